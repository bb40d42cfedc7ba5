//! SQLite database with Diesel ORM
//!
//! Stores one row per answered study question. The `diagnoses` table is
//! created on open when missing, so a fresh path yields a usable store.

use crate::schema::diagnoses;
use chrono::{SecondsFormat, Utc};
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool, PooledConnection};
use diesel::sqlite::SqliteConnection;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Database file used when nothing else is configured
pub const DEFAULT_DB_PATH: &str = "./diagnosis.db";

// ============================================================================
// Diesel Models
// ============================================================================

/// Insertable diagnosis row
#[derive(Insertable)]
#[diesel(table_name = diagnoses)]
pub struct NewDiagnosis<'a> {
    pub user_id: &'a str,
    pub study_id: &'a str,
    pub question_index: i32,
    pub diagnosis: &'a str,
    pub ai_recommendation: Option<&'a str>,
    pub timestamp: &'a str,
}

/// Queryable diagnosis row, serialized with the wire field names
#[derive(Queryable, Selectable, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[diesel(table_name = diagnoses)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosisRecord {
    pub id: i32,
    pub user_id: String,
    pub study_id: String,
    pub question_index: i32,
    pub diagnosis: String,
    pub ai_recommendation: Option<String>,
    pub timestamp: String,
}

/// One answered question as submitted by a participant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseInput {
    pub answer: String,
    #[serde(default)]
    pub ai_recommendation: Option<String>,
}

impl ResponseInput {
    pub fn new(answer: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
            ai_recommendation: None,
        }
    }

    pub fn with_recommendation(mut self, recommendation: impl Into<String>) -> Self {
        self.ai_recommendation = Some(recommendation.into());
        self
    }

    /// Recommendation to store; an empty string counts as not provided
    fn stored_recommendation(&self) -> Option<&str> {
        self.ai_recommendation.as_deref().filter(|s| !s.is_empty())
    }
}

/// Optional equality constraints for narrowing the record set
///
/// Deserializes from the `userId` / `studyId` query parameters. Empty values
/// are treated as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordFilter {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub study_id: Option<String>,
}

impl RecordFilter {
    pub fn by_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            study_id: None,
        }
    }

    pub fn by_study(study_id: impl Into<String>) -> Self {
        Self {
            user_id: None,
            study_id: Some(study_id.into()),
        }
    }

    fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref().filter(|s| !s.is_empty())
    }

    fn study_id(&self) -> Option<&str> {
        self.study_id.as_deref().filter(|s| !s.is_empty())
    }

    /// True when no constraint would be applied
    pub fn is_empty(&self) -> bool {
        self.user_id().is_none() && self.study_id().is_none()
    }
}

/// Current time as ISO-8601 UTC with millisecond precision
pub fn now_iso8601() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

// ============================================================================
// Database Connection
// ============================================================================

type DbPool = Pool<ConnectionManager<SqliteConnection>>;
type DbConn = PooledConnection<ConnectionManager<SqliteConnection>>;

/// Error type for database operations
#[derive(Debug, Error)]
pub enum DbError {
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("Query error: {0}")]
    Query(#[from] diesel::result::Error),
    #[error("{0}")]
    Validation(String),
}

pub type Result<T> = std::result::Result<T, DbError>;

/// Database connection wrapper with connection pool
///
/// Cloning is cheap and shares the underlying pool.
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
    path: PathBuf,
}

impl Database {
    /// Open the database at [`DEFAULT_DB_PATH`]
    pub fn open() -> Result<Self> {
        Self::open_at(DEFAULT_DB_PATH)
    }

    /// Open database at specified path, creating file and table as needed
    pub fn open_at<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    DbError::Connection(format!("cannot create {}: {}", parent.display(), e))
                })?;
            }
        }

        let manager = ConnectionManager::<SqliteConnection>::new(path.to_string_lossy());
        let pool = Pool::builder()
            .max_size(5)
            .build(manager)
            .map_err(|e| DbError::Connection(e.to_string()))?;

        let db = Self { pool, path };
        db.init_schema()?;
        tracing::debug!(path = %db.path.display(), "database ready");
        Ok(db)
    }

    /// Path of the backing database file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn get_conn(&self) -> Result<DbConn> {
        self.pool.get().map_err(|e| DbError::Connection(e.to_string()))
    }

    fn init_schema(&self) -> Result<()> {
        let mut conn = self.get_conn()?;

        diesel::sql_query(
            r#"
            CREATE TABLE IF NOT EXISTS diagnoses (
                id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                userId TEXT NOT NULL,
                studyId TEXT NOT NULL,
                questionIndex INTEGER NOT NULL,
                diagnosis TEXT NOT NULL,
                aiRecommendation TEXT,
                timestamp TEXT NOT NULL
            )
        "#,
        )
        .execute(&mut conn)?;

        diesel::sql_query(
            "CREATE INDEX IF NOT EXISTS idx_diagnoses_user_question ON diagnoses(userId, questionIndex)",
        )
        .execute(&mut conn)?;
        diesel::sql_query("CREATE INDEX IF NOT EXISTS idx_diagnoses_study ON diagnoses(studyId)")
            .execute(&mut conn)?;

        Ok(())
    }

    // ========================================================================
    // Diagnosis Operations
    // ========================================================================

    /// Insert one row per response, all in a single transaction
    ///
    /// `questionIndex` is the response's position in `responses`. Each row is
    /// stamped with the time it is written. Any failure rolls back every row
    /// of the submission. Returns the number of rows inserted.
    pub fn submit_responses(
        &self,
        user_id: &str,
        study_id: &str,
        responses: &[ResponseInput],
    ) -> Result<usize> {
        let mut conn = self.get_conn()?;

        conn.transaction::<_, DbError, _>(|conn| {
            for (index, response) in responses.iter().enumerate() {
                let question_index = i32::try_from(index).map_err(|_| {
                    DbError::Validation(format!("too many responses: {}", responses.len()))
                })?;
                let timestamp = now_iso8601();

                let row = NewDiagnosis {
                    user_id,
                    study_id,
                    question_index,
                    diagnosis: &response.answer,
                    ai_recommendation: response.stored_recommendation(),
                    timestamp: &timestamp,
                };

                diesel::insert_into(diagnoses::table)
                    .values(&row)
                    .execute(conn)?;
            }
            Ok(responses.len())
        })
    }

    /// Every record, ordered by user then question index
    pub fn get_all_records(&self) -> Result<Vec<DiagnosisRecord>> {
        self.filter_records(&RecordFilter::default())
    }

    /// Records matching all supplied constraints, same ordering as
    /// [`Database::get_all_records`]
    pub fn filter_records(&self, filter: &RecordFilter) -> Result<Vec<DiagnosisRecord>> {
        let mut conn = self.get_conn()?;

        let mut query = diagnoses::table.into_boxed();
        if let Some(user_id) = filter.user_id() {
            query = query.filter(diagnoses::user_id.eq(user_id.to_owned()));
        }
        if let Some(study_id) = filter.study_id() {
            query = query.filter(diagnoses::study_id.eq(study_id.to_owned()));
        }

        let records = query
            .order((
                diagnoses::user_id.asc(),
                diagnoses::question_index.asc(),
                diagnoses::id.asc(),
            ))
            .load::<DiagnosisRecord>(&mut conn)?;
        Ok(records)
    }

    /// Delete every record. Returns the number of rows removed.
    pub fn clear_all(&self) -> Result<usize> {
        let mut conn = self.get_conn()?;
        let deleted = diesel::delete(diagnoses::table).execute(&mut conn)?;
        Ok(deleted)
    }

    pub fn count_records(&self) -> Result<i64> {
        let mut conn = self.get_conn()?;
        let count = diagnoses::table.count().get_result(&mut conn)?;
        Ok(count)
    }
}
