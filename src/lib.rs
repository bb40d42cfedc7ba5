//! Diagnosis Store - response capture for diagnosis research studies
//!
//! Records every answered question of a study session in SQLite and serves
//! the data back over a small HTTP API: submit, list, filter, CSV export and
//! bulk clear.
//!
//! # Record Fields
//!
//! | Field | Purpose |
//! |-------|---------|
//! | `id` | Auto-assigned, never reused |
//! | `userId` | Participant |
//! | `studyId` | Study instance |
//! | `questionIndex` | Position within the submission, from 0 |
//! | `diagnosis` | The participant's answer |
//! | `aiRecommendation` | Suggestion shown to the participant, or `null` |
//! | `timestamp` | ISO-8601, set when the row is written |
//!
//! # Quick Start
//!
//! ```no_run
//! use diagnosis_store::{Database, RecordFilter, ResponseInput};
//!
//! let db = Database::open_at("diagnosis.db").unwrap();
//!
//! db.submit_responses(
//!     "u1",
//!     "s1",
//!     &[ResponseInput::new("A"), ResponseInput::new("B").with_recommendation("see doc")],
//! )
//! .unwrap();
//!
//! let mine = db.filter_records(&RecordFilter::by_user("u1")).unwrap();
//! println!("{}", diagnosis_store::records_to_csv(&mine));
//! ```

pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod observability;
pub mod schema;
pub mod serve;

pub use config::Config;
pub use db::{Database, DbError, DiagnosisRecord, RecordFilter, ResponseInput, DEFAULT_DB_PATH};
pub use error::ApiError;
pub use export::{records_to_csv, CSV_HEADER};
pub use serve::{route, start_server, ApiReply, ApiRequest, DiagnosisServer, SubmitRequest};
