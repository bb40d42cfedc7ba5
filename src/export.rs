//! CSV export of diagnosis records
//!
//! The layout is fixed: a header row followed by one line per record, in
//! the order given. `diagnosis` and `aiRecommendation` are wrapped in double
//! quotes without escaping, and a missing recommendation is written as
//! `"null"`.

use crate::db::DiagnosisRecord;

/// Header row of every export
pub const CSV_HEADER: &str = "userId,studyId,questionIndex,diagnosis,aiRecommendation,timestamp";

/// Filename offered to the client for the attachment
pub const EXPORT_FILENAME: &str = "diagnosis_export.csv";

/// Render one record as a CSV line (no trailing newline)
pub fn record_to_csv_line(record: &DiagnosisRecord) -> String {
    format!(
        "{},{},{},\"{}\",\"{}\",{}",
        record.user_id,
        record.study_id,
        record.question_index,
        record.diagnosis,
        record.ai_recommendation.as_deref().unwrap_or("null"),
        record.timestamp
    )
}

/// Render records as CSV text
///
/// The header is always followed by a newline; data lines are joined with
/// `\n` and the last one has no terminator.
pub fn records_to_csv(records: &[DiagnosisRecord]) -> String {
    let mut out = String::with_capacity(CSV_HEADER.len() + 1 + records.len() * 64);
    out.push_str(CSV_HEADER);
    out.push('\n');

    for (i, record) in records.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        out.push_str(&record_to_csv_line(record));
    }

    out
}

/// `Content-Disposition` value for an export download
pub fn attachment_disposition() -> String {
    format!("attachment; filename=\"{}\"", EXPORT_FILENAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: i32, user: &str, index: i32, diagnosis: &str, rec: Option<&str>) -> DiagnosisRecord {
        DiagnosisRecord {
            id,
            user_id: user.to_string(),
            study_id: "s1".to_string(),
            question_index: index,
            diagnosis: diagnosis.to_string(),
            ai_recommendation: rec.map(str::to_string),
            timestamp: "2024-05-01T12:00:00.123Z".to_string(),
        }
    }

    #[test]
    fn test_empty_export_is_header_only() {
        assert_eq!(records_to_csv(&[]), format!("{}\n", CSV_HEADER));
    }

    #[test]
    fn test_line_quotes_text_columns() {
        let line = record_to_csv_line(&record(1, "u1", 1, "B", Some("see doc")));
        assert_eq!(line, "u1,s1,1,\"B\",\"see doc\",2024-05-01T12:00:00.123Z");
    }

    #[test]
    fn test_missing_recommendation_written_as_null() {
        let line = record_to_csv_line(&record(1, "u1", 0, "A", None));
        assert_eq!(line, "u1,s1,0,\"A\",\"null\",2024-05-01T12:00:00.123Z");
    }

    #[test]
    fn test_rows_joined_without_trailing_newline() {
        let csv = records_to_csv(&[
            record(1, "u1", 0, "A", None),
            record(2, "u1", 1, "B", Some("see doc")),
        ]);
        let lines: Vec<&str> = csv.split('\n').collect();

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], CSV_HEADER);
        assert!(lines[1].starts_with("u1,s1,0,"));
        assert!(lines[2].starts_with("u1,s1,1,"));
        assert!(!csv.ends_with('\n'));
    }

    #[test]
    fn test_embedded_quotes_are_not_escaped() {
        let line = record_to_csv_line(&record(1, "u1", 0, "says \"hi\", twice", None));
        assert!(line.contains("\"says \"hi\", twice\""));
    }

    #[test]
    fn test_attachment_disposition() {
        assert_eq!(
            attachment_disposition(),
            "attachment; filename=\"diagnosis_export.csv\""
        );
    }
}
