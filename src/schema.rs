// Diagnosis store schema - Diesel ORM mapping for the diagnoses table

// Column names on disk stay camelCase so databases written by earlier
// versions of the service are read as-is.
diesel::table! {
    diagnoses (id) {
        id -> Integer,
        #[sql_name = "userId"]
        user_id -> Text,
        #[sql_name = "studyId"]
        study_id -> Text,
        #[sql_name = "questionIndex"]
        question_index -> Integer,
        diagnosis -> Text,
        #[sql_name = "aiRecommendation"]
        ai_recommendation -> Nullable<Text>,
        timestamp -> Text,
    }
}
