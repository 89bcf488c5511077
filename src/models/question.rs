// src/models/question.rs

use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, types::Json};
use validator::Validate;

/// Valid option labels, in display order. An answer key is always one of
/// these, lowercase.
pub const OPTION_LABELS: [&str; 4] = ["a", "b", "c", "d"];

/// Represents the 'questions' table in the database.
///
/// Questions are immutable once created: there is no update surface, so a
/// contest that references a question can never see its answer key change
/// under already-computed results.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,

    /// The text content of the question.
    pub content: String,

    /// The four option texts, indexed by label order (a..d).
    /// Stored as a JSON array in the database.
    pub options: Json<Vec<String>>,

    /// Label of the correct option: 'a', 'b', 'c' or 'd'.
    pub answer: String,

    /// Explanation of the correct answer, shown after the contest closes.
    pub analysis: Option<String>,

    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub difficulty: Option<String>,

    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// DTO for sending a question to an active participant
/// (excludes answer and analysis).
#[derive(Debug, Serialize)]
pub struct PublicQuestion {
    pub id: i64,
    pub content: String,
    pub options: Json<Vec<String>>,
}

impl From<Question> for PublicQuestion {
    fn from(q: Question) -> Self {
        Self {
            id: q.id,
            content: q.content,
            options: q.options,
        }
    }
}

/// DTO for creating a new question.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateQuestionRequest {
    #[validate(length(min = 1, max = 1000))]
    pub content: String,
    #[validate(custom(function = validate_options))]
    pub options: Vec<String>,
    #[validate(custom(function = validate_answer_label))]
    pub answer: String,
    #[validate(length(max = 2000))]
    pub analysis: Option<String>,
    #[validate(length(max = 100))]
    pub category: Option<String>,
    #[validate(length(max = 100))]
    pub subcategory: Option<String>,
    #[validate(length(max = 50))]
    pub difficulty: Option<String>,
}

fn validate_options(options: &[String]) -> Result<(), validator::ValidationError> {
    if options.len() != OPTION_LABELS.len() {
        return Err(validator::ValidationError::new("exactly_four_options_required"));
    }
    for opt in options {
        if opt.is_empty() || opt.len() > 500 {
            return Err(validator::ValidationError::new("option_length_invalid"));
        }
    }
    Ok(())
}

fn validate_answer_label(answer: &str) -> Result<(), validator::ValidationError> {
    if !OPTION_LABELS.contains(&answer.to_ascii_lowercase().as_str()) {
        return Err(validator::ValidationError::new("answer_must_be_a_to_d"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn option_list_must_have_four_entries() {
        assert!(validate_options(&["a".into(), "b".into(), "c".into(), "d".into()]).is_ok());
        assert!(validate_options(&["a".into(), "b".into()]).is_err());
        assert!(validate_options(&[]).is_err());
    }

    #[test]
    fn answer_label_is_case_insensitive_but_bounded() {
        assert!(validate_answer_label("a").is_ok());
        assert!(validate_answer_label("D").is_ok());
        assert!(validate_answer_label("e").is_err());
        assert!(validate_answer_label("ab").is_err());
    }
}
