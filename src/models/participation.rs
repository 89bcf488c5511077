// src/models/participation.rs

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Represents the 'participations' table: one user's enrollment in one
/// contest. `UNIQUE(contest_id, user_id)` at the schema level makes join
/// atomic; the submitted_at compare-and-set makes submission exactly-once.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Participation {
    pub id: i64,
    pub contest_id: i64,
    pub user_id: i64,
    pub joined_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    /// 'self', 'violation' or 'timeout' once submitted.
    pub submitted_by: Option<String>,
    pub auto_submitted: bool,
    pub violation_count: i64,
    /// Client-buffered partial answers (JSON), consumed by the violation
    /// force-submit path. Never serialized back to clients.
    #[serde(skip)]
    pub draft_answers: Option<String>,
}

/// What triggered a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionCause {
    SelfSubmit,
    Violation,
    Timeout,
}

impl SubmissionCause {
    pub fn as_str(self) -> &'static str {
        match self {
            SubmissionCause::SelfSubmit => "self",
            SubmissionCause::Violation => "violation",
            SubmissionCause::Timeout => "timeout",
        }
    }

    pub fn is_forced(self) -> bool {
        !matches!(self, SubmissionCause::SelfSubmit)
    }
}

/// Answer payload: question id -> selected option label (null = blank).
/// serde maps JSON object keys ("1": "b") onto the i64 keys.
pub type AnswerSheet = HashMap<i64, Option<String>>;

/// DTO for submitting (or drafting) answers.
#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    #[serde(default)]
    pub answers: AnswerSheet,
}

/// DTO for reporting an integrity violation.
#[derive(Debug, Deserialize)]
pub struct ViolationRequest {
    /// e.g. 'tab-blur', 'window-resize', 'devtools'.
    pub kind: String,
}

/// Derived result of a submitted participation. Always recomputable from the
/// answer records plus the participation timestamps; never a second source
/// of truth.
#[derive(Debug, Clone, Serialize)]
pub struct ExamResult {
    pub participation_id: i64,
    pub contest_id: i64,
    pub correct: i64,
    pub attempted: i64,
    pub total: i64,
    /// One point per correct answer.
    pub score: i64,
    pub time_taken_seconds: i64,
    pub auto_submitted: bool,
    pub submitted_by: String,
    /// True when this result was served from a previous submission rather
    /// than written by the current call.
    pub already_submitted: bool,
}
