// src/models/contest.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Where a contest sits relative to its [start, end] window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowState {
    Scheduled,
    Active,
    Closed,
}

/// Pure, total window evaluation. Monotonic in `now` for a fixed window:
/// once Closed a contest never becomes Scheduled or Active again.
pub fn window_state(now: DateTime<Utc>, start: DateTime<Utc>, end: DateTime<Utc>) -> WindowState {
    if now < start {
        WindowState::Scheduled
    } else if now <= end {
        WindowState::Active
    } else {
        WindowState::Closed
    }
}

/// Represents the 'contests' table in the database.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Contest {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,

    /// Join code for gated contests, None for open ones.
    /// Never serialized; only admins see it, via the summary DTO.
    #[serde(skip)]
    pub join_code: Option<String>,

    pub created_by: i64,
    pub created_at: Option<DateTime<Utc>>,
}

impl Contest {
    pub fn window_state(&self, now: DateTime<Utc>) -> WindowState {
        window_state(now, self.start_time, self.end_time)
    }

    pub fn is_code_gated(&self) -> bool {
        self.join_code.is_some()
    }
}

/// Public contest metadata plus the computed window state.
#[derive(Debug, Serialize)]
pub struct ContestSummary {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub window_state: WindowState,
    pub code_gated: bool,
    /// Only present for admins.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub join_code: Option<String>,
    pub question_count: i64,
    pub created_by: i64,
}

impl ContestSummary {
    pub fn from_contest(
        contest: Contest,
        now: DateTime<Utc>,
        question_count: i64,
        include_code: bool,
    ) -> Self {
        let window_state = contest.window_state(now);
        Self {
            id: contest.id,
            title: contest.title,
            description: contest.description,
            start_time: contest.start_time,
            end_time: contest.end_time,
            window_state,
            code_gated: contest.join_code.is_some(),
            join_code: if include_code { contest.join_code } else { None },
            question_count,
            created_by: contest.created_by,
        }
    }
}

/// DTO for creating a contest.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateContestRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Ordered question ids; duplicates are dropped, order preserved.
    pub question_ids: Vec<i64>,
    /// If true, the contest is created with a generated join code.
    #[serde(default)]
    pub code_gated: bool,
}

/// DTO for validating a join code.
#[derive(Debug, Deserialize)]
pub struct ValidateCodeRequest {
    pub code: String,
}
