// src/handlers/participation.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;
use sqlx::SqlitePool;

use crate::{
    error::AppError,
    models::{contest::WindowState, participation::Participation},
    state::AppState,
    utils::{code::normalize_join_code, jwt::Claims},
};

use super::contest::load_contest;

#[derive(Debug, Deserialize, Default)]
pub struct JoinRequest {
    pub code: Option<String>,
}

/// Fetches a participation row or fails with 404.
pub(crate) async fn load_participation(
    pool: &SqlitePool,
    participation_id: i64,
) -> Result<Participation, AppError> {
    sqlx::query_as::<_, Participation>(
        r#"
        SELECT id, contest_id, user_id, joined_at, submitted_at, submitted_by,
               auto_submitted, violation_count, draft_answers
        FROM participations
        WHERE id = ?
        "#,
    )
    .bind(participation_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Participation {} not found", participation_id)))
}

/// Joins the authenticated user into a contest.
///
/// Idempotent: a repeat join (including one that loses a race against a
/// concurrent request) answers 200 with the existing participation instead
/// of failing. The `UNIQUE(contest_id, user_id)` constraint is what makes
/// two concurrent joins yield exactly one row; there is no check-then-insert.
pub async fn join(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(contest_id): Path<i64>,
    Json(payload): Json<JoinRequest>,
) -> Result<impl IntoResponse, AppError> {
    let contest = load_contest(&state.pool, contest_id).await?;
    let user_id = claims.user_id()?;
    let now = state.clock.now();

    let window = contest.window_state(now);
    if window == WindowState::Closed {
        return Err(AppError::Gone("Contest window has closed".to_string()));
    }

    if contest.is_code_gated() {
        // Gated contests are only joinable once active; no pre-registration.
        if window == WindowState::Scheduled {
            return Err(AppError::BadRequest(
                "Contest has not started yet".to_string(),
            ));
        }

        let supplied = payload.code.as_deref().map(normalize_join_code);
        let expected = contest.join_code.as_deref().map(normalize_join_code);
        if supplied.is_none() || supplied != expected {
            return Err(AppError::Forbidden("Invalid join code".to_string()));
        }
    }

    let inserted = sqlx::query(
        r#"
        INSERT INTO participations (contest_id, user_id, joined_at)
        VALUES (?, ?, ?)
        ON CONFLICT(contest_id, user_id) DO NOTHING
        "#,
    )
    .bind(contest_id)
    .bind(user_id)
    .bind(now)
    .execute(&state.pool)
    .await?
    .rows_affected();

    let participation = sqlx::query_as::<_, Participation>(
        r#"
        SELECT id, contest_id, user_id, joined_at, submitted_at, submitted_by,
               auto_submitted, violation_count, draft_answers
        FROM participations
        WHERE contest_id = ? AND user_id = ?
        "#,
    )
    .bind(contest_id)
    .bind(user_id)
    .fetch_one(&state.pool)
    .await?;

    if window == WindowState::Active {
        state.notifier.contest_started(contest_id);
    }

    let status = if inserted > 0 {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((
        status,
        Json(json!({
            "participation": participation,
            "already_joined": inserted == 0,
        })),
    ))
}

/// The authenticated user's own participation in a contest.
pub async fn my_participation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(contest_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;

    let participation = sqlx::query_as::<_, Participation>(
        r#"
        SELECT id, contest_id, user_id, joined_at, submitted_at, submitted_by,
               auto_submitted, violation_count, draft_answers
        FROM participations
        WHERE contest_id = ? AND user_id = ?
        "#,
    )
    .bind(contest_id)
    .bind(user_id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Not a participant of this contest".to_string()))?;

    Ok(Json(participation))
}
