// src/handlers/violation.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use serde_json::json;

use crate::{
    error::AppError,
    models::{
        contest::WindowState,
        participation::{AnswerSheet, SubmissionCause, ViolationRequest},
    },
    state::AppState,
    utils::jwt::Claims,
};

use super::contest::{load_contest, resolve_question_set};
use super::participation::load_participation;
use super::submission::{finalize_submission, normalize_answer_sheet};

/// Records an integrity violation (tab blur, resize, devtools, ...) against
/// the caller's participation.
///
/// At the configured threshold the participation is force-submitted through
/// the same state transition as a manual submit, scored from whatever
/// partial answers the client has buffered (empty sheet if none). A
/// violation arriving after submission is a no-op: nothing is appended and
/// the existing state is reported back.
pub async fn record_violation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(participation_id): Path<i64>,
    Json(payload): Json<ViolationRequest>,
) -> Result<impl IntoResponse, AppError> {
    let participation = load_participation(&state.pool, participation_id).await?;
    if participation.user_id != claims.user_id()? {
        return Err(AppError::Forbidden("Not your participation".to_string()));
    }

    if payload.kind.is_empty() || payload.kind.len() > 100 {
        return Err(AppError::BadRequest("Invalid violation kind".to_string()));
    }

    if participation.submitted_at.is_some() {
        return Ok(Json(json!({
            "count": participation.violation_count,
            "auto_submitted": participation.auto_submitted,
            "already_submitted": true,
        })));
    }

    let contest = load_contest(&state.pool, participation.contest_id).await?;
    let now = state.clock.now();
    if contest.window_state(now) == WindowState::Scheduled {
        return Err(AppError::BadRequest(
            "Contest window is not yet active".to_string(),
        ));
    }

    // Event append and counter bump are atomic; the counter only moves while
    // the participation is unsubmitted, so a concurrent submit wins cleanly.
    let mut tx = state.pool.begin().await?;

    sqlx::query(
        "INSERT INTO violation_events (participation_id, kind, created_at) VALUES (?, ?, ?)",
    )
    .bind(participation.id)
    .bind(&payload.kind)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    let bumped: Option<(i64,)> = sqlx::query_as(
        r#"
        UPDATE participations
        SET violation_count = violation_count + 1
        WHERE id = ? AND submitted_at IS NULL
        RETURNING violation_count
        "#,
    )
    .bind(participation.id)
    .fetch_optional(&mut *tx)
    .await?;

    let count = match bumped {
        Some((count,)) => {
            tx.commit().await?;
            count
        }
        None => {
            // Raced with a submission; drop the event too.
            tx.rollback().await?;
            let current = load_participation(&state.pool, participation.id).await?;
            return Ok(Json(json!({
                "count": current.violation_count,
                "auto_submitted": current.auto_submitted,
                "already_submitted": true,
            })));
        }
    };

    tracing::warn!(
        "Violation '{}' recorded for participation {} (count {})",
        payload.kind,
        participation.id,
        count
    );

    if count < state.config.violation_threshold {
        return Ok(Json(json!({
            "count": count,
            "auto_submitted": false,
        })));
    }

    // Threshold reached: force-submit from the draft buffer.
    let questions = resolve_question_set(&state.pool, contest.id).await?;
    let draft: AnswerSheet = participation
        .draft_answers
        .as_deref()
        .and_then(|raw| serde_json::from_str(raw).ok())
        .unwrap_or_default();
    let answers = normalize_answer_sheet(&draft, &questions, false)
        .unwrap_or_default();

    let result = finalize_submission(
        &state,
        &participation,
        &contest,
        &questions,
        &answers,
        SubmissionCause::Violation,
    )
    .await?;

    tracing::warn!(
        "Participation {} force-submitted after {} violations",
        participation.id,
        count
    );

    Ok(Json(json!({
        "count": count,
        "auto_submitted": true,
        "result": result,
    })))
}
