// src/handlers/stats.rs

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tokio::time::Duration;

use crate::{
    error::AppError,
    models::{
        contest::{Contest, WindowState},
        participation::{AnswerSheet, Participation, SubmissionCause},
        stats::{ContestStats, QuestionTallyRow, ScoreRow, build_stats},
    },
    state::AppState,
    utils::jwt::Claims,
};

use super::contest::{load_contest, resolve_question_set};
use super::submission::finalize_submission;

/// Folds the contest's committed answer records into the aggregate object.
/// Reads only committed rows; never locks writers.
pub(crate) async fn gather_stats(
    pool: &SqlitePool,
    contest_id: i64,
) -> Result<ContestStats, AppError> {
    let (joined_count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM participations WHERE contest_id = ?")
            .bind(contest_id)
            .fetch_one(pool)
            .await?;

    let score_rows = sqlx::query_as::<_, ScoreRow>(
        r#"
        SELECT p.id AS participation_id, COALESCE(SUM(ar.is_correct), 0) AS score
        FROM participations p
        JOIN answer_records ar ON ar.participation_id = p.id
        WHERE p.contest_id = ? AND p.submitted_at IS NOT NULL
        GROUP BY p.id
        "#,
    )
    .bind(contest_id)
    .fetch_all(pool)
    .await?;

    let tally_rows = sqlx::query_as::<_, QuestionTallyRow>(
        r#"
        SELECT cq.question_id AS question_id,
               SUM(CASE WHEN ar.is_correct = 1 THEN 1 ELSE 0 END) AS correct_count,
               SUM(CASE WHEN ar.selected IS NOT NULL AND ar.is_correct = 0 THEN 1 ELSE 0 END)
                   AS incorrect_count,
               SUM(CASE WHEN ar.participation_id IS NOT NULL AND ar.selected IS NULL THEN 1 ELSE 0 END)
                   AS unanswered_count
        FROM contest_questions cq
        LEFT JOIN (
            SELECT ar.question_id, ar.selected, ar.is_correct, ar.participation_id
            FROM answer_records ar
            JOIN participations p ON p.id = ar.participation_id
            WHERE p.contest_id = ? AND p.submitted_at IS NOT NULL
        ) ar ON ar.question_id = cq.question_id
        WHERE cq.contest_id = ?
        GROUP BY cq.question_id
        ORDER BY MIN(cq.position)
        "#,
    )
    .bind(contest_id)
    .bind(contest_id)
    .fetch_all(pool)
    .await?;

    Ok(build_stats(contest_id, joined_count, &score_rows, tally_rows))
}

/// Force-submits every participation of a closed contest that still lacks a
/// submission timestamp, scoring it all-unanswered with the deadline as the
/// submission time. Keeps completion rate and percentile well-defined
/// without waiting on client cooperation. Idempotent: a second sweep finds
/// nothing to do.
pub(crate) async fn sweep_closed_contest(
    state: &AppState,
    contest: &Contest,
) -> Result<u64, AppError> {
    let stragglers = sqlx::query_as::<_, Participation>(
        r#"
        SELECT id, contest_id, user_id, joined_at, submitted_at, submitted_by,
               auto_submitted, violation_count, draft_answers
        FROM participations
        WHERE contest_id = ? AND submitted_at IS NULL
        "#,
    )
    .bind(contest.id)
    .fetch_all(&state.pool)
    .await?;

    if stragglers.is_empty() {
        return Ok(0);
    }

    let questions = resolve_question_set(&state.pool, contest.id).await?;
    let empty = AnswerSheet::new();

    let mut swept = 0;
    for participation in &stragglers {
        let result = finalize_submission(
            state,
            participation,
            contest,
            &questions,
            &empty,
            SubmissionCause::Timeout,
        )
        .await?;
        if !result.already_submitted {
            swept += 1;
        }
    }

    tracing::info!("Swept {} unsubmitted participations of contest {}", swept, contest.id);
    Ok(swept)
}

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    /// When present, the response includes the percentile of this score.
    pub score: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub stats: ContestStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percentile_of: Option<f64>,
}

/// Contest-wide statistics.
///
/// Admins may read at any time; participants only once the window is Closed
/// (aggregates would leak relative standings mid-contest). The first read
/// after close runs the deadline sweep, then results are announced.
pub async fn contest_stats(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(contest_id): Path<i64>,
    Query(query): Query<StatsQuery>,
) -> Result<impl IntoResponse, AppError> {
    let contest = load_contest(&state.pool, contest_id).await?;
    let closed = contest.window_state(state.clock.now()) == WindowState::Closed;

    if !closed && !claims.is_admin() {
        return Err(AppError::Forbidden(
            "Statistics are available once the contest closes".to_string(),
        ));
    }

    if closed {
        let swept = sweep_closed_contest(&state, &contest).await?;
        if swept > 0 {
            state.stats_cache.invalidate(contest_id).await;
        }
        state.notifier.results_available(contest_id);
    }

    let ttl = Duration::from_secs(state.config.stats_cache_ttl_seconds);
    let stats = match state.stats_cache.get(contest_id, ttl).await {
        Some(cached) => cached,
        None => {
            let fresh = gather_stats(&state.pool, contest_id).await?;
            state.stats_cache.insert(contest_id, fresh.clone()).await;
            fresh
        }
    };

    let percentile_of = query.score.map(|s| stats.percentile_of(s));
    Ok(Json(StatsResponse {
        stats,
        percentile_of,
    }))
}
