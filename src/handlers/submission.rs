// src/handlers/submission.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::json;
use sqlx::SqlitePool;
use sqlx::types::Json as SqlJson;

use crate::{
    error::AppError,
    models::{
        contest::{Contest, WindowState},
        participation::{AnswerSheet, ExamResult, Participation, SubmissionCause, SubmitRequest},
        question::{OPTION_LABELS, Question},
    },
    state::AppState,
    utils::jwt::Claims,
};

use super::contest::{load_contest, resolve_question_set};
use super::participation::load_participation;

/// One scored entry of an answer sheet, ready to persist.
#[derive(Debug, PartialEq)]
pub(crate) struct ScoredAnswer {
    pub question_id: i64,
    pub selected: Option<String>,
    pub is_correct: bool,
}

/// Checks a raw answer sheet against the contest's question set.
///
/// Strict mode (the manual submit path) rejects unknown question ids and
/// malformed option labels. Lenient mode (forced paths, which must never
/// fail) silently drops them instead.
pub(crate) fn normalize_answer_sheet(
    raw: &AnswerSheet,
    questions: &[Question],
    strict: bool,
) -> Result<AnswerSheet, String> {
    let mut normalized = AnswerSheet::new();
    for (question_id, selected) in raw {
        if !questions.iter().any(|q| q.id == *question_id) {
            if strict {
                return Err(format!(
                    "Question {} is not part of this contest",
                    question_id
                ));
            }
            continue;
        }
        let label = match selected {
            None => None,
            Some(s) => {
                let label = s.trim().to_ascii_lowercase();
                if !OPTION_LABELS.contains(&label.as_str()) {
                    if strict {
                        return Err(format!("'{}' is not a valid option label", s));
                    }
                    continue;
                }
                Some(label)
            }
        };
        normalized.insert(*question_id, label);
    }
    Ok(normalized)
}

/// Scores every question of the contest, in order. Questions missing from
/// the sheet count as unanswered, and unanswered is simply incorrect; the
/// record count always equals the question count.
pub(crate) fn score_answer_sheet(
    questions: &[Question],
    answers: &AnswerSheet,
) -> Vec<ScoredAnswer> {
    questions
        .iter()
        .map(|q| {
            let selected = answers.get(&q.id).cloned().flatten();
            let is_correct = selected.as_deref() == Some(q.answer.as_str());
            ScoredAnswer {
                question_id: q.id,
                selected,
                is_correct,
            }
        })
        .collect()
}

/// Recomputes the result of an already-submitted participation from its
/// answer records. Result is a derived view, never dual-written.
pub(crate) async fn load_prior_result(
    pool: &SqlitePool,
    participation: &Participation,
    already_submitted: bool,
) -> Result<ExamResult, AppError> {
    let (total, correct, attempted): (i64, i64, i64) = sqlx::query_as(
        r#"
        SELECT COUNT(*),
               COALESCE(SUM(is_correct), 0),
               COALESCE(SUM(selected IS NOT NULL), 0)
        FROM answer_records
        WHERE participation_id = ?
        "#,
    )
    .bind(participation.id)
    .fetch_one(pool)
    .await?;

    let submitted_at = participation.submitted_at.ok_or_else(|| {
        AppError::InternalServerError(format!(
            "Participation {} has answer records but no submission timestamp",
            participation.id
        ))
    })?;

    Ok(ExamResult {
        participation_id: participation.id,
        contest_id: participation.contest_id,
        correct,
        attempted,
        total,
        score: correct,
        time_taken_seconds: (submitted_at - participation.joined_at).num_seconds().max(0),
        auto_submitted: participation.auto_submitted,
        submitted_by: participation
            .submitted_by
            .clone()
            .unwrap_or_else(|| "self".to_string()),
        already_submitted,
    })
}

/// The single submission state transition, shared by the manual, violation
/// and deadline-sweep paths.
///
/// The submitted_at compare-and-set and the answer-record writes run in one
/// transaction: a participation can never end up with a submission timestamp
/// and no records, or the reverse. Losing the CAS race degrades into the
/// idempotent already-submitted path.
pub(crate) async fn finalize_submission(
    state: &AppState,
    participation: &Participation,
    contest: &Contest,
    questions: &[Question],
    answers: &AnswerSheet,
    cause: SubmissionCause,
) -> Result<ExamResult, AppError> {
    let now = state.clock.now();
    let grace = Duration::seconds(state.config.submission_grace_seconds);

    let submitted_at: DateTime<Utc> = match cause {
        SubmissionCause::SelfSubmit => now,
        // A straggling violation may arrive after close; pin the timestamp
        // inside the window plus grace.
        SubmissionCause::Violation => now.min(contest.end_time + grace),
        // The sweep stamps the deadline itself.
        SubmissionCause::Timeout => contest.end_time,
    }
    .max(participation.joined_at);

    let scored = score_answer_sheet(questions, answers);

    let mut tx = state.pool.begin().await?;

    let claimed = sqlx::query(
        r#"
        UPDATE participations
        SET submitted_at = ?, submitted_by = ?, auto_submitted = ?
        WHERE id = ? AND submitted_at IS NULL
        "#,
    )
    .bind(submitted_at)
    .bind(cause.as_str())
    .bind(cause.is_forced())
    .bind(participation.id)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    if claimed == 0 {
        // Lost the race: someone else already submitted. Surface their
        // result untouched.
        tx.rollback().await?;
        let current = load_participation(&state.pool, participation.id).await?;
        return load_prior_result(&state.pool, &current, true).await;
    }

    for answer in &scored {
        sqlx::query(
            r#"
            INSERT INTO answer_records (participation_id, question_id, selected, is_correct)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(participation.id)
        .bind(answer.question_id)
        .bind(&answer.selected)
        .bind(answer.is_correct)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    state.stats_cache.invalidate(contest.id).await;
    state
        .notifier
        .submission_recorded(contest.id, participation.id, cause.is_forced());

    let correct = scored.iter().filter(|a| a.is_correct).count() as i64;
    let attempted = scored.iter().filter(|a| a.selected.is_some()).count() as i64;

    tracing::info!(
        "Participation {} submitted ({}): {}/{} correct",
        participation.id,
        cause.as_str(),
        correct,
        scored.len()
    );

    Ok(ExamResult {
        participation_id: participation.id,
        contest_id: contest.id,
        correct,
        attempted,
        total: scored.len() as i64,
        score: correct,
        time_taken_seconds: (submitted_at - participation.joined_at).num_seconds().max(0),
        auto_submitted: cause.is_forced(),
        submitted_by: cause.as_str().to_string(),
        already_submitted: false,
    })
}

/// Submits the caller's answer sheet for scoring.
///
/// Exactly-once: a repeat call (any payload) answers 200 with the prior
/// result and leaves all state untouched.
pub async fn submit(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(participation_id): Path<i64>,
    Json(payload): Json<SubmitRequest>,
) -> Result<impl IntoResponse, AppError> {
    let participation = load_participation(&state.pool, participation_id).await?;
    if participation.user_id != claims.user_id()? {
        return Err(AppError::Forbidden(
            "Not your participation".to_string(),
        ));
    }

    if participation.submitted_at.is_some() {
        let result = load_prior_result(&state.pool, &participation, true).await?;
        return Ok(Json(result));
    }

    let contest = load_contest(&state.pool, participation.contest_id).await?;
    let now = state.clock.now();
    match contest.window_state(now) {
        WindowState::Scheduled => {
            return Err(AppError::BadRequest(
                "Contest window is not yet active".to_string(),
            ));
        }
        WindowState::Closed => {
            let grace = Duration::seconds(state.config.submission_grace_seconds);
            if now > contest.end_time + grace {
                return Err(AppError::Gone("Contest window has closed".to_string()));
            }
        }
        WindowState::Active => {}
    }

    let questions = resolve_question_set(&state.pool, contest.id).await?;
    let answers = normalize_answer_sheet(&payload.answers, &questions, true)
        .map_err(AppError::BadRequest)?;

    let result = finalize_submission(
        &state,
        &participation,
        &contest,
        &questions,
        &answers,
        SubmissionCause::SelfSubmit,
    )
    .await?;

    Ok(Json(result))
}

/// Buffers the client's partial answers so the violation force-submit path
/// has something to score. No-op once submitted.
pub async fn save_draft(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(participation_id): Path<i64>,
    Json(payload): Json<SubmitRequest>,
) -> Result<impl IntoResponse, AppError> {
    let participation = load_participation(&state.pool, participation_id).await?;
    if participation.user_id != claims.user_id()? {
        return Err(AppError::Forbidden("Not your participation".to_string()));
    }
    if participation.submitted_at.is_some() {
        return Ok(Json(json!({ "buffered": false })));
    }

    let contest = load_contest(&state.pool, participation.contest_id).await?;
    match contest.window_state(state.clock.now()) {
        WindowState::Scheduled => {
            return Err(AppError::BadRequest(
                "Contest window is not yet active".to_string(),
            ));
        }
        WindowState::Closed => {
            return Err(AppError::Gone("Contest window has closed".to_string()));
        }
        WindowState::Active => {}
    }

    let questions = resolve_question_set(&state.pool, contest.id).await?;
    let answers = normalize_answer_sheet(&payload.answers, &questions, true)
        .map_err(AppError::BadRequest)?;

    let buffered = sqlx::query(
        "UPDATE participations SET draft_answers = ? WHERE id = ? AND submitted_at IS NULL",
    )
    .bind(serde_json::to_string(&answers)?)
    .bind(participation.id)
    .execute(&state.pool)
    .await?
    .rows_affected();

    Ok(Json(json!({ "buffered": buffered > 0 })))
}

/// One row of a per-question result breakdown.
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct BreakdownRow {
    pub question_id: i64,
    pub content: String,
    pub options: SqlJson<Vec<String>>,
    pub selected: Option<String>,
    pub is_correct: bool,
    pub answer: String,
    pub analysis: Option<String>,
}

/// A participant's own result.
///
/// The raw score is visible immediately after their own submission; the
/// per-question breakdown (which reveals the answer key) is withheld until
/// the contest window is Closed, so still-active peers cannot mine it.
/// Admins see everything at any time.
pub async fn get_result(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(participation_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let participation = load_participation(&state.pool, participation_id).await?;
    if participation.user_id != claims.user_id()? && !claims.is_admin() {
        return Err(AppError::Forbidden("Not your participation".to_string()));
    }
    if participation.submitted_at.is_none() {
        return Err(AppError::NotFound("No submission yet".to_string()));
    }

    let result = load_prior_result(&state.pool, &participation, false).await?;

    let contest = load_contest(&state.pool, participation.contest_id).await?;
    let closed = contest.window_state(state.clock.now()) == WindowState::Closed;

    if !(closed || claims.is_admin()) {
        return Ok(Json(json!({
            "result": result,
            "breakdown": serde_json::Value::Null,
            "percentile": serde_json::Value::Null,
        })));
    }

    let breakdown = sqlx::query_as::<_, BreakdownRow>(
        r#"
        SELECT ar.question_id, q.content, q.options, ar.selected, ar.is_correct,
               q.answer, q.analysis
        FROM answer_records ar
        JOIN questions q ON q.id = ar.question_id
        JOIN contest_questions cq
            ON cq.question_id = ar.question_id AND cq.contest_id = ?
        WHERE ar.participation_id = ?
        ORDER BY cq.position
        "#,
    )
    .bind(contest.id)
    .bind(participation.id)
    .fetch_all(&state.pool)
    .await?;

    let stats = super::stats::gather_stats(&state.pool, contest.id).await?;

    Ok(Json(json!({
        "result": result,
        "breakdown": breakdown,
        "percentile": stats.percentile_of(result.score),
    })))
}
