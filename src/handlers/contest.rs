// src/handlers/contest.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        contest::{Contest, ContestSummary, CreateContestRequest, ValidateCodeRequest, WindowState},
        question::{PublicQuestion, Question},
    },
    state::AppState,
    utils::{
        code::{generate_join_code, is_well_formed, normalize_join_code},
        jwt::Claims,
    },
};

/// Fetches a contest row or fails with 404.
pub(crate) async fn load_contest(pool: &SqlitePool, contest_id: i64) -> Result<Contest, AppError> {
    sqlx::query_as::<_, Contest>(
        r#"
        SELECT id, title, description, start_time, end_time, join_code, created_by, created_at
        FROM contests
        WHERE id = ?
        "#,
    )
    .bind(contest_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Contest {} not found", contest_id)))
}

/// The contest's ordered, immutable question list, answer keys included.
/// Scoring and statistics both read through here so their denominators agree.
pub(crate) async fn resolve_question_set(
    pool: &SqlitePool,
    contest_id: i64,
) -> Result<Vec<Question>, AppError> {
    let questions = sqlx::query_as::<_, Question>(
        r#"
        SELECT q.id, q.content, q.options, q.answer, q.analysis,
               q.category, q.subcategory, q.difficulty, q.created_at
        FROM contest_questions cq
        JOIN questions q ON q.id = cq.question_id
        WHERE cq.contest_id = ?
        ORDER BY cq.position
        "#,
    )
    .bind(contest_id)
    .fetch_all(pool)
    .await?;

    Ok(questions)
}

/// Generates a join code that is unique among contests whose window has not
/// yet closed. Codes of closed contests may be recycled.
async fn issue_unique_code(state: &AppState, exclude_contest: i64) -> Result<String, AppError> {
    let now = state.clock.now();

    for _ in 0..32 {
        let candidate = generate_join_code(state.config.join_code_length);

        let holders = sqlx::query_as::<_, Contest>(
            r#"
            SELECT id, title, description, start_time, end_time, join_code, created_by, created_at
            FROM contests
            WHERE join_code = ? AND id != ?
            "#,
        )
        .bind(&candidate)
        .bind(exclude_contest)
        .fetch_all(&state.pool)
        .await?;

        let collides = holders
            .iter()
            .any(|c| c.window_state(now) != WindowState::Closed);
        if !collides {
            return Ok(candidate);
        }
    }

    Err(AppError::InternalServerError(
        "Could not generate a unique join code".to_string(),
    ))
}

/// Creates a contest with an ordered question list.
/// Admin only. The question list is fixed at creation; there is no update
/// surface, so it can never change once participants exist.
pub async fn create_contest(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateContestRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }
    if payload.end_time <= payload.start_time {
        return Err(AppError::BadRequest(
            "end_time must be after start_time".to_string(),
        ));
    }

    // Dedup while preserving the submitted order.
    let mut question_ids: Vec<i64> = Vec::with_capacity(payload.question_ids.len());
    for id in &payload.question_ids {
        if !question_ids.contains(id) {
            question_ids.push(*id);
        }
    }
    if question_ids.is_empty() {
        return Err(AppError::BadRequest(
            "A contest needs at least one question".to_string(),
        ));
    }

    // All referenced questions must exist.
    let mut query_builder =
        QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM questions WHERE id IN (");
    let mut separated = query_builder.separated(",");
    for id in &question_ids {
        separated.push_bind(id);
    }
    separated.push_unseparated(")");

    let (found,): (i64,) = query_builder
        .build_query_as()
        .fetch_one(&state.pool)
        .await?;
    if found != question_ids.len() as i64 {
        return Err(AppError::BadRequest(
            "One or more question ids do not exist".to_string(),
        ));
    }

    let created_by = claims.user_id()?;
    let now = state.clock.now();

    let mut tx = state.pool.begin().await?;

    let (contest_id,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO contests (title, description, start_time, end_time, created_by, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(&payload.title)
    .bind(&payload.description)
    .bind(payload.start_time)
    .bind(payload.end_time)
    .bind(created_by)
    .bind(now)
    .fetch_one(&mut *tx)
    .await?;

    for (position, question_id) in question_ids.iter().enumerate() {
        sqlx::query(
            "INSERT INTO contest_questions (contest_id, question_id, position) VALUES (?, ?, ?)",
        )
        .bind(contest_id)
        .bind(question_id)
        .bind(position as i64)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    let join_code = if payload.code_gated {
        let code = issue_unique_code(&state, contest_id).await?;
        sqlx::query("UPDATE contests SET join_code = ? WHERE id = ?")
            .bind(&code)
            .bind(contest_id)
            .execute(&state.pool)
            .await?;
        Some(code)
    } else {
        None
    };

    tracing::info!(
        "Contest {} created by user {} ({} questions)",
        contest_id,
        created_by,
        question_ids.len()
    );

    let contest = load_contest(&state.pool, contest_id).await?;
    let summary =
        ContestSummary::from_contest(contest, now, question_ids.len() as i64, join_code.is_some());
    Ok((StatusCode::CREATED, Json(summary)))
}

/// Lists all contests with their computed window state.
pub async fn list_contests(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let contests = sqlx::query_as::<_, Contest>(
        r#"
        SELECT id, title, description, start_time, end_time, join_code, created_by, created_at
        FROM contests
        ORDER BY start_time DESC
        "#,
    )
    .fetch_all(&state.pool)
    .await?;

    let now = state.clock.now();
    let mut summaries = Vec::with_capacity(contests.len());
    for contest in contests {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM contest_questions WHERE contest_id = ?")
                .bind(contest.id)
                .fetch_one(&state.pool)
                .await?;
        summaries.push(ContestSummary::from_contest(
            contest,
            now,
            count,
            claims.is_admin(),
        ));
    }

    Ok(Json(summaries))
}

/// Public contest metadata. Admins additionally see the join code.
pub async fn get_contest(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(contest_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let contest = load_contest(&state.pool, contest_id).await?;

    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM contest_questions WHERE contest_id = ?")
            .bind(contest_id)
            .fetch_one(&state.pool)
            .await?;

    let summary =
        ContestSummary::from_contest(contest, state.clock.now(), count, claims.is_admin());
    Ok(Json(summary))
}

/// The contest's question list for a joined participant.
///
/// While the window is Active the answer key and analysis are withheld; once
/// Closed (or for admins) the full records are returned so clients can render
/// explanations.
pub async fn contest_questions(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(contest_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let contest = load_contest(&state.pool, contest_id).await?;
    let user_id = claims.user_id()?;

    if !claims.is_admin() {
        let joined: Option<(i64,)> = sqlx::query_as(
            "SELECT id FROM participations WHERE contest_id = ? AND user_id = ?",
        )
        .bind(contest_id)
        .bind(user_id)
        .fetch_optional(&state.pool)
        .await?;
        if joined.is_none() {
            return Err(AppError::Forbidden(
                "Join the contest to see its questions".to_string(),
            ));
        }
    }

    let window = contest.window_state(state.clock.now());
    if window == WindowState::Scheduled && !claims.is_admin() {
        return Err(AppError::BadRequest(
            "Contest has not started yet".to_string(),
        ));
    }

    let questions = resolve_question_set(&state.pool, contest_id).await?;

    if window == WindowState::Closed || claims.is_admin() {
        Ok(Json(questions).into_response())
    } else {
        let public: Vec<PublicQuestion> = questions.into_iter().map(Into::into).collect();
        Ok(Json(public).into_response())
    }
}

/// Issues (or rotates) the join code of a contest. Admin only.
pub async fn issue_code(
    State(state): State<AppState>,
    Path(contest_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let contest = load_contest(&state.pool, contest_id).await?;

    if contest.window_state(state.clock.now()) == WindowState::Closed {
        return Err(AppError::Gone(
            "Cannot issue a code for a closed contest".to_string(),
        ));
    }

    let code = issue_unique_code(&state, contest_id).await?;
    sqlx::query("UPDATE contests SET join_code = ? WHERE id = ?")
        .bind(&code)
        .bind(contest_id)
        .execute(&state.pool)
        .await?;

    tracing::info!("Join code rotated for contest {}", contest_id);

    Ok(Json(json!({ "contest_id": contest_id, "code": code })))
}

/// Resolves a join code to its contest, if any open contest carries it.
pub async fn validate_code(
    State(state): State<AppState>,
    Json(payload): Json<ValidateCodeRequest>,
) -> Result<impl IntoResponse, AppError> {
    let code = normalize_join_code(&payload.code);
    if !is_well_formed(&code, state.config.join_code_length) {
        return Err(AppError::Forbidden("Invalid join code".to_string()));
    }

    let holders = sqlx::query_as::<_, Contest>(
        r#"
        SELECT id, title, description, start_time, end_time, join_code, created_by, created_at
        FROM contests
        WHERE join_code = ?
        "#,
    )
    .bind(&code)
    .fetch_all(&state.pool)
    .await?;

    let now = state.clock.now();
    let contest = holders
        .into_iter()
        .find(|c| c.window_state(now) != WindowState::Closed)
        .ok_or_else(|| AppError::Forbidden("Invalid join code".to_string()))?;

    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM contest_questions WHERE contest_id = ?")
            .bind(contest.id)
            .fetch_one(&state.pool)
            .await?;

    let summary = ContestSummary::from_contest(contest, now, count, false);
    Ok(Json(summary))
}
