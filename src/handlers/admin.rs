// src/handlers/admin.rs

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde_json::json;
use sqlx::types::Json as SqlJson;
use validator::Validate;

use crate::{error::AppError, models::question::CreateQuestionRequest, state::AppState};

/// Creates a new question in the question bank.
/// Admin only. Questions are immutable afterwards: no update or delete
/// surface exists, so referenced answer keys can never drift under a
/// running contest.
pub async fn create_question(
    State(state): State<AppState>,
    Json(payload): Json<CreateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let answer = payload.answer.to_ascii_lowercase();
    let now = state.clock.now();

    let (id,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO questions
            (content, options, answer, analysis, category, subcategory, difficulty, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(&payload.content)
    .bind(SqlJson(&payload.options))
    .bind(&answer)
    .bind(&payload.analysis)
    .bind(&payload.category)
    .bind(&payload.subcategory)
    .bind(&payload.difficulty)
    .bind(now)
    .fetch_one(&state.pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create question: {:?}", e);
        AppError::from(e)
    })?;

    Ok((StatusCode::CREATED, Json(json!({ "id": id }))))
}
