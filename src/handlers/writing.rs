//! Writing-module endpoints: topic generation, real-time feedback while
//! typing, final submission, and history.

use crate::error::{AppError, AppResult};
use crate::practice::types::Essay;
use crate::practice::writing;
use crate::state::AppState;
use crate::storage::Repository;
use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct FeedbackRequest {
    pub essay: String,
}

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub topic: String,
    pub essay: String,
}

/// GET /api/v1/writing/topic
pub async fn get_topic(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    let topic = writing::generate_topic(&state.gemini).await;
    Ok(HttpResponse::Ok().json(json!({ "topic": topic })))
}

/// POST /api/v1/writing/feedback - quick assessment of a partial essay.
pub async fn realtime_feedback(
    state: web::Data<AppState>,
    body: web::Json<FeedbackRequest>,
) -> AppResult<HttpResponse> {
    if body.essay.trim().is_empty() {
        return Err(AppError::ValidationError("Essay cannot be empty".to_string()));
    }

    let feedback = writing::realtime_feedback(&state.gemini, &body.essay).await;
    Ok(HttpResponse::Ok().json(feedback))
}

/// POST /api/v1/writing/submit - grade a finished essay and persist the
/// attempt. The record is created exactly once, at the end of the flow.
pub async fn submit(
    state: web::Data<AppState>,
    body: web::Json<SubmitRequest>,
) -> AppResult<HttpResponse> {
    if body.topic.trim().is_empty() {
        return Err(AppError::ValidationError("Topic cannot be empty".to_string()));
    }

    let feedback = writing::detailed_feedback(&state.gemini, &body.topic, &body.essay).await?;

    let essay = Essay {
        id: Uuid::new_v4(),
        topic: body.topic.clone(),
        content: body.essay.clone(),
        feedback,
        date: Utc::now(),
    };
    state.stores.essays.append(essay.clone())?;

    Ok(HttpResponse::Ok().json(essay))
}

/// GET /api/v1/writing/history
pub async fn history(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    let essays = state.stores.essays.load()?;
    Ok(HttpResponse::Ok().json(essays))
}
