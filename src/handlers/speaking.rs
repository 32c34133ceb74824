//! Speaking-module endpoints. The live session itself runs over the
//! WebSocket in `crate::websocket`; these routes cover topic generation,
//! the retry path for evaluation, and history.

use crate::error::{AppError, AppResult};
use crate::practice::speaking;
use crate::practice::types::{SpeakingSessionRecord, TranscriptEntry};
use crate::state::AppState;
use crate::storage::Repository;
use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct EvaluationRequest {
    pub topic: Option<String>,
    pub transcript: Vec<TranscriptEntry>,
    pub level: u8,
}

/// GET /api/v1/speaking/topic
pub async fn get_topic(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    let topic = speaking::generate_topic(&state.gemini).await?;
    Ok(HttpResponse::Ok().json(json!({ "topic": topic })))
}

/// POST /api/v1/speaking/evaluation - grade a transcript and persist the
/// session. This is the retry path when the live session's own grading call
/// failed: the client still holds the transcript and submits it again.
pub async fn evaluate(
    state: web::Data<AppState>,
    body: web::Json<EvaluationRequest>,
) -> AppResult<HttpResponse> {
    if body.level == 0 || body.level > 9 {
        return Err(AppError::ValidationError(
            "Target band must be between 1 and 9".to_string(),
        ));
    }

    let feedback = speaking::evaluate(&state.gemini, &body.transcript, body.level).await?;

    let record = SpeakingSessionRecord {
        id: Uuid::new_v4(),
        topic: body.topic.clone().unwrap_or_default(),
        transcript: body.transcript.clone(),
        feedback,
        date: Utc::now(),
    };
    state.stores.speaking.append(record.clone())?;

    Ok(HttpResponse::Ok().json(record))
}

/// GET /api/v1/speaking/history
pub async fn history(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    let sessions = state.stores.speaking.load()?;
    Ok(HttpResponse::Ok().json(sessions))
}
