//! Listening-module endpoints: topic and test generation, narration audio,
//! submission scoring, and history.

use crate::audio::codec;
use crate::error::{AppError, AppResult};
use crate::practice::listening;
use crate::practice::types::{ListeningSessionRecord, ListeningTest};
use crate::state::AppState;
use crate::storage::Repository;
use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct TestRequest {
    pub topic: String,
    pub difficulty: String,
    pub question_count: u32,
}

#[derive(Debug, Deserialize)]
pub struct AudioRequest {
    pub script: String,
}

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub test: ListeningTest,
    /// Answers keyed by question id; unanswered questions are simply absent
    pub answers: HashMap<u32, String>,
}

/// GET /api/v1/listening/topic
pub async fn get_topic(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    let topic = listening::generate_topic(&state.gemini).await?;
    Ok(HttpResponse::Ok().json(json!({ "topic": topic })))
}

/// POST /api/v1/listening/test
pub async fn create_test(
    state: web::Data<AppState>,
    body: web::Json<TestRequest>,
) -> AppResult<HttpResponse> {
    let test = listening::generate_test(
        &state.gemini,
        &body.topic,
        &body.difficulty,
        body.question_count,
    )
    .await?;
    Ok(HttpResponse::Ok().json(test))
}

/// POST /api/v1/listening/audio - synthesize the narration and return a WAV
/// stream the browser's audio element plays directly.
pub async fn synthesize_audio(
    state: web::Data<AppState>,
    body: web::Json<AudioRequest>,
) -> AppResult<HttpResponse> {
    if body.script.trim().is_empty() {
        return Err(AppError::ValidationError("Script cannot be empty".to_string()));
    }

    let config = state.get_config();
    let pcm = state.gemini.synthesize_speech(&body.script).await?;
    let wav = codec::pcm_to_wav(&pcm, config.audio.output_sample_rate, 1, 16);

    Ok(HttpResponse::Ok().content_type("audio/wav").body(wav))
}

/// POST /api/v1/listening/submit - score the answers locally against the
/// test's canonical answers and persist the attempt.
pub async fn submit(
    state: web::Data<AppState>,
    body: web::Json<SubmitRequest>,
) -> AppResult<HttpResponse> {
    let report = listening::score(&body.test, &body.answers);

    let record = ListeningSessionRecord {
        id: Uuid::new_v4(),
        topic: body.test.topic.clone(),
        report,
        date: Utc::now(),
    };
    state.stores.listening.append(record.clone())?;

    Ok(HttpResponse::Ok().json(record))
}

/// GET /api/v1/listening/history
pub async fn history(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    let sessions = state.stores.listening.load()?;
    Ok(HttpResponse::Ok().json(sessions))
}
