//! Reading-module endpoints: topic and test generation, submission scoring,
//! and history.

use crate::error::AppResult;
use crate::practice::reading;
use crate::practice::types::{ReadingSessionRecord, ReadingTest};
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
pub struct SubmitRequest {
    pub test: ReadingTest,
    pub answers: HashMap<u32, String>,
}

/// GET /api/v1/reading/topic
pub async fn get_topic(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    let topic = reading::generate_topic(&state.gemini).await?;
    Ok(HttpResponse::Ok().json(json!({ "topic": topic })))
}

/// POST /api/v1/reading/test
pub async fn create_test(
    state: web::Data<AppState>,
    body: web::Json<TestRequest>,
) -> AppResult<HttpResponse> {
    let test = reading::generate_test(
        &state.gemini,
        &body.topic,
        &body.difficulty,
        body.question_count,
    )
    .await?;
    Ok(HttpResponse::Ok().json(test))
}

/// POST /api/v1/reading/submit
pub async fn submit(
    state: web::Data<AppState>,
    body: web::Json<SubmitRequest>,
) -> AppResult<HttpResponse> {
    let report = reading::score(&body.test, &body.answers);

    let record = ReadingSessionRecord {
        id: Uuid::new_v4(),
        topic: body.test.topic.clone(),
        report,
        date: Utc::now(),
    };
    state.stores.reading.append(record.clone())?;

    Ok(HttpResponse::Ok().json(record))
}

/// GET /api/v1/reading/history
pub async fn history(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    let sessions = state.stores.reading.load()?;
    Ok(HttpResponse::Ok().json(sessions))
}
