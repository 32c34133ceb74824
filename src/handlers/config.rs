use crate::{error::AppError, state::AppState};
use actix_web::{web, HttpResponse};
use serde_json::json;

/// GET /api/v1/config - the running configuration, minus the API key.
pub async fn get_config(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let config = state.get_config();

    Ok(HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "config": {
            "server": {
                "host": config.server.host,
                "port": config.server.port
            },
            "gemini": {
                "text_model": config.gemini.text_model,
                "reasoning_model": config.gemini.reasoning_model,
                "live_model": config.gemini.live_model,
                "tts_model": config.gemini.tts_model,
                "voice": config.gemini.voice
            },
            "audio": {
                "capture_sample_rate": config.audio.capture_sample_rate,
                "output_sample_rate": config.audio.output_sample_rate,
                "frame_samples": config.audio.frame_samples
            },
            "speaking": {
                "default_duration_secs": config.speaking.default_duration_secs,
                "default_level": config.speaking.default_level
            },
            "performance": {
                "max_concurrent_sessions": config.performance.max_concurrent_sessions
            }
        }
    })))
}

/// PUT /api/v1/config - partial runtime updates; validated before applying.
pub async fn update_config(
    state: web::Data<AppState>,
    body: web::Json<serde_json::Value>,
) -> Result<HttpResponse, AppError> {
    let json_str = serde_json::to_string(&body.into_inner())?;

    let mut current_config = state.get_config();
    current_config
        .update_from_json(&json_str)
        .map_err(|e| AppError::ValidationError(e.to_string()))?;

    state
        .update_config(current_config.clone())
        .map_err(AppError::ValidationError)?;

    Ok(HttpResponse::Ok().json(json!({
        "status": "success",
        "message": "Configuration updated successfully",
        "timestamp": chrono::Utc::now().to_rfc3339()
    })))
}
