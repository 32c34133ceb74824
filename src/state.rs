//! # Application State Management
//!
//! Shared state available to every HTTP request handler: the runtime
//! configuration, the generation-service client, the per-module history
//! stores, and the request metrics the middleware collects.
//!
//! All mutable pieces use Arc<RwLock<T>> so many requests can read
//! simultaneously while updates stay exclusive.

use crate::config::AppConfig;
use crate::error::AppResult;
use crate::gemini::GeminiClient;
use crate::practice::types::{
    Essay, ListeningSessionRecord, ReadingSessionRecord, SpeakingSessionRecord,
};
use crate::storage::JsonStore;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Instant;

/// One JSON history store per practice module, opened once at startup.
pub struct HistoryStores {
    pub essays: JsonStore<Essay>,
    pub speaking: Arc<JsonStore<SpeakingSessionRecord>>,
    pub listening: JsonStore<ListeningSessionRecord>,
    pub reading: JsonStore<ReadingSessionRecord>,
}

impl HistoryStores {
    fn open(data_dir: &str) -> AppResult<Self> {
        Ok(Self {
            essays: JsonStore::open(data_dir, "ielts-essays")?,
            speaking: Arc::new(JsonStore::open(data_dir, "ielts-speaking-sessions")?),
            listening: JsonStore::open(data_dir, "ielts-listening-sessions")?,
            reading: JsonStore::open(data_dir, "ielts-reading-sessions")?,
        })
    }
}

/// The main application state shared across all HTTP request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration (can be updated at runtime)
    pub config: Arc<RwLock<AppConfig>>,

    /// Client for the remote generation/grading service
    pub gemini: Arc<GeminiClient>,

    /// Session-history stores
    pub stores: Arc<HistoryStores>,

    /// Performance metrics (constantly being updated by requests)
    pub metrics: Arc<RwLock<AppMetrics>>,

    /// When the server started
    pub start_time: Instant,
}

/// Performance metrics collected across all HTTP requests.
#[derive(Debug, Default)]
pub struct AppMetrics {
    /// Total number of HTTP requests processed since server start
    pub request_count: u64,

    /// Total number of errors encountered since server start
    pub error_count: u64,

    /// Current number of live speaking sessions
    pub active_sessions: u32,

    /// Detailed metrics for each API endpoint (URL path)
    pub endpoint_metrics: HashMap<String, EndpointMetric>,
}

/// Detailed performance metrics for a specific API endpoint.
#[derive(Debug, Default, Clone)]
pub struct EndpointMetric {
    pub request_count: u64,
    pub total_duration_ms: u64,
    pub error_count: u64,
}

impl AppState {
    /// Build the shared state: wraps the config, constructs the service
    /// client, and opens the history stores (reading each file once).
    pub fn new(config: AppConfig) -> AppResult<Self> {
        let gemini = Arc::new(GeminiClient::new(config.gemini.clone()));
        let stores = Arc::new(HistoryStores::open(&config.storage.data_dir)?);

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            gemini,
            stores,
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            start_time: Instant::now(),
        })
    }

    /// Get a copy of the current configuration.
    ///
    /// Cloning releases the read lock immediately so other requests aren't
    /// blocked; AppConfig is cheap to clone.
    pub fn get_config(&self) -> AppConfig {
        self.config.read().unwrap().clone()
    }

    /// Update the configuration with validation.
    pub fn update_config(&self, new_config: AppConfig) -> Result<(), String> {
        match new_config.validate() {
            Ok(_) => {
                *self.config.write().unwrap() = new_config;
                Ok(())
            }
            Err(e) => Err(e.to_string()),
        }
    }

    /// Increment the total request counter (called by middleware for every request).
    pub fn increment_request_count(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.request_count += 1;
    }

    /// Increment the total error counter (called when any request fails).
    pub fn increment_error_count(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.error_count += 1;
    }

    /// Record detailed metrics for a specific endpoint.
    pub fn record_endpoint_request(&self, endpoint: &str, duration_ms: u64, is_error: bool) {
        let mut metrics = self.metrics.write().unwrap();

        let endpoint_metric = metrics.endpoint_metrics.entry(endpoint.to_string()).or_default();
        endpoint_metric.request_count += 1;
        endpoint_metric.total_duration_ms += duration_ms;

        if is_error {
            endpoint_metric.error_count += 1;
        }
    }

    /// Increment the live-session counter (a speaking WebSocket opened).
    pub fn increment_active_sessions(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.active_sessions += 1;
    }

    /// Decrement the live-session counter, guarding against underflow.
    pub fn decrement_active_sessions(&self) {
        let mut metrics = self.metrics.write().unwrap();
        if metrics.active_sessions > 0 {
            metrics.active_sessions -= 1;
        }
    }

    /// Get a snapshot of current metrics (used for the /metrics endpoint).
    pub fn get_metrics_snapshot(&self) -> AppMetrics {
        let metrics = self.metrics.read().unwrap();
        AppMetrics {
            request_count: metrics.request_count,
            error_count: metrics.error_count,
            active_sessions: metrics.active_sessions,
            endpoint_metrics: metrics.endpoint_metrics.clone(),
        }
    }

    /// Get server uptime in seconds.
    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl EndpointMetric {
    /// Average = total duration / request count.
    pub fn average_duration_ms(&self) -> f64 {
        if self.request_count > 0 {
            self.total_duration_ms as f64 / self.request_count as f64
        } else {
            0.0
        }
    }

    /// Error rate as a fraction (0.0 to 1.0).
    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_state() -> AppState {
        let mut config = AppConfig::default();
        config.storage.data_dir = std::env::temp_dir()
            .join(format!("ielts-state-{}", uuid::Uuid::new_v4()))
            .to_string_lossy()
            .to_string();
        AppState::new(config).unwrap()
    }

    #[test]
    fn test_session_counter_does_not_underflow() {
        let state = test_state();
        state.decrement_active_sessions();
        assert_eq!(state.get_metrics_snapshot().active_sessions, 0);

        state.increment_active_sessions();
        state.increment_active_sessions();
        state.decrement_active_sessions();
        assert_eq!(state.get_metrics_snapshot().active_sessions, 1);
    }

    #[test]
    fn test_endpoint_metrics_accumulate() {
        let state = test_state();
        state.record_endpoint_request("GET /health", 10, false);
        state.record_endpoint_request("GET /health", 30, true);

        let snapshot = state.get_metrics_snapshot();
        let metric = &snapshot.endpoint_metrics["GET /health"];
        assert_eq!(metric.request_count, 2);
        assert_eq!(metric.average_duration_ms(), 20.0);
        assert_eq!(metric.error_rate(), 0.5);
    }
}
