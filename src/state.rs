//! # Application State
//!
//! State shared by every HTTP handler and WebSocket connection:
//! - the live configuration (updatable at runtime),
//! - request and stream metrics,
//! - the recognizer client that every stream opens sessions on.
//!
//! ## Key Rust Concepts:
//!
//! ### Arc<RwLock<T>>
//! - **Arc**: Many handlers hold a reference to the same data
//! - **RwLock**: Any number of readers, or exactly one writer
//! - Readers copy what they need and drop the lock right away so writers never wait long
//!
//! ### Arc<dyn Trait>
//! - The recognizer is a trait object so tests (and other providers) can swap it
//!   without touching the handlers

use crate::config::AppConfig;
use crate::recognition::SpeechRecognizer;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct AppState {
    /// Application configuration (can be updated at runtime)
    pub config: Arc<RwLock<AppConfig>>,

    /// Counters updated by the request middleware and the streams
    pub metrics: Arc<RwLock<AppMetrics>>,

    /// Remote recognizer shared by all streams
    pub recognizer: Arc<dyn SpeechRecognizer>,

    pub start_time: Instant,
}

/// Server-wide counters.
///
/// ## What is tracked:
/// - **request_count / error_count**: HTTP traffic, from the middleware
/// - **active_streams**: Streams currently running (capacity check)
/// - **total_streams**: Streams started since boot
/// - **total_restarts**: Session rotations across all endless streams
/// - **stream_errors**: Recognition errors reported by any stream
#[derive(Debug, Default, Clone)]
pub struct AppMetrics {
    pub request_count: u64,
    pub error_count: u64,
    pub active_streams: u32,
    pub total_streams: u64,
    pub total_restarts: u64,
    pub stream_errors: u64,
    /// Key: "METHOD /route/pattern"
    pub endpoint_metrics: HashMap<String, EndpointMetric>,
}

#[derive(Debug, Default, Clone)]
pub struct EndpointMetric {
    pub request_count: u64,
    pub total_duration_ms: u64,
    pub error_count: u64,
}

impl AppState {
    pub fn new(config: AppConfig, recognizer: Arc<dyn SpeechRecognizer>) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            recognizer,
            start_time: Instant::now(),
        }
    }

    /// Copy of the current configuration; the lock is released on return.
    pub fn get_config(&self) -> AppConfig {
        self.config.read().unwrap().clone()
    }

    /// Replace the configuration after validating it.
    pub fn update_config(&self, new_config: AppConfig) -> Result<(), String> {
        new_config.validate().map_err(|e| e.to_string())?;
        *self.config.write().unwrap() = new_config;
        Ok(())
    }

    pub fn recognizer(&self) -> Arc<dyn SpeechRecognizer> {
        self.recognizer.clone()
    }

    pub fn increment_request_count(&self) {
        self.metrics.write().unwrap().request_count += 1;
    }

    pub fn increment_error_count(&self) {
        self.metrics.write().unwrap().error_count += 1;
    }

    pub fn record_endpoint_request(&self, endpoint: &str, duration_ms: u64, is_error: bool) {
        let mut metrics = self.metrics.write().unwrap();
        let endpoint_metric = metrics.endpoint_metrics.entry(endpoint.to_string()).or_default();

        endpoint_metric.request_count += 1;
        endpoint_metric.total_duration_ms += duration_ms;
        if is_error {
            endpoint_metric.error_count += 1;
        }
    }

    /// Reserve a stream slot, or `None` if `max` streams are already running.
    ///
    /// Check and increment happen under one write lock so two connections
    /// cannot both take the last slot. The slot is freed when the returned
    /// guard is dropped.
    pub fn try_acquire_stream(&self, max: usize) -> Option<StreamSlot> {
        let mut metrics = self.metrics.write().unwrap();
        if metrics.active_streams as usize >= max {
            return None;
        }
        metrics.active_streams += 1;
        metrics.total_streams += 1;
        Some(StreamSlot {
            metrics: self.metrics.clone(),
        })
    }

    pub fn record_restart(&self) {
        self.metrics.write().unwrap().total_restarts += 1;
    }

    pub fn record_stream_error(&self) {
        self.metrics.write().unwrap().stream_errors += 1;
    }

    pub fn get_metrics_snapshot(&self) -> AppMetrics {
        self.metrics.read().unwrap().clone()
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

/// One reserved stream slot; see [`AppState::try_acquire_stream`].
#[derive(Debug)]
pub struct StreamSlot {
    metrics: Arc<RwLock<AppMetrics>>,
}

impl Drop for StreamSlot {
    fn drop(&mut self) {
        // Runs while unwinding too, so a poisoned lock must not skip the release
        let mut metrics = self
            .metrics
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        metrics.active_streams = metrics.active_streams.saturating_sub(1);
    }
}

impl EndpointMetric {
    pub fn average_duration_ms(&self) -> f64 {
        if self.request_count > 0 {
            self.total_duration_ms as f64 / self.request_count as f64
        } else {
            0.0
        }
    }

    /// Fraction of requests that failed, 0.0 to 1.0
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
    use crate::recognition::scripted::ScriptedRecognizer;

    fn test_state() -> AppState {
        AppState::new(AppConfig::default(), Arc::new(ScriptedRecognizer::default()))
    }

    #[test]
    fn test_stream_slots_are_bounded() {
        let state = test_state();
        let first = state.try_acquire_stream(2);
        let second = state.try_acquire_stream(2);
        assert!(first.is_some());
        assert!(second.is_some());
        assert!(state.try_acquire_stream(2).is_none());

        drop(first);
        let third = state.try_acquire_stream(2);
        assert!(third.is_some());

        let metrics = state.get_metrics_snapshot();
        assert_eq!(metrics.active_streams, 2);
        assert_eq!(metrics.total_streams, 3);
    }

    #[tokio::test]
    async fn test_slot_released_when_stream_task_panics() {
        let state = test_state();
        let slot = state.try_acquire_stream(1).unwrap();
        assert_eq!(state.get_metrics_snapshot().active_streams, 1);

        let task = tokio::spawn(async move {
            let _slot = slot;
            panic!("stream task failed");
        });
        assert!(task.await.unwrap_err().is_panic());

        assert_eq!(state.get_metrics_snapshot().active_streams, 0);
        assert!(state.try_acquire_stream(1).is_some());
    }

    #[test]
    fn test_endpoint_metrics() {
        let state = test_state();
        state.record_endpoint_request("GET /health", 10, false);
        state.record_endpoint_request("GET /health", 30, true);

        let metrics = state.get_metrics_snapshot();
        let health = &metrics.endpoint_metrics["GET /health"];
        assert_eq!(health.average_duration_ms(), 20.0);
        assert_eq!(health.error_rate(), 0.5);
    }

    #[test]
    fn test_update_config_validates() {
        let state = test_state();
        let mut config = state.get_config();
        config.performance.max_concurrent_streams = 0;
        assert!(state.update_config(config).is_err());
        assert_eq!(state.get_config().performance.max_concurrent_streams, 10);
    }
}
