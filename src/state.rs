//! # Relay Application State
//!
//! Shared state for every HTTP worker and relay socket actor.
//!
//! ## Contents:
//! - **config**: the loaded `AppConfig`
//! - **metrics**: request counters, per-endpoint timings and relay session
//!   counters, behind one lock
//! - **backend**: factory for the speech backend each `/live` connection gets
//! - **start_time**: for uptime reporting
//!
//! `AppState` is cloned into each worker; the clones share the same `Arc`s.

use crate::config::AppConfig;
use crate::relay::backend::{loopback_factory, BackendFactory, SpeechBackend};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<RwLock<AppConfig>>,
    pub metrics: Arc<RwLock<AppMetrics>>,
    pub backend: BackendFactory,
    pub start_time: Instant,
}

/// Counters collected since the relay started.
#[derive(Debug, Default, Clone)]
pub struct AppMetrics {
    pub request_count: u64,
    pub error_count: u64,

    /// Relay sockets currently open
    pub active_sessions: u32,

    /// Relay sockets accepted since start
    pub total_sessions: u64,

    /// Upgrade requests refused because the relay was full
    pub rejected_sessions: u64,

    /// `mic` envelopes received across all sessions
    pub frames_received: u64,

    /// Envelopes sent back to clients
    pub frames_sent: u64,

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
    /// State with the loopback speech backend.
    pub fn new(config: AppConfig) -> Self {
        Self::with_backend(config, loopback_factory())
    }

    pub fn with_backend(config: AppConfig, backend: BackendFactory) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            backend,
            start_time: Instant::now(),
        }
    }

    pub fn get_config(&self) -> AppConfig {
        self.config.read().clone()
    }

    pub fn new_backend(&self) -> Box<dyn SpeechBackend> {
        (self.backend)()
    }

    pub fn increment_request_count(&self) {
        self.metrics.write().request_count += 1;
    }

    pub fn increment_error_count(&self) {
        self.metrics.write().error_count += 1;
    }

    pub fn record_endpoint_request(&self, endpoint: &str, duration_ms: u64, is_error: bool) {
        let mut metrics = self.metrics.write();
        let endpoint_metric = metrics.endpoint_metrics.entry(endpoint.to_string()).or_default();

        endpoint_metric.request_count += 1;
        endpoint_metric.total_duration_ms += duration_ms;
        if is_error {
            endpoint_metric.error_count += 1;
        }
    }

    /// Claim a relay session slot. Returns `false` when the configured
    /// maximum is already in use.
    pub fn try_acquire_session(&self) -> bool {
        let max = self.config.read().performance.max_concurrent_sessions;
        let mut metrics = self.metrics.write();

        if metrics.active_sessions as usize >= max {
            metrics.rejected_sessions += 1;
            return false;
        }

        metrics.active_sessions += 1;
        metrics.total_sessions += 1;
        true
    }

    /// Give back a slot taken by `try_acquire_session`.
    pub fn release_session(&self) {
        let mut metrics = self.metrics.write();
        if metrics.active_sessions > 0 {
            metrics.active_sessions -= 1;
        }
    }

    pub fn record_frame_received(&self) {
        self.metrics.write().frames_received += 1;
    }

    pub fn record_frames_sent(&self, count: usize) {
        if count > 0 {
            self.metrics.write().frames_sent += count as u64;
        }
    }

    /// Copy of the metrics, so handlers never serialize under the lock.
    pub fn get_metrics_snapshot(&self) -> AppMetrics {
        self.metrics.read().clone()
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl AppMetrics {
    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
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

    /// Fraction of requests that failed, 0.0 to 1.0.
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

    fn state_with_limit(max: usize) -> AppState {
        let mut config = AppConfig::default();
        config.performance.max_concurrent_sessions = max;
        AppState::new(config)
    }

    #[test]
    fn test_session_slots() {
        let state = state_with_limit(2);
        assert!(state.try_acquire_session());
        assert!(state.try_acquire_session());
        assert!(!state.try_acquire_session());

        state.release_session();
        assert!(state.try_acquire_session());

        let metrics = state.get_metrics_snapshot();
        assert_eq!(metrics.active_sessions, 2);
        assert_eq!(metrics.total_sessions, 3);
        assert_eq!(metrics.rejected_sessions, 1);
    }

    #[test]
    fn test_release_never_underflows() {
        let state = state_with_limit(1);
        state.release_session();
        assert_eq!(state.get_metrics_snapshot().active_sessions, 0);
    }

    #[test]
    fn test_endpoint_metrics() {
        let state = state_with_limit(1);
        state.record_endpoint_request("GET /health", 10, false);
        state.record_endpoint_request("GET /health", 30, true);

        let metrics = state.get_metrics_snapshot();
        let health = &metrics.endpoint_metrics["GET /health"];
        assert_eq!(health.average_duration_ms(), 20.0);
        assert_eq!(health.error_rate(), 0.5);
    }

    #[test]
    fn test_backend_factory_builds_fresh_backends() {
        let state = state_with_limit(1);
        assert_eq!(state.new_backend().name(), "loopback");
    }
}
