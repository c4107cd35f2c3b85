//! # Relay Server
//!
//! The server half of the protocol: accepts `/live` sockets, validates
//! client envelopes and forwards microphone audio to a speech backend.

pub mod backend;
pub mod socket;

pub use backend::{loopback_factory, BackendFactory, LoopbackBackend, SpeechBackend};
pub use socket::{live_socket, LiveRelaySocket};

use crate::health;
use crate::protocol::LIVE_PATH;
use actix_web::web;

/// Register every relay route.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .route("/health", web::get().to(health::health_check))
            .route("/metrics", web::get().to(health::detailed_metrics)),
    )
    .route("/health", web::get().to(health::health_check))
    .route(LIVE_PATH, web::get().to(live_socket));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::state::AppState;
    use actix_web::{http::StatusCode, test, App};

    fn state_with_limit(max: usize) -> AppState {
        let mut config = AppConfig::default();
        config.performance.max_concurrent_sessions = max;
        AppState::new(config)
    }

    #[actix_web::test]
    async fn test_health_routes() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state_with_limit(4)))
                .configure(configure),
        )
        .await;

        for uri in ["/health", "/api/v1/health", "/api/v1/metrics"] {
            let resp = test::call_service(&app, test::TestRequest::get().uri(uri).to_request()).await;
            assert_eq!(resp.status(), StatusCode::OK, "{}", uri);
        }
    }

    #[actix_web::test]
    async fn test_plain_get_on_live_is_rejected_and_releases_slot() {
        let state = state_with_limit(1);
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .configure(configure),
        )
        .await;

        let resp = test::call_service(&app, test::TestRequest::get().uri("/live").to_request()).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(state.get_metrics_snapshot().active_sessions, 0);
    }

    #[actix_web::test]
    async fn test_full_relay_answers_503() {
        let state = state_with_limit(1);
        assert!(state.try_acquire_session());

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .configure(configure),
        )
        .await;

        let resp = test::call_service(&app, test::TestRequest::get().uri("/live").to_request()).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"]["type"], "unavailable");
        assert_eq!(state.get_metrics_snapshot().rejected_sessions, 1);
    }
}
