pub mod auth;
pub mod error;
mod messages;
mod validation;

use axum::{
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::config::CorsConfig;
use crate::AppState;

pub use error::ApiError;

pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.cors);

    Router::new()
        .route("/login", post(auth::login))
        .route(
            "/conversations/:id/messages",
            get(messages::list_messages).post(messages::append_message),
        )
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// CORS for the configured origins only. Credentials are allowed so the
/// session cookie travels with cross-origin requests, which rules out
/// wildcards.
pub fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| {
            if origin == "*" {
                warn!("Ignoring wildcard CORS origin, credentials require explicit origins");
                return None;
            }
            match origin.parse() {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(origin = %origin, "Ignoring invalid CORS origin");
                    None
                }
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
}
