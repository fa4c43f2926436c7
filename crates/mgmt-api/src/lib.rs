//! mgmt-api - HTTP/JSON layer for the management bridge
//!
//! This crate serves the bridge wire protocol over HTTP. It only decodes
//! requests and encodes responses; all routing happens in the
//! [`BridgeHandler`](mgmt_gateway::BridgeHandler).
//!
//! # Usage
//!
//! ```ignore
//! use mgmt_api::{create_router, AppState};
//!
//! let handler = BridgeHandler::new(config, registries, detectors, log).await?;
//! let router = create_router(AppState::new(handler));
//! ```

pub mod error;
pub mod handlers;
pub mod state;

pub use error::ApiError;
pub use state::AppState;

use axum::routing::{get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the bridge API router with the given application state
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health check
        .route("/health", get(|| async { "OK" }))
        // Wire protocol
        .route("/bridge", post(handlers::bridge::post_bridge))
        .route("/bridge/version", get(handlers::bridge::get_version))
        // Middleware
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
