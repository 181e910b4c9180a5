//! # Leaderboard API
//!
//! REST service in front of the leaderboard repository.
//!
//! ## Routes
//!
//! - `POST /scores`: `{"uid", "name", "score"}`, answers `201 Created`
//! - `GET /totals/{window}`: top rows of a window as JSON
//! - `GET /health`: liveness and pool occupancy

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod handlers;

use std::sync::Arc;

use axum::{
    Router,
    http::{HeaderValue, Method},
    routing::{get, post},
};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use leaderboard_persistence::store::Connector;
use leaderboard_persistence::{LeaderboardRepository, PoolStatus, StoreLeaderboardRepository};

pub use config::{Config, StoreBackend};
pub use error::{ApiError, ApiResult};

/// Application state for Axum handlers
#[derive(Clone)]
pub struct AppState {
    pub leaderboard: Arc<dyn LeaderboardRepository>,
    pool_status: Arc<dyn Fn() -> PoolStatus + Send + Sync>,
}

impl AppState {
    /// Wrap a pooled repository. The pool stays owned by the repository.
    pub fn new<C: Connector>(repository: StoreLeaderboardRepository<C>) -> Self {
        let pool = repository.pool().clone();
        Self {
            leaderboard: Arc::new(repository),
            pool_status: Arc::new(move || pool.status()),
        }
    }

    pub fn pool_status(&self) -> PoolStatus {
        (self.pool_status)()
    }
}

/// CORS layer for the configured origins; `*` allows any origin.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    if origins.iter().any(|origin| origin == "*") {
        return cors.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(%origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    cors.allow_origin(AllowOrigin::list(allowed))
}

/// Build the Axum router
pub fn build_router(state: AppState, cors: CorsLayer) -> Router {
    Router::new()
        .route("/scores", post(handlers::submit_score))
        .route("/totals/{window}", get(handlers::top_totals))
        // Health check
        .route("/health", get(handlers::health_check))
        .route("/", get(|| async { "Leaderboard Engine API" }))
        // State and middleware
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
