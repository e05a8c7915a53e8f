//! Route modules for the Chunk Relay server
//!
//! Endpoints:
//! - GET /health - Liveness plus store statistics
//! - POST /api/v1/objects - Register an object (raw body)
//! - DELETE /api/v1/objects/:id - Evict an object
//! - POST /api/v1/transfer - Answer one protocol request

pub mod objects;
pub mod transfer;

use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::session::PublishSession;

// ============================================================================
// State
// ============================================================================

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub session: Arc<PublishSession>,
}

impl AppState {
    pub fn new(session: Arc<PublishSession>) -> Self {
        Self { session }
    }
}

// ============================================================================
// Router
// ============================================================================

/// Build the full application router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/v1/health", get(health_check))
        .merge(objects::router(&state))
        .merge(transfer::router())
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    objects: usize,
    bytes: u64,
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let stats = state.session.store().stats();
    let status = if state.session.is_ended() {
        "ending"
    } else {
        "healthy"
    };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        objects: stats.objects,
        bytes: stats.bytes,
    })
}
