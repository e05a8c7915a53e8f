//! Transfer Route
//!
//! POST /api/v1/transfer carries one protocol message per HTTP exchange.
//! Requests are forwarded to the session's coordinator actor, so HTTP
//! callers are served by the same single loop as in-process requesters.

use axum::{extract::State, routing::post, Json, Router};

use super::AppState;
use crate::error::TransferError;
use crate::protocol::{Channel, Request, Response, TRANSFER_PATH};

/// Create the transfer router
pub fn router() -> Router<AppState> {
    Router::new().route(TRANSFER_PATH, post(transfer))
}

/// POST /api/v1/transfer
async fn transfer(
    State(state): State<AppState>,
    Json(request): Json<Request>,
) -> Result<Json<Response>, TransferError> {
    if state.session.is_ended() {
        return Err(TransferError::Cancelled);
    }

    let response = state.session.channel().send(request).await?;
    Ok(Json(response))
}
