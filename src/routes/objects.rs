//! Object Routes
//!
//! Registration and eviction for the publishing session's store.
//!
//! Endpoints:
//! - POST /api/v1/objects - Register raw body bytes
//! - DELETE /api/v1/objects/:id - Evict an object

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, State},
    http::{header, HeaderMap, StatusCode},
    routing::{delete, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::AppState;
use crate::error::TransferError;
use crate::store::{NewObject, ObjectId};

/// Header carrying the object's file name
pub const OBJECT_NAME_HEADER: &str = "x-object-name";
/// Header carrying a caller-chosen object id
pub const OBJECT_ID_HEADER: &str = "x-object-id";
/// Header carrying the object's last modification time (RFC 3339)
pub const LAST_MODIFIED_HEADER: &str = "x-last-modified";

const DEFAULT_NAME: &str = "object";

/// Create the objects router
pub fn router(state: &AppState) -> Router<AppState> {
    let body_limit = usize::try_from(state.session.config().max_object_size).unwrap_or(usize::MAX);

    Router::new()
        .route("/api/v1/objects", post(register_object))
        .route("/api/v1/objects/:id", delete(evict_object))
        .layer(DefaultBodyLimit::max(body_limit))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub object_id: ObjectId,
    pub size: u64,
    pub chunked: bool,
    pub total_chunks: u32,
    pub sha256: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/v1/objects
async fn register_object(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<RegisterResponse>), TransferError> {
    let object = new_object(&headers);

    let id = header_value(&headers, OBJECT_ID_HEADER).map(str::to_string);
    let id = state.session.register_async(id, body, object).await?;

    let stored = state.session.store().get(&id)?;
    let plan = state.session.coordinator().plan_for(&stored)?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            object_id: id,
            size: plan.size,
            chunked: plan.chunked,
            total_chunks: plan.total_chunks,
            sha256: stored.sha256.clone(),
        }),
    ))
}

/// DELETE /api/v1/objects/:id
async fn evict_object(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, TransferError> {
    let id = ObjectId::parse(id)?;

    if state.session.store().evict(&id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(TransferError::NotFound(id.to_string()))
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Build registration metadata from request headers
fn new_object(headers: &HeaderMap) -> NewObject {
    let name = header_value(headers, OBJECT_NAME_HEADER).unwrap_or(DEFAULT_NAME);
    let mut object = NewObject::named(name);

    // A generic content type says nothing; let the name decide
    if let Some(mime) = header_value(headers, header::CONTENT_TYPE.as_str())
        .filter(|m| *m != mime_guess::mime::APPLICATION_OCTET_STREAM.essence_str())
    {
        object = object.with_mime_type(mime);
    }

    if let Some(raw) = header_value(headers, LAST_MODIFIED_HEADER) {
        match DateTime::parse_from_rfc3339(raw) {
            Ok(at) => object = object.with_last_modified(at.with_timezone(&Utc)),
            Err(e) => tracing::warn!(value = raw, error = %e, "Ignoring unparsable last-modified"),
        }
    }

    object
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::tests::test_server;
    use axum::http::{HeaderName, HeaderValue};
    use serde_json::Value;

    fn name_header(name: &'static str) -> (HeaderName, HeaderValue) {
        (
            HeaderName::from_static(OBJECT_NAME_HEADER),
            HeaderValue::from_static(name),
        )
    }

    #[tokio::test]
    async fn test_register_small_object() {
        let (server, session) = test_server();
        let (name, value) = name_header("notes.txt");

        let response = server
            .post("/api/v1/objects")
            .add_header(name, value)
            .bytes(Bytes::from_static(b"hello world"))
            .await;

        response.assert_status(StatusCode::CREATED);
        let body: Value = response.json();
        assert_eq!(body["size"], 11);
        assert_eq!(body["chunked"], false);
        assert_eq!(body["totalChunks"], 1);
        assert_eq!(body["sha256"], crate::store::compute_hash(b"hello world"));

        let id = ObjectId::parse(body["objectId"].as_str().unwrap()).unwrap();
        let metadata = session.store().metadata(&id).unwrap();
        assert_eq!(metadata.name, "notes.txt");
        assert_eq!(metadata.mime_type, "text/plain");
    }

    #[tokio::test]
    async fn test_register_with_headers() {
        let (server, session) = test_server();
        let (name, value) = name_header("clip.bin");

        let response = server
            .post("/api/v1/objects")
            .add_header(name, value)
            .add_header(
                HeaderName::from_static(OBJECT_ID_HEADER),
                HeaderValue::from_static("clip-1"),
            )
            .content_type("video/mp4")
            .add_header(
                HeaderName::from_static(LAST_MODIFIED_HEADER),
                HeaderValue::from_static("2024-03-01T12:00:00Z"),
            )
            .bytes(Bytes::from(vec![7u8; 50]))
            .await;

        response.assert_status(StatusCode::CREATED);
        let body: Value = response.json();
        assert_eq!(body["objectId"], "clip-1");
        assert_eq!(body["chunked"], true);
        assert_eq!(body["totalChunks"], 4);

        let metadata = session
            .store()
            .metadata(&ObjectId::parse("clip-1").unwrap())
            .unwrap();
        assert_eq!(metadata.mime_type, "video/mp4");
        assert_eq!(metadata.last_modified.to_rfc3339(), "2024-03-01T12:00:00+00:00");
    }

    #[tokio::test]
    async fn test_register_duplicate_id_conflicts() {
        let (server, _session) = test_server();

        for expected in [StatusCode::CREATED, StatusCode::CONFLICT] {
            server
                .post("/api/v1/objects")
                .add_header(
                    HeaderName::from_static(OBJECT_ID_HEADER),
                    HeaderValue::from_static("same"),
                )
                .bytes(Bytes::from_static(b"x"))
                .await
                .assert_status(expected);
        }
    }

    #[tokio::test]
    async fn test_register_over_limit_rejected() {
        let (server, session) = test_server();

        let response = server
            .post("/api/v1/objects")
            .bytes(Bytes::from(vec![0u8; 2048]))
            .await;

        response.assert_status(StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(session.store().stats().objects, 0);
    }

    #[tokio::test]
    async fn test_evict_object() {
        let (server, session) = test_server();
        let id = session
            .register(Bytes::from_static(b"bye"), NewObject::named("a"))
            .unwrap();

        server
            .delete(&format!("/api/v1/objects/{}", id))
            .await
            .assert_status(StatusCode::NO_CONTENT);
        assert!(!session.store().contains(&id));

        let response = server.delete(&format!("/api/v1/objects/{}", id)).await;
        response.assert_status(StatusCode::NOT_FOUND);
        let body: Value = response.json();
        assert_eq!(body["code"], "NOT_FOUND");
    }
}
