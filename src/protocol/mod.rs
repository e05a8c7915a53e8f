//! Transfer protocol
//!
//! Typed request/response messages exchanged between a `ChunkRequester` and a
//! `TransferCoordinator`, plus the channels that carry them.
//!
//! Actions:
//! - `CHECK_CHUNKING` - plan and metadata for an object
//! - `GET_OBJECT` - whole object, only for objects below the threshold
//! - `GET_CHUNK` - one chunk of a chunked object
//!
//! Messages serialize as JSON tagged by `action`; byte payloads are base64.

pub mod channel;
pub mod http;

pub use channel::{Channel, Envelope, LocalChannel};
pub use http::{HttpChannel, TRANSFER_PATH};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TransferError};
use crate::store::{ObjectId, ObjectMetadata};

// ============================================================================
// Requests
// ============================================================================

/// Request sent by a requester
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Request {
    #[serde(rename_all = "camelCase")]
    CheckChunking { object_id: ObjectId },

    #[serde(rename_all = "camelCase")]
    GetObject { object_id: ObjectId },

    #[serde(rename_all = "camelCase")]
    GetChunk { object_id: ObjectId, index: u32 },
}

impl Request {
    pub fn object_id(&self) -> &ObjectId {
        match self {
            Self::CheckChunking { object_id }
            | Self::GetObject { object_id }
            | Self::GetChunk { object_id, .. } => object_id,
        }
    }

    pub fn action(&self) -> &'static str {
        match self {
            Self::CheckChunking { .. } => "CHECK_CHUNKING",
            Self::GetObject { .. } => "GET_OBJECT",
            Self::GetChunk { .. } => "GET_CHUNK",
        }
    }
}

// ============================================================================
// Responses
// ============================================================================

/// Response to a `Request`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Response {
    CheckChunking(ChunkingInfo),
    GetObject(ObjectPayload),
    GetChunk(ChunkPayload),
}

impl Response {
    /// Number of object bytes carried by this message
    pub fn payload_len(&self) -> u64 {
        match self {
            Self::CheckChunking(_) => 0,
            Self::GetObject(payload) => payload.bytes.len() as u64,
            Self::GetChunk(payload) => payload.bytes.len() as u64,
        }
    }

    pub fn into_chunking_info(self) -> Result<ChunkingInfo> {
        match self {
            Self::CheckChunking(info) => Ok(info),
            other => Err(unexpected("CHECK_CHUNKING", &other)),
        }
    }

    pub fn into_object(self) -> Result<ObjectPayload> {
        match self {
            Self::GetObject(payload) => Ok(payload),
            other => Err(unexpected("GET_OBJECT", &other)),
        }
    }

    pub fn into_chunk(self) -> Result<ChunkPayload> {
        match self {
            Self::GetChunk(payload) => Ok(payload),
            other => Err(unexpected("GET_CHUNK", &other)),
        }
    }

    fn action(&self) -> &'static str {
        match self {
            Self::CheckChunking(_) => "CHECK_CHUNKING",
            Self::GetObject(_) => "GET_OBJECT",
            Self::GetChunk(_) => "GET_CHUNK",
        }
    }
}

fn unexpected(wanted: &str, got: &Response) -> TransferError {
    TransferError::Internal(format!("expected {} response, got {}", wanted, got.action()))
}

/// Plan and metadata of an object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkingInfo {
    pub object_id: ObjectId,
    pub chunked: bool,
    pub total_chunks: u32,
    pub chunk_size: u64,
    pub size: u64,
    pub mime_type: String,
    pub name: String,
    pub last_modified: DateTime<Utc>,

    /// SHA-256 of the whole object, hex encoded
    pub sha256: String,
}

impl ChunkingInfo {
    pub fn metadata(&self) -> ObjectMetadata {
        ObjectMetadata {
            name: self.name.clone(),
            mime_type: self.mime_type.clone(),
            size: self.size,
            last_modified: self.last_modified,
        }
    }
}

/// Whole object bytes with metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectPayload {
    pub object_id: ObjectId,
    #[serde(with = "base64_bytes")]
    pub bytes: Bytes,
    pub size: u64,
    pub mime_type: String,
    pub name: String,
    pub last_modified: DateTime<Utc>,
}

/// One chunk, sliced from the stored object at request time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkPayload {
    pub object_id: ObjectId,
    pub index: u32,
    #[serde(with = "base64_bytes")]
    pub bytes: Bytes,
    pub size: u32,
}

/// Reject responses that would not fit one channel message
pub fn enforce_ceiling(response: &Response, limit: u64) -> Result<()> {
    let size = response.payload_len();
    if size > limit {
        return Err(TransferError::PayloadTooLarge { size, limit });
    }
    Ok(())
}

// ============================================================================
// Serde Helpers
// ============================================================================

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map(Bytes::from)
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id() -> ObjectId {
        ObjectId::parse("clip-7").unwrap()
    }

    #[test]
    fn test_request_wire_format() {
        let json = serde_json::to_value(Request::GetChunk { object_id: id(), index: 2 }).unwrap();
        assert_eq!(json["action"], "GET_CHUNK");
        assert_eq!(json["objectId"], "clip-7");
        assert_eq!(json["index"], 2);

        let parsed: Request =
            serde_json::from_str(r#"{"action":"CHECK_CHUNKING","objectId":"clip-7"}"#).unwrap();
        assert_eq!(parsed, Request::CheckChunking { object_id: id() });
        assert_eq!(parsed.action(), "CHECK_CHUNKING");
    }

    #[test]
    fn test_chunk_payload_base64() {
        let response = Response::GetChunk(ChunkPayload {
            object_id: id(),
            index: 0,
            bytes: Bytes::from_static(b"\x00\x01binary\xff"),
            size: 9,
        });

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["action"], "GET_CHUNK");
        assert!(json["bytes"].is_string());

        let back: Response = serde_json::from_value(json).unwrap();
        assert_eq!(back, response);
    }

    #[test]
    fn test_unexpected_variant() {
        let response = Response::GetChunk(ChunkPayload {
            object_id: id(),
            index: 0,
            bytes: Bytes::new(),
            size: 0,
        });
        assert!(matches!(response.clone().into_object(), Err(TransferError::Internal(_))));
        assert!(response.into_chunk().is_ok());
    }

    #[test]
    fn test_enforce_ceiling() {
        let response = Response::GetChunk(ChunkPayload {
            object_id: id(),
            index: 0,
            bytes: Bytes::from(vec![0u8; 10]),
            size: 10,
        });
        assert!(enforce_ceiling(&response, 10).is_ok());
        assert_eq!(
            enforce_ceiling(&response, 9),
            Err(TransferError::PayloadTooLarge { size: 10, limit: 9 })
        );
    }
}
