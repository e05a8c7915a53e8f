//! Object store types

use std::fmt;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, TransferError};

// ============================================================================
// Object Id
// ============================================================================

/// Opaque, immutable handle naming a registered object
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(String);

impl ObjectId {
    /// Mint a fresh random id
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Wrap a caller-chosen id, rejecting empty ones
    pub fn parse(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(TransferError::InvalidId(id));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Metadata
// ============================================================================

/// Descriptive metadata travelling with an object's bytes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMetadata {
    /// Original file name
    pub name: String,

    /// MIME type
    pub mime_type: String,

    /// Total size in bytes
    pub size: u64,

    /// Last modification time reported by the producer
    pub last_modified: DateTime<Utc>,
}

/// Producer-supplied description of an object being registered
#[derive(Debug, Clone, Default)]
pub struct NewObject {
    pub name: String,

    /// Guessed from the name when absent
    pub mime_type: Option<String>,

    /// Defaults to the registration time when absent
    pub last_modified: Option<DateTime<Utc>>,
}

impl NewObject {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    pub fn with_last_modified(mut self, last_modified: DateTime<Utc>) -> Self {
        self.last_modified = Some(last_modified);
        self
    }

    /// Resolve defaults into full metadata for an object of `size` bytes
    pub(crate) fn into_metadata(self, size: u64, now: DateTime<Utc>) -> ObjectMetadata {
        let mime_type = self
            .mime_type
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| {
                mime_guess::from_path(&self.name)
                    .first_or_octet_stream()
                    .essence_str()
                    .to_string()
            });

        ObjectMetadata {
            name: self.name,
            mime_type,
            size,
            last_modified: self.last_modified.unwrap_or(now),
        }
    }
}

// ============================================================================
// Stored Object
// ============================================================================

/// A registered object. Bytes are immutable once stored.
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub id: ObjectId,
    pub metadata: ObjectMetadata,

    /// SHA-256 of the full contents, hex encoded
    pub sha256: String,

    pub bytes: Bytes,

    pub registered_at: DateTime<Utc>,
}

impl StoredObject {
    pub fn size(&self) -> u64 {
        self.metadata.size
    }
}

/// Store occupancy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub objects: usize,
    pub bytes: u64,
}
