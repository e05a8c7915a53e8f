//! Object Store
//!
//! Session-scoped mapping from object id to bytes and metadata. This is the
//! single owner of object bytes: chunking is a request-time view computed over
//! the stored buffer, never a storage-time transform.
//!
//! Lifecycle:
//! 1. A producer registers bytes once and receives an id
//! 2. Consumers read whole objects or byte ranges by id
//! 3. The owning session evicts objects when it ends

mod types;

pub use types::*;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use parking_lot::RwLock;
use sha2::{Digest, Sha256};

use crate::config::DEFAULT_MAX_OBJECT_SIZE;
use crate::error::{Result, TransferError};

/// In-memory object store
#[derive(Clone)]
pub struct ObjectStore {
    inner: Arc<ObjectStoreInner>,
}

struct ObjectStoreInner {
    state: RwLock<StoreState>,

    /// Largest object accepted
    max_object_size: u64,
}

/// Everything guarded by the store lock
#[derive(Default)]
struct StoreState {
    /// Registered objects indexed by id
    objects: HashMap<ObjectId, Arc<StoredObject>>,

    /// Ids that were evicted and may not be registered again
    retired: HashSet<ObjectId>,

    /// Set once the owning session ends; no further registrations
    closed: bool,
}

impl StoreState {
    fn retire_all(&mut self) -> Vec<ObjectId> {
        let ids: Vec<ObjectId> = self.objects.drain().map(|(id, _)| id).collect();
        self.retired.extend(ids.iter().cloned());
        ids
    }
}

impl ObjectStore {
    pub fn new() -> Self {
        Self::with_max_object_size(DEFAULT_MAX_OBJECT_SIZE)
    }

    pub fn with_max_object_size(max_object_size: u64) -> Self {
        Self {
            inner: Arc::new(ObjectStoreInner {
                state: RwLock::new(StoreState::default()),
                max_object_size,
            }),
        }
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Register an object under a freshly minted id
    ///
    /// Hashes on the calling thread. From async code prefer `register_async`.
    pub fn register(&self, bytes: impl Into<Bytes>, object: NewObject) -> Result<ObjectId> {
        let bytes = bytes.into();
        self.check_size(&bytes)?;
        let sha256 = compute_hash(&bytes);
        self.insert(ObjectId::generate(), bytes, object, sha256)
    }

    /// Register an object under a caller-chosen id
    pub fn register_with_id(
        &self,
        id: impl Into<String>,
        bytes: impl Into<Bytes>,
        object: NewObject,
    ) -> Result<ObjectId> {
        let id = ObjectId::parse(id)?;
        let bytes = bytes.into();
        self.check_size(&bytes)?;
        let sha256 = compute_hash(&bytes);
        self.insert(id, bytes, object, sha256)
    }

    /// Register an object, computing its digest on the blocking pool
    ///
    /// `id` of `None` mints a fresh id.
    pub async fn register_async(
        &self,
        id: Option<String>,
        bytes: impl Into<Bytes>,
        object: NewObject,
    ) -> Result<ObjectId> {
        let id = match id {
            Some(id) => ObjectId::parse(id)?,
            None => ObjectId::generate(),
        };
        let bytes = bytes.into();
        self.check_size(&bytes)?;

        let sha256 = compute_hash_blocking(bytes.clone()).await?;
        self.insert(id, bytes, object, sha256)
    }

    fn check_size(&self, bytes: &Bytes) -> Result<()> {
        let size = bytes.len() as u64;
        if size > self.inner.max_object_size {
            return Err(TransferError::PayloadTooLarge {
                size,
                limit: self.inner.max_object_size,
            });
        }
        Ok(())
    }

    fn insert(&self, id: ObjectId, bytes: Bytes, object: NewObject, sha256: String) -> Result<ObjectId> {
        let size = bytes.len() as u64;
        let now = Utc::now();
        let stored = Arc::new(StoredObject {
            id: id.clone(),
            metadata: object.into_metadata(size, now),
            sha256,
            bytes,
            registered_at: now,
        });

        {
            let mut state = self.inner.state.write();
            if state.closed {
                return Err(TransferError::Cancelled);
            }
            if state.retired.contains(&id) || state.objects.contains_key(&id) {
                return Err(TransferError::DuplicateId(id.to_string()));
            }
            state.objects.insert(id.clone(), stored.clone());
        }

        tracing::info!(
            object_id = %id,
            name = %stored.metadata.name,
            mime_type = %stored.metadata.mime_type,
            size = size,
            "Registered object"
        );

        Ok(id)
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Get an object by id
    pub fn get(&self, id: &ObjectId) -> Result<Arc<StoredObject>> {
        self.inner
            .state
            .read()
            .objects
            .get(id)
            .cloned()
            .ok_or_else(|| TransferError::NotFound(id.to_string()))
    }

    /// Get only the metadata of an object
    pub fn metadata(&self, id: &ObjectId) -> Result<ObjectMetadata> {
        self.get(id).map(|object| object.metadata.clone())
    }

    /// Read `length` bytes starting at `offset`
    ///
    /// Ranges reaching past the end of the object fail with `OutOfRange`; they
    /// are never clamped. The returned buffer shares the stored allocation.
    pub fn slice(&self, id: &ObjectId, offset: u64, length: u64) -> Result<Bytes> {
        let object = self.get(id)?;
        let size = object.size();

        let end = offset
            .checked_add(length)
            .filter(|end| *end <= size)
            .ok_or_else(|| {
                TransferError::OutOfRange(format!(
                    "range {}+{} exceeds size {} of {}",
                    offset, length, size, id
                ))
            })?;

        Ok(object.bytes.slice(offset as usize..end as usize))
    }

    pub fn contains(&self, id: &ObjectId) -> bool {
        self.inner.state.read().objects.contains_key(id)
    }

    /// Get store occupancy
    pub fn stats(&self) -> StoreStats {
        let state = self.inner.state.read();
        StoreStats {
            objects: state.objects.len(),
            bytes: state.objects.values().map(|o| o.size()).sum(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state.read().closed
    }

    // ========================================================================
    // Eviction
    // ========================================================================

    /// Remove an object. Returns whether it was present.
    pub fn evict(&self, id: &ObjectId) -> bool {
        let removed = {
            let mut state = self.inner.state.write();
            let removed = state.objects.remove(id);
            if removed.is_some() {
                state.retired.insert(id.clone());
            }
            removed
        };

        match removed {
            Some(object) => {
                tracing::info!(object_id = %id, size = object.size(), "Evicted object");
                true
            }
            None => false,
        }
    }

    /// Remove every object. Returns the number evicted.
    pub fn evict_all(&self) -> usize {
        let drained = self.inner.state.write().retire_all();

        if !drained.is_empty() {
            tracing::info!(count = drained.len(), "Evicted all objects");
        }

        drained.len()
    }

    /// Evict every object and refuse later registrations
    ///
    /// Both happen under one lock, so no registration can land afterwards.
    /// Returns the number evicted.
    pub fn close(&self) -> usize {
        let drained = {
            let mut state = self.inner.state.write();
            state.closed = true;
            state.retire_all()
        };

        tracing::info!(count = drained.len(), "Closed object store");
        drained.len()
    }
}

impl Default for ObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Compute SHA-256 hash of data
pub fn compute_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Compute SHA-256 hash on the blocking pool
pub async fn compute_hash_blocking(data: Bytes) -> Result<String> {
    tokio::task::spawn_blocking(move || compute_hash(&data))
        .await
        .map_err(|e| TransferError::Internal(format!("digest task failed: {}", e)))
}

// ============================================================================
// Tests
// ============================================================================
