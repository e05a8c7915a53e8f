//! Transfer Coordinator
//!
//! Serving side of the protocol, co-located with the object store. The
//! coordinator holds no per-request state: every answer is computed from the
//! store and the planner, so repeated, out-of-order or retried requests have
//! no side effects.
//!
//! When spawned it runs as a single actor draining a bounded inbox one
//! message at a time.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::TransferConfig;
use crate::error::{Result, TransferError};
use crate::planner::{self, ChunkPlan};
use crate::protocol::{
    ChunkPayload, ChunkingInfo, Envelope, LocalChannel, ObjectPayload, Request, Response,
};
use crate::session::SessionToken;
use crate::store::{ObjectId, ObjectStore, StoredObject};

/// Answers protocol requests against an `ObjectStore`
#[derive(Clone)]
pub struct TransferCoordinator {
    store: ObjectStore,
    chunk_size: u64,
    threshold: u64,
}

impl TransferCoordinator {
    pub fn new(store: ObjectStore, config: &TransferConfig) -> Self {
        Self {
            store,
            chunk_size: config.chunk_size,
            threshold: config.threshold,
        }
    }

    pub fn store(&self) -> &ObjectStore {
        &self.store
    }

    /// Plan for a stored object
    pub fn plan_for(&self, object: &StoredObject) -> Result<ChunkPlan> {
        planner::plan(object.size(), self.chunk_size, self.threshold)
    }

    /// Answer one request
    pub fn handle(&self, request: Request) -> Result<Response> {
        match request {
            Request::CheckChunking { object_id } => {
                self.check_chunking(&object_id).map(Response::CheckChunking)
            }
            Request::GetObject { object_id } => self.get_object(&object_id).map(Response::GetObject),
            Request::GetChunk { object_id, index } => {
                self.get_chunk(&object_id, index).map(Response::GetChunk)
            }
        }
    }

    /// CHECK_CHUNKING
    pub fn check_chunking(&self, object_id: &ObjectId) -> Result<ChunkingInfo> {
        let object = self.store.get(object_id)?;
        let plan = self.plan_for(&object)?;

        Ok(ChunkingInfo {
            object_id: object_id.clone(),
            chunked: plan.chunked,
            total_chunks: plan.total_chunks,
            chunk_size: plan.chunk_size,
            size: plan.size,
            mime_type: object.metadata.mime_type.clone(),
            name: object.metadata.name.clone(),
            last_modified: object.metadata.last_modified,
            sha256: object.sha256.clone(),
        })
    }

    /// GET_OBJECT, the fast path for objects at or below the threshold
    pub fn get_object(&self, object_id: &ObjectId) -> Result<ObjectPayload> {
        let object = self.store.get(object_id)?;
        let plan = self.plan_for(&object)?;

        if plan.chunked {
            return Err(TransferError::ChunkingRequired(format!(
                "{} is {} bytes, above threshold {}",
                object_id, plan.size, self.threshold
            )));
        }

        Ok(ObjectPayload {
            object_id: object_id.clone(),
            bytes: object.bytes.clone(),
            size: object.size(),
            mime_type: object.metadata.mime_type.clone(),
            name: object.metadata.name.clone(),
            last_modified: object.metadata.last_modified,
        })
    }

    /// GET_CHUNK
    pub fn get_chunk(&self, object_id: &ObjectId, index: u32) -> Result<ChunkPayload> {
        let object = self.store.get(object_id)?;
        let plan = self.plan_for(&object)?;

        let range = plan.chunk_range(index)?;
        let length = range.end - range.start;
        let bytes = self.store.slice(object_id, range.start, length)?;

        Ok(ChunkPayload {
            object_id: object_id.clone(),
            index,
            size: bytes.len() as u32,
            bytes,
        })
    }

    // ========================================================================
    // Actor
    // ========================================================================

    /// Spawn the coordinator as an actor and return a channel to it
    ///
    /// The actor stops when every channel clone is dropped or `token` is
    /// cancelled. Must be called from within a Tokio runtime.
    pub fn spawn(
        self,
        config: &TransferConfig,
        token: SessionToken,
    ) -> (LocalChannel, JoinHandle<()>) {
        let (sender, inbox) = mpsc::channel(config.queue_depth);
        let channel = LocalChannel::new(sender, config.max_message_bytes);
        let handle = tokio::spawn(self.run(inbox, token));
        (channel, handle)
    }

    async fn run(self, mut inbox: mpsc::Receiver<Envelope>, token: SessionToken) {
        tracing::debug!("Transfer coordinator started");

        loop {
            let envelope = tokio::select! {
                _ = token.cancelled() => break,
                envelope = inbox.recv() => match envelope {
                    Some(envelope) => envelope,
                    None => break,
                },
            };

            let action = envelope.request.action();
            let object_id = envelope.request.object_id().clone();
            let response = self.handle(envelope.request);

            match &response {
                Ok(r) => tracing::debug!(
                    object_id = %object_id,
                    action = action,
                    payload = r.payload_len(),
                    "Served request"
                ),
                Err(e) => tracing::debug!(
                    object_id = %object_id,
                    action = action,
                    error = %e,
                    "Request failed"
                ),
            }

            // The requester may have timed out and gone away
            let _ = envelope.reply.send(response);
        }

        tracing::debug!("Transfer coordinator stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Channel;
    use crate::session::SessionSignal;
    use crate::store::NewObject;
    use bytes::Bytes;

    fn config() -> TransferConfig {
        TransferConfig {
            chunk_size: 16,
            threshold: 32,
            max_message_bytes: 64,
            ..TransferConfig::default()
        }
    }

    fn data(len: usize) -> Bytes {
        Bytes::from((0..len).map(|i| (i % 251) as u8).collect::<Vec<u8>>())
    }

    fn coordinator_with(len: usize) -> (TransferCoordinator, ObjectId) {
        let store = ObjectStore::new();
        let id = store.register(data(len), NewObject::named("clip.mp4")).unwrap();
        (TransferCoordinator::new(store, &config()), id)
    }

    #[test]
    fn test_check_chunking_large_object() {
        let (coordinator, id) = coordinator_with(50);
        let info = coordinator.check_chunking(&id).unwrap();

        assert!(info.chunked);
        assert_eq!(info.total_chunks, 4);
        assert_eq!(info.chunk_size, 16);
        assert_eq!(info.size, 50);
        assert_eq!(info.mime_type, "video/mp4");
        assert_eq!(info.name, "clip.mp4");
        assert_eq!(info.sha256, crate::store::compute_hash(&data(50)));
    }

    #[test]
    fn test_unknown_id() {
        let (coordinator, _) = coordinator_with(10);
        let missing = ObjectId::parse("nope").unwrap();

        for request in [
            Request::CheckChunking { object_id: missing.clone() },
            Request::GetObject { object_id: missing.clone() },
            Request::GetChunk { object_id: missing.clone(), index: 0 },
        ] {
            assert!(matches!(coordinator.handle(request), Err(TransferError::NotFound(_))));
        }
    }

    #[test]
    fn test_get_object_fast_path() {
        let (coordinator, id) = coordinator_with(10);
        let payload = coordinator.get_object(&id).unwrap();
        assert_eq!(payload.bytes, data(10));
        assert_eq!(payload.size, 10);
    }

    #[test]
    fn test_get_object_at_threshold() {
        let (coordinator, id) = coordinator_with(32);
        assert!(!coordinator.check_chunking(&id).unwrap().chunked);
        assert_eq!(coordinator.get_object(&id).unwrap().bytes.len(), 32);
    }

    #[test]
    fn test_get_object_requires_chunking() {
        let (coordinator, id) = coordinator_with(33);
        assert!(matches!(
            coordinator.get_object(&id),
            Err(TransferError::ChunkingRequired(_))
        ));
    }

    #[test]
    fn test_get_chunk_boundaries() {
        let (coordinator, id) = coordinator_with(50);
        let all = data(50);

        let sizes: Vec<u32> = (0..4)
            .map(|i| coordinator.get_chunk(&id, i).unwrap().size)
            .collect();
        assert_eq!(sizes, vec![16, 16, 16, 2]);

        let third = coordinator.get_chunk(&id, 2).unwrap();
        assert_eq!(third.index, 2);
        assert_eq!(third.bytes, all.slice(32..48));

        // Repeated requests are side-effect free
        assert_eq!(coordinator.get_chunk(&id, 2).unwrap(), third);
    }

    #[test]
    fn test_get_chunk_out_of_range() {
        let (coordinator, id) = coordinator_with(50);
        assert!(matches!(
            coordinator.get_chunk(&id, 4),
            Err(TransferError::OutOfRange(_))
        ));
    }

    #[test]
    fn test_whole_object_as_single_chunk() {
        let (coordinator, id) = coordinator_with(0);
        let chunk = coordinator.get_chunk(&id, 0).unwrap();
        assert_eq!(chunk.size, 0);
        assert!(matches!(
            coordinator.get_chunk(&id, 1),
            Err(TransferError::OutOfRange(_))
        ));
    }

    #[tokio::test]
    async fn test_actor_serves_and_stops_on_cancel() {
        let (coordinator, id) = coordinator_with(50);
        let signal = SessionSignal::new();
        let (channel, handle) = coordinator.spawn(&config(), signal.token());

        let info = channel
            .send(Request::CheckChunking { object_id: id.clone() })
            .await
            .unwrap()
            .into_chunking_info()
            .unwrap();
        assert_eq!(info.total_chunks, 4);

        let err = channel
            .send(Request::GetChunk { object_id: id, index: 9 })
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::OutOfRange(_)));

        signal.cancel();
        handle.await.unwrap();
        assert!(channel.is_closed());
    }
}
