//! Publishing Session
//!
//! Owns everything whose lifetime is one publishing session:
//! - the object store holding registered bytes
//! - the coordinator actor serving them
//! - the cancellation signal observed by in-flight resolves
//!
//! Ending the session cancels in-flight resolves, evicts every object and
//! waits for the coordinator to stop.

use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::TransferConfig;
use crate::coordinator::TransferCoordinator;
use crate::error::Result;
use crate::protocol::LocalChannel;
use crate::requester::ChunkRequester;
use crate::store::{NewObject, ObjectId, ObjectStore};

// ============================================================================
// Cancellation
// ============================================================================

/// Owning side of a session's cancellation signal
///
/// Dropping the signal counts as cancellation.
#[derive(Debug)]
pub struct SessionSignal {
    sender: watch::Sender<bool>,
}

impl SessionSignal {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self { sender }
    }

    pub fn token(&self) -> SessionToken {
        SessionToken {
            receiver: Some(self.sender.subscribe()),
        }
    }

    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }
}

impl Default for SessionSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Observing side of a session's cancellation signal
#[derive(Debug, Clone)]
pub struct SessionToken {
    receiver: Option<watch::Receiver<bool>>,
}

impl SessionToken {
    /// A token that is never cancelled
    pub fn never() -> Self {
        Self { receiver: None }
    }

    pub fn is_cancelled(&self) -> bool {
        match &self.receiver {
            Some(receiver) => *receiver.borrow() || receiver.has_changed().is_err(),
            None => false,
        }
    }

    /// Completes once the session is cancelled or its signal is dropped
    pub async fn cancelled(&self) {
        let Some(receiver) = &self.receiver else {
            return std::future::pending().await;
        };

        let mut receiver = receiver.clone();
        loop {
            if *receiver.borrow_and_update() {
                return;
            }
            if receiver.changed().await.is_err() {
                return;
            }
        }
    }
}

// ============================================================================
// Publishing Session
// ============================================================================

/// One publishing session
pub struct PublishSession {
    id: Uuid,
    config: TransferConfig,
    coordinator: TransferCoordinator,
    channel: LocalChannel,
    signal: SessionSignal,
    actor: Mutex<Option<JoinHandle<()>>>,
    started_at: DateTime<Utc>,
}

impl PublishSession {
    /// Start a session: validate config, create the store, spawn the coordinator
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(config: TransferConfig) -> Result<Self> {
        config.validate()?;

        let store = ObjectStore::with_max_object_size(config.max_object_size);
        let coordinator = TransferCoordinator::new(store, &config);
        let signal = SessionSignal::new();
        let (channel, actor) = coordinator.clone().spawn(&config, signal.token());

        let session = Self {
            id: Uuid::new_v4(),
            config,
            coordinator,
            channel,
            signal,
            actor: Mutex::new(Some(actor)),
            started_at: Utc::now(),
        };

        tracing::info!(
            session_id = %session.id,
            chunk_size = session.config.chunk_size,
            threshold = session.config.threshold,
            "Started publishing session"
        );

        Ok(session)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn store(&self) -> &ObjectStore {
        self.coordinator.store()
    }

    pub fn coordinator(&self) -> &TransferCoordinator {
        &self.coordinator
    }

    /// In-process channel to this session's coordinator
    pub fn channel(&self) -> LocalChannel {
        self.channel.clone()
    }

    pub fn token(&self) -> SessionToken {
        self.signal.token()
    }

    pub fn is_ended(&self) -> bool {
        self.signal.is_cancelled()
    }

    /// Register an object for this session
    ///
    /// Fails with `Cancelled` once the session has ended, including when the
    /// end races this call.
    pub fn register(&self, bytes: impl Into<Bytes>, object: NewObject) -> Result<ObjectId> {
        self.store().register(bytes, object)
    }

    /// Register an object under a caller-chosen id
    pub fn register_with_id(
        &self,
        id: impl Into<String>,
        bytes: impl Into<Bytes>,
        object: NewObject,
    ) -> Result<ObjectId> {
        self.store().register_with_id(id, bytes, object)
    }

    /// Register an object, hashing it on the blocking pool
    pub async fn register_async(
        &self,
        id: Option<String>,
        bytes: impl Into<Bytes>,
        object: NewObject,
    ) -> Result<ObjectId> {
        self.store().register_async(id, bytes, object).await
    }

    /// A requester bound to this session's coordinator and cancellation
    pub fn requester(&self) -> ChunkRequester {
        ChunkRequester::new(Arc::new(self.channel()), self.config.clone())
            .with_cancellation(self.token())
    }

    /// End the session. Returns the number of objects evicted.
    pub async fn end(&self) -> usize {
        self.signal.cancel();
        let evicted = self.store().close();

        let actor = self.actor.lock().take();
        if let Some(actor) = actor {
            if let Err(e) = actor.await {
                tracing::warn!(session_id = %self.id, error = %e, "Coordinator task failed");
            }

            tracing::info!(
                session_id = %self.id,
                evicted = evicted,
                "Ended publishing session"
            );
        }

        evicted
    }
}

impl Drop for PublishSession {
    fn drop(&mut self) {
        self.signal.cancel();
    }
}
