//! Chunk Requester
//!
//! Consuming side of the protocol. Callers see a single operation,
//! `resolve(id) -> ResolvedObject`, and never learn whether the object came
//! through the whole-object fast path or the chunked path.
//!
//! Each resolve walks:
//!
//! ```text
//! START -> CHECKING -> FAST_PATH | FETCHING -> RECONSTRUCTING -> DONE | FAILED
//! ```
//!
//! Chunk requests are issued through a fixed window (`max_in_flight`), each
//! with its own timeout and retry budget. Responses are buffered by index so
//! arrival order does not matter.

mod retry;

pub use retry::{BackoffStrategy, RetryError, RetryPolicy};

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use futures::stream::{self, StreamExt};

use crate::config::TransferConfig;
use crate::error::{Result, TransferError};
use crate::planner::{self, ChunkDescriptor, ChunkPlan};
use crate::protocol::{Channel, ChunkingInfo, ObjectPayload, Request, Response};
use crate::reconstruct::{reconstruct, verify_digest_blocking, ResolvedObject};
use crate::session::SessionToken;
use crate::store::ObjectId;

// ============================================================================
// Transfer State
// ============================================================================

/// Phase of a resolve attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvePhase {
    Start,
    Checking,
    FastPath,
    Fetching,
    Reconstructing,
    Done,
    Failed,
}

impl fmt::Display for ResolvePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResolvePhase::Start => "START",
            ResolvePhase::Checking => "CHECKING",
            ResolvePhase::FastPath => "FAST_PATH",
            ResolvePhase::Fetching => "FETCHING",
            ResolvePhase::Reconstructing => "RECONSTRUCTING",
            ResolvePhase::Done => "DONE",
            ResolvePhase::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// Requester-side state of one transfer attempt
#[derive(Debug)]
pub struct TransferRequest {
    pub object_id: ObjectId,
    pub expected_size: u64,
    pub expected_chunks: u32,
    received: BTreeMap<u32, Bytes>,
    phase: ResolvePhase,
}

impl TransferRequest {
    pub fn new(object_id: ObjectId) -> Self {
        Self {
            object_id,
            expected_size: 0,
            expected_chunks: 0,
            received: BTreeMap::new(),
            phase: ResolvePhase::Start,
        }
    }

    pub fn phase(&self) -> ResolvePhase {
        self.phase
    }

    fn advance(&mut self, next: ResolvePhase) {
        tracing::debug!(
            object_id = %self.object_id,
            from = %self.phase,
            to = %next,
            "Resolve phase"
        );
        self.phase = next;
    }

    /// Record what the serving side announced
    pub fn expect(&mut self, size: u64, chunks: u32) {
        self.expected_size = size;
        self.expected_chunks = chunks;
    }

    /// Buffer a chunk. Duplicates and unknown indices are ignored.
    ///
    /// Returns whether the chunk was new.
    pub fn receive(&mut self, index: u32, bytes: Bytes) -> bool {
        if index >= self.expected_chunks || self.received.contains_key(&index) {
            return false;
        }
        self.received.insert(index, bytes);
        true
    }

    pub fn received_count(&self) -> usize {
        self.received.len()
    }

    pub fn is_complete(&self) -> bool {
        self.received.len() as u64 == u64::from(self.expected_chunks)
    }

    /// Indices not received yet
    pub fn missing(&self) -> Vec<u32> {
        (0..self.expected_chunks)
            .filter(|i| !self.received.contains_key(i))
            .collect()
    }

    /// Take the buffered chunks in index order
    pub fn take_ordered(&mut self) -> Result<Vec<Bytes>> {
        if let Some(index) = self.missing().first() {
            return Err(TransferError::ChunkUnavailable {
                index: *index,
                attempts: 0,
            });
        }
        Ok(std::mem::take(&mut self.received).into_values().collect())
    }
}

// ============================================================================
// Chunk Requester
// ============================================================================

/// Resolves object ids into objects over a `Channel`
#[derive(Clone)]
pub struct ChunkRequester {
    channel: Arc<dyn Channel>,
    config: TransferConfig,
    retry: RetryPolicy,
    token: SessionToken,
}

impl ChunkRequester {
    pub fn new(channel: Arc<dyn Channel>, config: TransferConfig) -> Self {
        let retry = RetryPolicy::from_config(&config);
        Self {
            channel,
            config,
            retry,
            token: SessionToken::never(),
        }
    }

    /// Stop resolving when `token` is cancelled
    pub fn with_cancellation(mut self, token: SessionToken) -> Self {
        self.token = token;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Resolve an object id into its bytes and metadata
    pub async fn resolve(&self, object_id: &ObjectId) -> Result<ResolvedObject> {
        if self.token.is_cancelled() {
            return Err(TransferError::Cancelled);
        }

        let started = Instant::now();
        let mut whole_retries = 0;

        loop {
            let result = tokio::select! {
                biased;
                _ = self.token.cancelled() => Err(TransferError::Cancelled),
                result = self.resolve_once(object_id) => result,
            };

            match result {
                Ok(object) => {
                    tracing::info!(
                        object_id = %object_id,
                        size = object.size(),
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Resolved object"
                    );
                    return Ok(object);
                }
                Err(e @ (TransferError::SizeMismatch { .. } | TransferError::IntegrityMismatch { .. }))
                    if whole_retries < self.config.whole_transfer_retries =>
                {
                    whole_retries += 1;
                    tracing::warn!(
                        object_id = %object_id,
                        error = %e,
                        retry = whole_retries,
                        "Transfer verification failed, retrying whole transfer"
                    );
                }
                Err(e) => {
                    tracing::warn!(object_id = %object_id, error = %e, "Resolve failed");
                    return Err(e);
                }
            }
        }
    }

    async fn resolve_once(&self, object_id: &ObjectId) -> Result<ResolvedObject> {
        let mut transfer = TransferRequest::new(object_id.clone());
        let result = self.drive(&mut transfer).await;
        match &result {
            Ok(_) => transfer.advance(ResolvePhase::Done),
            Err(_) => transfer.advance(ResolvePhase::Failed),
        }
        result
    }

    async fn drive(&self, transfer: &mut TransferRequest) -> Result<ResolvedObject> {
        transfer.advance(ResolvePhase::Checking);
        let info = self.check_chunking(&transfer.object_id).await?;
        transfer.expect(info.size, info.total_chunks);

        if info.chunked {
            let plan = planner::chunked(info.size, info.chunk_size)?;
            if plan.total_chunks != info.total_chunks {
                return Err(TransferError::Internal(format!(
                    "coordinator announced {} chunks, plan has {}",
                    info.total_chunks, plan.total_chunks
                )));
            }

            transfer.advance(ResolvePhase::Fetching);
            self.fetch_chunks(transfer, &plan).await?;
        } else {
            if info.total_chunks != 1 {
                return Err(TransferError::Internal(format!(
                    "whole object announced with {} chunks",
                    info.total_chunks
                )));
            }

            transfer.advance(ResolvePhase::FastPath);
            let payload = self.fetch_object(&transfer.object_id).await?;
            if payload.bytes.len() as u64 != info.size {
                return Err(TransferError::SizeMismatch {
                    expected: info.size,
                    actual: payload.bytes.len() as u64,
                });
            }
            transfer.receive(0, payload.bytes);
        }

        transfer.advance(ResolvePhase::Reconstructing);
        let chunks = transfer.take_ordered()?;
        let object = reconstruct(transfer.object_id.clone(), chunks, info.metadata())?;
        verify_digest_blocking(&object, &info.sha256).await?;

        Ok(object)
    }

    // ========================================================================
    // Requests
    // ========================================================================

    /// Send one request with the per-request timeout attached
    async fn send(&self, request: Request) -> Result<Response> {
        let timeout = self.config.request_timeout;
        tokio::time::timeout(timeout, self.channel.send(request))
            .await
            .map_err(|_| TransferError::Timeout(timeout))?
    }

    async fn check_chunking(&self, object_id: &ObjectId) -> Result<ChunkingInfo> {
        let request = Request::CheckChunking {
            object_id: object_id.clone(),
        };

        self.retry
            .run("CHECK_CHUNKING", |_| {
                let request = request.clone();
                async move { self.send(request).await?.into_chunking_info() }
            })
            .await
            .map_err(RetryError::into_error)
    }

    async fn fetch_object(&self, object_id: &ObjectId) -> Result<ObjectPayload> {
        let request = Request::GetObject {
            object_id: object_id.clone(),
        };

        self.retry
            .run("GET_OBJECT", |_| {
                let request = request.clone();
                async move { self.send(request).await?.into_object() }
            })
            .await
            .map_err(|e| match e {
                RetryError::Exhausted { attempts, .. } => {
                    TransferError::ChunkUnavailable { index: 0, attempts }
                }
                RetryError::Fatal(e) => e,
            })
    }

    /// Fetch every chunk of `plan` through the bounded window
    async fn fetch_chunks(&self, transfer: &mut TransferRequest, plan: &ChunkPlan) -> Result<()> {
        let descriptors = plan.descriptors(&transfer.object_id);

        let mut fetches = stream::iter(descriptors)
            .map(|descriptor| self.fetch_chunk(descriptor))
            .buffer_unordered(self.config.max_in_flight.max(1));

        while let Some(result) = fetches.next().await {
            // Returning drops the stream, so no further requests are issued
            let (index, bytes) = result?;
            transfer.receive(index, bytes);
        }

        if !transfer.is_complete() {
            let missing = transfer.missing();
            return Err(TransferError::ChunkUnavailable {
                index: missing.first().copied().unwrap_or_default(),
                attempts: 0,
            });
        }

        Ok(())
    }

    async fn fetch_chunk(&self, descriptor: ChunkDescriptor) -> Result<(u32, Bytes)> {
        let index = descriptor.index;
        let request = Request::GetChunk {
            object_id: descriptor.object_id.clone(),
            index,
        };

        let payload = self
            .retry
            .run("GET_CHUNK", |_| {
                let request = request.clone();
                async move { self.send(request).await?.into_chunk() }
            })
            .await
            .map_err(|e| match e {
                RetryError::Exhausted { attempts, .. } => {
                    TransferError::ChunkUnavailable { index, attempts }
                }
                RetryError::Fatal(e) => e,
            })?;

        if payload.index != index {
            return Err(TransferError::Internal(format!(
                "requested chunk {}, received chunk {}",
                index, payload.index
            )));
        }

        let actual = payload.bytes.len() as u64;
        if actual != u64::from(descriptor.size) {
            return Err(TransferError::SizeMismatch {
                expected: u64::from(descriptor.size),
                actual,
            });
        }

        tracing::debug!(
            object_id = %descriptor.object_id,
            index = index,
            total_chunks = descriptor.total_chunks,
            size = actual,
            "Received chunk"
        );

        Ok((index, payload.bytes))
    }
}

// ============================================================================
// Tests
// ============================================================================
