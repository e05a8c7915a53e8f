//! Message channels
//!
//! A `Channel` delivers one request and yields its response. Channels do not
//! retry or time out on their own; the requester attaches both per call.

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use super::{enforce_ceiling, Request, Response};
use crate::error::{Result, TransferError};

/// Request/response transport between requester and coordinator
#[async_trait]
pub trait Channel: Send + Sync {
    /// Deliver a request and wait for its response
    async fn send(&self, request: Request) -> Result<Response>;
}

/// A request paired with the slot its response goes to
#[derive(Debug)]
pub struct Envelope {
    pub request: Request,
    pub reply: oneshot::Sender<Result<Response>>,
}

/// In-process channel to a coordinator actor
///
/// Enforces the per-message payload ceiling on every response.
#[derive(Clone)]
pub struct LocalChannel {
    sender: mpsc::Sender<Envelope>,
    max_message_bytes: u64,
}

impl LocalChannel {
    pub fn new(sender: mpsc::Sender<Envelope>, max_message_bytes: u64) -> Self {
        Self {
            sender,
            max_message_bytes,
        }
    }

    /// Whether the receiving actor has stopped
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

#[async_trait]
impl Channel for LocalChannel {
    async fn send(&self, request: Request) -> Result<Response> {
        let (reply, response) = oneshot::channel();

        self.sender
            .send(Envelope { request, reply })
            .await
            .map_err(|_| TransferError::Channel("coordinator inbox closed".to_string()))?;

        let response = response
            .await
            .map_err(|_| TransferError::Channel("coordinator dropped the request".to_string()))??;

        enforce_ceiling(&response, self.max_message_bytes)?;
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ChunkPayload;
    use crate::store::ObjectId;
    use bytes::Bytes;

    fn echo_chunk(request: &Request, len: usize) -> Response {
        let index = match request {
            Request::GetChunk { index, .. } => *index,
            _ => 0,
        };
        Response::GetChunk(ChunkPayload {
            object_id: request.object_id().clone(),
            index,
            bytes: Bytes::from(vec![7u8; len]),
            size: len as u32,
        })
    }

    fn request() -> Request {
        Request::GetChunk {
            object_id: ObjectId::parse("a").unwrap(),
            index: 1,
        }
    }

    #[tokio::test]
    async fn test_local_channel_roundtrip() {
        let (tx, mut rx) = mpsc::channel::<Envelope>(4);
        let channel = LocalChannel::new(tx, 1024);

        tokio::spawn(async move {
            while let Some(envelope) = rx.recv().await {
                let response = echo_chunk(&envelope.request, 8);
                let _ = envelope.reply.send(Ok(response));
            }
        });

        let chunk = channel.send(request()).await.unwrap().into_chunk().unwrap();
        assert_eq!(chunk.index, 1);
        assert_eq!(chunk.bytes.len(), 8);
    }

    #[tokio::test]
    async fn test_local_channel_enforces_ceiling() {
        let (tx, mut rx) = mpsc::channel::<Envelope>(4);
        let channel = LocalChannel::new(tx, 4);

        tokio::spawn(async move {
            while let Some(envelope) = rx.recv().await {
                let response = echo_chunk(&envelope.request, 8);
                let _ = envelope.reply.send(Ok(response));
            }
        });

        let result = channel.send(request()).await;
        assert!(matches!(result, Err(TransferError::PayloadTooLarge { size: 8, limit: 4 })));
    }

    #[tokio::test]
    async fn test_closed_inbox_is_transient() {
        let (tx, rx) = mpsc::channel::<Envelope>(1);
        drop(rx);
        let channel = LocalChannel::new(tx, 4);
        assert!(channel.is_closed());

        let err = channel.send(request()).await.unwrap_err();
        assert!(matches!(err, TransferError::Channel(_)));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_dropped_reply_is_transient() {
        let (tx, mut rx) = mpsc::channel::<Envelope>(1);
        let channel = LocalChannel::new(tx, 4);

        tokio::spawn(async move {
            // Receive and drop without answering
            while let Some(envelope) = rx.recv().await {
                drop(envelope);
            }
        });

        let err = channel.send(request()).await.unwrap_err();
        assert!(matches!(err, TransferError::Channel(_)));
    }
}
