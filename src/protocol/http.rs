//! HTTP channel
//!
//! Carries protocol messages to a coordinator served by the `routes` module
//! (`POST {base_url}/api/v1/transfer`). Typed error bodies are mapped back to
//! `TransferError` so remote failures keep their variant.

use async_trait::async_trait;

use super::{enforce_ceiling, Channel, Request, Response};
use crate::error::{ErrorBody, Result, TransferError};

/// Path of the transfer endpoint relative to the server root
pub const TRANSFER_PATH: &str = "/api/v1/transfer";

/// Channel to a remote coordinator over HTTP
#[derive(Clone)]
pub struct HttpChannel {
    client: reqwest::Client,
    endpoint: String,
    max_message_bytes: u64,
}

impl HttpChannel {
    pub fn new(base_url: &str, max_message_bytes: u64) -> Self {
        Self::with_client(reqwest::Client::new(), base_url, max_message_bytes)
    }

    pub fn with_client(client: reqwest::Client, base_url: &str, max_message_bytes: u64) -> Self {
        Self {
            client,
            endpoint: format!("{}{}", base_url.trim_end_matches('/'), TRANSFER_PATH),
            max_message_bytes,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Channel for HttpChannel {
    async fn send(&self, request: Request) -> Result<Response> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| TransferError::Channel(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return match response.json::<ErrorBody>().await {
                Ok(body) => Err(body.into()),
                Err(_) => Err(TransferError::Channel(format!("unexpected status {}", status))),
            };
        }

        let response: Response = response
            .json()
            .await
            .map_err(|e| TransferError::Channel(format!("malformed response: {}", e)))?;

        enforce_ceiling(&response, self.max_message_bytes)?;
        Ok(response)
    }
}
