//! Configuration management for Chunk Relay

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Result, TransferError};

const MIB: u64 = 1024 * 1024;

/// Default chunk size: 16MB
pub const DEFAULT_CHUNK_SIZE: u64 = 16 * MIB;

/// Default chunking threshold: 32MB
pub const DEFAULT_THRESHOLD: u64 = 32 * MIB;

/// Default per-message payload ceiling: 64MB
pub const DEFAULT_MAX_MESSAGE_BYTES: u64 = 64 * MIB;

/// Default registration cap: 4GB
pub const DEFAULT_MAX_OBJECT_SIZE: u64 = 4096 * MIB;

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub server: ServerConfig,
    pub transfer: TransferConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

/// Tunables for planning, serving and fetching objects
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Size of every chunk except possibly the last
    pub chunk_size: u64,
    /// Objects strictly larger than this are transferred in chunks
    pub threshold: u64,
    /// Hard ceiling on the byte payload of a single channel message
    pub max_message_bytes: u64,
    /// Largest object accepted at registration
    pub max_object_size: u64,
    /// Chunk requests in flight per resolve
    pub max_in_flight: usize,
    /// Timeout for each individual request
    pub request_timeout: Duration,
    /// Total attempts per request, first try included
    pub max_attempts: u32,
    pub retry_base_delay: Duration,
    pub retry_max_delay: Duration,
    /// Fresh attempts of a whole resolve after a size or digest mismatch
    pub whole_transfer_retries: u32,
    /// Bound of the coordinator inbox
    pub queue_depth: usize,
}

impl Default for TransferConfig {
    fn default() -> Self {
        TransferConfig {
            chunk_size: DEFAULT_CHUNK_SIZE,
            threshold: DEFAULT_THRESHOLD,
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
            max_object_size: DEFAULT_MAX_OBJECT_SIZE,
            max_in_flight: 3,
            request_timeout: Duration::from_secs(30),
            max_attempts: 3,
            retry_base_delay: Duration::from_millis(250),
            retry_max_delay: Duration::from_secs(4),
            whole_transfer_retries: 1,
            queue_depth: 64,
        }
    }
}

impl TransferConfig {
    /// Check the settings are mutually consistent
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(TransferError::InvalidConfig("chunk size must be non-zero".to_string()));
        }
        if self.chunk_size > self.max_message_bytes {
            return Err(TransferError::InvalidConfig(format!(
                "chunk size {} exceeds message ceiling {}",
                self.chunk_size, self.max_message_bytes
            )));
        }
        if self.chunk_size > u64::from(u32::MAX) || self.threshold > u64::from(u32::MAX) {
            return Err(TransferError::InvalidConfig(format!(
                "chunk size {} and threshold {} must fit a 32-bit chunk descriptor",
                self.chunk_size, self.threshold
            )));
        }
        if self.threshold > self.max_message_bytes {
            return Err(TransferError::InvalidConfig(format!(
                "threshold {} exceeds message ceiling {}",
                self.threshold, self.max_message_bytes
            )));
        }
        if self.max_in_flight == 0 {
            return Err(TransferError::InvalidConfig("max in-flight must be at least 1".to_string()));
        }
        if self.max_attempts == 0 {
            return Err(TransferError::InvalidConfig("max attempts must be at least 1".to_string()));
        }
        if self.queue_depth == 0 {
            return Err(TransferError::InvalidConfig("queue depth must be at least 1".to_string()));
        }
        Ok(())
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let defaults = TransferConfig::default();

        let config = Config {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env_or("SERVER_PORT", 3000)?,
            },
            transfer: TransferConfig {
                chunk_size: env_or("RELAY_CHUNK_SIZE", defaults.chunk_size)?,
                threshold: env_or("RELAY_CHUNK_THRESHOLD", defaults.threshold)?,
                max_message_bytes: env_or("RELAY_MAX_MESSAGE_BYTES", defaults.max_message_bytes)?,
                max_object_size: env_or("RELAY_MAX_OBJECT_SIZE", defaults.max_object_size)?,
                max_in_flight: env_or("RELAY_MAX_IN_FLIGHT", defaults.max_in_flight)?,
                request_timeout: env_millis("RELAY_REQUEST_TIMEOUT_MS", defaults.request_timeout)?,
                max_attempts: env_or("RELAY_MAX_ATTEMPTS", defaults.max_attempts)?,
                retry_base_delay: env_millis("RELAY_RETRY_BASE_DELAY_MS", defaults.retry_base_delay)?,
                retry_max_delay: env_millis("RELAY_RETRY_MAX_DELAY_MS", defaults.retry_max_delay)?,
                whole_transfer_retries: env_or(
                    "RELAY_WHOLE_TRANSFER_RETRIES",
                    defaults.whole_transfer_retries,
                )?,
                queue_depth: env_or("RELAY_QUEUE_DEPTH", defaults.queue_depth)?,
            },
        };

        config.transfer.validate()?;
        Ok(config)
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> Result<T> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| TransferError::InvalidConfig(format!("{}={:?} is not valid", name, raw))),
        Err(_) => Ok(default),
    }
}

fn env_millis(name: &str, default: Duration) -> Result<Duration> {
    env_or(name, default.as_millis() as u64).map(Duration::from_millis)
}
