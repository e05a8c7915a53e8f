//! Chunk Relay Library
//!
//! Segmented transfer of large binary objects over request/response channels
//! with a per-message size ceiling. Objects at or below a threshold travel
//! whole; larger ones are split into fixed-size chunks, fetched through a
//! bounded window with per-request timeouts and retries, and reassembled in
//! index order.
//!
//! # Modules
//!
//! - `store`: Session-scoped in-memory object store
//! - `planner`: Deterministic chunk plans
//! - `protocol`: Request/response messages and channels
//! - `coordinator`: Serving side, answers requests from the store
//! - `requester`: Consuming side, resolves ids into objects
//! - `reconstruct`: Ordered reassembly with size and digest checks
//! - `session`: Publishing session lifecycle
//! - `routes`: HTTP binding for the coordinator

pub mod config;
pub mod coordinator;
pub mod error;
pub mod planner;
pub mod protocol;
pub mod reconstruct;
pub mod requester;
pub mod routes;
pub mod session;
pub mod store;

pub use config::{Config, TransferConfig};
pub use coordinator::TransferCoordinator;
pub use error::{Result, TransferError};
pub use reconstruct::ResolvedObject;
pub use requester::ChunkRequester;
pub use session::PublishSession;
pub use store::{NewObject, ObjectId, ObjectStore};
