//! Chunk planning
//!
//! Pure functions deciding whether an object is transferred whole or in
//! chunks, and where chunk boundaries fall. Every other component relies on
//! these boundaries, so the rules are kept in one place:
//!
//! - `chunked = size > threshold`
//! - `total_chunks = ceil(size / chunk_size)` for chunked objects
//! - every chunk is `chunk_size` long except the last
//! - a non-chunked object is a single chunk spanning the whole object, so a
//!   zero-byte object is one zero-length chunk

use std::ops::Range;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TransferError};
use crate::store::ObjectId;

/// Transfer layout of one object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkPlan {
    /// Whether the chunked path applies
    pub chunked: bool,

    /// Object size in bytes
    pub size: u64,

    /// Number of chunks (1 for the whole-object path)
    pub total_chunks: u32,

    /// Nominal chunk size the plan was computed with
    pub chunk_size: u64,

    /// Length of the last chunk
    pub final_chunk_size: u64,
}

/// Metadata describing one chunk. Carries no payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkDescriptor {
    pub object_id: ObjectId,
    pub index: u32,
    pub size: u32,
    pub total_chunks: u32,
}

/// Plan the transfer of an object of `size` bytes
pub fn plan(size: u64, chunk_size: u64, threshold: u64) -> Result<ChunkPlan> {
    if threshold > u64::from(u32::MAX) {
        return Err(TransferError::InvalidConfig(format!(
            "threshold {} does not fit a chunk descriptor",
            threshold
        )));
    }

    if size <= threshold {
        if chunk_size == 0 {
            return Err(TransferError::InvalidConfig("chunk size must be non-zero".to_string()));
        }
        return Ok(ChunkPlan {
            chunked: false,
            size,
            total_chunks: 1,
            chunk_size,
            final_chunk_size: size,
        });
    }

    chunked(size, chunk_size)
}

/// Plan an object that is known to take the chunked path
///
/// Used by requesters, which learn the chunk size and the chunked flag from
/// the serving side but not its threshold.
pub fn chunked(size: u64, chunk_size: u64) -> Result<ChunkPlan> {
    if chunk_size == 0 {
        return Err(TransferError::InvalidConfig("chunk size must be non-zero".to_string()));
    }
    if chunk_size > u64::from(u32::MAX) {
        return Err(TransferError::InvalidConfig(format!(
            "chunk size {} does not fit a chunk descriptor",
            chunk_size
        )));
    }

    let total = if size == 0 { 1 } else { size.div_ceil(chunk_size) };
    let total_chunks = u32::try_from(total).map_err(|_| {
        TransferError::InvalidConfig(format!(
            "{} bytes in chunks of {} needs {} chunks",
            size, chunk_size, total
        ))
    })?;

    let remainder = size % chunk_size;
    let final_chunk_size = if size == 0 {
        0
    } else if remainder == 0 {
        chunk_size
    } else {
        remainder
    };

    Ok(ChunkPlan {
        chunked: true,
        size,
        total_chunks,
        chunk_size,
        final_chunk_size,
    })
}

impl ChunkPlan {
    /// Byte range covered by chunk `index`
    pub fn chunk_range(&self, index: u32) -> Result<Range<u64>> {
        if index >= self.total_chunks {
            return Err(TransferError::OutOfRange(format!(
                "chunk {} of {}",
                index, self.total_chunks
            )));
        }

        if !self.chunked {
            return Ok(0..self.size);
        }

        let start = u64::from(index) * self.chunk_size;
        let end = start.saturating_add(self.chunk_size).min(self.size);
        Ok(start..end)
    }

    /// Length of chunk `index`
    pub fn chunk_len(&self, index: u32) -> Result<u64> {
        self.chunk_range(index).map(|range| range.end - range.start)
    }

    /// Descriptors for every chunk, in index order
    pub fn descriptors(&self, object_id: &ObjectId) -> Vec<ChunkDescriptor> {
        (0..self.total_chunks)
            .map(|index| {
                let size = if index + 1 == self.total_chunks {
                    self.final_chunk_size
                } else {
                    self.chunk_size
                };
                ChunkDescriptor {
                    object_id: object_id.clone(),
                    index,
                    size: size as u32,
                    total_chunks: self.total_chunks,
                }
            })
            .collect()
    }
}

/// Split a buffer along the boundaries of `plan`
///
/// Slices share the input allocation.
pub fn split(bytes: &Bytes, plan: &ChunkPlan) -> Result<Vec<Bytes>> {
    if bytes.len() as u64 != plan.size {
        return Err(TransferError::SizeMismatch {
            expected: plan.size,
            actual: bytes.len() as u64,
        });
    }

    (0..plan.total_chunks)
        .map(|index| {
            let range = plan.chunk_range(index)?;
            Ok(bytes.slice(range.start as usize..range.end as usize))
        })
        .collect()
}
