//! Reconstruction
//!
//! Turns ordered chunk buffers back into the original object. Chunks are
//! concatenated strictly in index order and the total length must equal the
//! declared size; a short or long result is an error, never a truncated or
//! padded object.

use bytes::{Bytes, BytesMut};
use serde::Serialize;

use crate::error::{Result, TransferError};
use crate::store::{compute_hash, compute_hash_blocking, ObjectId, ObjectMetadata};

/// A resolved object: bytes plus the declared metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedObject {
    pub id: ObjectId,
    pub metadata: ObjectMetadata,
    #[serde(skip)]
    pub bytes: Bytes,
}

impl ResolvedObject {
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Concatenate `chunks` (already in index order) and attach `metadata`
pub fn reconstruct(
    id: ObjectId,
    chunks: Vec<Bytes>,
    metadata: ObjectMetadata,
) -> Result<ResolvedObject> {
    let actual: u64 = chunks.iter().map(|c| c.len() as u64).sum();
    if actual != metadata.size {
        return Err(TransferError::SizeMismatch {
            expected: metadata.size,
            actual,
        });
    }

    let bytes = match chunks.len() {
        0 => Bytes::new(),
        1 => chunks.into_iter().next().unwrap_or_default(),
        _ => {
            let mut buffer = BytesMut::with_capacity(actual as usize);
            for chunk in &chunks {
                buffer.extend_from_slice(chunk);
            }
            buffer.freeze()
        }
    };

    Ok(ResolvedObject { id, metadata, bytes })
}

/// Check the object bytes against a hex SHA-256 digest
pub fn verify_digest(object: &ResolvedObject, expected: &str) -> Result<()> {
    check_digest(compute_hash(&object.bytes), expected)
}

/// `verify_digest` with the hashing done on the blocking pool
pub async fn verify_digest_blocking(object: &ResolvedObject, expected: &str) -> Result<()> {
    let actual = compute_hash_blocking(object.bytes.clone()).await?;
    check_digest(actual, expected)
}

/// Hex digests compare case-insensitively
fn check_digest(actual: String, expected: &str) -> Result<()> {
    if !actual.eq_ignore_ascii_case(expected) {
        return Err(TransferError::IntegrityMismatch {
            expected: expected.to_string(),
            actual,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner;
    use chrono::Utc;

    fn metadata(size: u64) -> ObjectMetadata {
        ObjectMetadata {
            name: "clip.mp4".to_string(),
            mime_type: "video/mp4".to_string(),
            size,
            last_modified: Utc::now(),
        }
    }

    fn id() -> ObjectId {
        ObjectId::parse("clip").unwrap()
    }

    #[test]
    fn test_concatenates_in_order() {
        let chunks = vec![
            Bytes::from_static(b"Hello, "),
            Bytes::from_static(b"World"),
            Bytes::from_static(b"!"),
        ];
        let object = reconstruct(id(), chunks, metadata(13)).unwrap();
        assert_eq!(object.bytes, Bytes::from_static(b"Hello, World!"));
        assert_eq!(object.metadata.name, "clip.mp4");
        assert_eq!(object.size(), 13);
    }

    #[test]
    fn test_short_total_is_size_mismatch() {
        let chunks = vec![Bytes::from_static(b"abc"), Bytes::from_static(b"de")];
        assert_eq!(
            reconstruct(id(), chunks, metadata(6)),
            Err(TransferError::SizeMismatch { expected: 6, actual: 5 })
        );
    }

    #[test]
    fn test_long_total_is_size_mismatch() {
        let chunks = vec![Bytes::from_static(b"abcdefg")];
        assert!(matches!(
            reconstruct(id(), chunks, metadata(6)),
            Err(TransferError::SizeMismatch { expected: 6, actual: 7 })
        ));
    }

    #[test]
    fn test_forty_nine_of_fifty_mib() {
        const MIB: usize = 1024 * 1024;
        let chunks = vec![
            Bytes::from(vec![0u8; 16 * MIB]),
            Bytes::from(vec![0u8; 16 * MIB]),
            Bytes::from(vec![0u8; 16 * MIB]),
            Bytes::from(vec![0u8; MIB]),
        ];
        assert!(matches!(
            reconstruct(id(), chunks, metadata(50 * MIB as u64)),
            Err(TransferError::SizeMismatch { .. })
        ));
    }

    #[test]
    fn test_empty_object() {
        let object = reconstruct(id(), vec![Bytes::new()], metadata(0)).unwrap();
        assert!(object.bytes.is_empty());
        let object = reconstruct(id(), Vec::new(), metadata(0)).unwrap();
        assert!(object.bytes.is_empty());
    }

    #[test]
    fn test_round_trip_through_planner() {
        let data = Bytes::from((0..1000u32).map(|i| (i * 7 % 256) as u8).collect::<Vec<u8>>());
        for chunk_size in [1u64, 3, 64, 999, 1000, 1001] {
            let plan = planner::chunked(data.len() as u64, chunk_size).unwrap();
            let parts = planner::split(&data, &plan).unwrap();
            let object = reconstruct(id(), parts, metadata(1000)).unwrap();
            assert_eq!(object.bytes, data, "chunk size {}", chunk_size);
        }
    }

    #[test]
    fn test_verify_digest() {
        let object = reconstruct(id(), vec![Bytes::from_static(b"abc")], metadata(3)).unwrap();
        let good = compute_hash(b"abc");
        assert!(verify_digest(&object, &good).is_ok());
        assert!(verify_digest(&object, &good.to_uppercase()).is_ok());
        assert!(matches!(
            verify_digest(&object, &compute_hash(b"abd")),
            Err(TransferError::IntegrityMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_verify_digest_blocking_agrees() {
        let object = reconstruct(id(), vec![Bytes::from_static(b"abc")], metadata(3)).unwrap();
        let good = compute_hash(b"abc");

        assert!(verify_digest_blocking(&object, &good.to_uppercase()).await.is_ok());
        assert_eq!(
            verify_digest_blocking(&object, "00").await,
            verify_digest(&object, "00")
        );
    }
}
