//! Storage seams: the multipart control plane and the byte transport

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

use s3probe_core::{ByteRange, ProbeError, ProbeResult};

/// One uploaded part as reported by the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartInfo {
    pub part_number: u32,
    pub size: u64,
    pub etag: String,
}

/// A multipart upload that was started but neither completed nor aborted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingUpload {
    pub key: String,
    pub upload_id: String,
}

/// Multipart control plane of an S3-compatible store.
///
/// Part bytes never pass through this trait: it hands out URLs and a
/// [`Transport`] moves the data.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn create_bucket(&self, bucket: &str) -> ProbeResult<()>;

    /// Start a multipart upload and return its upload id
    async fn init_multipart_upload(&self, bucket: &str, key: &str) -> ProbeResult<String>;

    async fn get_part_upload_url(
        &self,
        upload_id: &str,
        bucket: &str,
        key: &str,
        part_number: u32,
    ) -> ProbeResult<String>;

    /// Assemble the object. The backend checks that exactly `part_count`
    /// parts arrived and that all but the last are `part_size` bytes.
    async fn complete_multipart_upload(
        &self,
        upload_id: &str,
        bucket: &str,
        key: &str,
        part_count: u32,
        part_size: u64,
    ) -> ProbeResult<()>;

    async fn abort_multipart_upload(
        &self,
        upload_id: &str,
        bucket: &str,
        key: &str,
    ) -> ProbeResult<()>;

    async fn get_object_download_url(&self, bucket: &str, key: &str) -> ProbeResult<String>;

    /// Uploads still in progress whose key starts with `prefix`
    async fn list_multipart_uploads(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> ProbeResult<Vec<PendingUpload>>;

    async fn object_size(&self, bucket: &str, key: &str) -> ProbeResult<u64>;

    async fn delete_object(&self, bucket: &str, key: &str) -> ProbeResult<()>;

    async fn check_health(&self, bucket: &str) -> ProbeResult<()>;
}

/// Moves bytes to and from URLs handed out by an [`ObjectStorage`]
#[async_trait]
pub trait Transport: Send + Sync {
    async fn put_part(&self, url: &str, body: Bytes) -> ProbeResult<()>;

    async fn get_range(&self, url: &str, range: ByteRange) -> ProbeResult<Bytes>;
}

/// A control plane paired with the transport that can reach its URLs
#[derive(Clone)]
pub struct Backend {
    pub storage: Arc<dyn ObjectStorage>,
    pub transport: Arc<dyn Transport>,
}

impl Backend {
    pub fn new(storage: Arc<dyn ObjectStorage>, transport: Arc<dyn Transport>) -> Self {
        Self { storage, transport }
    }
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backend").finish_non_exhaustive()
    }
}

/// Check an uploaded part list against the layout the uploader promised:
/// parts 1..=part_count, each `part_size` bytes except a non-empty last part
/// of at most `part_size`.
pub fn verify_part_layout(parts: &[PartInfo], part_count: u32, part_size: u64) -> ProbeResult<()> {
    if parts.len() != part_count as usize {
        return Err(ProbeError::storage(format!(
            "expected {part_count} uploaded parts, backend has {}",
            parts.len()
        )));
    }
    for (i, part) in parts.iter().enumerate() {
        let expected_number = i as u32 + 1;
        if part.part_number != expected_number {
            return Err(ProbeError::storage(format!(
                "part {expected_number} missing (found part {} in its place)",
                part.part_number
            )));
        }
        let is_last = expected_number == part_count;
        let size_ok = if is_last {
            part.size > 0 && part.size <= part_size
        } else {
            part.size == part_size
        };
        if !size_ok {
            return Err(ProbeError::storage(format!(
                "part {} has {} bytes, expected {}{}",
                part.part_number,
                part.size,
                if is_last { "at most " } else { "" },
                part_size
            )));
        }
    }
    Ok(())
}
