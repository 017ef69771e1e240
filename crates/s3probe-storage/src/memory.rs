//! In-memory storage backend
//!
//! Implements both [`ObjectStorage`] and [`Transport`] against a
//! mutex-guarded map, hands out `memory://` URLs that only it can resolve,
//! counts every call, and can inject failures. Used by the test suites and by
//! `s3probe run --dry-run`.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use md5::{Digest, Md5};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use s3probe_core::{ByteRange, ProbeError, ProbeResult};

use crate::backend::{verify_part_layout, Backend, ObjectStorage, PartInfo, PendingUpload, Transport};

/// Number of calls that reached the backend, per operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub init: usize,
    pub part_urls: usize,
    pub part_puts: usize,
    pub complete: usize,
    pub abort: usize,
    pub range_gets: usize,
}

#[derive(Debug)]
struct Upload {
    bucket: String,
    key: String,
    parts: BTreeMap<u32, Bytes>,
}

#[derive(Debug, Clone)]
enum UrlTarget {
    Part { upload_id: String, part_number: u32 },
    Object { bucket: String, key: String },
}

#[derive(Debug, Default)]
struct State {
    buckets: HashSet<String>,
    objects: HashMap<(String, String), Bytes>,
    uploads: HashMap<String, Upload>,
    urls: HashMap<String, UrlTarget>,
    counts: CallCounts,
    fail_on_part: Option<u32>,
    fail_on_complete: bool,
    abort_delay: Option<Duration>,
    next_upload: u64,
}

#[derive(Debug, Default)]
pub struct MemoryStorage {
    state: Mutex<State>,
}

fn etag(data: &[u8]) -> String {
    format!("\"{}\"", hex::encode(Md5::digest(data)))
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend with `bucket` already created
    pub fn with_bucket(bucket: &str) -> Self {
        let storage = Self::new();
        storage.lock().buckets.insert(bucket.to_string());
        storage
    }

    /// Pair this store with itself as transport
    pub fn backend(this: &Arc<Self>) -> Backend {
        Backend::new(this.clone(), this.clone())
    }

    // A panic while holding the lock cannot leave the maps half-updated in a
    // way later calls care about, so poisoning is ignored.
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make the upload of `part_number` fail at the transport
    pub fn fail_on_part(&self, part_number: u32) {
        self.lock().fail_on_part = Some(part_number);
    }

    /// Make every complete call fail
    pub fn fail_on_complete(&self) {
        self.lock().fail_on_complete = true;
    }

    /// Hold every abort call for `delay` before it reaches the store
    pub fn delay_aborts(&self, delay: Duration) {
        self.lock().abort_delay = Some(delay);
    }

    pub fn counts(&self) -> CallCounts {
        self.lock().counts
    }

    /// Uploads started but neither completed nor aborted
    pub fn dangling_uploads(&self) -> usize {
        self.lock().uploads.len()
    }

    /// Part URLs that still resolve
    pub fn live_part_urls(&self) -> usize {
        self.lock()
            .urls
            .values()
            .filter(|target| matches!(target, UrlTarget::Part { .. }))
            .count()
    }

    pub fn object(&self, bucket: &str, key: &str) -> Option<Bytes> {
        self.lock()
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    /// Flip one bit of a stored object
    pub fn corrupt_object(&self, bucket: &str, key: &str, offset: usize) -> ProbeResult<()> {
        let mut state = self.lock();
        let id = (bucket.to_string(), key.to_string());
        let data = state
            .objects
            .get(&id)
            .ok_or_else(|| ProbeError::storage(format!("NoSuchKey: {bucket}/{key}")))?;
        if offset >= data.len() {
            return Err(ProbeError::storage(format!(
                "offset {offset} beyond object of {} bytes",
                data.len()
            )));
        }
        let mut bytes = BytesMut::from(&data[..]);
        bytes[offset] ^= 0x01;
        state.objects.insert(id, bytes.freeze());
        Ok(())
    }

    fn register_url(state: &mut State, url: String, target: UrlTarget) -> String {
        state.urls.insert(url.clone(), target);
        url
    }

    /// Forget the part URLs handed out for `upload_id`
    fn drop_part_urls(state: &mut State, upload_id: &str) {
        state.urls.retain(|_, target| {
            !matches!(target, UrlTarget::Part { upload_id: id, .. } if id == upload_id)
        });
    }

    fn resolve(state: &State, url: &str) -> ProbeResult<UrlTarget> {
        state
            .urls
            .get(url)
            .cloned()
            .ok_or_else(|| ProbeError::storage(format!("unknown URL {url}")))
    }

    fn require_bucket(state: &State, bucket: &str) -> ProbeResult<()> {
        if state.buckets.contains(bucket) {
            Ok(())
        } else {
            Err(ProbeError::storage(format!("NoSuchBucket: {bucket}")))
        }
    }

    fn require_upload<'a>(
        state: &'a State,
        upload_id: &str,
        bucket: &str,
        key: &str,
    ) -> ProbeResult<&'a Upload> {
        match state.uploads.get(upload_id) {
            Some(upload) if upload.bucket == bucket && upload.key == key => Ok(upload),
            _ => Err(ProbeError::storage(format!("NoSuchUpload: {upload_id}"))),
        }
    }
}

#[async_trait]
impl ObjectStorage for MemoryStorage {
    async fn create_bucket(&self, bucket: &str) -> ProbeResult<()> {
        if !self.lock().buckets.insert(bucket.to_string()) {
            tracing::info!(bucket, "bucket already exists");
        }
        Ok(())
    }

    async fn init_multipart_upload(&self, bucket: &str, key: &str) -> ProbeResult<String> {
        let mut state = self.lock();
        state.counts.init += 1;
        Self::require_bucket(&state, bucket)?;
        state.next_upload += 1;
        let upload_id = format!("mem-upload-{}", state.next_upload);
        state.uploads.insert(
            upload_id.clone(),
            Upload {
                bucket: bucket.to_string(),
                key: key.to_string(),
                parts: BTreeMap::new(),
            },
        );
        Ok(upload_id)
    }

    async fn get_part_upload_url(
        &self,
        upload_id: &str,
        bucket: &str,
        key: &str,
        part_number: u32,
    ) -> ProbeResult<String> {
        let mut state = self.lock();
        state.counts.part_urls += 1;
        Self::require_upload(&state, upload_id, bucket, key)?;
        Ok(Self::register_url(
            &mut state,
            format!("memory://{bucket}/{key}?uploadId={upload_id}&partNumber={part_number}"),
            UrlTarget::Part {
                upload_id: upload_id.to_string(),
                part_number,
            },
        ))
    }

    async fn complete_multipart_upload(
        &self,
        upload_id: &str,
        bucket: &str,
        key: &str,
        part_count: u32,
        part_size: u64,
    ) -> ProbeResult<()> {
        let mut state = self.lock();
        state.counts.complete += 1;
        if state.fail_on_complete {
            return Err(ProbeError::storage("InternalError: injected complete failure"));
        }
        let upload = Self::require_upload(&state, upload_id, bucket, key)?;
        let listed: Vec<PartInfo> = upload
            .parts
            .iter()
            .map(|(n, data)| PartInfo {
                part_number: *n,
                size: data.len() as u64,
                etag: etag(data),
            })
            .collect();
        verify_part_layout(&listed, part_count, part_size)?;

        let mut object = BytesMut::new();
        for data in upload.parts.values() {
            object.extend_from_slice(data);
        }
        state.uploads.remove(upload_id);
        Self::drop_part_urls(&mut state, upload_id);
        state
            .objects
            .insert((bucket.to_string(), key.to_string()), object.freeze());
        Ok(())
    }

    async fn abort_multipart_upload(
        &self,
        upload_id: &str,
        bucket: &str,
        key: &str,
    ) -> ProbeResult<()> {
        let delay = self.lock().abort_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.lock();
        state.counts.abort += 1;
        Self::require_upload(&state, upload_id, bucket, key)?;
        state.uploads.remove(upload_id);
        Self::drop_part_urls(&mut state, upload_id);
        Ok(())
    }

    async fn get_object_download_url(&self, bucket: &str, key: &str) -> ProbeResult<String> {
        let mut state = self.lock();
        Self::require_bucket(&state, bucket)?;
        Ok(Self::register_url(
            &mut state,
            format!("memory://{bucket}/{key}"),
            UrlTarget::Object {
                bucket: bucket.to_string(),
                key: key.to_string(),
            },
        ))
    }

    async fn list_multipart_uploads(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> ProbeResult<Vec<PendingUpload>> {
        let state = self.lock();
        Self::require_bucket(&state, bucket)?;
        let mut pending: Vec<PendingUpload> = state
            .uploads
            .iter()
            .filter(|(_, u)| u.bucket == bucket && u.key.starts_with(prefix))
            .map(|(id, u)| PendingUpload {
                key: u.key.clone(),
                upload_id: id.clone(),
            })
            .collect();
        pending.sort_by(|a, b| a.upload_id.cmp(&b.upload_id));
        Ok(pending)
    }

    async fn object_size(&self, bucket: &str, key: &str) -> ProbeResult<u64> {
        self.object(bucket, key)
            .map(|data| data.len() as u64)
            .ok_or_else(|| ProbeError::storage(format!("NoSuchKey: {bucket}/{key}")))
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> ProbeResult<()> {
        self.lock()
            .objects
            .remove(&(bucket.to_string(), key.to_string()));
        Ok(())
    }

    async fn check_health(&self, bucket: &str) -> ProbeResult<()> {
        Self::require_bucket(&self.lock(), bucket)
    }
}

#[async_trait]
impl Transport for MemoryStorage {
    async fn put_part(&self, url: &str, body: Bytes) -> ProbeResult<()> {
        let mut state = self.lock();
        state.counts.part_puts += 1;
        let UrlTarget::Part {
            upload_id,
            part_number,
        } = Self::resolve(&state, url)?
        else {
            return Err(ProbeError::storage(format!("{url} is not a part URL")));
        };
        if state.fail_on_part == Some(part_number) {
            return Err(ProbeError::storage(format!(
                "injected transport failure on part {part_number}"
            )));
        }
        let upload = state
            .uploads
            .get_mut(&upload_id)
            .ok_or_else(|| ProbeError::storage(format!("NoSuchUpload: {upload_id}")))?;
        upload.parts.insert(part_number, body);
        Ok(())
    }

    async fn get_range(&self, url: &str, range: ByteRange) -> ProbeResult<Bytes> {
        let mut state = self.lock();
        state.counts.range_gets += 1;
        let UrlTarget::Object { bucket, key } = Self::resolve(&state, url)? else {
            return Err(ProbeError::storage(format!("{url} is not an object URL")));
        };
        let data = state
            .objects
            .get(&(bucket.clone(), key.clone()))
            .ok_or_else(|| ProbeError::storage(format!("NoSuchKey: {bucket}/{key}")))?;
        let len = data.len() as u64;
        if range.start >= len {
            return Err(ProbeError::storage(format!(
                "InvalidRange: {range} of {len} bytes"
            )));
        }
        let end = range.end.min(len - 1);
        Ok(data.slice(range.start as usize..=end as usize))
    }
}
