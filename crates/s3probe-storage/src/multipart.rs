//! Multipart upload transaction
//!
//! `MultipartUpload` owns one upload id from `begin` until the upload is
//! completed or aborted. Every failure path aborts before handing the
//! original error back; dropping an upload that is still in progress spawns
//! a best-effort abort on the current Tokio runtime.

use bytes::Bytes;

use s3probe_core::{ProbeError, ProbeResult, UploadState};

use crate::backend::Backend;

pub struct MultipartUpload {
    backend: Backend,
    bucket: String,
    key: String,
    upload_id: String,
    part_size: u64,
    expected_parts: u32,
    sent_parts: u32,
    state: UploadState,
}

impl MultipartUpload {
    /// Start an upload of `expected_size` bytes in `part_size` parts. A
    /// failure here leaves nothing behind to clean up.
    pub async fn begin(
        backend: &Backend,
        bucket: &str,
        key: &str,
        part_size: u64,
        expected_size: u64,
    ) -> ProbeResult<Self> {
        if part_size == 0 {
            return Err(ProbeError::config("part size must be positive"));
        }
        let expected_parts = u32::try_from(expected_size.div_ceil(part_size)).map_err(|_| {
            ProbeError::config(format!(
                "{expected_size} bytes in {part_size}-byte parts needs too many parts"
            ))
        })?;

        let upload_id = backend.storage.init_multipart_upload(bucket, key).await?;
        tracing::info!(bucket, key, upload_id = %upload_id, expected_parts, "multipart upload initialized");

        Ok(Self {
            backend: backend.clone(),
            bucket: bucket.to_string(),
            key: key.to_string(),
            upload_id,
            part_size,
            expected_parts,
            sent_parts: 0,
            state: UploadState::InProgress,
        })
    }

    pub fn upload_id(&self) -> &str {
        &self.upload_id
    }

    pub fn state(&self) -> UploadState {
        self.state
    }

    pub fn expected_parts(&self) -> u32 {
        self.expected_parts
    }

    pub fn sent_parts(&self) -> u32 {
        self.sent_parts
    }

    /// Send the next part. Parts must arrive as 1, 2, 3, ...; any failure
    /// aborts the upload before the error is returned.
    pub async fn send_part(&mut self, part_number: u32, body: Bytes) -> ProbeResult<()> {
        if self.state != UploadState::InProgress {
            return Err(ProbeError::storage(format!(
                "upload {} is {:?}, cannot send part {part_number}",
                self.upload_id, self.state
            )));
        }
        if part_number != self.sent_parts + 1 {
            let err = ProbeError::storage(format!(
                "part {part_number} sent out of order, expected part {}",
                self.sent_parts + 1
            ));
            return Err(self.abort_in_place(err).await);
        }

        let url = match self
            .backend
            .storage
            .get_part_upload_url(&self.upload_id, &self.bucket, &self.key, part_number)
            .await
        {
            Ok(url) => url,
            Err(e) => return Err(self.abort_in_place(e).await),
        };
        if let Err(e) = self.backend.transport.put_part(&url, body).await {
            return Err(self.abort_in_place(e).await);
        }

        self.sent_parts = part_number;
        Ok(())
    }

    /// Complete the upload. The number of parts sent must equal the number
    /// announced at `begin`; the backend then checks the layout itself.
    pub async fn complete(mut self) -> ProbeResult<()> {
        if self.state != UploadState::InProgress {
            return Err(ProbeError::storage(format!(
                "upload {} is {:?}, cannot complete",
                self.upload_id, self.state
            )));
        }
        if self.sent_parts != self.expected_parts {
            let err = ProbeError::storage(format!(
                "sent {} parts, expected {}",
                self.sent_parts, self.expected_parts
            ));
            return Err(self.abort_in_place(err).await);
        }

        // Marked terminal while the call is in flight so a drop mid-call
        // does not race it with a background abort.
        self.state = UploadState::Completed;
        let result = self
            .backend
            .storage
            .complete_multipart_upload(
                &self.upload_id,
                &self.bucket,
                &self.key,
                self.expected_parts,
                self.part_size,
            )
            .await;
        match result {
            Ok(()) => {
                tracing::info!(upload_id = %self.upload_id, parts = self.sent_parts, "multipart upload completed");
                Ok(())
            }
            Err(e) => {
                self.state = UploadState::InProgress;
                Err(self.abort_in_place(e).await)
            }
        }
    }

    /// Abort the upload and hand back `err`. Abort failures are logged.
    pub async fn abort(mut self, err: ProbeError) -> ProbeError {
        self.abort_in_place(err).await
    }

    async fn abort_in_place(&mut self, err: ProbeError) -> ProbeError {
        if self.state != UploadState::InProgress {
            return err;
        }
        tracing::warn!(upload_id = %self.upload_id, error = %err, "aborting multipart upload");
        // Stays in progress until the call returns, so a drop mid-call still
        // aborts from `Drop`.
        let result = self
            .backend
            .storage
            .abort_multipart_upload(&self.upload_id, &self.bucket, &self.key)
            .await;
        self.state = UploadState::Aborted;
        if let Err(abort_err) = result {
            tracing::error!(
                upload_id = %self.upload_id,
                error = %abort_err,
                "abort failed; the upload may be left dangling"
            );
        }
        err
    }
}

impl std::fmt::Debug for MultipartUpload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultipartUpload")
            .field("bucket", &self.bucket)
            .field("key", &self.key)
            .field("upload_id", &self.upload_id)
            .field("sent_parts", &self.sent_parts)
            .field("expected_parts", &self.expected_parts)
            .field("state", &self.state)
            .finish()
    }
}

impl Drop for MultipartUpload {
    fn drop(&mut self) {
        if self.state != UploadState::InProgress {
            return;
        }
        self.state = UploadState::Aborted;
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::error!(
                upload_id = %self.upload_id,
                "multipart upload dropped outside a runtime; it is left dangling"
            );
            return;
        };
        tracing::warn!(upload_id = %self.upload_id, "multipart upload dropped in progress, aborting");
        let storage = self.backend.storage.clone();
        let (upload_id, bucket, key) = (
            std::mem::take(&mut self.upload_id),
            std::mem::take(&mut self.bucket),
            std::mem::take(&mut self.key),
        );
        handle.spawn(async move {
            if let Err(e) = storage
                .abort_multipart_upload(&upload_id, &bucket, &key)
                .await
            {
                tracing::error!(upload_id = %upload_id, error = %e, "background abort failed");
            }
        });
    }
}
