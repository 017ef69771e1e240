//! Chunked encrypted upload: file → Encryptor → multipart transaction

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use s3probe_chunks::{input_size, part_count, read_chunks, ChecksumSet};
use s3probe_core::{ProbeError, ProbeResult, MIB};
use s3probe_crypto::{encrypted_size, Encryptor, FileSecret};
use s3probe_storage::{Backend, MultipartUpload};

use crate::telemetry::PhaseTelemetry;
use crate::{ProgressFn, PARTS_TARGET};

/// What to upload, and where
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub input: PathBuf,
    pub bucket: String,
    pub key: String,
    /// Negotiated part size in bytes (already adjusted)
    pub part_size: u64,
}

/// Everything the download side needs to verify the upload
#[derive(Debug)]
pub struct UploadReport {
    pub bucket: String,
    pub key: String,
    pub part_size: u64,
    pub part_count: u64,
    pub plaintext_size: u64,
    pub encrypted_size: u64,
    pub secret: FileSecret,
    pub checksums: ChecksumSet,
    pub elapsed: Duration,
}

/// Encrypt `req.input` on the fly and upload it as one multipart object.
///
/// Any failure after the upload was started, cancellation included, aborts
/// the multipart upload before the error is returned.
pub async fn upload_file(
    backend: &Backend,
    req: &UploadRequest,
    telemetry: &mut PhaseTelemetry,
    cancel: &CancellationToken,
    progress: Option<&ProgressFn>,
) -> ProbeResult<UploadReport> {
    let plaintext_size = input_size(&req.input)?;
    let expected_size = encrypted_size(plaintext_size);
    let parts_total = part_count(expected_size, req.part_size);
    let chunk_size = usize::try_from(req.part_size)
        .map_err(|_| ProbeError::config(format!("part size {} too large", req.part_size)))?;
    let chunks = read_chunks(&req.input, chunk_size)?;

    let start = Instant::now();
    let mut upload = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(ProbeError::Cancelled),
        upload = MultipartUpload::begin(backend, &req.bucket, &req.key, req.part_size, expected_size) => upload?,
    };
    tracing::info!(key = %req.key, parts = parts_total, "UPLOAD: initialized file upload");

    let mut encryptor = Encryptor::new(chunk_size);
    let mut bytes_done = 0u64;
    let mut part_number = 0u32;
    for part in encryptor.process(chunks) {
        let part = match part {
            Ok(part) => part,
            Err(e) => return Err(upload.abort(e).await),
        };
        part_number += 1;
        let len = part.len() as u64;
        let part_start = Instant::now();

        let sent = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ProbeError::Cancelled),
            sent = upload.send_part(part_number, part) => sent,
        };
        if let Err(e) = sent {
            return Err(upload.abort(e).await);
        }

        let sample = telemetry.record(part_number, len, part_start.elapsed());
        bytes_done += len;
        tracing::info!(
            target: PARTS_TARGET,
            part = part_number,
            parts = parts_total,
            mib_per_sec = %format!("{:.2}", sample.mib_per_sec()),
            "UPLOAD: processed part"
        );
        if let Some(cb) = progress {
            cb(bytes_done, expected_size, "upload");
        }
    }

    let report = encryptor.finish();
    if report.encrypted_size != expected_size {
        let err = ProbeError::SizeMismatch {
            what: "encrypted stream".into(),
            expected: expected_size,
            actual: report.encrypted_size,
        };
        return Err(upload.abort(err).await);
    }
    if cancel.is_cancelled() {
        return Err(upload.abort(ProbeError::Cancelled).await);
    }
    upload.complete().await?;

    let stored = backend.storage.object_size(&req.bucket, &req.key).await?;
    if stored != expected_size {
        return Err(ProbeError::SizeMismatch {
            what: format!("stored object {}", req.key),
            expected: expected_size,
            actual: stored,
        });
    }

    let elapsed = start.elapsed();
    tracing::info!(
        key = %req.key,
        mib = %format!("{:.2}", expected_size as f64 / MIB as f64),
        secs = %format!("{:.2}", elapsed.as_secs_f64()),
        "UPLOAD: uploaded encrypted file"
    );

    Ok(UploadReport {
        bucket: req.bucket.clone(),
        key: req.key.clone(),
        part_size: req.part_size,
        part_count: parts_total,
        plaintext_size: report.plaintext_size,
        encrypted_size: report.encrypted_size,
        secret: report.secret,
        checksums: report.checksums,
        elapsed,
    })
}

impl UploadRequest {
    pub fn new(input: &Path, bucket: &str, key: &str, part_size: u64) -> Self {
        Self {
            input: input.to_path_buf(),
            bucket: bucket.to_string(),
            key: key.to_string(),
            part_size,
        }
    }
}
