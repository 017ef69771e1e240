//! s3probe-transfer: chunked encrypted upload, ranged download, and the
//! end-to-end validation run tying them together.
//!
//! A run is: negotiate a part size, upload the file encrypted through one
//! multipart transaction, download it again range by range, decrypt, and
//! compare checksums. Every step reports through `tracing`; per-part events
//! use the [`PARTS_TARGET`] target so they can be filtered separately.

pub mod downloader;
pub mod summary;
pub mod telemetry;
pub mod uploader;

use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio_util::sync::CancellationToken;

use s3probe_chunks::{adjust_part_size, input_size};
use s3probe_core::config::ProbeConfig;
use s3probe_core::ProbeResult;
use s3probe_storage::Backend;

pub use downloader::{download_and_verify, DownloadReport};
pub use summary::RunSummary;
pub use telemetry::{PartSample, PhaseStats, PhaseTelemetry, RunTelemetry};
pub use uploader::{upload_file, UploadReport, UploadRequest};

/// Progress callback: (bytes done, bytes total, phase)
pub type ProgressFn = Box<dyn Fn(u64, u64, &str) + Send + Sync>;

/// Tracing target of per-part events
pub const PARTS_TARGET: &str = "s3probe::parts";

/// Inputs of one validation run
#[derive(Debug, Clone)]
pub struct ValidationOptions {
    pub input: PathBuf,
    pub bucket: String,
    pub object_prefix: String,
    pub part_size_mib: u64,
    pub create_bucket: bool,
    pub delete_after: bool,
}

impl ValidationOptions {
    pub fn from_config(config: &ProbeConfig, input: &Path) -> Self {
        Self {
            input: input.to_path_buf(),
            bucket: config.storage.bucket.clone(),
            object_prefix: config.transfer.object_prefix.clone(),
            part_size_mib: config.transfer.part_size_mib,
            create_bucket: false,
            delete_after: config.transfer.delete_after_validation,
        }
    }

    /// Part size in bytes for an input of `plaintext_size` bytes. The part
    /// ceiling already leaves room for encryption growth.
    pub fn part_size_for(&self, plaintext_size: u64) -> ProbeResult<u64> {
        adjust_part_size(self.part_size_mib, plaintext_size)
    }
}

/// Upload `opts.input` encrypted, download it back, and verify it.
///
/// Configuration problems are reported before anything touches the
/// backend. On success the returned summary carries the timings and the
/// file secret; any failure is returned as the first error hit.
pub async fn run_validation(
    backend: &Backend,
    opts: &ValidationOptions,
    cancel: &CancellationToken,
    progress: Option<&ProgressFn>,
) -> ProbeResult<RunSummary> {
    let start = Instant::now();
    let plaintext_size = input_size(&opts.input)?;
    let part_size = opts.part_size_for(plaintext_size)?;

    if opts.create_bucket {
        backend.storage.create_bucket(&opts.bucket).await?;
    }

    let key = format!("{}{}", opts.object_prefix, uuid::Uuid::new_v4());
    tracing::info!(
        input = %opts.input.display(),
        bucket = %opts.bucket,
        key = %key,
        part_size,
        "starting validation run"
    );

    let mut telemetry = RunTelemetry::default();
    let request = UploadRequest::new(&opts.input, &opts.bucket, &key, part_size);
    let uploaded = upload_file(backend, &request, &mut telemetry.upload, cancel, progress).await?;
    download_and_verify(backend, &uploaded, &mut telemetry.download, cancel, progress).await?;

    let pending = backend
        .storage
        .list_multipart_uploads(&opts.bucket, &key)
        .await?;
    for upload in &pending {
        tracing::warn!(key = %upload.key, upload_id = %upload.upload_id, "dangling multipart upload");
    }

    let mut object_deleted = false;
    if opts.delete_after {
        backend.storage.delete_object(&opts.bucket, &key).await?;
        tracing::info!(key = %key, "deleted validation object");
        object_deleted = true;
    }

    let mut summary = RunSummary::new(start.elapsed(), &opts.input, &uploaded, &telemetry);
    summary.dangling_uploads = pending.len();
    summary.object_deleted = object_deleted;
    Ok(summary)
}
