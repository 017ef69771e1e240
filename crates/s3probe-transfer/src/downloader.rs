//! Ranged download and verification: backend → Decryptor → checksum compare

use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use s3probe_chunks::{byte_ranges, ChecksumSet};
use s3probe_core::{ProbeError, ProbeResult, MIB};
use s3probe_crypto::Decryptor;
use s3probe_storage::Backend;

use crate::telemetry::PhaseTelemetry;
use crate::uploader::UploadReport;
use crate::{ProgressFn, PARTS_TARGET};

#[derive(Debug)]
pub struct DownloadReport {
    pub checksums: ChecksumSet,
    pub plaintext_size: u64,
    pub elapsed: Duration,
}

/// Download the object described by `uploaded` in ranges of exactly one
/// uploaded part each, decrypt it, and compare every checksum against the
/// upload side.
pub async fn download_and_verify(
    backend: &Backend,
    uploaded: &UploadReport,
    telemetry: &mut PhaseTelemetry,
    cancel: &CancellationToken,
    progress: Option<&ProgressFn>,
) -> ProbeResult<DownloadReport> {
    tracing::info!(key = %uploaded.key, "DOWNLOAD: downloading file for validation");
    let url = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(ProbeError::Cancelled),
        url = backend.storage.get_object_download_url(&uploaded.bucket, &uploaded.key) => url?,
    };

    let window = usize::try_from(uploaded.part_size).map_err(|_| {
        ProbeError::config(format!("part size {} too large", uploaded.part_size))
    })?;
    let ranges = byte_ranges(uploaded.encrypted_size, uploaded.part_size);
    let parts_total = ranges.len();
    let mut decryptor = Decryptor::new(&uploaded.secret, window);

    let start = Instant::now();
    let mut bytes_done = 0u64;
    for (i, range) in ranges.into_iter().enumerate() {
        let part_number = i as u32 + 1;
        tracing::debug!(target: PARTS_TARGET, part = part_number, range = %range.header_value(), "DOWNLOAD: requesting part");
        let part_start = Instant::now();

        let bytes = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ProbeError::Cancelled),
            bytes = backend.transport.get_range(&url, range) => bytes?,
        };
        if bytes.len() as u64 != range.len() {
            return Err(ProbeError::storage(format!(
                "short read for part {part_number} ({range}): got {} of {} bytes",
                bytes.len(),
                range.len()
            )));
        }
        decryptor.process_part(&bytes)?;

        let sample = telemetry.record(part_number, range.len(), part_start.elapsed());
        bytes_done += range.len();
        tracing::info!(
            target: PARTS_TARGET,
            part = part_number,
            parts = parts_total,
            mib_per_sec = %format!("{:.2}", sample.mib_per_sec()),
            "DOWNLOAD: processed part"
        );
        if let Some(cb) = progress {
            cb(bytes_done, uploaded.encrypted_size, "download");
        }
    }

    let decrypted = decryptor.finish()?;
    let elapsed = start.elapsed();
    tracing::info!(
        mib = %format!("{:.2}", uploaded.encrypted_size as f64 / MIB as f64),
        secs = %format!("{:.2}", elapsed.as_secs_f64()),
        "DOWNLOAD: downloaded encrypted file"
    );

    if decrypted.plaintext_size != uploaded.plaintext_size {
        return Err(ProbeError::SizeMismatch {
            what: "decrypted plaintext".into(),
            expected: uploaded.plaintext_size,
            actual: decrypted.plaintext_size,
        });
    }
    uploaded.checksums.verify(&decrypted.checksums)?;
    tracing::info!(key = %uploaded.key, "DOWNLOAD: successfully validated checksums");

    Ok(DownloadReport {
        checksums: decrypted.checksums,
        plaintext_size: decrypted.plaintext_size,
        elapsed,
    })
}
