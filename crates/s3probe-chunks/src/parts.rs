//! Upload part sizing and ranged-read planning

use s3probe_core::{ByteRange, ProbeError, ProbeResult, MIB};

/// Smallest part size S3 accepts for non-final parts
pub const MIN_PART_SIZE: u64 = 5 * MIB;
/// Largest part size S3 accepts
pub const MAX_PART_SIZE: u64 = 5 * 1024 * MIB;
/// Part-count ceiling; five below the S3 limit of 10000 to leave room for
/// the growth encryption adds
pub const MAX_PART_COUNT: u64 = 9_995;

/// Part sizes tried, smallest first, when the requested size needs too many parts
const CANDIDATE_SIZES_MIB: [u64; 10] = [8, 16, 32, 64, 128, 256, 512, 1024, 2048, 4096];

/// Turn a requested part size (MiB) into a usable one (bytes) for a file of
/// `file_size` bytes.
///
/// The request is clamped to [5 MiB, 5 GiB]. If the file would still need
/// more than [`MAX_PART_COUNT`] parts, the smallest candidate larger than the
/// clamped size that fits is chosen.
pub fn adjust_part_size(requested_mib: u64, file_size: u64) -> ProbeResult<u64> {
    let mut part_size = requested_mib
        .saturating_mul(MIB)
        .clamp(MIN_PART_SIZE, MAX_PART_SIZE);

    if file_size > MAX_PART_COUNT * part_size {
        part_size = CANDIDATE_SIZES_MIB
            .iter()
            .map(|mib| mib * MIB)
            .find(|&candidate| candidate > part_size && file_size <= MAX_PART_COUNT * candidate)
            .ok_or_else(|| {
                ProbeError::config(format!(
                    "no part size lets {file_size} bytes upload in at most {MAX_PART_COUNT} parts"
                ))
            })?;
    }

    if part_size != requested_mib.saturating_mul(MIB) {
        tracing::info!(
            requested_mib,
            adjusted_mib = part_size / MIB,
            "part size was adjusted"
        );
    }
    Ok(part_size)
}

/// Number of parts needed to cover `total` bytes
pub fn part_count(total: u64, part_size: u64) -> u64 {
    total.div_ceil(part_size)
}

/// Inclusive byte ranges covering `[0, total)` in windows of `window` bytes.
/// The last range is truncated; `total == 0` yields no ranges.
///
/// # Panics
/// Panics if `window` is zero.
pub fn byte_ranges(total: u64, window: u64) -> Vec<ByteRange> {
    assert!(window > 0, "range window must be positive");
    (0..total)
        .step_by(window as usize)
        .map(|start| ByteRange::new(start, (start + window).min(total) - 1))
        .collect()
}
