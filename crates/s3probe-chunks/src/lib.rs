//! s3probe-chunks: the plain-byte side of the transfer pipeline
//!
//! # Overview
//! - `checksum`: plaintext SHA-256 plus per-part MD5/SHA-256 of the ciphertext
//! - `segments`: fixed-size segment splitting with a trailing remainder
//! - `parts`: part-size adaptation, part counts, and byte-range planning
//! - `reader`: chunked reads of the local input file

pub mod checksum;
pub mod parts;
pub mod reader;
pub mod segments;

pub use checksum::{md5_hex, sha256_hex, ChecksumAccumulator, ChecksumSet};
pub use parts::{
    adjust_part_size, byte_ranges, part_count, MAX_PART_COUNT, MAX_PART_SIZE, MIN_PART_SIZE,
};
pub use reader::{input_size, read_chunks, FileChunks};
pub use segments::split_segments;
