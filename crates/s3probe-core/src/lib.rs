pub mod config;
pub mod error;
pub mod types;

pub use error::{ErrorClass, ProbeError, ProbeResult};
pub use types::{ByteRange, UploadState};

/// Bytes per MiB, the unit part sizes are configured in
pub const MIB: u64 = 1024 * 1024;
