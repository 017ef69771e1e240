use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of one multipart upload transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UploadState {
    /// No upload id requested yet
    NotStarted,
    /// Upload id issued, parts may be sent
    InProgress,
    /// Backend assembled the object
    Completed,
    /// Backend discarded all parts
    Aborted,
}

impl UploadState {
    pub fn is_terminal(self) -> bool {
        matches!(self, UploadState::Completed | UploadState::Aborted)
    }
}

/// An inclusive byte range, as sent in an HTTP `Range` header.
///
/// Ranges built with [`ByteRange::new`] always have `start <= end`. A value
/// assembled field by field that breaks this is treated as empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    /// # Panics
    /// Panics if `end < start`.
    pub fn new(start: u64, end: u64) -> Self {
        assert!(end >= start, "byte range {start}-{end} ends before it starts");
        Self { start, end }
    }

    /// Number of bytes covered
    pub fn len(&self) -> u64 {
        self.end.checked_sub(self.start).map_or(0, |d| d.saturating_add(1))
    }

    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }

    /// Value for the `Range` request header
    pub fn header_value(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

impl From<(u64, u64)> for ByteRange {
    fn from((start, end): (u64, u64)) -> Self {
        Self::new(start, end)
    }
}
