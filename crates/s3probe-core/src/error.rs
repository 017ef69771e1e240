use thiserror::Error;

pub type ProbeResult<T> = Result<T, ProbeError>;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("config error: {0}")]
    Config(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("transfer cancelled")]
    Cancelled,

    #[error("encryption error: {0}")]
    Crypto(String),

    #[error("decryption failed: {0}")]
    Decryption(String),

    #[error("size mismatch for {what}: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        what: String,
        expected: u64,
        actual: u64,
    },

    #[error("checksum mismatch ({field}):\nupload:\n{upload}\ndownload:\n{download}")]
    ChecksumMismatch {
        field: String,
        upload: String,
        download: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Coarse error taxonomy used for reporting and exit handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Bad configuration or input; the run never started
    Config,
    /// Backend or local I/O failure, including cancellation
    Io,
    /// AEAD failure while encrypting
    Crypto,
    /// The data that came back is not the data that went up
    Integrity,
}

impl ProbeError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ProbeError::Config(_) => ErrorClass::Config,
            ProbeError::Storage(_)
            | ProbeError::Cancelled
            | ProbeError::Io(_)
            | ProbeError::Other(_) => ErrorClass::Io,
            ProbeError::Crypto(_) => ErrorClass::Crypto,
            ProbeError::Decryption(_)
            | ProbeError::SizeMismatch { .. }
            | ProbeError::ChecksumMismatch { .. } => ErrorClass::Integrity,
        }
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        ProbeError::Storage(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        ProbeError::Config(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classes() {
        assert_eq!(ProbeError::config("x").class(), ErrorClass::Config);
        assert_eq!(ProbeError::storage("x").class(), ErrorClass::Io);
        assert_eq!(ProbeError::Cancelled.class(), ErrorClass::Io);
        assert_eq!(ProbeError::Crypto("x".into()).class(), ErrorClass::Crypto);
        assert_eq!(
            ProbeError::Decryption("x".into()).class(),
            ErrorClass::Integrity
        );
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert_eq!(ProbeError::from(io).class(), ErrorClass::Io);
    }

    #[test]
    fn test_checksum_mismatch_message_carries_both_sets() {
        let err = ProbeError::ChecksumMismatch {
            field: "plaintext sha256".into(),
            upload: "aaa".into(),
            download: "bbb".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("plaintext sha256"));
        assert!(msg.contains("aaa"));
        assert!(msg.contains("bbb"));
    }
}
