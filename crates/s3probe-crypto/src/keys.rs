//! Per-run file secret

use base64::{engine::general_purpose::STANDARD, Engine};
use rand::RngCore;
use zeroize::Zeroize;

use crate::KEY_SIZE;

/// A 256-bit symmetric file secret. Zeroized on drop.
#[derive(Clone)]
pub struct FileSecret {
    bytes: [u8; KEY_SIZE],
}

impl FileSecret {
    /// Generate a fresh random secret
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self { bytes }
    }

    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }

    /// Standard base64 encoding, as printed in the run summary
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.bytes)
    }
}

impl Drop for FileSecret {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for FileSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSecret")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_secrets_differ() {
        let a = FileSecret::generate();
        let b = FileSecret::generate();
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn debug_is_redacted() {
        let secret = FileSecret::from_bytes([0x42; KEY_SIZE]);
        let dbg = format!("{secret:?}");
        assert!(dbg.contains("REDACTED"));
        assert!(!dbg.contains("66"));
    }

    #[test]
    fn base64_encoding() {
        let secret = FileSecret::from_bytes([0u8; KEY_SIZE]);
        assert_eq!(
            secret.to_base64(),
            "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA="
        );
    }
}
