//! s3probe-crypto: segment encryption for the upload/download pipeline
//!
//! Ciphertext layout, one cipher segment per plaintext segment:
//! ```text
//! [12 bytes: random nonce][N bytes: ChaCha20-Poly1305 ciphertext][16 bytes: tag]
//! ```
//! N is `SEGMENT_SIZE` for every segment but the last, which may be shorter.
//! No AAD is bound; the key is the per-run file secret.
//!
//! The `Encryptor` turns a plaintext chunk stream into fixed-size upload
//! parts; the `Decryptor` reverses that from downloaded parts.

pub mod keys;
pub mod segment;
pub mod stream;

pub use keys::FileSecret;
pub use segment::{decrypt_segment, encrypt_segment};
pub use stream::{Decrypted, Decryptor, EncryptedParts, EncryptionReport, Encryptor};

/// Size of the file secret in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Plaintext bytes per segment
pub const SEGMENT_SIZE: usize = 65_536;

/// Size of a ChaCha20-Poly1305 (IETF) nonce
pub const NONCE_SIZE: usize = 12;

/// Size of a Poly1305 authentication tag
pub const TAG_SIZE: usize = 16;

/// Bytes added to every segment by encryption
pub const SEGMENT_OVERHEAD: usize = NONCE_SIZE + TAG_SIZE;

/// Size of a full cipher segment
pub const CIPHER_SEGMENT_SIZE: usize = SEGMENT_SIZE + SEGMENT_OVERHEAD;

/// Ciphertext size for `plaintext_size` bytes of plaintext
pub fn encrypted_size(plaintext_size: u64) -> u64 {
    let segments = plaintext_size.div_ceil(SEGMENT_SIZE as u64);
    plaintext_size + segments * SEGMENT_OVERHEAD as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constants_are_consistent() {
        assert_eq!(SEGMENT_OVERHEAD, 28);
        assert_eq!(CIPHER_SEGMENT_SIZE, 65_564);
    }

    #[test]
    fn encrypted_size_per_segment() {
        assert_eq!(encrypted_size(0), 0);
        assert_eq!(encrypted_size(1), 29);
        assert_eq!(encrypted_size(SEGMENT_SIZE as u64), CIPHER_SEGMENT_SIZE as u64);
        assert_eq!(encrypted_size(SEGMENT_SIZE as u64 + 1), CIPHER_SEGMENT_SIZE as u64 + 29);
        // 50 MiB is exactly 800 segments
        assert_eq!(encrypted_size(50 * 1024 * 1024), 50 * 1024 * 1024 + 800 * 28);
    }
}
