//! Single-segment ChaCha20-Poly1305 (IETF) encryption
//!
//! Cipher segment format:
//! ```text
//! [12 bytes: random nonce][N bytes: ciphertext][16 bytes: Poly1305 tag]
//! ```

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use rand::RngCore;

use s3probe_core::{ProbeError, ProbeResult};

use crate::keys::FileSecret;
use crate::{NONCE_SIZE, SEGMENT_OVERHEAD};

/// Encrypt one plaintext segment under a fresh random nonce.
///
/// Returns `[12-byte nonce][ciphertext][16-byte tag]`.
pub fn encrypt_segment(secret: &FileSecret, plaintext: &[u8]) -> ProbeResult<Vec<u8>> {
    let cipher = ChaCha20Poly1305::new(secret.as_bytes().into());

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| ProbeError::Crypto(format!("segment encryption failed: {e}")))?;

    let mut result = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    result.extend_from_slice(&nonce_bytes);
    result.extend_from_slice(&ciphertext);
    Ok(result)
}

/// Decrypt one cipher segment produced by [`encrypt_segment`].
pub fn decrypt_segment(secret: &FileSecret, segment: &[u8]) -> ProbeResult<Vec<u8>> {
    if segment.len() < SEGMENT_OVERHEAD {
        return Err(ProbeError::Decryption(format!(
            "cipher segment too short: {} bytes (minimum {})",
            segment.len(),
            SEGMENT_OVERHEAD
        )));
    }

    let (nonce_bytes, ciphertext) = segment.split_at(NONCE_SIZE);
    let nonce = Nonce::from_slice(nonce_bytes);
    let cipher = ChaCha20Poly1305::new(secret.as_bytes().into());

    cipher.decrypt(nonce, ciphertext).map_err(|_| {
        ProbeError::Decryption("segment authentication failed: wrong secret or corrupted data".into())
    })
}
