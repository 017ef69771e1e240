//! Checksum accumulation for both sides of a transfer
//!
//! The plaintext stream is folded into one running SHA-256. The ciphertext
//! stream is hashed per uploaded part (MD5 and SHA-256), in part order. The
//! finalized [`ChecksumSet`] of the upload is the oracle the download is
//! compared against.

use md5::Md5;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;

use s3probe_core::{ProbeError, ProbeResult};

/// Lowercase hex MD5 of a byte slice
pub fn md5_hex(data: &[u8]) -> String {
    hex::encode(Md5::digest(data))
}

/// Lowercase hex SHA-256 of a byte slice
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Running checksum state, appended to monotonically
#[derive(Clone, Default)]
pub struct ChecksumAccumulator {
    plaintext: Sha256,
    part_md5: Vec<String>,
    part_sha256: Vec<String>,
}

impl ChecksumAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold plaintext bytes into the running SHA-256
    pub fn update_plaintext(&mut self, data: &[u8]) {
        self.plaintext.update(data);
    }

    /// Record the hashes of the next ciphertext part. Returns its 1-based
    /// part number.
    pub fn record_part(&mut self, part: &[u8]) -> usize {
        self.part_md5.push(md5_hex(part));
        self.part_sha256.push(sha256_hex(part));
        self.part_md5.len()
    }

    pub fn parts_recorded(&self) -> usize {
        self.part_md5.len()
    }

    pub fn finalize(self) -> ChecksumSet {
        ChecksumSet {
            plaintext_sha256: hex::encode(self.plaintext.finalize()),
            part_md5: self.part_md5,
            part_sha256: self.part_sha256,
        }
    }
}

impl fmt::Debug for ChecksumAccumulator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChecksumAccumulator")
            .field("parts_recorded", &self.part_md5.len())
            .finish()
    }
}

/// Finalized checksums of one side of a transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChecksumSet {
    pub plaintext_sha256: String,
    pub part_md5: Vec<String>,
    pub part_sha256: Vec<String>,
}

impl ChecksumSet {
    /// Compare the download-side set (`self` is the upload side).
    ///
    /// Fails on the first differing field, naming it; the error carries both
    /// full sets.
    pub fn verify(&self, download: &ChecksumSet) -> ProbeResult<()> {
        match self.first_difference(download) {
            None => Ok(()),
            Some(field) => Err(ProbeError::ChecksumMismatch {
                field,
                upload: self.to_string(),
                download: download.to_string(),
            }),
        }
    }

    fn first_difference(&self, other: &ChecksumSet) -> Option<String> {
        if self.part_md5.len() != other.part_md5.len() {
            return Some(format!(
                "part count {} vs {}",
                self.part_md5.len(),
                other.part_md5.len()
            ));
        }
        if let Some(i) = first_mismatch(&self.part_md5, &other.part_md5) {
            return Some(format!("part {} md5", i + 1));
        }
        if let Some(i) = first_mismatch(&self.part_sha256, &other.part_sha256) {
            return Some(format!("part {} sha256", i + 1));
        }
        if self.plaintext_sha256 != other.plaintext_sha256 {
            return Some("plaintext sha256".into());
        }
        None
    }
}

fn first_mismatch(a: &[String], b: &[String]) -> Option<usize> {
    a.iter().zip(b).position(|(x, y)| x != y)
}

impl fmt::Display for ChecksumSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Unencrypted SHA256: {}", self.plaintext_sha256)?;
        writeln!(f, "Encrypted MD5: [{}]", self.part_md5.join(", "))?;
        write!(f, "Encrypted SHA256: [{}]", self.part_sha256.join(", "))
    }
}
