//! Streaming encryption into upload parts, and the reverse for downloads
//!
//! Three independently sized windows meet here: the caller's chunks, the
//! cipher segment, and the upload part. Bytes that do not yet fill a window
//! are carried over, so part boundaries depend only on the total length and
//! never on how the input was chunked.

use bytes::{Bytes, BytesMut};

use s3probe_chunks::{split_segments, ChecksumAccumulator, ChecksumSet};
use s3probe_core::ProbeResult;

use crate::keys::FileSecret;
use crate::segment::{decrypt_segment, encrypt_segment};
use crate::{CIPHER_SEGMENT_SIZE, SEGMENT_SIZE};

/// Encrypts a plaintext stream into fixed-size ciphertext parts
#[derive(Debug)]
pub struct Encryptor {
    secret: FileSecret,
    part_size: usize,
    /// Plaintext not yet filling a segment
    pending: BytesMut,
    /// Ciphertext not yet handed out as a part
    output: BytesMut,
    checksums: ChecksumAccumulator,
    plaintext_size: u64,
    encrypted_size: u64,
}

/// What the upload side keeps once encryption is done
#[derive(Debug)]
pub struct EncryptionReport {
    pub secret: FileSecret,
    pub checksums: ChecksumSet,
    pub plaintext_size: u64,
    pub encrypted_size: u64,
}

impl Encryptor {
    /// New encryptor with a freshly generated file secret
    pub fn new(part_size: usize) -> Self {
        Self::with_secret(FileSecret::generate(), part_size)
    }

    pub fn with_secret(secret: FileSecret, part_size: usize) -> Self {
        assert!(part_size > 0, "part size must be positive");
        Self {
            secret,
            part_size,
            pending: BytesMut::new(),
            output: BytesMut::new(),
            checksums: ChecksumAccumulator::new(),
            plaintext_size: 0,
            encrypted_size: 0,
        }
    }

    pub fn secret(&self) -> &FileSecret {
        &self.secret
    }

    pub fn part_size(&self) -> usize {
        self.part_size
    }

    /// Ciphertext bytes handed out as parts so far
    pub fn encrypted_size(&self) -> u64 {
        self.encrypted_size
    }

    /// Lazily encrypt `chunks` into parts. Nothing is read until the returned
    /// iterator is polled.
    pub fn process<I, B>(&mut self, chunks: I) -> EncryptedParts<'_, I::IntoIter>
    where
        I: IntoIterator<Item = ProbeResult<B>>,
        B: AsRef<[u8]>,
    {
        EncryptedParts {
            encryptor: self,
            chunks: chunks.into_iter(),
            stage: Stage::Reading,
        }
    }

    pub fn finish(self) -> EncryptionReport {
        EncryptionReport {
            secret: self.secret,
            checksums: self.checksums.finalize(),
            plaintext_size: self.plaintext_size,
            encrypted_size: self.encrypted_size,
        }
    }

    fn absorb(&mut self, chunk: &[u8]) -> ProbeResult<()> {
        self.checksums.update_plaintext(chunk);
        self.plaintext_size += chunk.len() as u64;
        self.pending.extend_from_slice(chunk);

        let full = self.pending.len() - self.pending.len() % SEGMENT_SIZE;
        if full == 0 {
            return Ok(());
        }
        let ready = self.pending.split_to(full);
        let (segments, _) = split_segments(&ready, SEGMENT_SIZE);
        for segment in segments {
            let sealed = encrypt_segment(&self.secret, segment)?;
            self.output.extend_from_slice(&sealed);
        }
        Ok(())
    }

    /// Encrypt the short trailing segment, if any
    fn seal_remainder(&mut self) -> ProbeResult<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let sealed = encrypt_segment(&self.secret, &self.pending)?;
        self.pending.clear();
        self.output.extend_from_slice(&sealed);
        Ok(())
    }

    fn has_full_part(&self) -> bool {
        self.output.len() >= self.part_size
    }

    fn take_part(&mut self, len: usize) -> Bytes {
        let part = self.output.split_to(len).freeze();
        let number = self.checksums.record_part(&part);
        self.encrypted_size += part.len() as u64;
        tracing::trace!(part_number = number, len = part.len(), "sealed part");
        part
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Reading,
    Draining,
    Done,
}

/// Pull-based sequence of ciphertext parts. Fused: after `None` or an error
/// it yields `None` forever.
#[derive(Debug)]
pub struct EncryptedParts<'a, I> {
    encryptor: &'a mut Encryptor,
    chunks: I,
    stage: Stage,
}

impl<I, B> Iterator for EncryptedParts<'_, I>
where
    I: Iterator<Item = ProbeResult<B>>,
    B: AsRef<[u8]>,
{
    type Item = ProbeResult<Bytes>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.stage {
                Stage::Reading => {
                    if self.encryptor.has_full_part() {
                        let len = self.encryptor.part_size;
                        return Some(Ok(self.encryptor.take_part(len)));
                    }
                    let step = match self.chunks.next() {
                        Some(Ok(chunk)) => self.encryptor.absorb(chunk.as_ref()),
                        Some(Err(e)) => Err(e),
                        None => {
                            self.stage = Stage::Draining;
                            self.encryptor.seal_remainder()
                        }
                    };
                    if let Err(e) = step {
                        self.stage = Stage::Done;
                        return Some(Err(e));
                    }
                }
                Stage::Draining => {
                    let buffered = self.encryptor.output.len();
                    if buffered == 0 {
                        self.stage = Stage::Done;
                        return None;
                    }
                    let len = buffered.min(self.encryptor.part_size);
                    return Some(Ok(self.encryptor.take_part(len)));
                }
                Stage::Done => return None,
            }
        }
    }
}

impl<I, B> std::iter::FusedIterator for EncryptedParts<'_, I>
where
    I: Iterator<Item = ProbeResult<B>>,
    B: AsRef<[u8]>,
{
}

/// Decrypts downloaded ciphertext parts and rebuilds the checksum set
#[derive(Debug)]
pub struct Decryptor<'a> {
    secret: &'a FileSecret,
    part_size: usize,
    /// Ciphertext not yet filling a cipher segment
    pending: BytesMut,
    /// Plaintext not yet filling a part
    plaintext: BytesMut,
    checksums: ChecksumAccumulator,
    plaintext_size: u64,
}

/// What the download side ends with
#[derive(Debug)]
pub struct Decrypted {
    /// Plaintext parts released by `finish`, the last one possibly short
    pub parts: Vec<Bytes>,
    pub checksums: ChecksumSet,
    pub plaintext_size: u64,
}

impl<'a> Decryptor<'a> {
    /// `part_size` is the plaintext window parts are folded in.
    pub fn new(secret: &'a FileSecret, part_size: usize) -> Self {
        assert!(part_size > 0, "part size must be positive");
        Self {
            secret,
            part_size,
            pending: BytesMut::new(),
            plaintext: BytesMut::new(),
            checksums: ChecksumAccumulator::new(),
            plaintext_size: 0,
        }
    }

    /// Feed the next downloaded part. Returns the plaintext parts it
    /// completed, in order.
    pub fn process_part(&mut self, part: &[u8]) -> ProbeResult<Vec<Bytes>> {
        self.checksums.record_part(part);
        self.pending.extend_from_slice(part);

        let full = self.pending.len() - self.pending.len() % CIPHER_SEGMENT_SIZE;
        if full > 0 {
            let ready = self.pending.split_to(full);
            let (segments, _) = split_segments(&ready, CIPHER_SEGMENT_SIZE);
            for segment in segments {
                let opened = decrypt_segment(self.secret, segment)?;
                self.plaintext.extend_from_slice(&opened);
            }
        }
        Ok(self.drain_parts())
    }

    /// Drive [`Decryptor::process_part`] over every chunk, discarding the
    /// plaintext.
    pub fn process<I, B>(&mut self, parts: I) -> ProbeResult<()>
    where
        I: IntoIterator<Item = B>,
        B: AsRef<[u8]>,
    {
        for part in parts {
            self.process_part(part.as_ref())?;
        }
        Ok(())
    }

    pub fn parts_processed(&self) -> usize {
        self.checksums.parts_recorded()
    }

    pub fn finish(mut self) -> ProbeResult<Decrypted> {
        if !self.pending.is_empty() {
            let opened = decrypt_segment(self.secret, &self.pending)?;
            self.pending.clear();
            self.plaintext.extend_from_slice(&opened);
        }
        let mut parts = self.drain_parts();
        if !self.plaintext.is_empty() {
            let tail = self.plaintext.split().freeze();
            parts.push(self.fold(tail));
        }
        Ok(Decrypted {
            parts,
            checksums: self.checksums.finalize(),
            plaintext_size: self.plaintext_size,
        })
    }

    fn drain_parts(&mut self) -> Vec<Bytes> {
        let mut parts = Vec::new();
        while self.plaintext.len() >= self.part_size {
            let part = self.plaintext.split_to(self.part_size).freeze();
            parts.push(self.fold(part));
        }
        parts
    }

    fn fold(&mut self, part: Bytes) -> Bytes {
        self.checksums.update_plaintext(&part);
        self.plaintext_size += part.len() as u64;
        part
    }
}
