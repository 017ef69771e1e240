//! Chunked reads of the local input file

use bytes::Bytes;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use s3probe_core::{ProbeError, ProbeResult};

/// Check that `path` names a readable, non-empty regular file and return its
/// size.
pub fn input_size(path: &Path) -> ProbeResult<u64> {
    let meta = std::fs::metadata(path).map_err(|e| {
        ProbeError::config(format!("input file {} is not accessible: {e}", path.display()))
    })?;
    if !meta.is_file() {
        return Err(ProbeError::config(format!(
            "input path {} is not a regular file",
            path.display()
        )));
    }
    if meta.len() == 0 {
        return Err(ProbeError::config(format!(
            "input file {} is empty",
            path.display()
        )));
    }
    Ok(meta.len())
}

/// Iterator of fixed-size chunks read from a file. The last chunk may be
/// short. A read error is yielded once, then the iterator ends.
#[derive(Debug)]
pub struct FileChunks<R = File> {
    reader: R,
    chunk_size: usize,
    done: bool,
}

/// Open `path` for chunked reading
pub fn read_chunks(path: &Path, chunk_size: usize) -> ProbeResult<FileChunks> {
    let file = File::open(path)?;
    Ok(FileChunks::new(file, chunk_size))
}

impl<R: Read> FileChunks<R> {
    pub fn new(reader: R, chunk_size: usize) -> Self {
        assert!(chunk_size > 0, "chunk size must be positive");
        Self {
            reader,
            chunk_size,
            done: false,
        }
    }

    fn fill(&mut self) -> std::io::Result<Vec<u8>> {
        let mut buf = vec![0u8; self.chunk_size];
        let mut filled = 0;
        while filled < buf.len() {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        buf.truncate(filled);
        Ok(buf)
    }
}

impl<R: Read> Iterator for FileChunks<R> {
    type Item = ProbeResult<Bytes>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.fill() {
            Ok(buf) if buf.is_empty() => {
                self.done = true;
                None
            }
            Ok(buf) => {
                if buf.len() < self.chunk_size {
                    self.done = true;
                }
                Some(Ok(Bytes::from(buf)))
            }
            Err(e) => {
                self.done = true;
                Some(Err(e.into()))
            }
        }
    }
}

impl<R: Read> std::iter::FusedIterator for FileChunks<R> {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};

    #[test]
    fn chunks_cover_file() {
        let data: Vec<u8> = (0u8..=255).cycle().take(1000).collect();
        let chunks: Vec<Bytes> = FileChunks::new(Cursor::new(data.clone()), 300)
            .collect::<ProbeResult<_>>()
            .unwrap();
        let lens: Vec<usize> = chunks.iter().map(|c| c.len()).collect();
        assert_eq!(lens, vec![300, 300, 300, 100]);
        assert_eq!(chunks.concat(), data);
    }

    #[test]
    fn exact_multiple_has_no_empty_tail() {
        let chunks: Vec<Bytes> = FileChunks::new(Cursor::new(vec![1u8; 600]), 300)
            .collect::<ProbeResult<_>>()
            .unwrap();
        assert_eq!(chunks.len(), 2);
    }

    struct FailingReader;

    impl Read for FailingReader {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::other("disk on fire"))
        }
    }

    #[test]
    fn read_error_is_yielded_once() {
        let mut chunks = FileChunks::new(FailingReader, 16);
        assert!(matches!(chunks.next(), Some(Err(ProbeError::Io(_)))));
        assert!(chunks.next().is_none());
    }

    #[test]
    fn input_checks() {
        let dir = tempfile::tempdir().unwrap();

        let missing = dir.path().join("missing.bin");
        assert!(matches!(input_size(&missing), Err(ProbeError::Config(_))));
        assert!(matches!(input_size(dir.path()), Err(ProbeError::Config(_))));

        let empty = dir.path().join("empty.bin");
        std::fs::File::create(&empty).unwrap();
        let err = input_size(&empty).unwrap_err();
        assert!(err.to_string().contains("empty"));

        let full = dir.path().join("full.bin");
        let mut f = std::fs::File::create(&full).unwrap();
        f.write_all(&[7u8; 1234]).unwrap();
        assert_eq!(input_size(&full).unwrap(), 1234);

        let read: Vec<Bytes> = read_chunks(&full, 1000)
            .unwrap()
            .collect::<ProbeResult<_>>()
            .unwrap();
        assert_eq!(read.len(), 2);
    }
}
