//! Streaming content digests for exact deduplication.

use blake3::Hasher as Blake3Hasher;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::types::Digest;

/// Read buffer size used while digesting.
const CHUNK_SIZE: usize = 64 * 1024;

/// Computes BLAKE3 content digests.
pub struct Hasher;

impl Hasher {
    /// Digest any byte stream without holding it in memory.
    ///
    /// An I/O error aborts the digest; no partial result is returned.
    pub fn digest_reader<R: Read>(mut reader: R) -> std::io::Result<Digest> {
        let mut hasher = Blake3Hasher::new();
        let mut buffer = vec![0u8; CHUNK_SIZE];
        loop {
            let bytes_read = match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            hasher.update(&buffer[..bytes_read]);
        }
        Ok(Self::finish(hasher))
    }

    /// Digest a file on disk by streaming it.
    pub fn digest_file(path: &Path) -> std::io::Result<Digest> {
        let file = File::open(path)?;
        Self::digest_reader(BufReader::new(file))
    }

    /// Digest a buffer that is already resident.
    pub fn digest_bytes(data: &[u8]) -> Digest {
        let mut hasher = Blake3Hasher::new();
        hasher.update(data);
        Self::finish(hasher)
    }

    fn finish(hasher: Blake3Hasher) -> Digest {
        Digest::from_trusted_hex(hasher.finalize().to_hex().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, ErrorKind};

    struct FailingReader {
        served: bool,
    }

    impl Read for FailingReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.served {
                Err(std::io::Error::new(ErrorKind::BrokenPipe, "gone"))
            } else {
                self.served = true;
                buf[0] = 7;
                Ok(1)
            }
        }
    }

    #[test]
    fn test_reader_matches_bytes() {
        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        let streamed = Hasher::digest_reader(Cursor::new(&data)).unwrap();
        assert_eq!(streamed, Hasher::digest_bytes(&data));
    }

    #[test]
    fn test_file_digest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob.bin");
        std::fs::write(&path, b"hello tessera").unwrap();
        assert_eq!(
            Hasher::digest_file(&path).unwrap(),
            Hasher::digest_bytes(b"hello tessera")
        );
    }

    #[test]
    fn test_different_content_different_digest() {
        assert_ne!(Hasher::digest_bytes(b"a"), Hasher::digest_bytes(b"b"));
    }

    #[test]
    fn test_io_error_propagates() {
        let result = Hasher::digest_reader(FailingReader { served: false });
        assert_eq!(result.unwrap_err().kind(), ErrorKind::BrokenPipe);
    }
}
