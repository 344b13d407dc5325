//! Content fingerprints for dataset files.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

const BUFFER_SIZE: usize = 64 * 1024;

/// Hash function used for checksums.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumAlgorithm {
    #[default]
    Blake3,
    Sha256,
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Blake3 => f.write_str("blake3"),
            Self::Sha256 => f.write_str("sha256"),
        }
    }
}

enum Hasher {
    Blake3(Box<blake3::Hasher>),
    Sha256(Sha256),
}

impl Hasher {
    fn new(algorithm: ChecksumAlgorithm) -> Self {
        match algorithm {
            ChecksumAlgorithm::Blake3 => Self::Blake3(Box::new(blake3::Hasher::new())),
            ChecksumAlgorithm::Sha256 => Self::Sha256(Sha256::new()),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            Self::Blake3(hasher) => {
                hasher.update(data);
            }
            Self::Sha256(hasher) => hasher.update(data),
        }
    }

    fn finalize_hex(self) -> String {
        match self {
            Self::Blake3(hasher) => hasher.finalize().to_hex().to_string(),
            Self::Sha256(hasher) => hex::encode(hasher.finalize()),
        }
    }
}

/// Computes lowercase hex checksums by streaming file contents.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChecksumComputer {
    algorithm: ChecksumAlgorithm,
}

impl ChecksumComputer {
    pub fn new(algorithm: ChecksumAlgorithm) -> Self {
        Self { algorithm }
    }

    pub fn algorithm(&self) -> ChecksumAlgorithm {
        self.algorithm
    }

    /// Checksum of the file at `path`.
    pub fn compute(&self, path: &Path) -> io::Result<String> {
        let file = File::open(path)?;
        self.compute_reader(file)
    }

    /// Checksum of everything `reader` yields.
    pub fn compute_reader<R: Read>(&self, mut reader: R) -> io::Result<String> {
        let mut hasher = Hasher::new(self.algorithm);
        let mut buffer = vec![0u8; BUFFER_SIZE];
        loop {
            let read = match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            hasher.update(&buffer[..read]);
        }
        Ok(hasher.finalize_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_known_digests() {
        let sha = ChecksumComputer::new(ChecksumAlgorithm::Sha256);
        assert_eq!(
            sha.compute_reader(&b"abc"[..]).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );

        let b3 = ChecksumComputer::new(ChecksumAlgorithm::Blake3);
        assert_eq!(
            b3.compute_reader(&b""[..]).unwrap(),
            "af1349b9f5f9a1a6a0404dea36dcc9499bcb25c9adc112b7cc9a93cae41f3262"
        );
    }

    #[test]
    fn test_file_checksum_is_deterministic() {
        let mut file = NamedTempFile::new().unwrap();
        // Larger than one buffer so streaming crosses a chunk boundary
        let data: Vec<u8> = (0..BUFFER_SIZE * 2 + 17).map(|i| (i % 251) as u8).collect();
        file.write_all(&data).unwrap();
        file.flush().unwrap();

        let computer = ChecksumComputer::default();
        let first = computer.compute(file.path()).unwrap();
        let second = computer.compute(file.path()).unwrap();

        assert_eq!(first, second);
        assert_eq!(first, blake3::hash(&data).to_hex().to_string());
        assert!(first.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ChecksumComputer::default()
            .compute(&dir.path().join("missing.fits"))
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
