//! SHA-256 digests for archives and the files unpacked from them
//!
//! Input is always consumed in fixed-size chunks so memory stays bounded
//! no matter how large a firmware image is. Only the final lowercase hex
//! digest is exposed.

use crate::error::{FwrError, Result};
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;

/// Read size used while hashing.
pub const CHUNK_SIZE: usize = 8192;

/// Length of a hex-encoded SHA-256 digest.
pub const SHA256_HEX_LEN: usize = 64;

/// Compute the SHA-256 digest of any readable source
pub fn compute_sha256<R: Read>(reader: &mut R) -> Result<String> {
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; CHUNK_SIZE];

    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Compute the SHA-256 digest of a file on disk
pub fn compute_file_sha256(path: impl AsRef<Path>) -> Result<String> {
    let mut file = std::fs::File::open(path)?;
    compute_sha256(&mut file)
}

/// Hash a file and compare it against an expected digest.
///
/// The comparison ignores ASCII case. On mismatch the returned error
/// carries both digests; the computed one is always lowercase.
pub fn verify_file_sha256(path: impl AsRef<Path>, expected: &str) -> Result<String> {
    let mut file = std::fs::File::open(path)?;
    verify_sha256(&mut file, expected)
}

/// Like [`verify_file_sha256`], for any readable source
pub fn verify_sha256<R: Read>(reader: &mut R, expected: &str) -> Result<String> {
    let actual = compute_sha256(reader)?;
    if actual.eq_ignore_ascii_case(expected) {
        Ok(actual)
    } else {
        Err(FwrError::ChecksumMismatch {
            expected: expected.to_string(),
            actual,
        })
    }
}
