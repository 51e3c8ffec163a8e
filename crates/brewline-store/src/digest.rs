//! Content digests of fetched archives.
//!
//! The algorithm is chosen by the declared checksum's length. Comparison is
//! plain and case-insensitive: this guards integrity, not a secret.

use crate::StoreError;
use brewline_schema::{Checksum, DigestAlgorithm};
use md5::Md5;
use sha2::{Digest, Sha256, Sha384, Sha512};
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

const CHUNK: usize = 64 * 1024;

fn stream<D: Digest>(reader: &mut impl Read) -> io::Result<String> {
    let mut hasher = D::new();
    let mut buf = vec![0u8; CHUNK];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Lowercase hex digest of everything `reader` yields.
pub fn hash_reader(algorithm: DigestAlgorithm, reader: &mut impl Read) -> io::Result<String> {
    match algorithm {
        DigestAlgorithm::Md5 => stream::<Md5>(reader),
        DigestAlgorithm::Sha256 => stream::<Sha256>(reader),
        DigestAlgorithm::Sha384 => stream::<Sha384>(reader),
        DigestAlgorithm::Sha512 => stream::<Sha512>(reader),
    }
}

pub fn hash_bytes(algorithm: DigestAlgorithm, data: &[u8]) -> String {
    let mut reader = data;
    // Reading from a slice cannot fail.
    hash_reader(algorithm, &mut reader).unwrap_or_default()
}

pub fn hash_file(path: &Path, algorithm: DigestAlgorithm) -> Result<String, StoreError> {
    let mut reader = BufReader::new(File::open(path)?);
    Ok(hash_reader(algorithm, &mut reader)?)
}

/// Hash `path` with the checksum's algorithm and compare.
///
/// Returns the computed digest on success and
/// [`StoreError::ChecksumMismatch`] otherwise.
pub fn verify_file(path: &Path, expected: &Checksum) -> Result<String, StoreError> {
    let actual = hash_file(path, expected.algorithm())?;
    if expected.matches(&actual) {
        tracing::debug!("{} {} ok", expected.algorithm(), path.display());
        Ok(actual)
    } else {
        Err(StoreError::ChecksumMismatch {
            expected: expected.as_str().to_owned(),
            actual,
        })
    }
}
