//! File digests, computed after a download completes.
//!
//! Hashing runs over the finished temp file rather than inline with the
//! download path; the sink offloads it to a separate thread so the consumer
//! loop is never blocked by CPU-bound work.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::{ErrorKind, RangeRequestError, Result};

const BUF_SIZE: usize = 64 * 1024;

/// Digest selection for a finished download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumType {
    Sha256,
    Md5,
    None,
}

/// Compute the selected digest of `path`, returned as lowercase hex.
/// Reads in chunks to keep memory use bounded; suitable for large files.
pub fn hash_file(path: &Path, checksum: ChecksumType) -> Result<String> {
    match checksum {
        ChecksumType::Sha256 => sha256_file(path),
        ChecksumType::Md5 => md5_file(path),
        ChecksumType::None => Err(RangeRequestError::new(
            ErrorKind::UnsupportedOperation,
            "no checksum type selected",
        )),
    }
}

fn sha256_file(path: &Path) -> Result<String> {
    let mut hasher = Sha256::new();
    stream_file(path, |data| hasher.update(data))?;
    Ok(hex::encode(hasher.finalize()))
}

fn md5_file(path: &Path) -> Result<String> {
    let mut context = md5::Context::new();
    stream_file(path, |data| context.consume(data))?;
    Ok(format!("{:x}", context.compute()))
}

fn stream_file(path: &Path, mut update: impl FnMut(&[u8])) -> Result<()> {
    let mut file = File::open(path).map_err(|e| {
        RangeRequestError::file(format!("open {} for hashing: {}", path.display(), e))
    })?;
    let mut buf = [0u8; BUF_SIZE];
    loop {
        let n = file
            .read(&mut buf)
            .map_err(|e| RangeRequestError::file(format!("read {}: {}", path.display(), e)))?;
        if n == 0 {
            return Ok(());
        }
        update(&buf[..n]);
    }
}
