//! Content fingerprints for archives and blobs

use crate::error::{RelprovError, RelprovResult};
use sha2::{Digest, Sha256};
use std::path::Path;

/// SHA256 of a byte slice, hex encoded
pub fn fingerprint_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// SHA256 of a file's contents, hex encoded
pub async fn fingerprint_file(path: &Path) -> RelprovResult<String> {
    let contents = tokio::fs::read(path)
        .await
        .map_err(|e| RelprovError::io(format!("reading {}", path.display()), e))?;
    Ok(fingerprint_bytes(&contents))
}
