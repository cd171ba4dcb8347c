//! Directory-backed blobstore
//!
//! Blobs are copied into a single directory under a random id. Reads check
//! the content against the fingerprint recorded at upload time.

use crate::blobstore::{BlobRef, Blobstore};
use crate::error::{RelprovError, RelprovResult};
use crate::fingerprint::fingerprint_file;
use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;
use uuid::Uuid;

/// Blobstore keeping every blob as a file in `dir`
pub struct LocalBlobstore {
    dir: PathBuf,
}

impl LocalBlobstore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn blob_path(&self, blob_id: &str) -> RelprovResult<PathBuf> {
        // Ids come from records on disk; never let one escape the directory
        if blob_id.is_empty() || !blob_id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(RelprovError::blobstore(
                "resolving blob",
                format!("invalid blob id '{}'", blob_id),
            ));
        }
        Ok(self.dir.join(blob_id))
    }
}

#[async_trait]
impl Blobstore for LocalBlobstore {
    async fn create(&self, path: &Path) -> RelprovResult<BlobRef> {
        let fingerprint = fingerprint_file(path)
            .await
            .map_err(|e| RelprovError::blobstore(format!("hashing {}", path.display()), e))?;

        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| RelprovError::blobstore("creating blobstore directory", e))?;

        let blob_id = Uuid::new_v4().to_string();
        let dest = self.blob_path(&blob_id)?;
        fs::copy(path, &dest)
            .await
            .map_err(|e| RelprovError::blobstore(format!("uploading {}", path.display()), e))?;

        debug!("Created blob {} from {}", blob_id, path.display());
        Ok(BlobRef::new(blob_id, fingerprint))
    }

    async fn get(&self, blob: &BlobRef) -> RelprovResult<PathBuf> {
        let path = self.blob_path(&blob.blob_id)?;
        match fs::metadata(&path).await {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(RelprovError::blobstore(
                    "fetching blob",
                    format!("blob {} not found", blob.blob_id),
                ));
            }
            Err(e) => {
                return Err(RelprovError::blobstore(
                    format!("fetching blob {}", blob.blob_id),
                    e,
                ));
            }
        }

        let actual = fingerprint_file(&path)
            .await
            .map_err(|e| RelprovError::blobstore(format!("hashing blob {}", blob.blob_id), e))?;
        if actual != blob.fingerprint {
            return Err(RelprovError::BlobFingerprintMismatch {
                blob_id: blob.blob_id.clone(),
                expected: blob.fingerprint.clone(),
                actual,
            });
        }

        Ok(path)
    }
}
