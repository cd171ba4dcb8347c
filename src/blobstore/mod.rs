//! Content-addressed blob storage
//!
//! Package archives and compiled artifacts are uploaded to a blobstore and
//! referred to afterwards only by [`BlobRef`].

mod local;

pub use local::LocalBlobstore;

use crate::error::RelprovResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Location of an object inside the blobstore
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobRef {
    pub blob_id: String,
    pub fingerprint: String,
}

impl BlobRef {
    pub fn new(blob_id: impl Into<String>, fingerprint: impl Into<String>) -> Self {
        Self {
            blob_id: blob_id.into(),
            fingerprint: fingerprint.into(),
        }
    }
}

/// Abstract blobstore interface
#[async_trait]
pub trait Blobstore: Send + Sync {
    /// Upload a local file, returning its reference
    async fn create(&self, path: &Path) -> RelprovResult<BlobRef>;

    /// Fetch a blob to a local path, verifying its fingerprint
    async fn get(&self, blob: &BlobRef) -> RelprovResult<PathBuf>;
}
