//! Package record repositories
//!
//! Two repositories share one contract: the package repository maps a
//! package to its uploaded *source* archive, the compiled package
//! repository maps it to its *compiled* artifact. Together they make
//! compilation idempotent and resumable.
//!
//! # Contract
//!
//! | Call | Outcome | Meaning |
//! |------|---------|---------|
//! | `find` | `Ok(Some(r))` | cache hit |
//! | `find` | `Ok(None)` | cache miss, the normal case |
//! | `find` / `save` | `Err(Storage)` | I/O failure or corrupt record |
//!
//! `save` is an idempotent upsert. Records are never deleted here.

mod json_file;

pub use json_file::{JsonFileRepository, RecordKey};

use crate::blobstore::BlobRef;
use crate::error::RelprovResult;
use crate::release::Package;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Durable mapping from package identity to a record
#[async_trait]
pub trait RecordRepository<R: Send + Sync>: Send + Sync {
    /// Look up the record for a package
    async fn find(&self, pkg: &Package) -> RelprovResult<Option<R>>;

    /// Store or replace the record for a package
    async fn save(&self, pkg: &Package, record: &R) -> RelprovResult<()>;
}

/// Source repository: where a package's source archive lives
pub type PackageRepository = dyn RecordRepository<PackageRecord>;

/// Compiled repository: where a package's compiled artifact lives
pub type CompiledPackageRepository = dyn RecordRepository<CompiledPackageRecord>;

/// Blobstore location of a package's source archive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRecord {
    pub blob_id: String,
    pub fingerprint: String,
}

/// Blobstore location of a package's compiled artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledPackageRecord {
    pub blob_id: String,
    pub fingerprint: String,
}

impl PackageRecord {
    pub fn blob(&self) -> BlobRef {
        BlobRef::new(&self.blob_id, &self.fingerprint)
    }
}

impl CompiledPackageRecord {
    pub fn blob(&self) -> BlobRef {
        BlobRef::new(&self.blob_id, &self.fingerprint)
    }
}

impl From<BlobRef> for PackageRecord {
    fn from(blob: BlobRef) -> Self {
        Self {
            blob_id: blob.blob_id,
            fingerprint: blob.fingerprint,
        }
    }
}

impl From<BlobRef> for CompiledPackageRecord {
    fn from(blob: BlobRef) -> Self {
        Self {
            blob_id: blob.blob_id,
            fingerprint: blob.fingerprint,
        }
    }
}
