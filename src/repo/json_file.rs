//! File-backed record repository
//!
//! One JSON document per package under the repository directory. The
//! document repeats the full key so a record copied or renamed by hand is
//! detected instead of silently served for the wrong package.
//!
//! Keys are `(name, version, source fingerprint)`: two releases that reuse a
//! name and version with different archive contents get distinct records.

use crate::error::{RelprovError, RelprovResult};
use crate::fingerprint::fingerprint_bytes;
use crate::release::Package;
use crate::repo::RecordRepository;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;
use uuid::Uuid;

/// Full identity a record is stored under
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordKey {
    pub name: String,
    pub version: String,
    pub fingerprint: String,
}

impl RecordKey {
    pub fn for_package(pkg: &Package) -> Self {
        Self {
            name: pkg.name.clone(),
            version: pkg.version.clone(),
            fingerprint: pkg.fingerprint.clone(),
        }
    }

    /// File name: readable prefix plus a short hash of the whole key
    fn file_name(&self) -> String {
        let material = format!("{}\0{}\0{}", self.name, self.version, self.fingerprint);
        let digest = fingerprint_bytes(material.as_bytes());
        format!(
            "{}-{}-{}.json",
            sanitize(&self.name),
            sanitize(&self.version),
            &digest[..12]
        )
    }
}

fn sanitize(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[derive(Serialize, Deserialize)]
struct StoredRecord<R> {
    key: RecordKey,
    record: R,
}

/// Repository keeping records as JSON files in `dir`
pub struct JsonFileRepository<R> {
    dir: PathBuf,
    _record: PhantomData<fn() -> R>,
}

impl<R> JsonFileRepository<R>
where
    R: Serialize + DeserializeOwned + Send + Sync,
{
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            _record: PhantomData,
        }
    }

    fn record_path(&self, key: &RecordKey) -> PathBuf {
        self.dir.join(key.file_name())
    }

    /// Every stored record, sorted by key
    pub async fn entries(&self) -> RelprovResult<Vec<(RecordKey, R)>> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(RelprovError::storage("reading repository directory", e)),
        };

        let mut records = vec![];
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| RelprovError::storage("reading repository entry", e))?
        {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                if let Some(stored) = read_stored::<R>(&path).await? {
                    records.push((stored.key, stored.record));
                }
            }
        }

        records.sort_by(|a, b| {
            (&a.0.name, &a.0.version, &a.0.fingerprint).cmp(&(
                &b.0.name,
                &b.0.version,
                &b.0.fingerprint,
            ))
        });
        Ok(records)
    }
}

/// A missing file is `None`; any other read failure is a storage error
async fn read_stored<R: DeserializeOwned>(path: &Path) -> RelprovResult<Option<StoredRecord<R>>> {
    let content = match fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(RelprovError::storage(
                format!("reading record {}", path.display()),
                e,
            ))
        }
    };

    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| RelprovError::storage(format!("corrupt record {}", path.display()), e))
}

#[async_trait]
impl<R> RecordRepository<R> for JsonFileRepository<R>
where
    R: Serialize + DeserializeOwned + Send + Sync,
{
    async fn find(&self, pkg: &Package) -> RelprovResult<Option<R>> {
        let key = RecordKey::for_package(pkg);
        let path = self.record_path(&key);

        let Some(stored) = read_stored::<R>(&path).await? else {
            return Ok(None);
        };
        if stored.key != key {
            return Err(RelprovError::storage(
                format!("corrupt record {}", path.display()),
                format!("stored for {}/{}", stored.key.name, stored.key.version),
            ));
        }

        Ok(Some(stored.record))
    }

    async fn save(&self, pkg: &Package, record: &R) -> RelprovResult<()> {
        let key = RecordKey::for_package(pkg);
        let path = self.record_path(&key);

        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| RelprovError::storage("creating repository directory", e))?;

        let content = serde_json::to_string_pretty(&StoredRecord { key, record })
            .map_err(|e| RelprovError::storage("encoding record", e))?;

        // Write aside then rename so readers never see a partial record
        let tmp = self.dir.join(format!(".{}.tmp", Uuid::new_v4()));
        fs::write(&tmp, content)
            .await
            .map_err(|e| RelprovError::storage(format!("writing record {}", tmp.display()), e))?;
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(RelprovError::storage(
                format!("writing record {}", path.display()),
                e,
            ));
        }

        debug!("Saved record {}", path.display());
        Ok(())
    }
}
