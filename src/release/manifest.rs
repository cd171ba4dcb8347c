//! Release manifest parsing
//!
//! A release is described by a `release.toml` next to its package archives.
//! Archive paths are relative to the manifest's directory. When a package
//! omits its fingerprint, the archive is hashed while loading.

use crate::error::{RelprovError, RelprovResult};
use crate::fingerprint::fingerprint_file;
use crate::release::{PackageSpec, Release, ReleaseBuilder};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Parsed `release.toml`
#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseManifest {
    pub name: String,
    pub version: String,

    /// Source packages compiled by the agent
    #[serde(default)]
    pub packages: Vec<PackageEntry>,

    /// Packages shipped already compiled
    #[serde(default)]
    pub compiled_packages: Vec<PackageEntry>,
}

/// One package in the manifest
#[derive(Debug, Clone, Deserialize)]
pub struct PackageEntry {
    pub name: String,
    pub version: String,
    pub archive: PathBuf,
    #[serde(default)]
    pub fingerprint: Option<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

impl ReleaseManifest {
    /// Parse a manifest from a file on disk
    pub async fn from_file(path: &Path) -> RelprovResult<Self> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            RelprovError::io(format!("reading release manifest {}", path.display()), e)
        })?;
        Self::parse(&content).map_err(|e| match e {
            RelprovError::ReleaseManifestInvalid { reason, .. } => {
                RelprovError::ReleaseManifestInvalid {
                    path: path.to_path_buf(),
                    reason,
                }
            }
            other => other,
        })
    }

    /// Parse a manifest from a TOML string
    pub fn parse(content: &str) -> RelprovResult<Self> {
        toml::from_str(content).map_err(|e| RelprovError::ReleaseManifestInvalid {
            path: "release.toml".into(),
            reason: e.to_string(),
        })
    }

    /// Load a release from a manifest file, resolving archives against its directory
    pub async fn load_release(path: &Path) -> RelprovResult<Release> {
        let manifest = Self::from_file(path).await?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        manifest.into_release(base_dir).await
    }

    /// Build the release arena, hashing archives without a fingerprint
    pub async fn into_release(self, base_dir: &Path) -> RelprovResult<Release> {
        let mut builder = ReleaseBuilder::new(&self.name, &self.version);

        for entry in self.packages {
            builder = builder.package(entry.into_spec(base_dir).await?);
        }
        for entry in self.compiled_packages {
            builder = builder.compiled_package(entry.into_spec(base_dir).await?);
        }

        builder.build()
    }
}

impl PackageEntry {
    async fn into_spec(self, base_dir: &Path) -> RelprovResult<PackageSpec> {
        let archive_path = if self.archive.is_absolute() {
            self.archive
        } else {
            base_dir.join(self.archive)
        };

        let fingerprint = match self.fingerprint {
            Some(fp) => fp,
            None => {
                debug!("Hashing archive {}", archive_path.display());
                fingerprint_file(&archive_path).await?
            }
        };

        Ok(
            PackageSpec::new(self.name, self.version, archive_path, fingerprint)
                .with_dependencies(&self.dependencies),
        )
    }
}
