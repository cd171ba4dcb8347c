//! Error types for relprov
//!
//! All modules use `RelprovResult<T>` as their return type. Errors raised
//! while working on a package are wrapped with [`RelprovError::Context`] so
//! the message names the package; other operations use
//! [`RelprovError::Operation`]. [`RelprovError::kind`] looks through both
//! layers to classify the root cause.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for relprov operations
pub type RelprovResult<T> = Result<T, RelprovError>;

/// Coarse classification used for retry decisions and reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A record that ordering guaranteed to exist is missing
    ConsistencyViolation,
    /// The agent reported a compile failure
    UpstreamCompile,
    /// Record repository I/O or corruption
    Storage,
    /// Blob upload or download failure
    Blobstore,
    /// Agent transport failure
    Transport,
    /// A remote call exceeded its deadline
    Timeout,
    /// Post-start scripts failed on the instance
    PostStart,
    /// The release itself is malformed
    Release,
    /// Configuration could not be loaded
    Config,
    /// Anything else
    Internal,
}

/// All errors that can occur in relprov
#[derive(Error, Debug)]
pub enum RelprovError {
    // Compilation errors
    #[error("{context} {package}: {source}")]
    Context {
        context: String,
        package: String,
        #[source]
        source: Box<RelprovError>,
    },

    #[error("{context}: {source}")]
    Operation {
        context: String,
        #[source]
        source: Box<RelprovError>,
    },

    #[error("Expected to find compiled package {dependency} (dependency of {package})")]
    ConsistencyViolation { package: String, dependency: String },

    #[error("Expected to find compiled package {0}")]
    CompiledPackageMissing(String),

    #[error("Agent task failed: {0}")]
    AgentTask(String),

    #[error("Timed out after {after:?}: {operation}")]
    Timeout { operation: String, after: Duration },

    // Collaborator errors
    #[error("Record storage error: {context}: {reason}")]
    Storage { context: String, reason: String },

    #[error("Blobstore error: {context}: {reason}")]
    Blobstore { context: String, reason: String },

    #[error("Blob {blob_id} fingerprint mismatch: expected {expected}, got {actual}")]
    BlobFingerprintMismatch {
        blob_id: String,
        expected: String,
        actual: String,
    },

    #[error("Agent transport error: {0}")]
    Transport(String),

    // Instance errors
    #[error("Post start scripts failed: {source}")]
    PostStartFailed {
        #[source]
        source: Box<RelprovError>,
    },

    // Release errors
    #[error("Release dependency cycle detected at package {0}")]
    DependencyCycle(String),

    #[error("Package {package} depends on unknown package {dependency}")]
    UnknownDependency { package: String, dependency: String },

    #[error("Duplicate package in release: {0}")]
    DuplicatePackage(String),

    #[error("Invalid release manifest at {path}: {reason}")]
    ReleaseManifestInvalid { path: PathBuf, reason: String },

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RelprovError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a record storage error
    pub fn storage(context: impl Into<String>, reason: impl ToString) -> Self {
        Self::Storage {
            context: context.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a blobstore error
    pub fn blobstore(context: impl Into<String>, reason: impl ToString) -> Self {
        Self::Blobstore {
            context: context.into(),
            reason: reason.to_string(),
        }
    }

    /// Wrap this error with package-identifying context
    pub fn with_package(self, context: impl Into<String>, package: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            package: package.into(),
            source: Box::new(self),
        }
    }

    /// Wrap this error with the operation that failed
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::Operation {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Innermost error, skipping context layers
    pub fn root(&self) -> &RelprovError {
        match self {
            Self::Context { source, .. } | Self::Operation { source, .. } => source.root(),
            other => other,
        }
    }

    /// Classify the root cause
    pub fn kind(&self) -> ErrorKind {
        match self.root() {
            Self::ConsistencyViolation { .. } | Self::CompiledPackageMissing(_) => {
                ErrorKind::ConsistencyViolation
            }
            Self::AgentTask(_) => ErrorKind::UpstreamCompile,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Storage { .. } => ErrorKind::Storage,
            Self::Blobstore { .. } | Self::BlobFingerprintMismatch { .. } => ErrorKind::Blobstore,
            Self::Transport(_) => ErrorKind::Transport,
            Self::PostStartFailed { .. } => ErrorKind::PostStart,
            Self::DependencyCycle(_)
            | Self::UnknownDependency { .. }
            | Self::DuplicatePackage(_)
            | Self::ReleaseManifestInvalid { .. } => ErrorKind::Release,
            Self::ConfigInvalid { .. } => ErrorKind::Config,
            _ => ErrorKind::Internal,
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Storage | ErrorKind::Blobstore | ErrorKind::Transport | ErrorKind::Timeout
        )
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self.kind() {
            ErrorKind::ConsistencyViolation => {
                Some("The compiled package store is inconsistent; check for external changes to the repos directory")
            }
            ErrorKind::Transport => Some("Check that the agent is running and agent.url is correct"),
            ErrorKind::Timeout => Some("Raise compiler.call_timeout_secs or agent.timeout_secs"),
            ErrorKind::UpstreamCompile => {
                Some("Fix the package source or agent toolchain, then re-run; finished packages are cached")
            }
            _ => None,
        }
    }
}
