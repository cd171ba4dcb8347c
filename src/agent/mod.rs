//! Agent client abstraction
//!
//! The agent is the remote execution host on a target VM. It compiles
//! packages and runs lifecycle hooks. Calls are request/response; long
//! running work is surfaced by implementations as a single blocking call.

mod http;

pub use http::HttpAgentClient;

use crate::blobstore::BlobRef;
use crate::error::RelprovResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Compiled dependency handed to the agent, keyed by name in [`Dependencies`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyPackage {
    pub name: String,
    pub version: String,
    #[serde(rename = "blobstore_id")]
    pub blob_id: String,
    #[serde(rename = "sha1")]
    pub fingerprint: String,
}

/// Dependency name to compiled dependency
pub type Dependencies = BTreeMap<String, DependencyPackage>;

/// Everything the agent needs to compile one package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilePackageRequest {
    /// Source archive in the blobstore
    pub source: BlobRef,
    pub name: String,
    pub version: String,
    pub dependencies: Dependencies,
}

/// Abstract agent interface
#[async_trait]
pub trait AgentClient: Send + Sync {
    /// Compile a package, returning the compiled artifact's blob
    async fn compile_package(&self, request: &CompilePackageRequest) -> RelprovResult<BlobRef>;

    /// Stop all jobs on the instance
    async fn stop(&self) -> RelprovResult<String>;

    /// Run post-start scripts on the instance
    async fn post_start(&self) -> RelprovResult<String>;
}
