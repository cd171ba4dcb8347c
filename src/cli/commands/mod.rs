//! CLI command implementations

pub mod agent;
pub mod compile;
pub mod config;
pub mod find;

pub use agent::execute as agent;
pub use compile::execute as compile;
pub use config::execute as config;
pub use find::execute as find;

use crate::blobstore::LocalBlobstore;
use crate::compiler::{CompilerOptions, PackagesCompilerFactory};
use crate::config::Config;
use crate::eventlog::Factory;
use crate::repo::{CompiledPackageRecord, JsonFileRepository, PackageRecord};
use std::sync::Arc;

/// Compiler factory over the configured repositories and blobstore
pub(crate) fn compiler_factory(config: &Config, max_concurrency: usize) -> PackagesCompilerFactory {
    let packages_repo: Arc<JsonFileRepository<PackageRecord>> =
        Arc::new(JsonFileRepository::new(config.storage.packages_dir()));
    let compiled_packages_repo: Arc<JsonFileRepository<CompiledPackageRecord>> =
        Arc::new(JsonFileRepository::new(config.storage.compiled_packages_dir()));

    PackagesCompilerFactory::new(
        packages_repo,
        compiled_packages_repo,
        Arc::new(LocalBlobstore::new(config.storage.blobstore_dir.clone())),
        Factory::new(config.event_log.device).new_log(),
        CompilerOptions {
            call_timeout: config.compiler.call_timeout(),
            max_concurrency,
        },
    )
}
