//! Package compilation engine
//!
//! Produces a compiled package record for every package of a release,
//! delegating the build to the agent and caching results in the compiled
//! package repository.
//!
//! # Resumability
//!
//! Records are saved as soon as each package compiles. A failed `compile`
//! leaves earlier records in place; calling it again skips them as cache
//! hits and retries from the failed package on.
//!
//! # Ordering
//!
//! A package is only compiled once every direct dependency has a compiled
//! record. With `max_concurrency == 1` packages run one at a time in
//! resolved order; larger values dispatch independent packages in parallel
//! (see `schedule.rs`).

mod schedule;
mod single_flight;

use crate::agent::{AgentClient, CompilePackageRequest, Dependencies, DependencyPackage};
use crate::blobstore::Blobstore;
use crate::error::{RelprovError, RelprovResult};
use crate::eventlog::{Log, Stage};
use crate::release::{Package, PackageId, Release};
use crate::repo::{
    CompiledPackageRecord, CompiledPackageRepository, PackageRecord, PackageRepository, RecordKey,
};
use single_flight::KeyedLocks;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, info_span, Instrument};

/// Tuning for a compiler instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompilerOptions {
    /// Deadline for each agent or blobstore call
    pub call_timeout: Duration,
    /// Packages compiled at once; 1 means strictly sequential
    pub max_concurrency: usize,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(3600),
            max_concurrency: 1,
        }
    }
}

/// Compiles release packages on an agent
pub struct PackagesCompiler {
    agent: Arc<dyn AgentClient>,
    packages_repo: Arc<PackageRepository>,
    compiled_packages_repo: Arc<CompiledPackageRepository>,
    blobstore: Arc<dyn Blobstore>,
    event_log: Log,
    options: CompilerOptions,
    in_flight: Arc<KeyedLocks<RecordKey>>,
}

impl PackagesCompiler {
    pub fn new(
        agent: Arc<dyn AgentClient>,
        packages_repo: Arc<PackageRepository>,
        compiled_packages_repo: Arc<CompiledPackageRepository>,
        blobstore: Arc<dyn Blobstore>,
        event_log: Log,
        options: CompilerOptions,
    ) -> Self {
        Self::with_in_flight(
            agent,
            packages_repo,
            compiled_packages_repo,
            blobstore,
            event_log,
            options,
            Arc::new(KeyedLocks::new()),
        )
    }

    /// Compiler sharing its per-package locks with other compilers
    fn with_in_flight(
        agent: Arc<dyn AgentClient>,
        packages_repo: Arc<PackageRepository>,
        compiled_packages_repo: Arc<CompiledPackageRepository>,
        blobstore: Arc<dyn Blobstore>,
        event_log: Log,
        options: CompilerOptions,
        in_flight: Arc<KeyedLocks<RecordKey>>,
    ) -> Self {
        Self {
            agent,
            packages_repo,
            compiled_packages_repo,
            blobstore,
            event_log,
            options: CompilerOptions {
                max_concurrency: options.max_concurrency.max(1),
                ..options
            },
            in_flight,
        }
    }

    /// Upload every precompiled package and record it as compiled.
    ///
    /// Always re-uploads and overwrites: precompiled packages shipped with
    /// the release are authoritative.
    pub async fn apply_precompiled_packages(&self, release: &Release) -> RelprovResult<()> {
        for pkg in release.compiled_packages() {
            info!("Applying precompiled package {}", pkg);

            let blob = self
                .with_timeout(
                    format!("uploading compiled package {}", pkg),
                    self.blobstore.create(&pkg.archive_path),
                )
                .await
                .map_err(|e| e.with_package("Creating compiled package blob", &pkg.name))?;

            self.compiled_packages_repo
                .save(pkg, &CompiledPackageRecord::from(blob))
                .await
                .map_err(|e| e.with_package("Saving compiled package", &pkg.name))?;
        }

        Ok(())
    }

    /// Compile every package of a release, dependencies first.
    ///
    /// All packages are compiled whether or not they are used later. Stops at
    /// the first failure and returns it.
    pub async fn compile(&self, release: &Release) -> RelprovResult<()> {
        let order = release.resolved_package_dependencies();
        let stage = self
            .event_log
            .begin_stage(format!("Compiling release {}", release), order.len());

        let span = info_span!("compile", release = %release);
        async {
            info!("Compiling {} packages", order.len());
            if self.options.max_concurrency == 1 {
                for id in order {
                    self.compile_in_stage(&stage, release, *id).await?;
                }
                Ok(())
            } else {
                self.compile_concurrently(&stage, release, order).await
            }
        }
        .instrument(span)
        .await
    }

    /// Compiled record of a package expected to be compiled already
    pub async fn find_compiled_package(&self, pkg: &Package) -> RelprovResult<CompiledPackageRecord> {
        self.compiled_packages_repo
            .find(pkg)
            .await
            .map_err(|e| e.with_package("Finding compiled package", &pkg.name))?
            .ok_or_else(|| RelprovError::CompiledPackageMissing(pkg.name.clone()))
    }

    /// One package as one task of the stage: cache hit or compile
    async fn compile_in_stage(
        &self,
        stage: &Stage,
        release: &Release,
        id: PackageId,
    ) -> RelprovResult<()> {
        let pkg = release.package(id);
        let task = stage.begin_task(format!("Package {}", pkg));

        // Serializes attempts on the same package across concurrent compiles;
        // a waiter sees the winner's record below.
        let _flight = self.in_flight.lock(RecordKey::for_package(pkg)).await;

        match self.compiled_packages_repo.find(pkg).await {
            Err(e) => task.end(Err(e.with_package("Finding compiled package", &pkg.name))),
            Ok(Some(_)) => {
                debug!("Package {} already compiled", pkg);
                task.end(Ok(()))
            }
            Ok(None) => task.end(
                self.compile_pkg(release, id)
                    .instrument(info_span!("package", package = %pkg))
                    .await,
            ),
        }
    }

    /// Compile one package. Assumes its dependencies are already compiled.
    async fn compile_pkg(&self, release: &Release, id: PackageId) -> RelprovResult<()> {
        let pkg = release.package(id);
        debug!("Preparing to compile package {}", pkg);

        let source = self.find_or_create_source(pkg).await?;
        let dependencies = self.build_pkg_deps(release, id).await?;

        let request = CompilePackageRequest {
            source: source.blob(),
            name: pkg.name.clone(),
            version: pkg.version.clone(),
            dependencies,
        };

        let compiled = self
            .with_timeout(
                format!("compiling package {}", pkg),
                self.agent.compile_package(&request),
            )
            .await
            .map_err(|e| e.with_package("Compiling package", &pkg.name))?;

        self.compiled_packages_repo
            .save(pkg, &CompiledPackageRecord::from(compiled))
            .await
            .map_err(|e| e.with_package("Saving compiled package", &pkg.name))?;

        info!("Compiled package {}", pkg);
        Ok(())
    }

    /// Source record for a package, uploading the archive on first use
    async fn find_or_create_source(&self, pkg: &Package) -> RelprovResult<PackageRecord> {
        let found = self
            .packages_repo
            .find(pkg)
            .await
            .map_err(|e| e.with_package("Finding package source blob", &pkg.name))?;

        if let Some(record) = found {
            return Ok(record);
        }

        let blob = self
            .with_timeout(
                format!("uploading package source {}", pkg),
                self.blobstore.create(&pkg.archive_path),
            )
            .await
            .map_err(|e| e.with_package("Creating package source blob", &pkg.name))?;

        let record = PackageRecord::from(blob);
        self.packages_repo
            .save(pkg, &record)
            .await
            .map_err(|e| e.with_package("Saving package record", &pkg.name))?;

        Ok(record)
    }

    /// Compiled dependencies for the agent's compile call.
    ///
    /// A missing dependency record means ordering was violated or the store
    /// was changed underneath us; it is never treated as a cache miss.
    async fn build_pkg_deps(&self, release: &Release, id: PackageId) -> RelprovResult<Dependencies> {
        let pkg = release.package(id);
        let mut deps = Dependencies::new();

        for dep in release.dependencies(id).into_iter().map(|d| release.package(d)) {
            let record = self
                .compiled_packages_repo
                .find(dep)
                .await
                .map_err(|e| e.with_package("Finding compiled package", &dep.name))?
                .ok_or_else(|| RelprovError::ConsistencyViolation {
                    package: pkg.name.clone(),
                    dependency: dep.name.clone(),
                })?;

            deps.insert(
                dep.name.clone(),
                DependencyPackage {
                    name: dep.name.clone(),
                    version: dep.version.clone(),
                    blob_id: record.blob_id,
                    fingerprint: record.fingerprint,
                },
            );
        }

        Ok(deps)
    }

    async fn with_timeout<T>(
        &self,
        operation: String,
        call: impl Future<Output = RelprovResult<T>>,
    ) -> RelprovResult<T> {
        match tokio::time::timeout(self.options.call_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(RelprovError::Timeout {
                operation,
                after: self.options.call_timeout,
            }),
        }
    }
}

/// Builds compilers once the agent for a target is known
///
/// Compilers from one factory share their per-package locks, so a package is
/// compiled at most once at a time across all of them.
#[derive(Clone)]
pub struct PackagesCompilerFactory {
    packages_repo: Arc<PackageRepository>,
    compiled_packages_repo: Arc<CompiledPackageRepository>,
    blobstore: Arc<dyn Blobstore>,
    event_log: Log,
    options: CompilerOptions,
    in_flight: Arc<KeyedLocks<RecordKey>>,
}

impl PackagesCompilerFactory {
    pub fn new(
        packages_repo: Arc<PackageRepository>,
        compiled_packages_repo: Arc<CompiledPackageRepository>,
        blobstore: Arc<dyn Blobstore>,
        event_log: Log,
        options: CompilerOptions,
    ) -> Self {
        Self {
            packages_repo,
            compiled_packages_repo,
            blobstore,
            event_log,
            options,
            in_flight: Arc::new(KeyedLocks::new()),
        }
    }

    pub fn new_compiler(&self, agent: Arc<dyn AgentClient>) -> PackagesCompiler {
        PackagesCompiler::with_in_flight(
            agent,
            self.packages_repo.clone(),
            self.compiled_packages_repo.clone(),
            self.blobstore.clone(),
            self.event_log.clone(),
            self.options,
            self.in_flight.clone(),
        )
    }

    /// Read-only access to compiled records, no agent required
    pub async fn find_compiled_package(&self, pkg: &Package) -> RelprovResult<CompiledPackageRecord> {
        self.compiled_packages_repo
            .find(pkg)
            .await
            .map_err(|e| e.with_package("Finding compiled package", &pkg.name))?
            .ok_or_else(|| RelprovError::CompiledPackageMissing(pkg.name.clone()))
    }
}
