//! End-to-end compiler scenarios against file-backed repositories

use async_trait::async_trait;
use proptest::prelude::*;
use relprov::agent::{AgentClient, CompilePackageRequest};
use relprov::blobstore::{BlobRef, Blobstore};
use relprov::compiler::{CompilerOptions, PackagesCompiler, PackagesCompilerFactory};
use relprov::error::{ErrorKind, RelprovError, RelprovResult};
use relprov::eventlog::{DeviceType, Factory, LogEntry, TaskState};
use relprov::release::{PackageSpec, Release, ReleaseBuilder};
use relprov::repo::{CompiledPackageRecord, JsonFileRepository, PackageRecord, RecordRepository};
use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Agent that records calls and checks dependencies were compiled first
#[derive(Default)]
struct RecordingAgent {
    calls: Mutex<Vec<String>>,
    completed: Mutex<HashSet<String>>,
    fail_on: Mutex<Option<String>>,
    delay: Duration,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl RecordingAgent {
    fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    fn fail_on(&self, name: Option<&str>) {
        *self.fail_on.lock().unwrap() = name.map(String::from);
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl AgentClient for RecordingAgent {
    async fn compile_package(&self, request: &CompilePackageRequest) -> RelprovResult<BlobRef> {
        self.calls.lock().unwrap().push(request.name.clone());
        if self.fail_on.lock().unwrap().as_deref() == Some(request.name.as_str()) {
            return Err(RelprovError::AgentTask(format!("make {} failed", request.name)));
        }
        {
            let completed = self.completed.lock().unwrap();
            for dep in request.dependencies.keys() {
                assert!(completed.contains(dep), "{} compiled before {}", request.name, dep);
            }
        }

        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        self.completed.lock().unwrap().insert(request.name.clone());
        Ok(BlobRef::new(
            format!("compiled-{}", request.name),
            format!("sha-{}", request.name),
        ))
    }

    async fn stop(&self) -> RelprovResult<String> {
        Ok("stopped".to_string())
    }

    async fn post_start(&self) -> RelprovResult<String> {
        Ok("executed".to_string())
    }
}

#[derive(Default)]
struct CountingBlobstore {
    uploads: Mutex<Vec<PathBuf>>,
}

#[async_trait]
impl Blobstore for CountingBlobstore {
    async fn create(&self, path: &Path) -> RelprovResult<BlobRef> {
        let mut uploads = self.uploads.lock().unwrap();
        uploads.push(path.to_path_buf());
        Ok(BlobRef::new(format!("blob-{}", uploads.len()), "sha"))
    }

    async fn get(&self, blob: &BlobRef) -> RelprovResult<PathBuf> {
        Err(RelprovError::blobstore("get", format!("{} not stored", blob.blob_id)))
    }
}

#[derive(Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl SharedBuffer {
    fn entries(&self) -> Vec<LogEntry> {
        let bytes = self.0.lock().unwrap();
        String::from_utf8_lossy(&bytes)
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }
}

struct Env {
    temp: TempDir,
    agent: Arc<RecordingAgent>,
    blobstore: Arc<CountingBlobstore>,
    compiled: Arc<JsonFileRepository<CompiledPackageRecord>>,
    events: SharedBuffer,
    compiler: PackagesCompiler,
}

fn env(agent: RecordingAgent, max_concurrency: usize) -> Env {
    let temp = TempDir::new().unwrap();
    let agent = Arc::new(agent);
    let blobstore = Arc::new(CountingBlobstore::default());
    let packages: Arc<JsonFileRepository<PackageRecord>> =
        Arc::new(JsonFileRepository::new(temp.path().join("packages")));
    let compiled = Arc::new(JsonFileRepository::new(temp.path().join("compiled_packages")));
    let events = SharedBuffer::default();

    let compiler = PackagesCompiler::new(
        agent.clone(),
        packages,
        compiled.clone(),
        blobstore.clone(),
        Factory::new(DeviceType::Json).new_log_with_writer(events.clone()),
        CompilerOptions {
            call_timeout: Duration::from_secs(30),
            max_concurrency,
        },
    );

    Env {
        temp,
        agent,
        blobstore,
        compiled,
        events,
        compiler,
    }
}

fn pkg(name: &str, deps: &[&str]) -> PackageSpec {
    PackageSpec::new(name, "1.0", format!("/src/{name}.tgz"), format!("fp-{name}")).with_dependencies(deps)
}

fn app_release() -> Release {
    ReleaseBuilder::new("app", "1.0")
        .package(pkg("base", &[]))
        .package(pkg("web", &["base"]))
        .build()
        .unwrap()
}

/// root <- m0..m5 <- top
fn wide_release() -> Release {
    let middle: Vec<String> = (0..6).map(|i| format!("m{i}")).collect();
    let mut builder = ReleaseBuilder::new("wide", "1").package(pkg("root", &[]));
    for name in &middle {
        builder = builder.package(pkg(name, &["root"]));
    }
    let middle: Vec<&str> = middle.iter().map(String::as_str).collect();
    builder.package(pkg("top", &middle)).build().unwrap()
}

/// p1 <- p2 <- ... <- p5
fn chain_release() -> Release {
    let mut builder = ReleaseBuilder::new("chain", "1").package(pkg("p1", &[]));
    for i in 2..=5 {
        let prev = format!("p{}", i - 1);
        builder = builder.package(pkg(&format!("p{i}"), &[prev.as_str()]));
    }
    builder.build().unwrap()
}

#[tokio::test]
async fn app_release_end_to_end() {
    let env = env(RecordingAgent::default(), 1);
    let release = app_release();

    env.compiler.compile(&release).await.unwrap();
    assert_eq!(env.agent.calls(), vec!["base", "web"]);

    let web = release.find_by_name("web").unwrap();
    let record = env.compiler.find_compiled_package(web).await.unwrap();
    assert_eq!(record.blob_id, "compiled-web");
    assert_eq!(env.compiled.entries().await.unwrap().len(), 2);
}

#[tokio::test]
async fn recompile_is_idempotent() {
    let env = env(RecordingAgent::default(), 1);
    let release = app_release();

    env.compiler.compile(&release).await.unwrap();
    let before = env.compiled.entries().await.unwrap();
    let uploads = env.blobstore.uploads.lock().unwrap().len();

    env.compiler.compile(&release).await.unwrap();

    assert_eq!(env.agent.calls().len(), 2);
    assert_eq!(env.compiled.entries().await.unwrap(), before);
    assert_eq!(env.blobstore.uploads.lock().unwrap().len(), uploads);
}

#[tokio::test]
async fn failed_package_is_retried_alone() {
    let env = env(RecordingAgent::default(), 1);
    let release = app_release();
    env.agent.fail_on(Some("web"));

    let err = env.compiler.compile(&release).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UpstreamCompile);
    assert!(err.to_string().starts_with("Compiling package web"));

    let base = release.find_by_name("base").unwrap();
    assert!(env.compiled.find(base).await.unwrap().is_some());

    env.agent.fail_on(None);
    env.compiler.compile(&release).await.unwrap();
    assert_eq!(env.agent.calls(), vec!["base", "web", "web"]);
}

#[tokio::test]
async fn resumes_from_failed_package() {
    let env = env(RecordingAgent::default(), 1);
    let release = chain_release();
    env.agent.fail_on(Some("p3"));

    assert!(env.compiler.compile(&release).await.is_err());
    assert_eq!(env.agent.calls(), vec!["p1", "p2", "p3"]);

    env.agent.fail_on(None);
    env.compiler.compile(&release).await.unwrap();
    assert_eq!(env.agent.calls(), vec!["p1", "p2", "p3", "p3", "p4", "p5"]);
}

#[tokio::test]
async fn precompiled_packages_then_compile() {
    let env = env(RecordingAgent::default(), 1);
    let release = ReleaseBuilder::new("app", "1.0")
        .package(pkg("base", &[]))
        .compiled_package(pkg("tool", &[]))
        .build()
        .unwrap();

    env.compiler.apply_precompiled_packages(&release).await.unwrap();
    env.compiler.compile(&release).await.unwrap();

    let tool = &release.compiled_packages()[0];
    let record = env.compiler.find_compiled_package(tool).await.unwrap();
    assert_eq!(record.blob_id, "blob-1");
    assert_eq!(env.agent.calls(), vec!["base"]);
}

#[tokio::test]
async fn event_log_reports_each_package() {
    let env = env(RecordingAgent::default(), 1);
    env.compiler.compile(&app_release()).await.unwrap();

    let entries = env.events.entries();
    assert_eq!(entries.len(), 4);
    assert!(entries.iter().all(|e| e.total == 2));
    assert!(entries.iter().all(|e| e.stage == "Compiling release app/1.0"));

    let summary: Vec<(usize, TaskState, &str)> = entries
        .iter()
        .map(|e| (e.index, e.state, e.task.as_str()))
        .collect();
    assert_eq!(
        summary,
        vec![
            (0, TaskState::Started, "Package base/1.0"),
            (0, TaskState::Finished, "Package base/1.0"),
            (1, TaskState::Started, "Package web/1.0"),
            (1, TaskState::Finished, "Package web/1.0"),
        ]
    );
}

#[tokio::test]
async fn concurrent_scheduler_respects_bound_and_order() {
    let env = env(RecordingAgent::with_delay(Duration::from_millis(20)), 3);
    let release = wide_release();

    env.compiler.compile(&release).await.unwrap();

    let calls = env.agent.calls();
    assert_eq!(calls.len(), 8);
    assert_eq!(calls.first().map(String::as_str), Some("root"));
    assert_eq!(calls.last().map(String::as_str), Some("top"));

    let max = env.agent.max_active.load(Ordering::SeqCst);
    assert!(max > 1, "expected parallel compiles, saw {max}");
    assert!(max <= 3, "concurrency bound exceeded: {max}");
}

#[tokio::test]
async fn concurrent_scheduler_stops_on_failure() {
    let env = env(RecordingAgent::default(), 4);
    env.agent.fail_on(Some("root"));

    let err = env.compiler.compile(&wide_release()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UpstreamCompile);
    assert_eq!(env.agent.calls(), vec!["root"]);
}

#[tokio::test]
async fn failure_closes_tasks_of_cancelled_siblings() {
    let env = env(RecordingAgent::with_delay(Duration::from_millis(500)), 3);
    env.agent.fail_on(Some("b"));
    let release = ReleaseBuilder::new("flat", "1")
        .package(pkg("a", &[]))
        .package(pkg("b", &[]))
        .package(pkg("c", &[]))
        .package(pkg("d", &[]))
        .build()
        .unwrap();

    let err = env.compiler.compile(&release).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UpstreamCompile);

    let entries = env.events.entries();
    let started: Vec<&LogEntry> = entries
        .iter()
        .filter(|e| e.state == TaskState::Started)
        .collect();
    assert_eq!(started.len(), 3);

    for start in started {
        let ends: Vec<&LogEntry> = entries
            .iter()
            .filter(|e| e.index == start.index && e.state.is_terminal())
            .collect();
        assert_eq!(ends.len(), 1, "task {} has no single terminal entry", start.task);
        assert_eq!(ends[0].state, TaskState::Failed);

        let error = &ends[0].data.as_ref().unwrap()["error"];
        if start.task == "Package b/1.0" {
            assert!(error.as_str().unwrap().contains("make b failed"));
        } else {
            assert_eq!(error, &serde_json::json!("cancelled"));
        }
    }
}

#[tokio::test]
async fn storage_failure_surfaces_through_compile() {
    let env = env(RecordingAgent::default(), 1);
    std::fs::write(env.temp.path().join("compiled_packages"), b"not a directory").unwrap();

    let err = env.compiler.compile(&app_release()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Storage);
    assert!(err.is_retryable());
    assert!(err.to_string().starts_with("Finding compiled package base"));
    assert!(env.agent.calls().is_empty());
}

#[tokio::test]
async fn compilers_from_one_factory_share_in_flight_work() {
    let temp = TempDir::new().unwrap();
    let agent = Arc::new(RecordingAgent::with_delay(Duration::from_millis(30)));
    let packages: Arc<JsonFileRepository<PackageRecord>> =
        Arc::new(JsonFileRepository::new(temp.path().join("packages")));
    let compiled: Arc<JsonFileRepository<CompiledPackageRecord>> =
        Arc::new(JsonFileRepository::new(temp.path().join("compiled_packages")));
    let factory = PackagesCompilerFactory::new(
        packages,
        compiled,
        Arc::new(CountingBlobstore::default()),
        Factory::new(DeviceType::Json).new_log_with_writer(SharedBuffer::default()),
        CompilerOptions::default(),
    );
    let release = ReleaseBuilder::new("app", "1.0")
        .package(pkg("base", &[]))
        .build()
        .unwrap();

    let first = factory.new_compiler(agent.clone());
    let second = factory.new_compiler(agent.clone());
    let (a, b) = tokio::join!(first.compile(&release), second.compile(&release));
    a.unwrap();
    b.unwrap();

    assert_eq!(agent.calls(), vec!["base"]);
}

#[tokio::test]
async fn concurrent_compiles_share_work() {
    let env = env(RecordingAgent::with_delay(Duration::from_millis(10)), 1);
    let release = app_release();

    let (a, b) = tokio::join!(
        env.compiler.compile(&release),
        env.compiler.compile(&release)
    );
    a.unwrap();
    b.unwrap();

    assert_eq!(env.agent.calls(), vec!["base", "web"]);
}

fn arb_dag() -> impl Strategy<Value = (Vec<Vec<usize>>, Vec<usize>)> {
    (1usize..12).prop_flat_map(|n| {
        (
            prop::collection::vec(prop::collection::vec(any::<usize>(), 0..4), n),
            Just((0..n).collect::<Vec<_>>()).prop_shuffle(),
        )
    })
}

/// Node `i` may only depend on nodes below it, then manifest order is shuffled
fn dag_release(edges: &[Vec<usize>], manifest_order: &[usize]) -> Release {
    let mut builder = ReleaseBuilder::new("dag", "1");
    for &i in manifest_order {
        let deps: Vec<String> = if i == 0 {
            vec![]
        } else {
            edges[i].iter().map(|d| format!("p{}", d % i)).collect()
        };
        builder = builder.package(pkg(&format!("p{i}"), &[]).with_dependencies(&deps));
    }
    builder.build().unwrap()
}

proptest! {
    #[test]
    fn resolved_order_follows_dependencies((edges, manifest_order) in arb_dag()) {
        let release = dag_release(&edges, &manifest_order);
        let order = release.resolved_package_dependencies();
        prop_assert_eq!(order.len(), release.package_count());

        let mut placed = HashSet::new();
        for id in order {
            let pkg = release.package(*id);
            for dep in release.dependencies(*id).into_iter().map(|d| release.package(d)) {
                prop_assert!(placed.contains(&dep.name), "{} before {}", pkg.name, dep.name);
            }
            placed.insert(pkg.name.clone());
        }
    }

    #[test]
    fn concurrent_compile_covers_random_dags(
        (edges, manifest_order) in arb_dag(),
        jobs in 1usize..5,
    ) {
        let release = dag_release(&edges, &manifest_order);
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap();

        let calls = runtime.block_on(async {
            let env = env(RecordingAgent::default(), jobs);
            env.compiler.compile(&release).await.unwrap();
            env.agent.calls()
        });

        let unique: HashSet<&String> = calls.iter().collect();
        prop_assert_eq!(calls.len(), release.package_count());
        prop_assert_eq!(unique.len(), calls.len());
    }
}
