//! Compile command - compile a release's packages on the agent

use crate::agent::HttpAgentClient;
use crate::cli::args::CompileArgs;
use crate::config::{Config, ConfigManager};
use crate::error::RelprovResult;
use crate::release::ReleaseManifest;
use console::style;
use std::sync::Arc;
use tracing::info;

/// Execute the compile command
pub async fn execute(args: CompileArgs, config: &Config) -> RelprovResult<()> {
    let release = ReleaseManifest::load_release(&args.manifest).await?;
    info!(
        "Loaded release {} with {} packages",
        release,
        release.package_count()
    );

    ConfigManager::ensure_dirs(config).await?;

    let url = args.agent_url.as_deref().unwrap_or(&config.agent.url);
    let agent = Arc::new(HttpAgentClient::new(
        url,
        config.agent.timeout(),
        config.agent.poll_interval(),
    ));

    let jobs = args.jobs.unwrap_or(config.compiler.max_concurrency);
    let compiler = super::compiler_factory(config, jobs).new_compiler(agent);

    if !args.skip_precompiled {
        compiler.apply_precompiled_packages(&release).await?;
    }
    compiler.compile(&release).await?;

    eprintln!(
        "{} Compiled release {}",
        style("✓").green(),
        style(&release).bold()
    );
    Ok(())
}
