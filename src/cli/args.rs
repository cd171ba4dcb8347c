//! CLI argument definitions using clap derive

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

/// relprov - release provisioner
///
/// Compiles release packages on a remote agent, caching compiled
/// artifacts so repeated runs only build what changed.
#[derive(Parser, Debug)]
#[command(name = "relprov")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "RELPROV_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compile every package of a release on the agent
    Compile(CompileArgs),

    /// Show the compiled record of a package
    Find(FindArgs),

    /// Drive instance lifecycle through the agent
    Agent(AgentArgs),

    /// Show or initialize configuration
    Config(ConfigArgs),
}

/// Arguments for the compile command
#[derive(Parser, Debug)]
pub struct CompileArgs {
    /// Release manifest (release.toml)
    #[arg(default_value = "release.toml")]
    pub manifest: PathBuf,

    /// Agent URL, overriding agent.url
    #[arg(long)]
    pub agent_url: Option<String>,

    /// Packages compiled at once, overriding compiler.max_concurrency
    #[arg(short = 'j', long)]
    pub jobs: Option<usize>,

    /// Skip uploading the release's precompiled packages
    #[arg(long)]
    pub skip_precompiled: bool,
}

/// Arguments for the find command
#[derive(Parser, Debug)]
pub struct FindArgs {
    /// Package name
    pub package: String,

    /// Release manifest (release.toml)
    #[arg(short, long, default_value = "release.toml")]
    pub manifest: PathBuf,

    /// Print the record as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the agent command
#[derive(Parser, Debug)]
pub struct AgentArgs {
    #[command(subcommand)]
    pub action: AgentAction,

    /// Agent URL, overriding agent.url
    #[arg(long, global = true)]
    pub agent_url: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum AgentAction {
    /// Stop all jobs on the instance
    Stop,

    /// Run post-start scripts on the instance
    PostStart,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}
