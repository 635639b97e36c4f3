//! CLI definition using clap derive.

use std::path::PathBuf;
use std::time::Duration;

use appmap_core::MilestoneId;
use appmap_watcher::{DEFAULT_POLL_INTERVAL, WatcherConfig};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "appmap-watch", about = "Track AppMap onboarding milestones for project folders")]
pub struct Cli {
    /// Delay between agent status polls, in milliseconds
    #[arg(long, global = true, env = "APPMAP_POLL_INTERVAL_MS", default_value_t = DEFAULT_POLL_INTERVAL.as_millis() as u64)]
    pub poll_interval_ms: u64,

    /// Kill agent commands that run longer than this many milliseconds
    #[arg(long, global = true, env = "APPMAP_COMMAND_TIMEOUT_MS")]
    pub command_timeout_ms: Option<u64>,

    /// Do not watch folders for new AppMap files
    #[arg(long, global = true)]
    pub no_file_watch: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn watcher_config(&self) -> WatcherConfig {
        WatcherConfig::default()
            .with_frequency(Duration::from_millis(self.poll_interval_ms))
            .with_command_timeout(self.command_timeout_ms.map(Duration::from_millis))
    }
}

#[derive(Subcommand)]
pub enum Command {
    /// Watch folders until interrupted, logging milestone progress
    Watch(WatchOpts),
    /// Print the agent's raw status JSON for a folder
    Status(FolderOpts),
    /// Print the detected language distribution for a folder
    Languages(FolderOpts),
    /// Print the configuration, test and AppMap paths the agent reports
    Files(FilesOpts),
    /// Perform a milestone action and print the resulting milestones
    Action(ActionOpts),
}

#[derive(clap::Args)]
pub struct WatchOpts {
    /// Project folders (default: current directory)
    pub folders: Vec<PathBuf>,
}

#[derive(clap::Args)]
pub struct FolderOpts {
    pub folder: PathBuf,
}

#[derive(clap::Args)]
pub struct FilesOpts {
    pub folder: PathBuf,

    /// Ask this language's agent instead of the detected one
    #[arg(long)]
    pub language: Option<String>,
}

#[derive(clap::Args)]
pub struct ActionOpts {
    pub folder: PathBuf,

    /// INSTALL_AGENT, CREATE_CONFIGURATION, RECORD_APPMAP or VIEW_APPMAP
    pub milestone: MilestoneId,

    /// Test command to record with (RECORD_APPMAP only)
    #[arg(long)]
    pub command: Option<String>,

    /// Override the detected project language before acting
    #[arg(long)]
    pub language: Option<String>,
}
