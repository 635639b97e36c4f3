//! appmap-watch: AppMap onboarding watcher for project folders.
//! Single-process binary embedding the agent registry, project watchers and
//! milestone views in-process.

use clap::Parser;

mod app;
mod cli;
mod cmd_action;
mod cmd_files;
mod cmd_languages;
mod cmd_status;
mod cmd_watch;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    let filter = std::env::var("APPMAP_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    let app = app::App::from_cli(&args);

    match &args.command {
        cli::Command::Watch(opts) => {
            tracing::info!("appmap-watch starting");
            cmd_watch::cmd_watch(&app, &opts.folders).await?;
        }
        cli::Command::Status(opts) => cmd_status::cmd_status(&app, &opts.folder).await?,
        cli::Command::Languages(opts) => cmd_languages::cmd_languages(&app, &opts.folder).await?,
        cli::Command::Files(opts) => {
            cmd_files::cmd_files(&app, &opts.folder, opts.language.as_deref()).await?
        }
        cli::Command::Action(opts) => cmd_action::cmd_action(&app, opts).await?,
    }

    Ok(())
}
