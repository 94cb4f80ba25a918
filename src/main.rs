// ABOUTME: Main entry point for the canvas CLI
//
// Binary: canvas
// Usage: canvas <COMMAND>
// - scan / status / diff / branches / commit: local repository inspection
// - clone / push: long-running transfers with progress, Ctrl-C cancels
// - login / logout / whoami / repos: remote account

#![allow(missing_docs)]

use anyhow::Result;
use clap::Parser;

use commit_canvas::cli::{self, Commands};
use commit_canvas::config::{app_dir, AppConfig};
use commit_canvas::tasks::TaskRegistry;

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging();
    setup_panic_handler();

    let args = cli::Cli::parse();
    let config = AppConfig::load()?;
    let format = args.format;

    let result = match args.command {
        Commands::Scan(scan_args) => cli::repos::scan(&scan_args, &config, format),
        Commands::Status(status_args) => cli::repos::status(&status_args, format).await,
        Commands::Diff(diff_args) => cli::repos::diff(&diff_args, format),
        Commands::Branches(repo_args) => cli::repos::branches(&repo_args, format),
        Commands::Commit(commit_args) => cli::repos::commit(&commit_args),
        Commands::Clone(clone_args) => {
            let registry = TaskRegistry::initialize(&config.tasks)?;
            cli::transfer::clone(clone_args, &config, &registry).await
        }
        Commands::Push(push_args) => {
            let registry = TaskRegistry::initialize(&config.tasks)?;
            cli::transfer::push(push_args, &config, &registry).await
        }
        Commands::Login(login_args) => cli::account::login(login_args, &config).await,
        Commands::Logout => cli::account::logout(&config),
        Commands::Whoami => cli::account::whoami(&config, format).await,
        Commands::Repos => cli::account::repos(&config, format).await,
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Command failed");
    }

    result
}

fn setup_logging() {
    use std::fs::OpenOptions;
    use tracing_subscriber::prelude::*;

    let log_dir = app_dir().join("logs");
    let _ = std::fs::create_dir_all(&log_dir);

    // JSONL log file with timestamp
    let log_file = log_dir.join(format!(
        "commit-canvas-{}.jsonl",
        chrono::Local::now().format("%Y%m%d-%H%M%S")
    ));

    let Ok(file) = OpenOptions::new().create(true).append(true).open(&log_file) else {
        eprintln!("Warning: could not open log file {}", log_file.display());
        return;
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_target(true)
                .with_writer(file)
                .with_ansi(false),
        )
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "commit_canvas=info".into()),
        )
        .init();
}

fn setup_panic_handler() {
    std::panic::set_hook(Box::new(|panic_info| {
        tracing::error!("Application panicked: {}", panic_info);
        eprintln!("Application panicked: {}", panic_info);
        eprintln!("Please check the logs for more details.");
    }));
}
