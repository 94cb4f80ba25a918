// ABOUTME: CLI clone and push commands - run as registry tasks with live progress on stderr
//
// Destructive pushes (--force, --delete) require --yes; this is the confirmation boundary.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use tracing::{info, warn};

use super::repos::open_repository;
use super::{CloneArgs, PushArgs};
use crate::config::AppConfig;
use crate::credentials::store_from_config;
use crate::git::current_branch;
use crate::tasks::{
    clone_destination, format_rate, prepare_destination, CloneOptions, CloneTask, GitInvocation,
    PushOptions, PushTask, TaskEvent, TaskHandle, TaskProgress, TaskRegistry, TaskResult,
};

pub async fn clone(args: CloneArgs, config: &AppConfig, registry: &Arc<TaskRegistry>) -> Result<()> {
    let parent = match args.into {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to read current directory")?,
    };
    let destination = clone_destination(&parent, &args.url)
        .ok_or_else(|| anyhow!("Cannot derive a directory name from {}", args.url))?;

    if destination.exists() {
        if !args.overwrite {
            bail!(
                "{} already exists; pass --overwrite to replace it",
                destination.display()
            );
        }
        prepare_destination(&destination)?;
    }

    let mut options = CloneOptions::from_transport(&config.transport);
    if let Some(depth) = args.depth {
        options.depth = depth;
    }
    if let Some(branch) = args.branch {
        options = options.with_branch(branch);
    }

    let task = CloneTask::new(args.url, destination.clone(), options, invocation(config));
    let handle = task.start(registry);
    eprintln!("Cloning into {}", destination.display());

    let result = follow(registry, handle).await?;
    finish(result, Some(destination))
}

pub async fn push(args: PushArgs, config: &AppConfig, registry: &Arc<TaskRegistry>) -> Result<()> {
    let options = PushOptions {
        force: args.force,
        delete_remote: args.delete,
    };
    if options.is_destructive() && !args.yes {
        bail!("--force and --delete rewrite or remove remote history; re-run with --yes to confirm");
    }

    let repo = open_repository(&args.repo)?;
    let branch = match args.branch {
        Some(branch) => branch,
        None => current_branch(&repo)?
            .ok_or_else(|| anyhow!("HEAD is detached; pass --branch"))?,
    };

    let handle = PushTask::new(&repo, branch, options, invocation(config)).start(registry);
    let result = follow(registry, handle).await?;
    finish(result, None)
}

/// Task environment with stored credentials attached when available
fn invocation(config: &AppConfig) -> GitInvocation {
    let invocation = GitInvocation::from_config(config);

    match store_from_config(&config.credentials).load() {
        Ok(Some(credential)) => {
            info!(username = %credential.username, "Using stored credentials for transport");
            invocation.with_credential(credential)
        }
        Ok(None) => invocation,
        Err(e) => {
            warn!(error = %e, "Could not load stored credentials, continuing unauthenticated");
            invocation
        }
    }
}

/// Print progress until the task finishes; Ctrl-C cancels it
async fn follow(registry: &Arc<TaskRegistry>, handle: TaskHandle) -> Result<TaskResult> {
    let mut subscription = registry.subscribe(handle)?;
    let mut cancel_requested = false;

    loop {
        tokio::select! {
            event = subscription.next() => match event {
                Some(TaskEvent::Progress(progress)) => print_progress(&progress),
                Some(TaskEvent::Finished(result)) => {
                    eprintln!();
                    return Ok(result);
                }
                None => return registry.wait(handle).await.map_err(Into::into),
            },
            _ = tokio::signal::ctrl_c(), if !cancel_requested => {
                eprintln!("\nCancelling...");
                cancel_requested = true;
                registry.cancel(handle)?;
            }
        }
    }
}

fn print_progress(progress: &TaskProgress) {
    let rate = progress
        .bytes_per_sec
        .map(format_rate)
        .unwrap_or_default();
    let mut stderr = std::io::stderr();
    let _ = write!(stderr, "\r\x1b[2K{}  {rate}", progress.status);
    let _ = stderr.flush();
}

fn finish(result: TaskResult, destination: Option<PathBuf>) -> Result<()> {
    if result.success {
        println!("{}", result.message);
        if let Some(destination) = destination {
            println!("{}", destination.display());
        }
        Ok(())
    } else {
        Err(anyhow!(result.message))
    }
}
