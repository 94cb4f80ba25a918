// ABOUTME: CLI repository commands - scan, status, diff, branches, commit

use anyhow::{anyhow, Context, Result};
use serde::Serialize;

use super::{CommitArgs, DiffArgs, OutputFormat, RepoArgs, ScanArgs, StatusArgs};
use crate::config::AppConfig;
use crate::git::{commit_all, list_branches, ChangeSetAnalyzer, DiffSide, RepoScanner};
use crate::models::{ChangeSetSummary, FileChange, RepositoryRef};

/// Resolve a repository root argument
pub fn open_repository(path: &std::path::Path) -> Result<RepositoryRef> {
    RepositoryRef::discover(path)
        .ok_or_else(|| anyhow!("{} is not a git repository root", path.display()))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn scan(args: &ScanArgs, config: &AppConfig, format: OutputFormat) -> Result<()> {
    let mut scanner =
        RepoScanner::from_config(&config.scanner).with_follow_symlinks(args.follow_symlinks);
    if let Some(depth) = args.max_depth {
        scanner = scanner.with_max_depth(depth);
    }

    let repos = scanner.scan(&args.root);

    match format {
        OutputFormat::Json => print_json(&repos)?,
        OutputFormat::Text => {
            if repos.is_empty() {
                println!("No repositories found under {}", args.root.display());
            }
            for repo in &repos {
                println!("{:<30} {}", repo.name(), repo.root().display());
            }
        }
    }

    Ok(())
}

pub async fn status(args: &StatusArgs, format: OutputFormat) -> Result<()> {
    let repo = open_repository(&args.repo)?;
    let summary = ChangeSetAnalyzer::new()
        .analyze_on_worker(repo.clone())
        .await
        .with_context(|| format!("Failed to analyze {}", repo.root().display()))?;

    match format {
        OutputFormat::Json => print_json(&summary)?,
        OutputFormat::Text => print_summary(&repo, &summary, args.diff),
    }

    Ok(())
}

fn print_summary(repo: &RepositoryRef, summary: &ChangeSetSummary, with_diff: bool) {
    let counts = summary.counts();
    println!(
        "{}: {} staged, {} modified, {} deleted, {} new",
        repo.name(),
        counts.staged,
        counts.modified,
        counts.deleted,
        counts.new
    );

    if summary.is_empty() {
        println!("Working tree clean");
        return;
    }

    for change in summary.changes() {
        println!("{}", change_line(change));
        if with_diff && !change.diff.is_empty() {
            println!("{}", change.diff.annotated());
        }
    }
}

fn change_line(change: &FileChange) -> String {
    let detail = if change.binary {
        "binary".to_string()
    } else {
        format!("{} lines", change.lines_affected)
    };
    format!("  {:<9} {} ({detail})", change.kind.label(), change.path)
}

pub fn diff(args: &DiffArgs, format: OutputFormat) -> Result<()> {
    let repo = open_repository(&args.repo)?;
    let side = if args.cached {
        DiffSide::Index
    } else {
        DiffSide::WorkingTree
    };

    let change = ChangeSetAnalyzer::new().file_diff(&repo, &args.path, side)?;

    match (format, change) {
        (OutputFormat::Json, change) => print_json(&change)?,
        (OutputFormat::Text, None) => println!("No changes in {}", args.path),
        (OutputFormat::Text, Some(change)) if change.binary => {
            println!("Binary file {} differs", change.path);
        }
        (OutputFormat::Text, Some(change)) => print!("{}", change.diff.annotated()),
    }

    Ok(())
}

pub fn branches(args: &RepoArgs, format: OutputFormat) -> Result<()> {
    let repo = open_repository(&args.repo)?;
    let branches = list_branches(&repo)?;

    match format {
        OutputFormat::Json => print_json(&branches)?,
        OutputFormat::Text => {
            for branch in &branches {
                let marker = if branch.is_current { "*" } else { " " };
                println!("{marker} {}", branch.name);
            }
        }
    }

    Ok(())
}

pub fn commit(args: &CommitArgs) -> Result<()> {
    let repo = open_repository(&args.repo)?;
    let id = commit_all(&repo, &args.message)?;
    println!("Committed {}", &id[..id.len().min(8)]);
    Ok(())
}
