// ABOUTME: CLI argument parsing and command routing for canvas
//
// Thin surface over the library:
// - Repository discovery and inspection (scan, status, diff, branches, commit)
// - Transfers run as registry tasks (clone, push)
// - Account management (login, logout, whoami, repos)

pub mod account;
pub mod repos;
pub mod transfer;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Git clone/push orchestration, change-set inspection and account verification
#[derive(Parser)]
#[command(name = "canvas")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Find git repositories under a directory
    Scan(ScanArgs),

    /// Show staged, modified and new files of a repository
    Status(StatusArgs),

    /// Show the diff of one file
    Diff(DiffArgs),

    /// List local branches
    Branches(RepoArgs),

    /// Stage everything and commit
    Commit(CommitArgs),

    /// Clone a repository (shallow by default)
    Clone(CloneArgs),

    /// Push a branch to origin
    Push(PushArgs),

    /// Verify and store credentials for the remote host
    Login(LoginArgs),

    /// Forget stored credentials
    Logout,

    /// Show the verified profile of the stored credentials
    Whoami,

    /// List repositories of the stored account
    Repos,
}

#[derive(clap::Args)]
pub struct ScanArgs {
    /// Directory to scan
    #[arg(default_value = ".")]
    pub root: PathBuf,

    /// Maximum directory depth (overrides config)
    #[arg(long)]
    pub max_depth: Option<usize>,

    /// Follow symlinked directories
    #[arg(long)]
    pub follow_symlinks: bool,
}

#[derive(clap::Args)]
pub struct RepoArgs {
    /// Repository root
    #[arg(default_value = ".")]
    pub repo: PathBuf,
}

#[derive(clap::Args)]
pub struct StatusArgs {
    /// Repository root
    #[arg(default_value = ".")]
    pub repo: PathBuf,

    /// Print each file's annotated diff
    #[arg(long, short)]
    pub diff: bool,
}

#[derive(clap::Args)]
pub struct DiffArgs {
    /// File path relative to the repository root
    pub path: String,

    /// Compare the index against HEAD instead of the working tree against the index
    #[arg(long)]
    pub cached: bool,

    /// Repository root
    #[arg(long, default_value = ".")]
    pub repo: PathBuf,
}

#[derive(clap::Args)]
pub struct CommitArgs {
    /// Commit message
    #[arg(long, short)]
    pub message: String,

    /// Repository root
    #[arg(default_value = ".")]
    pub repo: PathBuf,
}

#[derive(clap::Args)]
pub struct CloneArgs {
    /// Repository URL
    pub url: String,

    /// Parent directory for the clone (defaults to the current directory)
    #[arg(long)]
    pub into: Option<PathBuf>,

    /// Remove an existing destination first
    #[arg(long)]
    pub overwrite: bool,

    /// History depth, 0 for full history (overrides config)
    #[arg(long)]
    pub depth: Option<u32>,

    /// Branch to check out
    #[arg(long, short)]
    pub branch: Option<String>,
}

#[derive(clap::Args)]
pub struct PushArgs {
    /// Repository root
    #[arg(default_value = ".")]
    pub repo: PathBuf,

    /// Branch to push (defaults to the current branch)
    #[arg(long, short)]
    pub branch: Option<String>,

    /// Force-push (rewrites remote history)
    #[arg(long)]
    pub force: bool,

    /// Delete the branch on the remote
    #[arg(long)]
    pub delete: bool,

    /// Confirm a destructive push
    #[arg(long, short)]
    pub yes: bool,
}

#[derive(clap::Args)]
pub struct LoginArgs {
    /// Account username
    #[arg(long, short)]
    pub username: String,

    /// Personal access token (read from CANVAS_TOKEN or stdin when omitted)
    #[arg(long, env = "CANVAS_TOKEN", hide_env_values = true)]
    pub token: Option<String>,
}
