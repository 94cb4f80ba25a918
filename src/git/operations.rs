// ABOUTME: Repository operations supporting push - branch listing and commit-all

use git2::{BranchType, ErrorCode, IndexAddOption, Repository};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::models::RepositoryRef;

#[derive(Error, Debug)]
pub enum OperationError {
    #[error("Not a git repository: {0}")]
    NotARepository(String),

    #[error("Commit message cannot be empty")]
    EmptyMessage,

    #[error("No commit identity configured (set user.name and user.email)")]
    MissingIdentity,

    #[error("Git error: {0}")]
    Git(#[from] git2::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BranchInfo {
    pub name: String,
    pub is_current: bool,
}

fn open(repository: &RepositoryRef) -> Result<Repository, OperationError> {
    Repository::open(repository.root()).map_err(|e| {
        if e.code() == ErrorCode::NotFound {
            OperationError::NotARepository(repository.root().display().to_string())
        } else {
            OperationError::Git(e)
        }
    })
}

/// Local branches sorted by name, the checked-out one flagged
pub fn list_branches(repository: &RepositoryRef) -> Result<Vec<BranchInfo>, OperationError> {
    let repo = open(repository)?;
    let mut branches = Vec::new();

    for branch in repo.branches(Some(BranchType::Local))? {
        let (branch, _) = branch?;
        if let Some(name) = branch.name()? {
            branches.push(BranchInfo {
                name: name.to_string(),
                is_current: branch.is_head(),
            });
        }
    }

    branches.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(branches)
}

/// Name of the checked-out branch; unborn branches report their future name
pub fn current_branch(repository: &RepositoryRef) -> Result<Option<String>, OperationError> {
    let repo = open(repository)?;

    let branch = match repo.head() {
        Ok(head) if head.is_branch() => Ok(head.shorthand().map(str::to_string)),
        Ok(_) => Ok(None),
        Err(e) if e.code() == ErrorCode::UnbornBranch => {
            let head = repo.find_reference("HEAD")?;
            Ok(head
                .symbolic_target()
                .and_then(|target| target.strip_prefix("refs/heads/"))
                .map(str::to_string))
        }
        Err(e) => Err(e.into()),
    };
    branch
}

/// Stage every change (`add .` honoring ignore rules, deletions included)
/// and commit with the repository's configured identity.
///
/// Returns the new commit id.
pub fn commit_all(repository: &RepositoryRef, message: &str) -> Result<String, OperationError> {
    if message.trim().is_empty() {
        return Err(OperationError::EmptyMessage);
    }

    let repo = open(repository)?;
    let signature = repo.signature().map_err(|e| {
        debug!(error = %e, "No signature configured");
        OperationError::MissingIdentity
    })?;

    let mut index = repo.index()?;
    index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None)?;
    index.update_all(["*"].iter(), None)?;
    index.write()?;

    let tree_id = index.write_tree()?;
    let tree = repo.find_tree(tree_id)?;

    let parent_commit = match repo.head() {
        Ok(head) => Some(head.peel_to_commit()?),
        Err(e) if e.code() == ErrorCode::UnbornBranch => None,
        Err(e) => return Err(e.into()),
    };
    let parents: Vec<&git2::Commit> = parent_commit.iter().collect();

    let commit_id = repo.commit(
        Some("HEAD"),
        &signature,
        &signature,
        message,
        &tree,
        &parents,
    )?;

    info!(repo = %repository.name(), commit = %commit_id, "Created commit");
    Ok(commit_id.to_string())
}
