// ABOUTME: Git integration - repository discovery, change-set analysis and commit/branch operations

pub mod changeset;
pub mod operations;
pub mod scanner;
pub mod word_diff;

pub use changeset::{AnalyzerError, ChangeSetAnalyzer, DiffSide};
pub use operations::{commit_all, current_branch, list_branches, BranchInfo, OperationError};
pub use scanner::RepoScanner;
pub use word_diff::{word_diff, WordDiff};
