// ABOUTME: Core data models for repositories, change sets, credentials and remote profiles

pub mod account;
pub mod changeset;
pub mod repository;

pub use account::{Credential, RemoteProfile, RemoteRepository, DEFAULT_HOST};
pub use changeset::{
    ChangeCounts, ChangeKind, ChangeSetSummary, DiffBody, DiffSpan, FileChange, SpanKind,
};
pub use repository::{has_metadata_dir, RepositoryRef, METADATA_DIR};
