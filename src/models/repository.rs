// ABOUTME: Repository reference model - a discovered local git repository root

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the metadata directory that marks a repository root
pub const METADATA_DIR: &str = ".git";

/// Immutable reference to a local repository discovered on disk.
///
/// Equality is by root path only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryRef {
    root: PathBuf,
    name: String,
    discovered_at: DateTime<Utc>,
}

impl RepositoryRef {
    /// Build a reference if `root` contains a metadata directory.
    ///
    /// The root is made absolute (canonicalized when possible) so two refs to
    /// the same repository compare equal regardless of how they were reached.
    pub fn discover(root: &Path) -> Option<Self> {
        if !has_metadata_dir(root) {
            return None;
        }

        let root = absolute(root);
        let name = root
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();

        Some(Self {
            root,
            name,
            discovered_at: Utc::now(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Display name (basename of the root)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the metadata directory still exists
    pub fn is_intact(&self) -> bool {
        has_metadata_dir(&self.root)
    }
}

impl PartialEq for RepositoryRef {
    fn eq(&self, other: &Self) -> bool {
        self.root == other.root
    }
}

impl Eq for RepositoryRef {}

pub fn has_metadata_dir(path: &Path) -> bool {
    path.join(METADATA_DIR).is_dir()
}

fn absolute(path: &Path) -> PathBuf {
    if let Ok(canonical) = std::fs::canonicalize(path) {
        return canonical;
    }
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}
