// ABOUTME: Repository discovery - walks a directory tree collecting git repository roots
// Never descends into a repository once found; unreadable entries are skipped

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::config::ScannerConfig;
use crate::models::{has_metadata_dir, RepositoryRef, METADATA_DIR};

pub struct RepoScanner {
    max_depth: usize,
    exclude_dirs: Vec<String>,
    follow_symlinks: bool,
}

impl RepoScanner {
    pub fn new() -> Self {
        Self::from_config(&ScannerConfig::default())
    }

    pub fn from_config(config: &ScannerConfig) -> Self {
        Self {
            max_depth: config.max_depth,
            exclude_dirs: config.exclude_dirs.clone(),
            follow_symlinks: false,
        }
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Add directory names to skip (exact match)
    pub fn with_exclude_dirs(mut self, exclude_dirs: Vec<String>) -> Self {
        for name in exclude_dirs {
            if !self.exclude_dirs.contains(&name) {
                self.exclude_dirs.push(name);
            }
        }
        self
    }

    /// Descend into symlinked directories. Cycles are cut by tracking
    /// canonical paths already visited.
    pub fn with_follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
    }

    /// Repository roots under `root`, sorted by path.
    ///
    /// Best effort: a missing or unreadable root yields an empty list.
    pub fn scan(&self, root: &Path) -> Vec<RepositoryRef> {
        let mut found = Vec::new();
        let mut visited = HashSet::new();

        self.scan_directory(root, 0, &mut visited, &mut found);

        found.sort_by(|a, b| a.root().cmp(b.root()));
        info!(root = %root.display(), repositories = found.len(), "Repository scan complete");
        found
    }

    fn scan_directory(
        &self,
        path: &Path,
        depth: usize,
        visited: &mut HashSet<PathBuf>,
        found: &mut Vec<RepositoryRef>,
    ) {
        if depth > self.max_depth {
            return;
        }

        match fs::canonicalize(path) {
            Ok(canonical) => {
                if !visited.insert(canonical) {
                    debug!(path = %path.display(), "Already visited, skipping");
                    return;
                }
            }
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Skipping unresolvable directory");
                return;
            }
        }

        if has_metadata_dir(path) {
            if let Some(repo) = RepositoryRef::discover(path) {
                debug!(path = %repo.root().display(), "Found git repository");
                found.push(repo);
            }
            // Don't recurse into git repositories
            return;
        }

        let entries = match fs::read_dir(path) {
            Ok(entries) => entries,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Skipping unreadable directory");
                return;
            }
        };

        for entry in entries.flatten() {
            let Ok(file_type) = entry.file_type() else {
                continue;
            };

            let is_dir = if file_type.is_symlink() {
                self.follow_symlinks && entry.path().is_dir()
            } else {
                file_type.is_dir()
            };
            if !is_dir {
                continue;
            }

            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name == METADATA_DIR || self.exclude_dirs.iter().any(|excluded| *excluded == name) {
                continue;
            }

            self.scan_directory(&entry.path(), depth + 1, visited, found);
        }
    }
}

impl Default for RepoScanner {
    fn default() -> Self {
        Self::new()
    }
}
