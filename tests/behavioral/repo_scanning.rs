// ABOUTME: Behavioral tests for repository discovery under a directory tree

use anyhow::Result;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

use commit_canvas::config::ScannerConfig;
use commit_canvas::git::RepoScanner;

use super::fixtures::TestRepo;

fn roots(scanner: &RepoScanner, root: &std::path::Path) -> Vec<PathBuf> {
    scanner
        .scan(root)
        .into_iter()
        .map(|repo| repo.root().to_path_buf())
        .collect()
}

/// Only directories holding a `.git` directory are reported, nested ones are not
#[test]
fn test_scan_finds_top_level_repositories_only() -> Result<()> {
    let temp = TempDir::new()?;
    let base = fs::canonicalize(temp.path())?;
    fs::create_dir_all(base.join("a/.git"))?;
    fs::create_dir_all(base.join("b/.git"))?;
    fs::create_dir_all(base.join("b/sub/.git"))?;
    fs::create_dir_all(base.join("c"))?;

    let found = roots(&RepoScanner::new(), &base);

    assert_eq!(found, vec![base.join("a"), base.join("b")]);
    Ok(())
}

/// Repositories created by git itself are discovered by name
#[test]
fn test_scan_discovers_real_repository() -> Result<()> {
    let repo = TestRepo::new()?;

    let found = RepoScanner::new().scan(repo.path());

    assert_eq!(found.len(), 1);
    assert!(found[0].is_intact());
    Ok(())
}

/// Excluded directory names and depth limits are respected
#[test]
fn test_scan_honors_config() -> Result<()> {
    let temp = TempDir::new()?;
    let base = fs::canonicalize(temp.path())?;
    fs::create_dir_all(base.join("node_modules/dep/.git"))?;
    fs::create_dir_all(base.join("deep/one/two/three/.git"))?;
    fs::create_dir_all(base.join("shallow/.git"))?;

    let config = ScannerConfig {
        max_depth: 2,
        ..ScannerConfig::default()
    };
    let found = roots(&RepoScanner::from_config(&config), &base);

    assert_eq!(found, vec![base.join("shallow")]);
    Ok(())
}

/// A missing root is not an error
#[test]
fn test_scan_missing_root_is_empty() {
    let found = RepoScanner::new().scan(std::path::Path::new("/definitely/not/here"));
    assert!(found.is_empty());
}

/// Symlinked directories are skipped unless following is enabled, and
/// following never reports the same repository twice
#[cfg(unix)]
#[test]
fn test_scan_symlinks() -> Result<()> {
    let temp = TempDir::new()?;
    let base = fs::canonicalize(temp.path())?;
    fs::create_dir_all(base.join("real/project/.git"))?;
    fs::create_dir_all(base.join("elsewhere/other/.git"))?;
    fs::create_dir_all(base.join("links"))?;
    std::os::unix::fs::symlink(base.join("real"), base.join("links/real-again"))?;

    let scan_root = base.join("links");
    assert!(roots(&RepoScanner::new(), &scan_root).is_empty());

    let following = RepoScanner::new().with_follow_symlinks(true);
    let found = roots(&following, &scan_root);
    assert_eq!(found.len(), 1);

    // Seen through both the real path and the link: reported once
    let found = roots(&following, &base);
    let projects = found
        .iter()
        .filter(|root| root.ends_with("project"))
        .count();
    assert_eq!(projects, 1);
    Ok(())
}
