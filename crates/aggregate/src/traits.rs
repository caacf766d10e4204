//! Collaborator interfaces consumed by the aggregate layer, with the
//! default workspace implementations.
//!
//! Directory listing and per-file statistics are the only operations
//! assumed to be I/O-bound; both are injected so tests can substitute
//! deterministic fakes.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use inktally_core::{AggregateConfig, Result};
use tracing::{debug, warn};

/// One directory entry as the aggregate pass sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntryInfo {
  pub name: String,
  pub is_directory: bool,
}

/// Lists a directory's immediate entries.
#[async_trait]
pub trait DirectoryReader: Send + Sync {
  async fn list(&self, path: &Path) -> std::io::Result<Vec<DirEntryInfo>>;
}

/// Default reader backed by `tokio::fs`.
pub struct TokioDirectoryReader;

#[async_trait]
impl DirectoryReader for TokioDirectoryReader {
  async fn list(&self, path: &Path) -> std::io::Result<Vec<DirEntryInfo>> {
    let mut entries = Vec::new();
    let mut dir = tokio::fs::read_dir(path).await?;
    while let Some(entry) = dir.next_entry().await? {
      let is_directory = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
      entries.push(DirEntryInfo {
        name: entry.file_name().to_string_lossy().into_owned(),
        is_directory,
      });
    }
    Ok(entries)
  }
}

/// Decides which paths are excluded from tracking and aggregation.
pub trait IgnoreFilter: Send + Sync {
  fn should_ignore(&self, path: &Path) -> bool;
}

/// Default filter: gitignore rules, the tracked-extension list, and the
/// tracker's own database directory.
pub struct WorkspaceFilter {
  root: PathBuf,
  db_dir: PathBuf,
  gitignore: Option<Gitignore>,
  extensions: HashSet<String>,
}

impl WorkspaceFilter {
  pub fn new(root: &Path, db_dir: &Path, config: &AggregateConfig) -> Self {
    let extensions = config.extensions.iter().map(|e| e.to_lowercase()).collect();
    Self {
      root: root.to_path_buf(),
      db_dir: db_dir.to_path_buf(),
      gitignore: build_gitignore(root),
      extensions,
    }
  }
}

impl IgnoreFilter for WorkspaceFilter {
  fn should_ignore(&self, path: &Path) -> bool {
    if path.starts_with(&self.db_dir) {
      return true;
    }

    let is_dir = path.is_dir();
    // Match the path and its parents so files inside ignored
    // directories are excluded even outside a pruning walk
    if let Some(ref gitignore) = self.gitignore
      && gitignore.matched_path_or_any_parents(path, is_dir).is_ignore()
    {
      return true;
    }

    if !is_dir {
      let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
      if !self.extensions.contains(&ext) {
        return true;
      }
    }

    false
  }
}

/// Build a gitignore matcher rooted at the workspace.
///
/// Always excludes version-control and dependency directories even
/// without a `.gitignore` file.
fn build_gitignore(root: &Path) -> Option<Gitignore> {
  let mut builder = GitignoreBuilder::new(root);

  let gitignore_path = root.join(".gitignore");
  if gitignore_path.exists()
    && let Some(err) = builder.add(&gitignore_path)
  {
    warn!(error = %err, "Error parsing .gitignore, continuing with partial rules");
  }

  let _ = builder.add_line(None, ".git/");
  let _ = builder.add_line(None, "node_modules/");
  let _ = builder.add_line(None, "target/");

  match builder.build() {
    Ok(gitignore) => Some(gitignore),
    Err(e) => {
      warn!(error = %e, "Failed to build gitignore matcher, nothing will be filtered");
      None
    }
  }
}

/// Computes the domain statistics payload for one file.
#[async_trait]
pub trait FileStatifier<S>: Send + Sync {
  async fn compute(&self, path: &Path) -> Result<S>;
}

/// Default statifier: reads the file and analyzes it as text.
pub struct TextStatifier;

#[async_trait]
impl FileStatifier<inktally_core::TextStats> for TextStatifier {
  async fn compute(&self, path: &Path) -> Result<inktally_core::TextStats> {
    let bytes = tokio::fs::read(path).await?;
    let text = String::from_utf8_lossy(&bytes);
    let stats = inktally_core::analyze_text(&text);
    debug!(path = %path.display(), total = stats.total, "File statistics computed");
    Ok(stats)
  }
}

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;
  use tempfile::TempDir;

  use super::*;

  #[tokio::test]
  async fn test_tokio_reader_lists_entries() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("a.md"), "x").unwrap();
    std::fs::create_dir(dir.path().join("sub")).unwrap();

    let reader = TokioDirectoryReader;
    let mut entries = reader.list(dir.path()).await.unwrap();
    entries.sort_by(|a, b| a.name.cmp(&b.name));

    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].name, "a.md");
    assert!(!entries[0].is_directory);
    assert!(entries[1].is_directory);
  }

  #[tokio::test]
  async fn test_tokio_reader_missing_dir_errors() {
    let reader = TokioDirectoryReader;
    assert!(reader.list(Path::new("/definitely/not/here")).await.is_err());
  }

  #[test]
  fn test_workspace_filter_extensions() {
    let dir = TempDir::new().unwrap();
    let filter = WorkspaceFilter::new(dir.path(), &dir.path().join(".inktally"), &AggregateConfig::default());

    std::fs::write(dir.path().join("a.md"), "x").unwrap();
    std::fs::write(dir.path().join("b.bin"), "x").unwrap();

    assert!(!filter.should_ignore(&dir.path().join("a.md")));
    assert!(filter.should_ignore(&dir.path().join("b.bin")));
  }

  #[test]
  fn test_workspace_filter_db_dir_and_git() {
    let dir = TempDir::new().unwrap();
    let db_dir = dir.path().join(".inktally");
    std::fs::create_dir_all(&db_dir).unwrap();
    std::fs::create_dir_all(dir.path().join(".git")).unwrap();
    let filter = WorkspaceFilter::new(dir.path(), &db_dir, &AggregateConfig::default());

    assert!(filter.should_ignore(&db_dir.join("index.json")));
    assert!(filter.should_ignore(&dir.path().join(".git")));
  }

  #[test]
  fn test_workspace_filter_gitignore_rules() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join(".gitignore"), "drafts/\n*.tmp.md\n").unwrap();
    std::fs::create_dir(dir.path().join("drafts")).unwrap();
    let filter = WorkspaceFilter::new(dir.path(), &dir.path().join(".inktally"), &AggregateConfig::default());

    assert!(filter.should_ignore(&dir.path().join("drafts")));
    assert!(filter.should_ignore(&dir.path().join("note.tmp.md")));
    assert!(!filter.should_ignore(&dir.path().join("note.md")));
  }

  #[tokio::test]
  async fn test_text_statifier() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("a.md");
    std::fs::write(&file, "hello world").unwrap();

    let stats = TextStatifier.compute(&file).await.unwrap();
    assert_eq!(stats.words, 2);
    assert_eq!(stats.total, 2);

    assert!(TextStatifier.compute(&dir.path().join("missing.md")).await.is_err());
  }
}
