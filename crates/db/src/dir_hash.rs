//! Directory hash aggregation.
//!
//! When any tracked descendant changes, every directory on its ancestor
//! chain is marked dirty. A short debounce window collapses bursts;
//! when it fires, dirty directories are recomputed deepest-first so a
//! subdirectory's structural hash is already current when its parent
//! combines it. No file content is re-read: only already-known child
//! hashes are combined.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use inktally_core::{StatsPayload, StoreConfig};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::persist::PersistHandle;
use crate::store::MetadataStore;

enum DirHashMsg {
  /// Mark the ancestor chain of a path (exclusive of the path itself).
  MarkAncestors(PathBuf),
  /// Mark a directory itself plus its ancestor chain.
  MarkDir(PathBuf),
}

/// Handle to the directory hash task. Cheap to clone.
#[derive(Clone)]
pub struct DirHashHandle {
  tx: mpsc::UnboundedSender<DirHashMsg>,
}

impl DirHashHandle {
  /// Mark every directory from `dirname(path)` up to the tracked root
  /// as needing a structural hash recompute. Idempotent per window.
  pub fn mark_ancestors_dirty(&self, path: &Path) {
    let _ = self.tx.send(DirHashMsg::MarkAncestors(path.to_path_buf()));
  }

  /// Mark a directory (typically one that just appeared) and its
  /// ancestor chain.
  pub fn mark_directory(&self, path: &Path) {
    let _ = self.tx.send(DirHashMsg::MarkDir(path.to_path_buf()));
  }
}

/// Background task recomputing structural hashes for dirty directories.
pub struct DirHashTask<S: StatsPayload> {
  store: Arc<MetadataStore<S>>,
  persist: PersistHandle,
  rx: mpsc::UnboundedReceiver<DirHashMsg>,
  debounce: Duration,
  cancel: CancellationToken,
}

impl<S: StatsPayload> DirHashTask<S> {
  pub fn spawn(
    store: Arc<MetadataStore<S>>,
    persist: PersistHandle,
    config: &StoreConfig,
    cancel: CancellationToken,
  ) -> (DirHashHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let task = Self {
      store,
      persist,
      rx,
      debounce: Duration::from_millis(config.dir_hash_debounce_ms),
      cancel,
    };
    (DirHashHandle { tx }, tokio::spawn(task.run()))
  }

  async fn run(mut self) {
    let mut pending: HashSet<PathBuf> = HashSet::new();
    // Armed once per burst: the first mark opens the window, later
    // marks ride along instead of pushing the deadline out
    let mut deadline: Option<Instant> = None;

    loop {
      let sleep_target = deadline.unwrap_or_else(|| Instant::now() + Duration::from_secs(3600));

      tokio::select! {
        biased;

        _ = self.cancel.cancelled() => {
          if !pending.is_empty() {
            self.recompute(&mut pending);
          }
          break;
        }

        msg = self.rx.recv() => {
          let Some(msg) = msg else {
            if !pending.is_empty() {
              self.recompute(&mut pending);
            }
            break;
          };
          match msg {
            DirHashMsg::MarkAncestors(path) => {
              mark_chain(&mut pending, self.store.root(), &path, false);
            }
            DirHashMsg::MarkDir(path) => {
              mark_chain(&mut pending, self.store.root(), &path, true);
            }
          }
          if !pending.is_empty() && deadline.is_none() {
            deadline = Some(Instant::now() + self.debounce);
          }
        }

        _ = tokio::time::sleep_until(sleep_target), if deadline.is_some() => {
          deadline = None;
          self.recompute(&mut pending);
        }
      }
    }
  }

  fn recompute(&self, pending: &mut HashSet<PathBuf>) {
    let batch = pending.len();
    // Deepest paths first so children are current before their parents
    let mut dirs: Vec<PathBuf> = pending.drain().collect();
    dirs.sort_by_key(|d| std::cmp::Reverse(d.components().count()));

    let mut changed = 0usize;
    for dir in &dirs {
      if self.store.recompute_dir_hash(dir) {
        changed += 1;
      }
    }

    if changed > 0 {
      self.persist.schedule_save();
    }
    debug!(batch, changed, "Directory hashes recomputed");
  }
}

/// Collect `path`'s ancestor directories (optionally `path` itself)
/// into the pending set, stopping at the tracked root.
fn mark_chain(pending: &mut HashSet<PathBuf>, root: &Path, path: &Path, include_self: bool) {
  if include_self && path.starts_with(root) {
    pending.insert(path.to_path_buf());
  }
  let mut dir = path.parent();
  while let Some(d) = dir {
    if !d.starts_with(root) {
      break;
    }
    pending.insert(d.to_path_buf());
    if d == root {
      break;
    }
    dir = d.parent();
  }
}

#[cfg(test)]
mod tests {
  use inktally_core::TextStats;
  use pretty_assertions::assert_eq;
  use tempfile::TempDir;

  use super::*;
  use crate::persist::{NoEditors, PersistTask};
  use crate::storage::ShardedJsonStorage;

  #[test]
  fn test_mark_chain_walks_to_root() {
    let mut pending = HashSet::new();
    let root = Path::new("/ws");
    mark_chain(&mut pending, root, Path::new("/ws/a/b/c.md"), false);
    assert!(pending.contains(Path::new("/ws/a/b")));
    assert!(pending.contains(Path::new("/ws/a")));
    assert!(pending.contains(Path::new("/ws")));
    assert_eq!(pending.len(), 3);
  }

  #[test]
  fn test_mark_chain_is_idempotent() {
    let mut pending = HashSet::new();
    let root = Path::new("/ws");
    mark_chain(&mut pending, root, Path::new("/ws/a/b/c.md"), false);
    mark_chain(&mut pending, root, Path::new("/ws/a/b/d.md"), false);
    assert_eq!(pending.len(), 3, "repeated marks of the same chain collapse");
  }

  #[test]
  fn test_mark_chain_outside_root() {
    let mut pending = HashSet::new();
    mark_chain(&mut pending, Path::new("/ws"), Path::new("/elsewhere/x.md"), false);
    assert!(pending.is_empty());
  }

  #[test]
  fn test_mark_chain_include_self() {
    let mut pending = HashSet::new();
    mark_chain(&mut pending, Path::new("/ws"), Path::new("/ws/a"), true);
    assert!(pending.contains(Path::new("/ws/a")));
    assert!(pending.contains(Path::new("/ws")));
  }

  #[tokio::test]
  async fn test_debounced_recompute_propagates_upward() {
    let dir = TempDir::new().unwrap();
    let nested = dir.path().join("a").join("b");
    std::fs::create_dir_all(&nested).unwrap();
    let file = nested.join("c.md");
    std::fs::write(&file, "hello").unwrap();

    let storage = ShardedJsonStorage::open(dir.path().join(".inktally")).unwrap();
    let store: Arc<MetadataStore<TextStats>> =
      Arc::new(MetadataStore::open(dir.path(), Arc::new(storage), Arc::new(NoEditors)).unwrap());

    store.upsert(&dir.path().join("a")).await.unwrap();
    store.upsert(&nested).await.unwrap();
    store.upsert(&file).await.unwrap();

    let cancel = CancellationToken::new();
    let config = StoreConfig {
      save_debounce_ms: 20,
      dir_hash_debounce_ms: 20,
      ..StoreConfig::default()
    };
    let (persist, persist_task) = PersistTask::spawn(store.clone(), &config, cancel.clone());
    let (handle, hash_task) = DirHashTask::spawn(store.clone(), persist, &config, cancel.clone());

    handle.mark_ancestors_dirty(&file);
    tokio::time::sleep(Duration::from_millis(120)).await;

    let leaf = store.get_by_path(&nested).unwrap();
    let parent = store.get_by_path(&dir.path().join("a")).unwrap();
    assert!(!leaf.hash.is_empty(), "leaf directory hash must be computed");
    assert!(!parent.hash.is_empty(), "parent hash must combine the child's");
    assert_ne!(leaf.hash, parent.hash);

    cancel.cancel();
    hash_task.await.unwrap();
    persist_task.await.unwrap();
  }

  #[tokio::test]
  async fn test_recompute_skips_unchanged() {
    let dir = TempDir::new().unwrap();
    let sub = dir.path().join("a");
    std::fs::create_dir(&sub).unwrap();
    let file = sub.join("c.md");
    std::fs::write(&file, "hello").unwrap();

    let storage = ShardedJsonStorage::open(dir.path().join(".inktally")).unwrap();
    let store: Arc<MetadataStore<TextStats>> =
      Arc::new(MetadataStore::open(dir.path(), Arc::new(storage), Arc::new(NoEditors)).unwrap());
    store.upsert(&sub).await.unwrap();
    store.upsert(&file).await.unwrap();

    assert!(store.recompute_dir_hash(&sub));
    let first = store.get_by_path(&sub).unwrap();

    // Nothing changed: a second recompute is a no-op
    assert!(!store.recompute_dir_hash(&sub));
    let second = store.get_by_path(&sub).unwrap();
    assert_eq!(first.hash, second.hash);
    assert_eq!(first.updated_at, second.updated_at);
  }
}
