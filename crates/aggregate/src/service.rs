//! The tracker service: wires the metadata store, the persistence and
//! directory-hash tasks, the aggregate cache, and the recompute
//! pipeline behind one facade, and drives them from an external change
//! source.
//!
//! Control flow for one change notification: the store updates the
//! record (if anything actually changed), persistence is scheduled, the
//! ancestor chain is marked dirty for structural hashing, the parent's
//! aggregate is invalidated (retaining the old value as "previous"),
//! and the parent is enqueued for recompute, which walks to the root
//! notifying subscribers at each level.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use db::{
  DirHashHandle, DirHashTask, FlushOutcome, MetadataStore, NoEditors, PersistHandle, PersistTask, ShardedJsonStorage,
  StorageGate,
};
use ignore::WalkBuilder;
use inktally_core::{ChangeEvent, ChangeKind, Config, Error, FileRecord, Result, StatsPayload, TextStats, TrackerEvent};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cache::AggregateStatsCache;
use crate::recompute::{RecomputeHandle, RecomputeTask};
use crate::traits::{DirectoryReader, FileStatifier, IgnoreFilter, TextStatifier, TokioDirectoryReader, WorkspaceFilter};

/// Injected collaborators for a tracker instance.
pub struct Collaborators<S> {
  pub reader: Arc<dyn DirectoryReader>,
  pub filter: Arc<dyn IgnoreFilter>,
  pub statifier: Arc<dyn FileStatifier<S>>,
  pub gate: Arc<dyn StorageGate>,
}

impl Collaborators<TextStats> {
  /// The default workspace wiring: tokio directory listing, gitignore +
  /// extension filtering, text statistics, no editing gate.
  pub fn workspace_defaults(root: &Path, config: &Config) -> Self {
    let db_dir = root.join(&config.store.db_dir);
    Self {
      reader: Arc::new(TokioDirectoryReader),
      filter: Arc::new(WorkspaceFilter::new(root, &db_dir, &config.aggregate)),
      statifier: Arc::new(TextStatifier),
      gate: Arc::new(NoEditors),
    }
  }
}

/// Live-statistics tracker for one workspace root.
pub struct Tracker<S: StatsPayload> {
  root: PathBuf,
  store: Arc<MetadataStore<S>>,
  cache: AggregateStatsCache<S>,
  filter: Arc<dyn IgnoreFilter>,
  recompute: RecomputeHandle,
  persist: PersistHandle,
  dir_hash: DirHashHandle,
  events: broadcast::Sender<TrackerEvent<S>>,
  cancel: CancellationToken,
  tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl<S: StatsPayload> Tracker<S> {
  /// Open the store and spawn the background pipeline. Must be called
  /// inside a tokio runtime.
  pub fn spawn(
    root: &Path,
    config: Config,
    collaborators: Collaborators<S>,
    changes: mpsc::Receiver<ChangeEvent>,
  ) -> Result<Arc<Self>> {
    let root = root.to_path_buf();
    let storage = ShardedJsonStorage::open(root.join(&config.store.db_dir))?;
    let store = Arc::new(MetadataStore::open(&root, Arc::new(storage), collaborators.gate)?);

    let cancel = CancellationToken::new();
    let (persist, persist_task) = PersistTask::spawn(store.clone(), &config.store, cancel.child_token());
    let (dir_hash, dir_hash_task) =
      DirHashTask::spawn(store.clone(), persist.clone(), &config.store, cancel.child_token());

    let (recompute, recompute_rx) = RecomputeHandle::channel();
    let (events, _) = broadcast::channel(config.aggregate.event_capacity);
    let cache = AggregateStatsCache::new(
      &root,
      collaborators.reader,
      collaborators.filter.clone(),
      store.clone(),
      recompute.clone(),
      &config.aggregate,
    );
    let recompute_task = RecomputeTask::spawn(
      root.clone(),
      cache.clone(),
      store.clone(),
      collaborators.statifier,
      persist.clone(),
      dir_hash.clone(),
      recompute.clone(),
      recompute_rx,
      events.clone(),
      cancel.child_token(),
    );

    let tracker = Arc::new(Self {
      root: root.clone(),
      store,
      cache,
      filter: collaborators.filter,
      recompute,
      persist,
      dir_hash,
      events,
      cancel: cancel.clone(),
      tasks: Mutex::new(Vec::new()),
    });

    let change_task = tokio::spawn(run_changes(tracker.clone(), changes, cancel));
    {
      let mut tasks = tracker.lock_tasks();
      tasks.push(persist_task);
      tasks.push(dir_hash_task);
      tasks.push(recompute_task);
      tasks.push(change_task);
    }

    info!(root = %root.display(), tracked = tracker.store.tracked_count(), "Tracker started");
    Ok(tracker)
  }

  fn lock_tasks(&self) -> std::sync::MutexGuard<'_, Vec<JoinHandle<()>>> {
    self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  pub fn store(&self) -> &Arc<MetadataStore<S>> {
    &self.store
  }

  /// Subscribe to aggregate updates and record changes.
  pub fn subscribe(&self) -> broadcast::Receiver<TrackerEvent<S>> {
    self.events.subscribe()
  }

  /// The metadata record for a path, if tracked.
  pub fn file_record(&self, path: &Path) -> Option<FileRecord<S>> {
    self.store.get_by_path(path)
  }

  /// Synchronous best-effort directory total: the fresh value, else the
  /// stale one retained across invalidation, else zero. Never blocks.
  pub fn aggregate(&self, dir: &Path) -> S {
    self.cache.snapshot(dir)
  }

  /// One-shot forced recompute: bypasses the cache for the path and,
  /// for a directory, re-counts every tracked file beneath it.
  pub fn force_recompute(&self, path: &Path) {
    self.cache.mark_forced(path);
    let is_dir = self
      .store
      .get_by_path(path)
      .map(|r| r.is_directory)
      .unwrap_or_else(|| path.is_dir());
    if is_dir {
      self.recompute.enqueue_dir(path);
    } else {
      self.recompute.schedule_file_stat(path);
    }
  }

  /// Synchronously persist all pending mutations.
  pub async fn force_flush(&self) -> Result<FlushOutcome> {
    self.persist.flush(true).await
  }

  /// Apply one change notification.
  pub async fn handle_change(&self, event: ChangeEvent) -> Result<()> {
    match event.kind {
      ChangeKind::Created | ChangeKind::Modified => {
        self.observe(&event.path).await?;
      }
      ChangeKind::Deleted => {
        if self.store.remove(&event.path) {
          self.persist.schedule_save();
          self.dir_hash.mark_ancestors_dirty(&event.path);
          let _ = self.events.send(TrackerEvent::FileRecordChanged {
            path: event.path.clone(),
          });
          self.refresh_parent(&event.path);
        }
      }
      ChangeKind::Renamed { old_path } => {
        if self.store.rename(&old_path, &event.path) {
          self.persist.schedule_save();
          self.dir_hash.mark_ancestors_dirty(&old_path);
          self.dir_hash.mark_ancestors_dirty(&event.path);
          let _ = self.events.send(TrackerEvent::FileRecordChanged {
            path: event.path.clone(),
          });
          self.refresh_parent(&old_path);
          self.refresh_parent(&event.path);
        } else {
          // Rename of an untracked path: treat as a create so a missed
          // event earlier does not leave the new path untracked
          debug!(old = %old_path.display(), new = %event.path.display(), "Rename of untracked path, observing");
          self.observe(&event.path).await?;
        }
      }
    }
    Ok(())
  }

  async fn observe(&self, path: &Path) -> Result<()> {
    if self.filter.should_ignore(path) {
      return Ok(());
    }
    if let Some(outcome) = self.store.upsert(path).await?
      && outcome.changed
    {
      self.persist.schedule_save();
      if outcome.is_directory {
        self.dir_hash.mark_directory(path);
      } else {
        self.dir_hash.mark_ancestors_dirty(path);
      }
      let _ = self.events.send(TrackerEvent::FileRecordChanged {
        path: path.to_path_buf(),
      });
      self.refresh_parent(path);
    }
    Ok(())
  }

  fn refresh_parent(&self, path: &Path) {
    if let Some(parent) = path.parent()
      && parent.starts_with(&self.root)
    {
      self.cache.invalidate(parent);
      self.recompute.enqueue_dir(parent);
    }
  }

  /// Full walk of the workspace, tracking files and directories, then
  /// a root recompute so aggregates fill in bottom-up.
  pub async fn scan(&self) -> Result<usize> {
    let root = self.root.clone();
    let paths = tokio::task::spawn_blocking(move || {
      let mut out = Vec::new();
      let walker = WalkBuilder::new(&root)
        .hidden(true)
        .git_ignore(true)
        .git_global(false)
        .git_exclude(true)
        .build();
      for entry in walker.flatten() {
        let path = entry.path().to_path_buf();
        if path == root {
          continue;
        }
        out.push(path);
      }
      out
    })
    .await
    .map_err(|e| Error::Storage(e.to_string()))?;

    let mut tracked = 0usize;
    for path in paths {
      if self.filter.should_ignore(&path) {
        continue;
      }
      if let Some(outcome) = self.store.upsert(&path).await?
        && outcome.changed
      {
        tracked += 1;
        if outcome.is_directory {
          self.dir_hash.mark_directory(&path);
        } else {
          self.dir_hash.mark_ancestors_dirty(&path);
        }
      }
    }

    if tracked > 0 {
      self.persist.schedule_save();
    }
    self.recompute.enqueue_dir(&self.root);
    info!(tracked, total = self.store.tracked_count(), "Workspace scan complete");
    Ok(tracked)
  }

  /// Garbage collection sweep: drop records whose paths no longer
  /// exist, refreshing the affected aggregates.
  pub async fn sweep(&self) -> Vec<PathBuf> {
    let removed = self.store.sweep_missing();
    if !removed.is_empty() {
      self.persist.schedule_save();
      for path in &removed {
        self.dir_hash.mark_ancestors_dirty(path);
        self.refresh_parent(path);
      }
    }
    removed
  }

  /// Stop the pipeline, flushing pending state.
  pub async fn shutdown(&self) {
    self.cancel.cancel();
    let handles: Vec<JoinHandle<()>> = self.lock_tasks().drain(..).collect();
    for handle in handles {
      let _ = handle.await;
    }
    info!(root = %self.root.display(), "Tracker stopped");
  }
}

/// Event loop consuming the external change source.
async fn run_changes<S: StatsPayload>(
  tracker: Arc<Tracker<S>>,
  mut changes: mpsc::Receiver<ChangeEvent>,
  cancel: CancellationToken,
) {
  loop {
    tokio::select! {
      biased;

      _ = cancel.cancelled() => break,

      event = changes.recv() => {
        match event {
          None => break,
          Some(event) => {
            if let Err(e) = tracker.handle_change(event).await {
              tracing::warn!(error = %e, "Change handling failed");
            }
          }
        }
      }
    }
  }
  debug!("Change loop stopped");
}
