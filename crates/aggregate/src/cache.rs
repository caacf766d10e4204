//! Ephemeral per-directory aggregate cache.
//!
//! Each directory is in one of three states: fresh (`current` holds a
//! valid total), stale-but-displayable (`previous` holds the last known
//! total while a recompute is pending), or cold (never computed).
//! Invalidation moves current to previous, never dropping both, so
//! consumers never observe a hard "unknown" after the first successful
//! compute.
//!
//! Concurrent requests for the same directory share one in-flight
//! computation; a computation superseded by an invalidation mid-run
//! parks its result in `previous` and re-enqueues itself rather than
//! marking the directory fresh. Correctness relies on convergence, not
//! cancellation.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use db::MetadataStore;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use inktally_core::{AggregateConfig, StatsPayload, mtime_millis, now_millis};
use tracing::{trace, warn};

use crate::recompute::RecomputeHandle;
use crate::traits::{DirectoryReader, IgnoreFilter};

/// A cached directory total.
#[derive(Debug, Clone)]
pub struct AggregateEntry<S> {
  pub stats: S,
  pub computed_at: i64,
}

type SharedCompute<S> = Shared<BoxFuture<'static, S>>;

struct CacheInner<S: StatsPayload> {
  root: PathBuf,
  reader: Arc<dyn DirectoryReader>,
  filter: Arc<dyn IgnoreFilter>,
  store: Arc<MetadataStore<S>>,
  recompute: RecomputeHandle,
  current: DashMap<PathBuf, AggregateEntry<S>>,
  previous: DashMap<PathBuf, S>,
  in_flight: DashMap<PathBuf, SharedCompute<S>>,
  /// One-shot force flags; a flag is cleared when its path's recompute
  /// completes.
  forced: DashSet<PathBuf>,
  /// Invalidation counters: a compute that started under an older
  /// count is superseded, not fresh.
  epochs: DashMap<PathBuf, u64>,
  large_file_threshold: u64,
  avg_bytes_per_char: f64,
}

/// Cheap-clone handle to the aggregate cache.
pub struct AggregateStatsCache<S: StatsPayload> {
  inner: Arc<CacheInner<S>>,
}

impl<S: StatsPayload> Clone for AggregateStatsCache<S> {
  fn clone(&self) -> Self {
    Self {
      inner: self.inner.clone(),
    }
  }
}

impl<S: StatsPayload> AggregateStatsCache<S> {
  pub fn new(
    root: &Path,
    reader: Arc<dyn DirectoryReader>,
    filter: Arc<dyn IgnoreFilter>,
    store: Arc<MetadataStore<S>>,
    recompute: RecomputeHandle,
    config: &AggregateConfig,
  ) -> Self {
    Self {
      inner: Arc::new(CacheInner {
        root: root.to_path_buf(),
        reader,
        filter,
        store,
        recompute,
        current: DashMap::new(),
        previous: DashMap::new(),
        in_flight: DashMap::new(),
        forced: DashSet::new(),
        epochs: DashMap::new(),
        large_file_threshold: config.large_file_threshold,
        avg_bytes_per_char: config.avg_bytes_per_char,
      }),
    }
  }

  /// Synchronous best-effort total: fresh value, else the stale one,
  /// else zero. Never blocks.
  pub fn snapshot(&self, dir: &Path) -> S {
    if let Some(entry) = self.inner.current.get(dir) {
      return entry.stats.clone();
    }
    if let Some(previous) = self.inner.previous.get(dir) {
      return previous.value().clone();
    }
    S::default()
  }

  /// The fresh entry for a directory, if any.
  pub fn entry(&self, dir: &Path) -> Option<AggregateEntry<S>> {
    self.inner.current.get(dir).map(|e| e.value().clone())
  }

  /// Drop a directory's fresh total, retaining it as the stale value.
  pub fn invalidate(&self, dir: &Path) {
    *self.inner.epochs.entry(dir.to_path_buf()).or_insert(0) += 1;
    if let Some((_, entry)) = self.inner.current.remove(dir) {
      self.inner.previous.insert(dir.to_path_buf(), entry.stats);
      trace!(dir = %dir.display(), "Aggregate invalidated, previous retained");
    }
  }

  /// Mark a path for a one-shot forced recompute.
  pub fn mark_forced(&self, path: &Path) {
    self.inner.forced.insert(path.to_path_buf());
  }

  pub fn clear_forced(&self, path: &Path) {
    self.inner.forced.remove(path);
  }

  /// Whether the path or any of its ancestors carries a force flag.
  pub fn is_force_pending(&self, path: &Path) -> bool {
    if self.inner.forced.is_empty() {
      return false;
    }
    let mut cursor = Some(path);
    while let Some(p) = cursor {
      if self.inner.forced.contains(p) {
        return true;
      }
      if !p.starts_with(&self.inner.root) || p == self.inner.root {
        break;
      }
      cursor = p.parent();
    }
    false
  }

  /// The directory's total, computing it if needed.
  ///
  /// A fresh value is returned directly unless a force flag is pending
  /// for the directory or an ancestor. Concurrent callers share one
  /// computation; exactly one directory listing happens per miss.
  pub async fn get(&self, dir: &Path) -> S {
    if !self.is_force_pending(dir)
      && let Some(entry) = self.inner.current.get(dir)
    {
      return entry.stats.clone();
    }

    let key = dir.to_path_buf();
    let (future, started) = match self.inner.in_flight.entry(key.clone()) {
      Entry::Occupied(occupied) => (occupied.get().clone(), false),
      Entry::Vacant(vacant) => {
        let future = compute(self.clone(), key.clone()).boxed().shared();
        vacant.insert(future.clone());
        (future, true)
      }
    };

    let stats = future.await;
    if started {
      self.inner.in_flight.remove(&key);
    }
    stats
  }

  fn epoch(&self, dir: &Path) -> u64 {
    self.inner.epochs.get(dir).map(|e| *e).unwrap_or(0)
  }
}

/// One aggregate pass over a single directory.
///
/// Children are not recursed into: files fold in their cached per-file
/// stats (or a size estimate for large files), subdirectories fold in
/// their own cached aggregate, and anything missing is dispatched to
/// the background pipeline. The total is allowed to be transiently
/// incomplete; completions re-enqueue the directory until it converges.
async fn compute<S: StatsPayload>(cache: AggregateStatsCache<S>, dir: PathBuf) -> S {
  let inner = &cache.inner;
  let epoch_at_start = cache.epoch(&dir);
  let forced_scope = cache.is_force_pending(&dir);

  let entries = match inner.reader.list(&dir).await {
    Ok(entries) => entries,
    Err(e) => {
      // Zero/partial result; other queued directories proceed
      warn!(dir = %dir.display(), error = %e, "Directory listing failed, yielding zero aggregate");
      Vec::new()
    }
  };

  let mut total = S::default();
  for entry in entries {
    let path = dir.join(&entry.name);
    if inner.filter.should_ignore(&path) {
      continue;
    }

    if entry.is_directory {
      if let Some(child) = inner.current.get(&path) {
        total.merge(&child.stats);
        if forced_scope {
          inner.recompute.enqueue_dir(&path);
        }
      } else {
        inner.recompute.enqueue_dir(&path);
      }
      continue;
    }

    let meta = tokio::fs::metadata(&path).await.ok();
    let fresh = meta
      .as_ref()
      .and_then(|m| inner.store.fresh_stats(&path, m.len(), mtime_millis(m)));
    match fresh {
      Some(stats) => {
        total.merge(&stats);
        // Forced scope still re-counts the file; the cached value is
        // displayed for this pass and corrected shortly after
        if forced_scope || cache.is_force_pending(&path) {
          inner.recompute.schedule_file_stat(&path);
        }
      }
      None => {
        if let Some(meta) = meta.as_ref() {
          if meta.len() > inner.large_file_threshold {
            total.merge(&S::estimate_from_size(meta.len(), inner.avg_bytes_per_char));
          }
          inner.recompute.schedule_file_stat(&path);
        }
      }
    }
  }

  if cache.epoch(&dir) == epoch_at_start {
    inner.current.insert(
      dir.clone(),
      AggregateEntry {
        stats: total.clone(),
        computed_at: now_millis(),
      },
    );
    inner.previous.remove(&dir);
  } else {
    // Superseded mid-compute: keep the value displayable and go again
    trace!(dir = %dir.display(), "Aggregate superseded during compute, re-enqueueing");
    inner.previous.insert(dir.clone(), total.clone());
    inner.recompute.enqueue_dir(&dir);
  }
  inner.forced.remove(&dir);

  total
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::{AtomicU32, Ordering};
  use std::time::Duration;

  use db::{NoEditors, ShardedJsonStorage};
  use inktally_core::{TextStats, analyze_text};
  use pretty_assertions::assert_eq;
  use tempfile::TempDir;

  use super::*;
  use crate::traits::{DirEntryInfo, TokioDirectoryReader};

  struct NoIgnore;
  impl IgnoreFilter for NoIgnore {
    fn should_ignore(&self, _path: &Path) -> bool {
      false
    }
  }

  /// Reader that counts listings and widens the race window.
  struct CountingReader {
    inner: TokioDirectoryReader,
    listings: AtomicU32,
  }

  #[async_trait::async_trait]
  impl DirectoryReader for CountingReader {
    async fn list(&self, path: &Path) -> std::io::Result<Vec<DirEntryInfo>> {
      self.listings.fetch_add(1, Ordering::SeqCst);
      tokio::time::sleep(Duration::from_millis(30)).await;
      self.inner.list(path).await
    }
  }

  struct Fixture {
    _dir: TempDir,
    root: PathBuf,
    store: Arc<MetadataStore<TextStats>>,
    reader: Arc<CountingReader>,
    cache: AggregateStatsCache<TextStats>,
    handle: RecomputeHandle,
  }

  fn fixture() -> Fixture {
    let dir = TempDir::new().unwrap();
    let root = dir.path().to_path_buf();
    let storage = ShardedJsonStorage::open(root.join(".inktally")).unwrap();
    let store: Arc<MetadataStore<TextStats>> =
      Arc::new(MetadataStore::open(&root, Arc::new(storage), Arc::new(NoEditors)).unwrap());
    let reader = Arc::new(CountingReader {
      inner: TokioDirectoryReader,
      listings: AtomicU32::new(0),
    });
    let (handle, _rx) = RecomputeHandle::channel();
    let config = AggregateConfig {
      large_file_threshold: 64,
      ..AggregateConfig::default()
    };
    let cache = AggregateStatsCache::new(
      &root,
      reader.clone(),
      Arc::new(NoIgnore),
      store.clone(),
      handle.clone(),
      &config,
    );
    Fixture {
      _dir: dir,
      root,
      store,
      reader,
      cache,
      handle,
    }
  }

  async fn track_with_stats(fx: &Fixture, path: &Path, content: &str) {
    std::fs::write(path, content).unwrap();
    fx.store.upsert(path).await.unwrap();
    fx.store.update_stats(path, &analyze_text(content));
  }

  #[tokio::test]
  async fn test_compute_folds_fresh_file_stats() {
    let fx = fixture();
    let sub = fx.root.join("d");
    std::fs::create_dir(&sub).unwrap();
    track_with_stats(&fx, &sub.join("a.md"), "hello world").await;
    track_with_stats(&fx, &sub.join("b.md"), "one two three").await;

    let total = fx.cache.get(&sub).await;
    assert_eq!(total.words, 5);
    assert_eq!(total.total, 5);
  }

  #[tokio::test]
  async fn test_uncached_file_skipped_and_dispatched() {
    let fx = fixture();
    let sub = fx.root.join("d");
    std::fs::create_dir(&sub).unwrap();
    track_with_stats(&fx, &sub.join("a.md"), "hello world").await;
    // tracked but without stats: excluded from this pass's total
    let pending = sub.join("b.md");
    std::fs::write(&pending, "one two three").unwrap();
    fx.store.upsert(&pending).await.unwrap();

    let total = fx.cache.get(&sub).await;
    assert_eq!(total.words, 2, "pending file is transiently missing from the total");
    assert!(
      fx.handle.stats_in_flight.contains(&pending),
      "pending file must be dispatched for background computation"
    );
  }

  #[tokio::test]
  async fn test_large_file_gets_size_estimate() {
    let fx = fixture();
    let sub = fx.root.join("d");
    std::fs::create_dir(&sub).unwrap();
    let big = sub.join("big.md");
    // 200 bytes, threshold is 64, avg 2.0 bytes/char -> estimate 100
    std::fs::write(&big, "x".repeat(200)).unwrap();
    fx.store.upsert(&big).await.unwrap();

    let total = fx.cache.get(&sub).await;
    assert_eq!(total.total, 100, "large file contributes a size-derived estimate");
    assert!(fx.handle.stats_in_flight.contains(&big), "exact count still dispatched");
  }

  #[tokio::test]
  async fn test_subdirectories_use_cached_aggregate() {
    let fx = fixture();
    let sub = fx.root.join("d");
    let nested = sub.join("inner");
    std::fs::create_dir_all(&nested).unwrap();
    track_with_stats(&fx, &nested.join("a.md"), "one two").await;

    // Cold: the child subdirectory is dispatched, not recursed into
    let total = fx.cache.get(&sub).await;
    assert_eq!(total.total, 0);
    assert!(fx.handle.queued.contains(&nested));

    // Once the child's aggregate is cached the parent folds it in
    fx.cache.invalidate(&sub);
    let child_total = fx.cache.get(&nested).await;
    assert_eq!(child_total.words, 2);
    let total = fx.cache.get(&sub).await;
    assert_eq!(total.words, 2);
  }

  #[tokio::test]
  async fn test_concurrent_gets_share_one_listing() {
    let fx = fixture();
    let sub = fx.root.join("d");
    std::fs::create_dir(&sub).unwrap();
    track_with_stats(&fx, &sub.join("a.md"), "hello world").await;

    let (a, b) = tokio::join!(fx.cache.get(&sub), fx.cache.get(&sub));
    assert_eq!(a, b);
    assert_eq!(
      fx.reader.listings.load(Ordering::SeqCst),
      1,
      "concurrent callers must share one computation"
    );
  }

  #[tokio::test]
  async fn test_invalidate_retains_previous() {
    let fx = fixture();
    let sub = fx.root.join("d");
    std::fs::create_dir(&sub).unwrap();
    track_with_stats(&fx, &sub.join("a.md"), "hello world").await;

    let total = fx.cache.get(&sub).await;
    assert_eq!(fx.cache.snapshot(&sub), total);

    fx.cache.invalidate(&sub);
    assert!(fx.cache.entry(&sub).is_none(), "current is cleared");
    assert_eq!(fx.cache.snapshot(&sub), total, "previous keeps the value displayable");

    // Cold directory: snapshot is zero, never blocks
    assert_eq!(fx.cache.snapshot(&fx.root.join("unknown")), TextStats::default());
  }

  #[tokio::test]
  async fn test_forced_recompute_is_one_shot() {
    let fx = fixture();
    let sub = fx.root.join("d");
    std::fs::create_dir(&sub).unwrap();
    track_with_stats(&fx, &sub.join("a.md"), "hello world").await;

    let first = fx.cache.get(&sub).await;
    assert_eq!(fx.reader.listings.load(Ordering::SeqCst), 1);

    // Cached and unforced: no new listing
    let again = fx.cache.get(&sub).await;
    assert_eq!(again, first);
    assert_eq!(fx.reader.listings.load(Ordering::SeqCst), 1);

    // Forced: bypasses the cache, re-lists, and re-dispatches the file
    fx.cache.mark_forced(&sub);
    let forced = fx.cache.get(&sub).await;
    assert_eq!(forced, first, "no actual change occurred");
    assert_eq!(fx.reader.listings.load(Ordering::SeqCst), 2);
    assert!(fx.handle.stats_in_flight.contains(&sub.join("a.md")));

    // The flag is cleared on completion: back to the cache
    assert!(!fx.cache.is_force_pending(&sub));
    let after = fx.cache.get(&sub).await;
    assert_eq!(after, first);
    assert_eq!(fx.reader.listings.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn test_force_pending_covers_descendants() {
    let fx = fixture();
    let sub = fx.root.join("d");
    fx.cache.mark_forced(&fx.root);
    assert!(fx.cache.is_force_pending(&sub));
    assert!(fx.cache.is_force_pending(&sub.join("deep").join("a.md")));
    fx.cache.clear_forced(&fx.root);
    assert!(!fx.cache.is_force_pending(&sub));
  }

  #[tokio::test]
  async fn test_superseded_compute_parks_in_previous() {
    let fx = fixture();
    let sub = fx.root.join("d");
    std::fs::create_dir(&sub).unwrap();
    track_with_stats(&fx, &sub.join("a.md"), "hello world").await;

    // Invalidate while the compute sleeps inside the counting reader
    let cache = fx.cache.clone();
    let sub2 = sub.clone();
    let racing = tokio::spawn(async move { cache.get(&sub2).await });
    tokio::time::sleep(Duration::from_millis(10)).await;
    fx.cache.invalidate(&sub);
    let stats = racing.await.unwrap();
    assert_eq!(stats.words, 2);

    assert!(fx.cache.entry(&sub).is_none(), "superseded result must not be fresh");
    assert_eq!(fx.cache.snapshot(&sub), stats, "but stays displayable");
    assert!(fx.handle.queued.contains(&sub), "and the directory is re-enqueued");
  }
}
