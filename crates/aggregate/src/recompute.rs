//! Event-driven recompute pipeline.
//!
//! Directories go through a FIFO queue de-duplicated by a parallel
//! queued set: the processor pops one directory, recomputes its
//! aggregate, notifies subscribers, then chains to the parent until the
//! tracked root, yielding between iterations. Individual file
//! statistics are dispatched off the synchronous call stack through an
//! in-flight set, so at most one computation per path is outstanding at
//! any time.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashSet;
use db::{DirHashHandle, MetadataStore, PersistHandle};
use inktally_core::{StatsPayload, TrackerEvent, now_millis};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::cache::AggregateStatsCache;
use crate::traits::FileStatifier;

pub(crate) enum RecomputeMsg {
  Dir(PathBuf),
  FileStat(PathBuf),
}

/// Handle to the recompute pipeline. Cheap to clone.
#[derive(Clone)]
pub struct RecomputeHandle {
  tx: mpsc::UnboundedSender<RecomputeMsg>,
  pub(crate) queued: Arc<DashSet<PathBuf>>,
  pub(crate) stats_in_flight: Arc<DashSet<PathBuf>>,
}

impl RecomputeHandle {
  pub(crate) fn channel() -> (Self, mpsc::UnboundedReceiver<RecomputeMsg>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
      Self {
        tx,
        queued: Arc::new(DashSet::new()),
        stats_in_flight: Arc::new(DashSet::new()),
      },
      rx,
    )
  }

  /// Queue a directory for aggregate recompute, unless already queued.
  pub fn enqueue_dir(&self, dir: &Path) {
    if self.queued.insert(dir.to_path_buf()) {
      trace!(dir = %dir.display(), "Directory queued for recompute");
      let _ = self.tx.send(RecomputeMsg::Dir(dir.to_path_buf()));
    }
  }

  /// Dispatch one file's statistics computation, unless one is already
  /// in flight for the same path.
  pub fn schedule_file_stat(&self, path: &Path) {
    if self.stats_in_flight.insert(path.to_path_buf()) {
      trace!(path = %path.display(), "File statistics dispatch");
      let _ = self.tx.send(RecomputeMsg::FileStat(path.to_path_buf()));
    }
  }
}

/// Everything a background file-stat completion needs to run the
/// content-change cascade.
struct TaskCtx<S: StatsPayload> {
  root: PathBuf,
  cache: AggregateStatsCache<S>,
  store: Arc<MetadataStore<S>>,
  statifier: Arc<dyn FileStatifier<S>>,
  persist: PersistHandle,
  dir_hash: DirHashHandle,
  handle: RecomputeHandle,
  events: broadcast::Sender<TrackerEvent<S>>,
}

/// Background processor for the recompute queue.
pub struct RecomputeTask<S: StatsPayload> {
  ctx: Arc<TaskCtx<S>>,
  rx: mpsc::UnboundedReceiver<RecomputeMsg>,
  cancel: CancellationToken,
}

impl<S: StatsPayload> RecomputeTask<S> {
  #[allow(clippy::too_many_arguments)]
  pub fn spawn(
    root: PathBuf,
    cache: AggregateStatsCache<S>,
    store: Arc<MetadataStore<S>>,
    statifier: Arc<dyn FileStatifier<S>>,
    persist: PersistHandle,
    dir_hash: DirHashHandle,
    handle: RecomputeHandle,
    rx: mpsc::UnboundedReceiver<RecomputeMsg>,
    events: broadcast::Sender<TrackerEvent<S>>,
    cancel: CancellationToken,
  ) -> JoinHandle<()> {
    let task = Self {
      ctx: Arc::new(TaskCtx {
        root,
        cache,
        store,
        statifier,
        persist,
        dir_hash,
        handle,
        events,
      }),
      rx,
      cancel,
    };
    tokio::spawn(task.run())
  }

  async fn run(mut self) {
    loop {
      tokio::select! {
        biased;

        _ = self.cancel.cancelled() => break,

        msg = self.rx.recv() => {
          match msg {
            None => break,
            Some(RecomputeMsg::Dir(dir)) => self.process_dir(dir).await,
            Some(RecomputeMsg::FileStat(path)) => spawn_file_stat(self.ctx.clone(), path),
          }
        }
      }
    }
    debug!("Recompute task stopped");
  }

  async fn process_dir(&self, dir: PathBuf) {
    let ctx = &self.ctx;
    // Pop before computing so marks that land mid-compute re-enqueue
    ctx.handle.queued.remove(&dir);

    let stats = ctx.cache.get(&dir).await;
    let _ = ctx.events.send(TrackerEvent::AggregateUpdated {
      path: dir.clone(),
      stats,
      computed_at: now_millis(),
    });

    // Chain propagation toward the tracked root. The parent's cached
    // total predates this level's value, so it is invalidated first.
    if dir != ctx.root
      && let Some(parent) = dir.parent()
      && parent.starts_with(&ctx.root)
    {
      ctx.cache.invalidate(parent);
      ctx.handle.enqueue_dir(parent);
    }

    // Keep the host responsive between queue iterations
    tokio::task::yield_now().await;
  }
}

/// Run one file's statistics computation off the queue processor, then
/// feed the result back through the same cascade a content change uses.
fn spawn_file_stat<S: StatsPayload>(ctx: Arc<TaskCtx<S>>, path: PathBuf) {
  tokio::spawn(async move {
    match ctx.statifier.compute(&path).await {
      Ok(stats) => {
        // A dispatch can race record creation; make sure there is a
        // record to attach the payload to
        if ctx.store.get_by_path(&path).is_none() {
          let _ = ctx.store.upsert(&path).await;
        }
        if ctx.store.update_stats(&path, &stats) {
          ctx.dir_hash.mark_ancestors_dirty(&path);
          ctx.persist.schedule_save();
          let _ = ctx.events.send(TrackerEvent::FileRecordChanged { path: path.clone() });
        }
        ctx.cache.clear_forced(&path);
        if let Some(parent) = path.parent()
          && parent.starts_with(&ctx.root)
        {
          ctx.cache.invalidate(parent);
          ctx.handle.enqueue_dir(parent);
        }
      }
      Err(e) => {
        // Unreadable file: the record stays as-is, eligible for sweep
        debug!(path = %path.display(), error = %e, "File statistics computation failed");
        ctx.cache.clear_forced(&path);
      }
    }
    ctx.handle.stats_in_flight.remove(&path);
  });
}
