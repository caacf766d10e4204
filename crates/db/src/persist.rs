//! Persistence scheduler.
//!
//! Decides when in-memory mutations are flushed to disk: bursts of
//! mutations are debounced, and writes are deferred while the index
//! file is open for interactive editing elsewhere, up to a bounded
//! number of consecutive deferrals, after which a forced write
//! guarantees forward progress.
//!
//! The task owns the debounce state; the cheap-clone [`PersistHandle`]
//! is how the rest of the system talks to it.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use inktally_core::{Error, Result, StatsPayload, StoreConfig};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::store::{FlushOutcome, MetadataStore};

/// Reports whether a storage file is currently open for interactive
/// editing (so writes can be deferred instead of fighting the editor).
pub trait StorageGate: Send + Sync {
  fn is_open_for_editing(&self, path: &Path) -> bool;
}

/// Default gate: nothing is ever open.
pub struct NoEditors;

impl StorageGate for NoEditors {
  fn is_open_for_editing(&self, _path: &Path) -> bool {
    false
  }
}

enum PersistMsg {
  ScheduleSave,
  Flush {
    force: bool,
    reply: oneshot::Sender<Result<FlushOutcome>>,
  },
}

/// Handle to the persistence task. Cheap to clone.
#[derive(Clone)]
pub struct PersistHandle {
  tx: mpsc::UnboundedSender<PersistMsg>,
}

impl PersistHandle {
  /// (Re)arm the save debounce. No-op when nothing changed.
  pub fn schedule_save(&self) {
    let _ = self.tx.send(PersistMsg::ScheduleSave);
  }

  /// Flush now, bypassing the debounce. `force` also bypasses the
  /// editing gate and the no-change skip.
  pub async fn flush(&self, force: bool) -> Result<FlushOutcome> {
    let (reply, rx) = oneshot::channel();
    self
      .tx
      .send(PersistMsg::Flush { force, reply })
      .map_err(|_| Error::Storage("persistence task has shut down".into()))?;
    rx.await
      .map_err(|_| Error::Storage("persistence task has shut down".into()))?
  }
}

/// Background task driving debounced persistence for one store.
pub struct PersistTask<S: StatsPayload> {
  store: Arc<MetadataStore<S>>,
  rx: mpsc::UnboundedReceiver<PersistMsg>,
  debounce: Duration,
  open_retry: Duration,
  max_open_skips: u32,
  cancel: CancellationToken,
}

impl<S: StatsPayload> PersistTask<S> {
  pub fn spawn(
    store: Arc<MetadataStore<S>>,
    config: &StoreConfig,
    cancel: CancellationToken,
  ) -> (PersistHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let task = Self {
      store,
      rx,
      debounce: Duration::from_millis(config.save_debounce_ms),
      open_retry: Duration::from_millis(config.open_retry_delay_ms),
      max_open_skips: config.max_open_skips,
      cancel,
    };
    (PersistHandle { tx }, tokio::spawn(task.run()))
  }

  async fn run(mut self) {
    let mut deadline: Option<Instant> = None;
    let mut open_skips: u32 = 0;

    loop {
      // The sleep branch is disabled while no flush is pending
      let sleep_target = deadline.unwrap_or_else(|| Instant::now() + Duration::from_secs(3600));

      tokio::select! {
        biased;

        _ = self.cancel.cancelled() => {
          // Do not lose pending mutations on shutdown
          if let Err(e) = self.store.flush(true) {
            warn!(error = %e, "Final flush failed on shutdown");
          }
          break;
        }

        msg = self.rx.recv() => {
          match msg {
            None => {
              if let Err(e) = self.store.flush(true) {
                warn!(error = %e, "Final flush failed on shutdown");
              }
              break;
            }
            Some(PersistMsg::ScheduleSave) => {
              if self.store.has_unsaved() {
                deadline = Some(Instant::now() + self.debounce);
              }
            }
            Some(PersistMsg::Flush { force, reply }) => {
              deadline = None;
              open_skips = 0;
              let _ = reply.send(self.store.flush(force));
            }
          }
        }

        _ = tokio::time::sleep_until(sleep_target), if deadline.is_some() => {
          deadline = None;
          match self.store.flush(false) {
            Ok(FlushOutcome::Deferred) => {
              open_skips += 1;
              if open_skips > self.max_open_skips {
                info!(skips = open_skips, "Index still open, forcing write");
                open_skips = 0;
                if let Err(e) = self.store.flush(true) {
                  warn!(error = %e, "Forced flush failed");
                }
              } else {
                debug!(skips = open_skips, "Index open in editor, deferring write");
                deadline = Some(Instant::now() + self.open_retry);
              }
            }
            Ok(outcome) => {
              open_skips = 0;
              debug!(?outcome, "Debounced flush");
            }
            Err(e) => {
              open_skips = 0;
              warn!(error = %e, "Debounced flush failed");
            }
          }
        }
      }
    }
  }
}
