//! Typed event payloads.
//!
//! `ChangeEvent` is what the external change source feeds into the
//! tracker; `TrackerEvent` is what subscribers receive back.

use std::path::PathBuf;

/// What happened to a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeKind {
  Created,
  Modified,
  Deleted,
  Renamed { old_path: PathBuf },
}

/// A single filesystem change notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
  pub path: PathBuf,
  pub kind: ChangeKind,
}

impl ChangeEvent {
  pub fn created(path: impl Into<PathBuf>) -> Self {
    Self {
      path: path.into(),
      kind: ChangeKind::Created,
    }
  }

  pub fn modified(path: impl Into<PathBuf>) -> Self {
    Self {
      path: path.into(),
      kind: ChangeKind::Modified,
    }
  }

  pub fn deleted(path: impl Into<PathBuf>) -> Self {
    Self {
      path: path.into(),
      kind: ChangeKind::Deleted,
    }
  }

  pub fn renamed(old_path: impl Into<PathBuf>, new_path: impl Into<PathBuf>) -> Self {
    Self {
      path: new_path.into(),
      kind: ChangeKind::Renamed {
        old_path: old_path.into(),
      },
    }
  }
}

/// Event published to subscribers.
#[derive(Debug, Clone)]
pub enum TrackerEvent<S> {
  /// A directory's aggregate was recomputed.
  AggregateUpdated {
    path: PathBuf,
    stats: S,
    computed_at: i64,
  },
  /// A file record's metadata or statistics changed.
  FileRecordChanged { path: PathBuf },
}
