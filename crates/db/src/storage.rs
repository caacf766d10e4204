//! Sharded JSON record storage.
//!
//! The database directory holds a lightweight `index.json` plus one
//! shard file per record, grouped into subdirectories by a short UUID
//! prefix to bound directory fan-out:
//!
//! ```text
//! .inktally/
//!   index.json
//!   3f/3fa85f64-5717-4562-b3fc-2c963f66afa6.json
//!   9b/9b2e6d1c-....json
//! ```
//!
//! Shards store the full record (including the opaque stats payload);
//! the index stores only `(uuid, pathKey, isDirectory)` triples. A
//! malformed shard is treated exactly like an absent one: the record is
//! considered not-yet-loaded and will be recreated from a fresh
//! filesystem stat on the next upsert.

use std::path::{Path, PathBuf};

use inktally_core::{FileRecord, Result, StatsPayload};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

/// Index file name inside the database directory.
pub const INDEX_FILE: &str = "index.json";

/// Index format version.
pub const INDEX_VERSION: &str = "1.0.0+idx1";

/// Length of the UUID prefix used for shard subdirectories.
const SHARD_PREFIX_LEN: usize = 2;

/// One index entry: uuid, path key, directory flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
  pub u: Uuid,
  pub p: String,
  pub d: u8,
}

/// The persisted index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexFile {
  pub version: String,
  #[serde(rename = "lastUpdated")]
  pub last_updated: i64,
  pub entries: Vec<IndexEntry>,
}

/// Storage backend for records and the index.
///
/// The sharding scheme stays behind this seam so it can be swapped for
/// an embedded key-value store without touching the store logic.
pub trait RecordStorage<S: StatsPayload>: Send + Sync {
  /// Load one record; `None` when the shard is absent or unreadable.
  fn load(&self, uuid: Uuid) -> Option<FileRecord<S>>;

  /// Write one record's shard.
  fn save(&self, record: &FileRecord<S>) -> Result<()>;

  /// Delete one record's shard if present.
  fn remove(&self, uuid: Uuid) -> Result<()>;

  /// Read the index; `None` when no index exists yet.
  fn read_index(&self) -> Result<Option<IndexFile>>;

  /// Write the index.
  fn write_index(&self, index: &IndexFile) -> Result<()>;

  /// Path of the index file (used for write-contention checks).
  fn index_path(&self) -> PathBuf;
}

/// Filesystem implementation of [`RecordStorage`].
#[derive(Debug)]
pub struct ShardedJsonStorage {
  dir: PathBuf,
}

impl ShardedJsonStorage {
  /// Open (creating if needed) a database directory.
  pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
    let dir = dir.into();
    std::fs::create_dir_all(&dir)?;
    Ok(Self { dir })
  }

  pub fn dir(&self) -> &Path {
    &self.dir
  }

  fn shard_path(&self, uuid: Uuid) -> PathBuf {
    let id = uuid.to_string();
    self.dir.join(&id[..SHARD_PREFIX_LEN]).join(format!("{id}.json"))
  }
}

impl<S: StatsPayload> RecordStorage<S> for ShardedJsonStorage {
  fn load(&self, uuid: Uuid) -> Option<FileRecord<S>> {
    let path = self.shard_path(uuid);
    let raw = std::fs::read_to_string(&path).ok()?;
    match serde_json::from_str::<FileRecord<S>>(&raw) {
      Ok(record) if record.uuid == uuid => Some(record),
      Ok(_) => {
        warn!(shard = %path.display(), "Shard uuid mismatch, treating as absent");
        None
      }
      Err(e) => {
        warn!(shard = %path.display(), error = %e, "Malformed shard, treating as absent");
        None
      }
    }
  }

  fn save(&self, record: &FileRecord<S>) -> Result<()> {
    let path = self.shard_path(record.uuid);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string(record)?;
    std::fs::write(&path, json)?;
    Ok(())
  }

  fn remove(&self, uuid: Uuid) -> Result<()> {
    let path = self.shard_path(uuid);
    match std::fs::remove_file(&path) {
      Ok(()) => Ok(()),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
      Err(e) => Err(e.into()),
    }
  }

  fn read_index(&self) -> Result<Option<IndexFile>> {
    let path = self.dir.join(INDEX_FILE);
    let raw = match std::fs::read_to_string(&path) {
      Ok(raw) => raw,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
      Err(e) => return Err(e.into()),
    };
    match serde_json::from_str(&raw) {
      Ok(index) => Ok(Some(index)),
      Err(e) => {
        warn!(path = %path.display(), error = %e, "Malformed index, starting empty");
        Ok(None)
      }
    }
  }

  fn write_index(&self, index: &IndexFile) -> Result<()> {
    let path = self.dir.join(INDEX_FILE);
    let json = serde_json::to_string(index)?;
    std::fs::write(&path, json)?;
    debug!(entries = index.entries.len(), "Index written");
    Ok(())
  }

  fn index_path(&self) -> PathBuf {
    self.dir.join(INDEX_FILE)
  }
}
