//! The metadata store: one durable, UUID-keyed record per tracked file
//! or directory, with a path-key index and content-hash change
//! detection.
//!
//! Startup reads only the index; individual shards are faulted in on
//! first access. Directory entries pre-load their shards so structural
//! hash aggregation can run without touching every file shard.
//!
//! Mutations update the in-memory maps and the dirty/removed shard
//! sets; persistence is driven externally (see `persist`), so callers
//! decide when the dirty-state cascade (ancestor hashes, aggregate
//! invalidation) runs.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use dashmap::{DashMap, DashSet};
use inktally_core::{FileRecord, PathKeyCodec, Result, StatsPayload, mtime_millis, name_parts, now_millis};
use sha2::{Digest, Sha256};
use tracing::{debug, info, trace};
use uuid::Uuid;

use crate::persist::StorageGate;
use crate::storage::{INDEX_VERSION, IndexEntry, IndexFile, RecordStorage};

/// Record database version, persisted in the index.
pub const DB_VERSION: &str = "1.0.0";

/// Result of an upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsertOutcome {
  pub uuid: Uuid,
  pub created: bool,
  pub changed: bool,
  pub is_directory: bool,
}

/// Result of a flush attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
  /// Nothing pending.
  Clean,
  /// The index file is open for interactive editing; write deferred.
  Deferred,
  /// Pending mutations turned out to be no-op churn.
  SkippedNoChange,
  /// Dirty shards and the index were written.
  Written { shards: usize },
}

pub struct MetadataStore<S: StatsPayload> {
  codec: PathKeyCodec,
  storage: Arc<dyn RecordStorage<S>>,
  gate: Arc<dyn StorageGate>,
  db_dir: PathBuf,
  /// Resident records by uuid.
  records: DashMap<Uuid, FileRecord<S>>,
  /// Canonical path key -> uuid.
  path_index: DashMap<String, Uuid>,
  /// Directory flags from the index for uuids whose shard is not resident.
  dir_flags: DashSet<Uuid>,
  dirty_shards: DashSet<Uuid>,
  removed_shards: DashSet<Uuid>,
  unsaved: AtomicBool,
  full_rewrite: AtomicBool,
  last_saved_hash: Mutex<String>,
}

impl<S: StatsPayload> MetadataStore<S> {
  /// Open the store for a tracked root, reading only the index.
  ///
  /// Legacy keys (absolute or otherwise non-canonical) are rewritten to
  /// the canonical relative form; collisions are resolved by preferring
  /// the record whose file currently exists on disk, then the more
  /// recently updated one. The migration is logged because the
  /// tie-break is policy, not derived from content.
  pub fn open(root: &Path, storage: Arc<dyn RecordStorage<S>>, gate: Arc<dyn StorageGate>) -> Result<Self> {
    let db_dir = storage
      .index_path()
      .parent()
      .map(Path::to_path_buf)
      .unwrap_or_default();

    let store = Self {
      codec: PathKeyCodec::new(root),
      storage,
      gate,
      db_dir,
      records: DashMap::new(),
      path_index: DashMap::new(),
      dir_flags: DashSet::new(),
      dirty_shards: DashSet::new(),
      removed_shards: DashSet::new(),
      unsaved: AtomicBool::new(false),
      full_rewrite: AtomicBool::new(false),
      last_saved_hash: Mutex::new(String::new()),
    };

    if let Some(index) = store.storage.read_index()? {
      store.load_index(index);
    }

    let hash = store.db_hash();
    *store.lock_saved_hash() = hash;
    Ok(store)
  }

  fn load_index(&self, index: IndexFile) {
    let mut migrated = 0usize;
    let mut dropped = 0usize;

    for entry in index.entries {
      let canonical = self.codec.to_key(&self.codec.to_path(&entry.p));
      if canonical != entry.p {
        migrated += 1;
      }

      let existing = self.path_index.get(&canonical).map(|e| *e);
      match existing {
        Some(prior) if prior != entry.u => {
          let keep = self.pick_canonical(prior, entry.u);
          let drop = if keep == prior { entry.u } else { prior };
          self.records.remove(&drop);
          self.dir_flags.remove(&drop);
          self.removed_shards.insert(drop);
          self.path_index.insert(canonical.clone(), keep);
          dropped += 1;
          info!(
            key = %canonical,
            kept = %keep,
            dropped = %drop,
            "Path key collision during migration, kept existing-on-disk/newest record"
          );
        }
        _ => {
          self.path_index.insert(canonical.clone(), entry.u);
        }
      }

      if entry.d == 1 {
        self.dir_flags.insert(entry.u);
        // Directory shards are pre-loaded for hash aggregation
        self.ensure_loaded(entry.u);
      }
    }

    // Absolute keys that can no longer be resolved are stale leftovers
    let orphans: Vec<(String, Uuid)> = self
      .path_index
      .iter()
      .filter(|e| e.key().starts_with('/') && !self.codec.to_path(e.key()).exists())
      .map(|e| (e.key().clone(), *e.value()))
      .collect();
    for (key, uuid) in orphans {
      self.path_index.remove(&key);
      self.records.remove(&uuid);
      self.dir_flags.remove(&uuid);
      self.removed_shards.insert(uuid);
      dropped += 1;
    }

    if migrated > 0 || dropped > 0 {
      info!(
        migrated,
        dropped,
        entries = self.path_index.len(),
        "Migrated legacy path keys to canonical relative form"
      );
      // Rewrite every shard so on-disk keys match the new scheme
      let uuids: Vec<Uuid> = self.path_index.iter().map(|e| *e.value()).collect();
      for uuid in uuids {
        self.ensure_loaded(uuid);
        self.dirty_shards.insert(uuid);
      }
      self.full_rewrite.store(true, Ordering::SeqCst);
      self.unsaved.store(true, Ordering::SeqCst);
    }
  }

  /// Migration tie-break: prefer the record whose path exists on disk,
  /// else the more recently updated one.
  fn pick_canonical(&self, a: Uuid, b: Uuid) -> Uuid {
    self.ensure_loaded(a);
    self.ensure_loaded(b);
    let exists = |uuid: Uuid| {
      self
        .records
        .get(&uuid)
        .map(|r| self.codec.to_path(&r.path_key).exists())
        .unwrap_or(false)
    };
    let updated = |uuid: Uuid| self.records.get(&uuid).map(|r| r.updated_at).unwrap_or(0);

    let (ea, eb) = (exists(a), exists(b));
    if ea != eb {
      return if ea { a } else { b };
    }
    if updated(a) >= updated(b) { a } else { b }
  }

  pub fn codec(&self) -> &PathKeyCodec {
    &self.codec
  }

  pub fn root(&self) -> &Path {
    self.codec.root()
  }

  /// Number of tracked paths.
  pub fn tracked_count(&self) -> usize {
    self.path_index.len()
  }

  pub fn has_unsaved(&self) -> bool {
    self.unsaved.load(Ordering::SeqCst)
  }

  /// Whether a path belongs to the store's own database directory.
  pub fn is_internal(&self, path: &Path) -> bool {
    path.starts_with(&self.db_dir)
  }

  fn lock_saved_hash(&self) -> std::sync::MutexGuard<'_, String> {
    self.last_saved_hash.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn mark_shard_dirty(&self, uuid: Uuid, reason: &'static str) {
    if self.dirty_shards.insert(uuid) {
      trace!(%uuid, reason, "Shard marked dirty");
    }
    self.unsaved.store(true, Ordering::SeqCst);
  }

  fn ensure_loaded(&self, uuid: Uuid) {
    if self.records.contains_key(&uuid) {
      return;
    }
    if let Some(mut record) = self.storage.load(uuid) {
      // Shards may carry a pre-migration key; canonicalize on the way in
      record.path_key = self.codec.to_key(&self.codec.to_path(&record.path_key));
      if record.is_directory {
        self.dir_flags.insert(uuid);
      }
      self.records.insert(uuid, record);
    }
  }

  /// Fault in every shard named by the index (full enumeration).
  fn ensure_all_loaded(&self) {
    let uuids: Vec<Uuid> = self.path_index.iter().map(|e| *e.value()).collect();
    for uuid in uuids {
      self.ensure_loaded(uuid);
    }
  }

  pub fn uuid_for_path(&self, path: &Path) -> Option<Uuid> {
    self.path_index.get(&self.codec.to_key(path)).map(|e| *e)
  }

  pub fn get_by_uuid(&self, uuid: Uuid) -> Option<FileRecord<S>> {
    self.ensure_loaded(uuid);
    self.records.get(&uuid).map(|r| r.value().clone())
  }

  pub fn get_by_path(&self, path: &Path) -> Option<FileRecord<S>> {
    self.uuid_for_path(path).and_then(|uuid| self.get_by_uuid(uuid))
  }

  /// Stats for a file whose stored size/mtime match the live values.
  pub fn fresh_stats(&self, path: &Path, size: u64, mtime: i64) -> Option<S> {
    let record = self.get_by_path(path)?;
    if !record.is_directory && record.size == size && record.mtime == mtime {
      record.stats
    } else {
      None
    }
  }

  /// Every tracked record (faults in all shards).
  pub fn all_records(&self) -> Vec<FileRecord<S>> {
    self.ensure_all_loaded();
    self.records.iter().map(|r| r.value().clone()).collect()
  }

  /// Observe a path: create or update its record.
  ///
  /// A no-op when the stored size/mtime are unchanged; the content hash
  /// is recomputed only when they differ, to avoid needless full reads.
  /// A missing or unreadable path leaves any existing record untouched
  /// and returns `None`.
  pub async fn upsert(&self, path: &Path) -> Result<Option<UpsertOutcome>> {
    if self.is_internal(path) {
      return Ok(None);
    }

    let meta = match tokio::fs::metadata(path).await {
      Ok(meta) => meta,
      Err(e) => {
        debug!(path = %path.display(), error = %e, "Stat failed, record left untouched");
        return Ok(None);
      }
    };
    let is_dir = meta.is_dir();
    let size = meta.len();
    let mtime = mtime_millis(&meta);
    let key = self.codec.to_key(path);

    let existing_uuid = self.path_index.get(&key).map(|e| *e);
    if let Some(uuid) = existing_uuid {
      self.ensure_loaded(uuid);
      if self.records.contains_key(&uuid) {
        return self.update_existing(uuid, path, is_dir, size, mtime).await;
      }
      // Shard lost or unreadable: recreate below under the same uuid
    }

    let hash = if is_dir {
      String::new()
    } else {
      match hash_file(path).await {
        Ok(hash) => hash,
        Err(e) => {
          debug!(path = %path.display(), error = %e, "Read failed, record left untouched");
          return Ok(None);
        }
      }
    };

    let uuid = existing_uuid.unwrap_or_else(Uuid::new_v4);
    let (file_name, file_extension) = name_parts(path);
    let now = now_millis();
    let record = FileRecord {
      uuid,
      path_key: key.clone(),
      file_name,
      file_extension,
      size,
      mtime,
      hash,
      is_directory: is_dir,
      is_temporary: false,
      created_at: now,
      last_tracked_at: now,
      updated_at: now,
      stats: None,
    };

    if is_dir {
      self.dir_flags.insert(uuid);
    }
    self.records.insert(uuid, record);
    self.path_index.insert(key, uuid);
    self.mark_shard_dirty(uuid, "new path tracked");

    Ok(Some(UpsertOutcome {
      uuid,
      created: existing_uuid.is_none(),
      changed: true,
      is_directory: is_dir,
    }))
  }

  async fn update_existing(
    &self,
    uuid: Uuid,
    path: &Path,
    is_dir: bool,
    size: u64,
    mtime: i64,
  ) -> Result<Option<UpsertOutcome>> {
    {
      let record = match self.records.get(&uuid) {
        Some(record) => record,
        None => return Ok(None),
      };
      if record.size == size && record.mtime == mtime {
        trace!(path = %path.display(), "Unchanged, skipping");
        return Ok(Some(UpsertOutcome {
          uuid,
          created: false,
          changed: false,
          is_directory: record.is_directory,
        }));
      }
    }

    // size/mtime differ: for files, re-hash to see whether content moved
    let new_hash = if is_dir {
      None
    } else {
      match hash_file(path).await {
        Ok(hash) => Some(hash),
        Err(e) => {
          debug!(path = %path.display(), error = %e, "Read failed, record left untouched");
          return Ok(None);
        }
      }
    };

    if let Some(mut record) = self.records.get_mut(&uuid) {
      let now = now_millis();
      if let Some(hash) = new_hash
        && record.hash != hash
      {
        record.hash = hash;
        // Cached statistics are stale once the content hash moves
        record.stats = None;
      }
      record.size = size;
      record.mtime = mtime;
      record.is_temporary = false;
      record.updated_at = now;
      record.last_tracked_at = now;
    }
    self.mark_shard_dirty(uuid, "size/mtime/content changed");

    Ok(Some(UpsertOutcome {
      uuid,
      created: false,
      changed: true,
      is_directory: is_dir,
    }))
  }

  /// Delete the record for a path. Removing a tracked directory also
  /// drops its tracked descendants by key prefix.
  pub fn remove(&self, path: &Path) -> bool {
    let key = self.codec.to_key(path);
    let Some((_, uuid)) = self.path_index.remove(&key) else {
      return false;
    };

    let was_dir = self
      .records
      .remove(&uuid)
      .map(|(_, r)| r.is_directory)
      .unwrap_or_else(|| self.dir_flags.contains(&uuid));
    self.dir_flags.remove(&uuid);
    self.dirty_shards.remove(&uuid);
    self.removed_shards.insert(uuid);

    let mut removed = 1usize;
    if was_dir {
      let prefix = format!("{key}/");
      let children: Vec<(String, Uuid)> = self
        .path_index
        .iter()
        .filter(|e| e.key().starts_with(&prefix))
        .map(|e| (e.key().clone(), *e.value()))
        .collect();
      for (child_key, child_uuid) in children {
        self.path_index.remove(&child_key);
        self.records.remove(&child_uuid);
        self.dir_flags.remove(&child_uuid);
        self.dirty_shards.remove(&child_uuid);
        self.removed_shards.insert(child_uuid);
        removed += 1;
      }
    }

    self.unsaved.store(true, Ordering::SeqCst);
    debug!(path = %path.display(), removed, "Records removed");
    true
  }

  /// Rewrite a record's path key, preserving its uuid. A directory
  /// rename batch-rewrites every descendant key by prefix substitution.
  pub fn rename(&self, old_path: &Path, new_path: &Path) -> bool {
    let old_key = self.codec.to_key(old_path);
    let new_key = self.codec.to_key(new_path);
    let Some((_, uuid)) = self.path_index.remove(&old_key) else {
      return false;
    };

    self.ensure_loaded(uuid);
    if let Some(mut record) = self.records.get_mut(&uuid) {
      record.set_path_key(new_key.clone(), new_path);
    }
    self.path_index.insert(new_key.clone(), uuid);
    self.mark_shard_dirty(uuid, "renamed");

    let is_dir = self
      .records
      .get(&uuid)
      .map(|r| r.is_directory)
      .unwrap_or_else(|| self.dir_flags.contains(&uuid));
    if is_dir {
      let old_prefix = format!("{old_key}/");
      let new_prefix = format!("{new_key}/");
      let children: Vec<(String, Uuid)> = self
        .path_index
        .iter()
        .filter(|e| e.key().starts_with(&old_prefix))
        .map(|e| (e.key().clone(), *e.value()))
        .collect();
      let moved = children.len();
      for (child_key, child_uuid) in children {
        let tail = &child_key[old_prefix.len()..];
        let rewritten = format!("{new_prefix}{tail}");
        self.path_index.remove(&child_key);
        self.ensure_loaded(child_uuid);
        if let Some(mut record) = self.records.get_mut(&child_uuid) {
          let abs = self.codec.to_path(&rewritten);
          record.set_path_key(rewritten.clone(), &abs);
        }
        self.path_index.insert(rewritten, child_uuid);
        self.mark_shard_dirty(child_uuid, "directory child renamed");
      }
      debug!(old = %old_path.display(), new = %new_path.display(), moved, "Directory renamed");
    }

    true
  }

  /// Attach a statistics payload to a file record. No-op (and no dirty
  /// shard churn) when the payload is unchanged.
  pub fn update_stats(&self, path: &Path, stats: &S) -> bool {
    let Some(uuid) = self.uuid_for_path(path) else {
      return false;
    };
    self.ensure_loaded(uuid);
    let Some(mut record) = self.records.get_mut(&uuid) else {
      return false;
    };
    if record.stats.as_ref() == Some(stats) {
      return false;
    }
    record.stats = Some(stats.clone());
    let now = now_millis();
    record.updated_at = now;
    record.last_tracked_at = now;
    drop(record);
    self.mark_shard_dirty(uuid, "stats changed");
    true
  }

  /// Track a not-yet-persisted file (editor buffer without a disk file).
  pub fn create_temporary(&self, path: &Path) -> Uuid {
    if let Some(uuid) = self.uuid_for_path(path) {
      self.mark_temporary(path);
      return uuid;
    }
    let uuid = Uuid::new_v4();
    let key = self.codec.to_key(path);
    let (file_name, file_extension) = name_parts(path);
    let now = now_millis();
    let record = FileRecord {
      uuid,
      path_key: key.clone(),
      file_name,
      file_extension,
      size: 0,
      mtime: 0,
      hash: String::new(),
      is_directory: false,
      is_temporary: true,
      created_at: now,
      last_tracked_at: now,
      updated_at: now,
      stats: None,
    };
    self.records.insert(uuid, record);
    self.path_index.insert(key, uuid);
    self.mark_shard_dirty(uuid, "temporary record created");
    uuid
  }

  pub fn mark_temporary(&self, path: &Path) -> bool {
    self.set_temporary(path, true)
  }

  pub fn mark_saved(&self, path: &Path) -> bool {
    self.set_temporary(path, false)
  }

  fn set_temporary(&self, path: &Path, temporary: bool) -> bool {
    let Some(uuid) = self.uuid_for_path(path) else {
      return false;
    };
    self.ensure_loaded(uuid);
    let Some(mut record) = self.records.get_mut(&uuid) else {
      return false;
    };
    if record.is_temporary == temporary {
      return false;
    }
    record.is_temporary = temporary;
    let now = now_millis();
    record.updated_at = now;
    record.last_tracked_at = now;
    drop(record);
    self.mark_shard_dirty(uuid, "temporary flag changed");
    true
  }

  /// Garbage collection: drop records whose path no longer exists.
  /// Returns the absolute paths that were removed.
  pub fn sweep_missing(&self) -> Vec<PathBuf> {
    let entries: Vec<String> = self.path_index.iter().map(|e| e.key().clone()).collect();
    let mut removed = Vec::new();
    for key in entries {
      let abs = self.codec.to_path(&key);
      if !abs.exists() && self.remove(&abs) {
        removed.push(abs);
      }
    }
    if !removed.is_empty() {
      info!(count = removed.len(), "Swept missing paths");
    }
    removed
  }

  /// Recompute one directory's structural hash from its tracked
  /// descendants. Returns true when the hash actually changed.
  ///
  /// Tokens are `F:<relativePath>:<hash>` / `D:<relativePath>:<hash>`,
  /// sorted before hashing so the result is independent of read order.
  pub fn recompute_dir_hash(&self, dir: &Path) -> bool {
    let dir_key = self.codec.to_key(dir);
    let Some(uuid) = self.path_index.get(&dir_key).map(|e| *e) else {
      return false;
    };
    self.ensure_loaded(uuid);
    let is_dir = self.records.get(&uuid).map(|r| r.is_directory).unwrap_or(false);
    if !is_dir {
      return false;
    }

    let prefix = format!("{dir_key}/");
    let descendants: Vec<(String, Uuid)> = self
      .path_index
      .iter()
      .filter(|e| e.key().starts_with(&prefix))
      .map(|e| (e.key().clone(), *e.value()))
      .collect();

    let mut tokens = Vec::new();
    for (key, child_uuid) in descendants {
      self.ensure_loaded(child_uuid);
      if let Some(record) = self.records.get(&child_uuid)
        && !record.hash.is_empty()
      {
        let kind = if record.is_directory { 'D' } else { 'F' };
        let rel = &key[prefix.len()..];
        tokens.push(format!("{kind}:{rel}:{}", record.hash));
      }
    }

    let new_hash = if tokens.is_empty() {
      String::new()
    } else {
      tokens.sort();
      let mut hasher = Sha256::new();
      hasher.update(tokens.join("|"));
      hex::encode(hasher.finalize())
    };

    let changed = if let Some(mut record) = self.records.get_mut(&uuid)
      && record.hash != new_hash
    {
      record.hash = new_hash;
      let now = now_millis();
      record.updated_at = now;
      record.last_tracked_at = now;
      true
    } else {
      false
    };

    if changed {
      self.mark_shard_dirty(uuid, "structural hash changed");
    }
    changed
  }

  /// Content hash of the in-memory database, excluding volatile
  /// bookkeeping, used to absorb no-op churn before writes.
  fn db_hash(&self) -> String {
    let mut entries: Vec<(String, Uuid)> = self
      .path_index
      .iter()
      .map(|e| (e.key().clone(), *e.value()))
      .collect();
    entries.sort();

    let mut hasher = Sha256::new();
    hasher.update(DB_VERSION);
    for (key, uuid) in &entries {
      hasher.update(key.as_bytes());
      hasher.update(b"=");
      hasher.update(uuid.as_bytes());
      hasher.update(b"\n");
    }

    let mut uuids: Vec<Uuid> = self.records.iter().map(|r| r.uuid).collect();
    uuids.sort();
    for uuid in uuids {
      if let Some(record) = self.records.get(&uuid)
        && let Ok(json) = serde_json::to_string(&*record)
      {
        hasher.update(json.as_bytes());
        hasher.update(b"\n");
      }
    }

    hex::encode(hasher.finalize())
  }

  fn index_snapshot(&self) -> IndexFile {
    let mut entries: Vec<IndexEntry> = self
      .path_index
      .iter()
      .map(|e| {
        let uuid = *e.value();
        let is_dir = self
          .records
          .get(&uuid)
          .map(|r| r.is_directory)
          .unwrap_or_else(|| self.dir_flags.contains(&uuid));
        IndexEntry {
          u: uuid,
          p: e.key().clone(),
          d: u8::from(is_dir),
        }
      })
      .collect();
    entries.sort_by(|a, b| a.p.cmp(&b.p));
    IndexFile {
      version: INDEX_VERSION.to_string(),
      last_updated: now_millis(),
      entries,
    }
  }

  /// Persist pending mutations: dirty shards plus the index, never the
  /// full shard set unless a forced full rewrite is pending.
  ///
  /// Unforced flushes defer while the index file is open for
  /// interactive editing, and skip entirely when the in-memory database
  /// hash matches the hash at last save.
  pub fn flush(&self, force: bool) -> Result<FlushOutcome> {
    if !force && !self.has_unsaved() {
      return Ok(FlushOutcome::Clean);
    }
    if !force && self.gate.is_open_for_editing(&self.storage.index_path()) {
      return Ok(FlushOutcome::Deferred);
    }

    let hash = self.db_hash();
    if !force && *self.lock_saved_hash() == hash {
      self.unsaved.store(false, Ordering::SeqCst);
      self.dirty_shards.clear();
      self.removed_shards.clear();
      debug!("Skipping save, no substantive change");
      return Ok(FlushOutcome::SkippedNoChange);
    }

    let full = self.full_rewrite.swap(false, Ordering::SeqCst)
      || (force && self.dirty_shards.is_empty() && self.removed_shards.is_empty());

    let mut written = 0usize;
    if full {
      self.ensure_all_loaded();
      for record in self.records.iter() {
        self.storage.save(&record)?;
        written += 1;
      }
    } else {
      let dirty: Vec<Uuid> = self.dirty_shards.iter().map(|u| *u).collect();
      for uuid in dirty {
        if let Some(record) = self.records.get(&uuid) {
          self.storage.save(&record)?;
          written += 1;
        }
      }
    }

    let removed: Vec<Uuid> = self.removed_shards.iter().map(|u| *u).collect();
    for uuid in &removed {
      self.storage.remove(*uuid)?;
    }

    self.storage.write_index(&self.index_snapshot())?;

    *self.lock_saved_hash() = hash;
    self.unsaved.store(false, Ordering::SeqCst);
    self.dirty_shards.clear();
    self.removed_shards.clear();
    debug!(shards = written, removed = removed.len(), "Database flushed");
    Ok(FlushOutcome::Written { shards: written })
  }
}

/// SHA-256 content hash of a file, hex-encoded.
async fn hash_file(path: &Path) -> std::io::Result<String> {
  let bytes = tokio::fs::read(path).await?;
  let mut hasher = Sha256::new();
  hasher.update(&bytes);
  Ok(hex::encode(hasher.finalize()))
}
