//! The stored metadata unit for one tracked file or directory.

use std::path::Path;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current Unix time in milliseconds.
pub fn now_millis() -> i64 {
  Utc::now().timestamp_millis()
}

/// Modification time of a filesystem metadata record in Unix milliseconds.
pub fn mtime_millis(meta: &std::fs::Metadata) -> i64 {
  meta
    .modified()
    .ok()
    .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
    .map(|d| d.as_millis() as i64)
    .unwrap_or(0)
}

/// Split a path into its file name and lower-cased dotted extension
/// (e.g. `"chapter.MD"` -> `("chapter.MD", ".md")`).
pub fn name_parts(path: &Path) -> (String, String) {
  let file_name = path
    .file_name()
    .map(|n| n.to_string_lossy().into_owned())
    .unwrap_or_default();
  let extension = path
    .extension()
    .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
    .unwrap_or_default();
  (file_name, extension)
}

/// Metadata record for one tracked file or directory.
///
/// `hash` holds the content hash for files and the structural hash for
/// directories. It is empty only while the path has never been
/// successfully read (or a directory has no hashed descendants yet).
///
/// The serialized shape is the shard wire format: camelCase fields with
/// the path key stored under `filePath`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord<S> {
  pub uuid: Uuid,
  #[serde(rename = "filePath")]
  pub path_key: String,
  pub file_name: String,
  pub file_extension: String,
  pub size: u64,
  /// Modification time at last observation, Unix millis.
  pub mtime: i64,
  pub hash: String,
  #[serde(default)]
  pub is_directory: bool,
  #[serde(default)]
  pub is_temporary: bool,
  pub created_at: i64,
  pub last_tracked_at: i64,
  pub updated_at: i64,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub stats: Option<S>,
}

impl<S> FileRecord<S> {
  /// Rewrite the path key (rename), refreshing the derived name fields
  /// and the update timestamps. The uuid is untouched.
  pub fn set_path_key(&mut self, key: String, abs_path: &Path) {
    let (file_name, file_extension) = name_parts(abs_path);
    self.path_key = key;
    self.file_name = file_name;
    self.file_extension = file_extension;
    let now = now_millis();
    self.updated_at = now;
    self.last_tracked_at = now;
  }
}
