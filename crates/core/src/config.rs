//! Configuration with per-workspace overrides.
//!
//! Defaults are compiled in; a workspace may override any section from
//! `<root>/inktally.toml`. Unknown or unparsable files fall back to the
//! defaults with a warning rather than failing startup.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// File name of the per-workspace config override.
pub const CONFIG_FILE: &str = "inktally.toml";

/// Metadata store and persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
  /// Database directory relative to the workspace root (default: ".inktally")
  pub db_dir: String,

  /// Debounce before a burst of mutations is persisted, ms (default: 1000)
  pub save_debounce_ms: u64,

  /// Secondary delay when the index file is open for interactive
  /// editing, ms (default: 2000)
  pub open_retry_delay_ms: u64,

  /// Consecutive open-file deferrals before a forced write (default: 5)
  pub max_open_skips: u32,

  /// Debounce before dirty directory hashes are recomputed, ms (default: 500)
  pub dir_hash_debounce_ms: u64,
}

impl Default for StoreConfig {
  fn default() -> Self {
    Self {
      db_dir: ".inktally".to_string(),
      save_debounce_ms: 1000,
      open_retry_delay_ms: 2000,
      max_open_skips: 5,
      dir_hash_debounce_ms: 500,
    }
  }
}

/// Aggregate cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregateConfig {
  /// File extensions included in aggregation, without dots (default: md, txt)
  pub extensions: Vec<String>,

  /// Files above this size get an immediate size-derived estimate while
  /// the exact count runs in the background, bytes (default: 1 MiB)
  pub large_file_threshold: u64,

  /// Average bytes per character used for the estimate (default: 2.0)
  pub avg_bytes_per_char: f64,

  /// Capacity of the subscriber event channel (default: 256)
  pub event_capacity: usize,
}

impl Default for AggregateConfig {
  fn default() -> Self {
    Self {
      extensions: vec!["md".to_string(), "txt".to_string()],
      large_file_threshold: 1024 * 1024,
      avg_bytes_per_char: 2.0,
      event_capacity: 256,
    }
  }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
  pub store: StoreConfig,
  pub aggregate: AggregateConfig,
}

impl Config {
  /// Load the workspace config, falling back to defaults when the file
  /// is absent or malformed.
  pub fn load(root: &Path) -> Self {
    let path = root.join(CONFIG_FILE);
    let content = match std::fs::read_to_string(&path) {
      Ok(content) => content,
      Err(_) => {
        debug!(path = %path.display(), "No workspace config, using defaults");
        return Self::default();
      }
    };

    match toml::from_str(&content) {
      Ok(config) => {
        debug!(path = %path.display(), "Loaded workspace config");
        config
      }
      Err(e) => {
        warn!(path = %path.display(), error = %e, "Invalid workspace config, using defaults");
        Self::default()
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;

  use super::*;

  #[test]
  fn test_defaults() {
    let config = Config::default();
    assert_eq!(config.store.save_debounce_ms, 1000);
    assert_eq!(config.store.dir_hash_debounce_ms, 500);
    assert_eq!(config.aggregate.extensions, vec!["md", "txt"]);
  }

  #[test]
  fn test_partial_override() {
    let config: Config = toml::from_str(
      r#"
      [store]
      save_debounce_ms = 50

      [aggregate]
      extensions = ["md", "txt", "rst"]
      "#,
    )
    .unwrap();
    assert_eq!(config.store.save_debounce_ms, 50);
    // untouched fields keep their defaults
    assert_eq!(config.store.max_open_skips, 5);
    assert_eq!(config.aggregate.extensions.len(), 3);
  }

  #[test]
  fn test_load_missing_file() {
    let dir = tempfile::TempDir::new().unwrap();
    let config = Config::load(dir.path());
    assert_eq!(config.store.save_debounce_ms, 1000);
  }

  #[test]
  fn test_load_malformed_file() {
    let dir = tempfile::TempDir::new().unwrap();
    std::fs::write(dir.path().join(CONFIG_FILE), "not [valid toml").unwrap();
    let config = Config::load(dir.path());
    assert_eq!(config.store.save_debounce_ms, 1000);
  }
}
