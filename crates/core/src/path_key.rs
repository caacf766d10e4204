//! Canonical path keys.
//!
//! A path key is the workspace-relative form of an absolute path:
//! POSIX separators, lower-cased when the filesystem is
//! case-insensitive. Paths outside the tracked root fall back to an
//! absolute, still-canonicalized key. The codec performs no I/O.

use std::path::{Component, Path, PathBuf};

/// Canonicalizes absolute paths into stable workspace-relative keys and
/// back.
#[derive(Debug, Clone)]
pub struct PathKeyCodec {
  root: PathBuf,
  fold_case: bool,
}

impl PathKeyCodec {
  /// Codec for a tracked root. Case folding defaults to on for
  /// case-insensitive platforms.
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self::with_case_folding(root, cfg!(windows))
  }

  pub fn with_case_folding(root: impl Into<PathBuf>, fold_case: bool) -> Self {
    Self {
      root: lexical_clean(&root.into()),
      fold_case,
    }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  /// Canonical key for an absolute path.
  pub fn to_key(&self, path: &Path) -> String {
    let abs = lexical_clean(path);
    let key = match abs.strip_prefix(&self.root) {
      Ok(rel) if !rel.as_os_str().is_empty() => {
        let parts: Vec<String> = rel
          .components()
          .map(|c| c.as_os_str().to_string_lossy().into_owned())
          .collect();
        parts.join("/")
      }
      // Outside the root (or the root itself): keep an absolute key
      _ => abs.to_string_lossy().replace('\\', "/"),
    };
    if self.fold_case { key.to_lowercase() } else { key }
  }

  /// Absolute path for a key. Absolute keys (outside-root case) are
  /// returned with local separators; relative keys are re-joined with
  /// the root.
  pub fn to_path(&self, key: &str) -> PathBuf {
    if is_absolute_key(key) {
      if cfg!(windows) {
        PathBuf::from(key.replace('/', "\\"))
      } else {
        PathBuf::from(key)
      }
    } else {
      let mut path = self.root.clone();
      for part in key.split('/') {
        path.push(part);
      }
      path
    }
  }

  /// Normalize a key or path string for map comparisons.
  pub fn normalize(&self, key_like: &str) -> String {
    let s = key_like.replace('\\', "/");
    if self.fold_case { s.to_lowercase() } else { s }
  }
}

/// Whether a key encodes an absolute path (POSIX root or drive letter).
fn is_absolute_key(key: &str) -> bool {
  if key.starts_with('/') {
    return true;
  }
  let bytes = key.as_bytes();
  bytes.len() >= 3 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' && bytes[2] == b'/'
}

/// Lexically resolve `.` and `..` components without touching the
/// filesystem.
fn lexical_clean(path: &Path) -> PathBuf {
  let mut out = PathBuf::new();
  for component in path.components() {
    match component {
      Component::CurDir => {}
      Component::ParentDir => {
        out.pop();
      }
      other => out.push(other),
    }
  }
  out
}
