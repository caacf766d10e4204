//! Statistics payloads.
//!
//! The store and the aggregate cache are agnostic to what "statistics"
//! mean: they carry an opaque payload that only needs to be mergeable
//! and serializable. `TextStats` is the built-in payload for mixed
//! CJK/Latin text.

use serde::{Serialize, de::DeserializeOwned};

/// Opaque per-file statistics payload.
///
/// `Default` is the zero value. `merge` must be commutative and
/// associative so directory totals are independent of fold order.
pub trait StatsPayload:
  Clone + Default + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
  /// Fold another payload into this one.
  fn merge(&mut self, other: &Self);

  /// Size-derived approximation used for files too large to read
  /// synchronously. Only the headline total needs to be populated; the
  /// exact computation replaces the estimate shortly after.
  fn estimate_from_size(bytes: u64, avg_bytes_per_char: f64) -> Self;
}

/// Text statistics for mixed CJK/Latin content.
///
/// `total` counts CJK ideographs plus Latin words, the convention used
/// for prose word counts in mixed-script documents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TextStats {
  pub cjk_chars: u64,
  pub ascii_chars: u64,
  pub words: u64,
  pub non_ws_chars: u64,
  pub total: u64,
}

impl StatsPayload for TextStats {
  fn merge(&mut self, other: &Self) {
    self.cjk_chars += other.cjk_chars;
    self.ascii_chars += other.ascii_chars;
    self.words += other.words;
    self.non_ws_chars += other.non_ws_chars;
    self.total += other.total;
  }

  fn estimate_from_size(bytes: u64, avg_bytes_per_char: f64) -> Self {
    let chars = (bytes as f64 / avg_bytes_per_char.max(0.1)).round() as u64;
    Self {
      total: chars,
      ..Self::default()
    }
  }
}

/// Han ideograph check (CJK Unified Ideographs plus the common
/// extension and compatibility blocks).
fn is_cjk(c: char) -> bool {
  matches!(c,
    '\u{4E00}'..='\u{9FFF}'
      | '\u{3400}'..='\u{4DBF}'
      | '\u{F900}'..='\u{FAFF}'
      | '\u{20000}'..='\u{2A6DF}')
}

fn is_word_char(c: char) -> bool {
  c.is_ascii_alphanumeric() || c == '_'
}

/// Analyze a text buffer into `TextStats`.
///
/// Words are maximal runs of `[A-Za-z0-9_]`; `total` is CJK chars plus
/// words.
pub fn analyze_text(text: &str) -> TextStats {
  let mut stats = TextStats::default();
  let mut in_word = false;

  for c in text.chars() {
    if is_cjk(c) {
      stats.cjk_chars += 1;
    }
    if c.is_ascii() {
      stats.ascii_chars += 1;
    }
    if !c.is_whitespace() {
      stats.non_ws_chars += 1;
    }

    if is_word_char(c) {
      if !in_word {
        stats.words += 1;
        in_word = true;
      }
    } else {
      in_word = false;
    }
  }

  stats.total = stats.cjk_chars + stats.words;
  stats
}

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;

  use super::*;

  #[test]
  fn test_analyze_latin_text() {
    let stats = analyze_text("hello world");
    assert_eq!(stats.words, 2);
    assert_eq!(stats.cjk_chars, 0);
    assert_eq!(stats.ascii_chars, 11);
    assert_eq!(stats.non_ws_chars, 10);
    assert_eq!(stats.total, 2);
  }

  #[test]
  fn test_analyze_cjk_text() {
    let stats = analyze_text("你好世界");
    assert_eq!(stats.cjk_chars, 4);
    assert_eq!(stats.words, 0);
    assert_eq!(stats.total, 4);
  }

  #[test]
  fn test_analyze_mixed_text() {
    // 2 ideographs + 2 words, underscore joins a single word
    let stats = analyze_text("你好 hello_world rust");
    assert_eq!(stats.cjk_chars, 2);
    assert_eq!(stats.words, 2);
    assert_eq!(stats.total, 4);
  }

  #[test]
  fn test_analyze_empty() {
    assert_eq!(analyze_text(""), TextStats::default());
  }

  #[test]
  fn test_merge_adds_fields() {
    let mut a = analyze_text("hello world");
    let b = analyze_text("你好");
    a.merge(&b);
    assert_eq!(a.words, 2);
    assert_eq!(a.cjk_chars, 2);
    assert_eq!(a.total, 4);
  }

  #[test]
  fn test_merge_order_independent() {
    let parts = ["hello", "你好世界", "a b c"];
    let mut forward = TextStats::default();
    for p in parts {
      forward.merge(&analyze_text(p));
    }
    let mut backward = TextStats::default();
    for p in parts.iter().rev() {
      backward.merge(&analyze_text(p));
    }
    assert_eq!(forward, backward);
  }

  #[test]
  fn test_estimate_from_size() {
    let est = TextStats::estimate_from_size(1000, 2.0);
    assert_eq!(est.total, 500);
    assert_eq!(est.words, 0);
  }

  #[test]
  fn test_serde_shape() {
    let stats = analyze_text("hello 你好");
    let json = serde_json::to_value(stats).unwrap();
    assert!(json.get("cjkChars").is_some());
    assert!(json.get("nonWsChars").is_some());
    assert!(json.get("non_ws_chars").is_none());
  }
}
