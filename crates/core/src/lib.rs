pub mod config;
pub mod error;
pub mod events;
pub mod path_key;
pub mod record;
pub mod stats;

pub use config::{AggregateConfig, CONFIG_FILE, Config, StoreConfig};
pub use error::{Error, Result};
pub use events::{ChangeEvent, ChangeKind, TrackerEvent};
pub use path_key::PathKeyCodec;
pub use record::{FileRecord, mtime_millis, name_parts, now_millis};
pub use stats::{StatsPayload, TextStats, analyze_text};
