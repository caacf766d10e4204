pub mod cache;
pub mod recompute;
pub mod service;
pub mod traits;

pub use cache::{AggregateEntry, AggregateStatsCache};
pub use recompute::{RecomputeHandle, RecomputeTask};
pub use service::{Collaborators, Tracker};
pub use traits::{
  DirEntryInfo, DirectoryReader, FileStatifier, IgnoreFilter, TextStatifier, TokioDirectoryReader, WorkspaceFilter,
};
