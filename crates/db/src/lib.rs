pub mod dir_hash;
pub mod persist;
pub mod storage;
pub mod store;

pub use dir_hash::{DirHashHandle, DirHashTask};
pub use persist::{NoEditors, PersistHandle, PersistTask, StorageGate};
pub use storage::{INDEX_FILE, INDEX_VERSION, IndexEntry, IndexFile, RecordStorage, ShardedJsonStorage};
pub use store::{DB_VERSION, FlushOutcome, MetadataStore, UpsertOutcome};
