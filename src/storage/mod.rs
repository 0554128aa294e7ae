pub mod engine;
pub mod memory;

pub use engine::{RecordStore, StoreError, StoreResult, WatchHandle, WriteOp};
pub use memory::InMemoryRecordStore;
