// ============================================================================
// personkv Library
// ============================================================================

pub mod config;
pub mod core;
pub mod engine;
pub mod lock;
pub mod storage;
pub mod web;

// Re-export main types for convenience
pub use config::{ConflictRetryPolicy, EngineConfig, LockScope};
pub use core::{DateOfBirth, EngineError, FieldUpdate, Person, PersonPatch, Result};
pub use engine::{PersonEngine, UpdatePhase};
pub use lock::{InMemoryLockService, LockError, LockGuard, LockHandle, LockService};
pub use storage::{InMemoryRecordStore, RecordStore, StoreError, WatchHandle, WriteOp};

use std::sync::Arc;

/// Engine over fresh in-memory store and lock adapters.
///
/// # Examples
///
/// ```
/// use personkv::{EngineConfig, Person, PersonPatch};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let engine = personkv::in_memory(EngineConfig::default())?;
/// engine.create(Person::new("u1", "Ann", "1 Main St", None)).await?;
///
/// let updated = engine
///     .update_optimistic(PersonPatch::new("u1").address("2 Oak Ave"))
///     .await?;
/// assert_eq!(updated.name, "Ann");
/// # Ok(())
/// # }
/// ```
pub fn in_memory(config: EngineConfig) -> Result<PersonEngine> {
    PersonEngine::new(
        Arc::new(InMemoryRecordStore::new()),
        Arc::new(InMemoryLockService::new()),
        config,
    )
}
