#![allow(dead_code)]

use async_trait::async_trait;
use personkv::storage::StoreResult;
use personkv::{
    DateOfBirth, EngineConfig, InMemoryLockService, InMemoryRecordStore, LockError, LockHandle,
    LockService, Person, PersonEngine, RecordStore, StoreError, WatchHandle, WriteOp,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Barrier, Mutex, Notify};

pub fn ann() -> Person {
    Person::new(
        "u1",
        "Ann",
        "1 Main St",
        Some(DateOfBirth::from_ymd(1990, 5, 1).unwrap()),
    )
}

pub fn engine_over(
    store: Arc<dyn RecordStore>,
    locks: Arc<dyn LockService>,
    config: EngineConfig,
) -> PersonEngine {
    PersonEngine::new(store, locks, config).expect("engine config")
}

/// Store whose first `parties` conditional commits wait for each other,
/// forcing every racer to read the same snapshot first. Later commits pass
/// straight through.
pub struct GatedStore {
    pub inner: InMemoryRecordStore,
    gate: Barrier,
    remaining: AtomicUsize,
}

impl GatedStore {
    pub fn new(parties: usize) -> Self {
        Self {
            inner: InMemoryRecordStore::new(),
            gate: Barrier::new(parties),
            remaining: AtomicUsize::new(parties),
        }
    }
}

#[async_trait]
impl RecordStore for GatedStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> StoreResult<()> {
        self.inner.set(key, value, ttl).await
    }

    async fn watch(&self, key: &str) -> StoreResult<WatchHandle> {
        self.inner.watch(key).await
    }

    async fn commit_if_unchanged(&self, watch: WatchHandle, ops: Vec<WriteOp>) -> StoreResult<()> {
        let gated = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if gated {
            self.gate.wait().await;
        }
        self.inner.commit_if_unchanged(watch, ops).await
    }
}

/// Store that fails every write touching a chosen key, through `set` or a
/// conditional batch. Optionally reports that it cannot batch several keys.
pub struct FlakyStore {
    pub inner: InMemoryRecordStore,
    failing_key: std::sync::Mutex<Option<String>>,
    batches: bool,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self {
            inner: InMemoryRecordStore::new(),
            failing_key: std::sync::Mutex::new(None),
            batches: true,
        }
    }

    pub fn without_batches() -> Self {
        Self {
            batches: false,
            ..Self::new()
        }
    }

    pub fn fail_sets_on(&self, key: &str) {
        *self.failing_key.lock().unwrap() = Some(key.to_string());
    }

    fn check(&self, key: &str) -> StoreResult<()> {
        let failing = self.failing_key.lock().unwrap().clone();
        if failing.as_deref() == Some(key) {
            return Err(StoreError::Unavailable(format!("injected failure writing '{key}'")));
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for FlakyStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> StoreResult<()> {
        self.check(key)?;
        self.inner.set(key, value, ttl).await
    }

    async fn watch(&self, key: &str) -> StoreResult<WatchHandle> {
        self.inner.watch(key).await
    }

    async fn commit_if_unchanged(&self, watch: WatchHandle, ops: Vec<WriteOp>) -> StoreResult<()> {
        for op in &ops {
            self.check(&op.key)?;
        }
        self.inner.commit_if_unchanged(watch, ops).await
    }

    fn supports_atomic_batch(&self) -> bool {
        self.batches
    }
}

/// Store that delays every `get`, or every conditional commit, once armed.
pub struct SlowStore {
    pub inner: InMemoryRecordStore,
    delay: std::sync::Mutex<Duration>,
    commit_delay: std::sync::Mutex<Duration>,
}

impl SlowStore {
    pub fn new() -> Self {
        Self {
            inner: InMemoryRecordStore::new(),
            delay: std::sync::Mutex::new(Duration::ZERO),
            commit_delay: std::sync::Mutex::new(Duration::ZERO),
        }
    }

    pub fn slow_down(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn slow_commits(&self, delay: Duration) {
        *self.commit_delay.lock().unwrap() = delay;
    }
}

#[async_trait]
impl RecordStore for SlowStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let delay = *self.delay.lock().unwrap();
        tokio::time::sleep(delay).await;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> StoreResult<()> {
        self.inner.set(key, value, ttl).await
    }

    async fn watch(&self, key: &str) -> StoreResult<WatchHandle> {
        self.inner.watch(key).await
    }

    async fn commit_if_unchanged(&self, watch: WatchHandle, ops: Vec<WriteOp>) -> StoreResult<()> {
        let delay = *self.commit_delay.lock().unwrap();
        tokio::time::sleep(delay).await;
        self.inner.commit_if_unchanged(watch, ops).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    Watch(String),
    Get(String),
    Set(String),
    /// Keys written by one conditional batch.
    Commit(Vec<String>),
}

/// Store that logs every call and how many callers overlap.
pub struct RecordingStore {
    pub inner: InMemoryRecordStore,
    pub log: Mutex<Vec<StoreOp>>,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self {
            inner: InMemoryRecordStore::new(),
            log: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub async fn ops(&self) -> Vec<StoreOp> {
        self.log.lock().await.clone()
    }

    async fn enter(&self, op: StoreOp) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.log.lock().await.push(op);
        // widen the window so overlapping callers would be observed
        tokio::task::yield_now().await;
    }

    fn leave(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl RecordStore for RecordingStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.enter(StoreOp::Get(key.to_string())).await;
        let result = self.inner.get(key).await;
        self.leave();
        result
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> StoreResult<()> {
        self.enter(StoreOp::Set(key.to_string())).await;
        let result = self.inner.set(key, value, ttl).await;
        self.leave();
        result
    }

    async fn watch(&self, key: &str) -> StoreResult<WatchHandle> {
        self.enter(StoreOp::Watch(key.to_string())).await;
        let result = self.inner.watch(key).await;
        self.leave();
        result
    }

    async fn commit_if_unchanged(&self, watch: WatchHandle, ops: Vec<WriteOp>) -> StoreResult<()> {
        let keys = ops.iter().map(|op| op.key.clone()).collect();
        self.enter(StoreOp::Commit(keys)).await;
        let result = self.inner.commit_if_unchanged(watch, ops).await;
        self.leave();
        result
    }
}

/// Store whose next `get`, once armed, reads its value and then waits for
/// [`PausingStore::resume`] before answering.
pub struct PausingStore {
    pub inner: InMemoryRecordStore,
    armed: AtomicBool,
    paused: Notify,
    resumed: Notify,
}

impl PausingStore {
    pub fn new() -> Self {
        Self {
            inner: InMemoryRecordStore::new(),
            armed: AtomicBool::new(false),
            paused: Notify::new(),
            resumed: Notify::new(),
        }
    }

    pub fn pause_next_get(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }

    /// Resolves once an armed `get` has read its value.
    pub async fn wait_paused(&self) {
        self.paused.notified().await;
    }

    pub fn resume(&self) {
        self.resumed.notify_one();
    }
}

#[async_trait]
impl RecordStore for PausingStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let value = self.inner.get(key).await;
        if self.armed.swap(false, Ordering::SeqCst) {
            self.paused.notify_one();
            self.resumed.notified().await;
        }
        value
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> StoreResult<()> {
        self.inner.set(key, value, ttl).await
    }

    async fn watch(&self, key: &str) -> StoreResult<WatchHandle> {
        self.inner.watch(key).await
    }

    async fn commit_if_unchanged(&self, watch: WatchHandle, ops: Vec<WriteOp>) -> StoreResult<()> {
        self.inner.commit_if_unchanged(watch, ops).await
    }
}

/// Lock service whose grant reaches the caller only after `lag`, as with a
/// slow network round-trip. The lease starts counting at the grant.
pub struct LaggingLockService {
    pub inner: InMemoryLockService,
    lag: Duration,
}

impl LaggingLockService {
    pub fn new(lag: Duration) -> Self {
        Self {
            inner: InMemoryLockService::new(),
            lag,
        }
    }
}

#[async_trait]
impl LockService for LaggingLockService {
    async fn acquire(
        &self,
        name: &str,
        lease: Duration,
        timeout: Duration,
    ) -> Result<LockHandle, LockError> {
        let handle = self.inner.acquire(name, lease, timeout).await?;
        tokio::time::sleep(self.lag).await;
        Ok(handle)
    }

    async fn release(&self, handle: &LockHandle) -> Result<(), LockError> {
        self.inner.release(handle).await
    }
}
