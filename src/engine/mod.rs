//! Concurrent record update engine.
//!
//! [`PersonEngine`] owns the adapter handles and exposes record creation,
//! lookup and the two read-modify-write strategies:
//!
//! - [`PersonEngine::update_optimistic`]: watch, read, merge, conditional
//!   commit. A lost race is reported as [`EngineError::Conflict`].
//! - [`PersonEngine::update_pessimistic`]: acquire a leased mutex, read,
//!   merge, write, release.
//!
//! Neither path retries internally. Every store and lock round-trip is bounded
//! by the configured timeouts, and dropping an update future releases any
//! lock it holds.

pub mod expiration;
pub mod merge;
pub mod optimistic;
pub mod pessimistic;
pub mod phase;

pub use expiration::{EXPIRE_KEY_SUFFIX, ExpirationTracker, expire_key};
pub use merge::merge;
pub use phase::UpdatePhase;

use crate::config::EngineConfig;
use crate::core::{EngineError, Person, Result};
use crate::lock::LockService;
use crate::storage::{RecordStore, StoreResult, WatchHandle, WriteOp};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{Instrument, Level, event, info_span};

#[derive(Clone)]
pub struct PersonEngine {
    store: Arc<dyn RecordStore>,
    locks: Arc<dyn LockService>,
    config: EngineConfig,
    expiration: ExpirationTracker,
}

impl PersonEngine {
    pub fn new(
        store: Arc<dyn RecordStore>,
        locks: Arc<dyn LockService>,
        config: EngineConfig,
    ) -> Result<Self> {
        config.validate().map_err(EngineError::Validation)?;
        let expiration = ExpirationTracker::new(config.record_expiry_ttl);

        Ok(Self {
            store,
            locks,
            config,
            expiration,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Store a new record together with its expiration marker.
    ///
    /// The id must already be assigned. An existing record with the same id
    /// yields [`EngineError::Conflict`]; creation never overwrites.
    pub async fn create(&self, person: Person) -> Result<Person> {
        let span = info_span!("person.create", person_id = %person.id);
        async move {
            if person.id.trim().is_empty() {
                return Err(EngineError::Validation("Missing person ID".to_string()));
            }

            let watch = self.bounded("watch", self.store.watch(&person.id)).await?;
            if self.bounded("get", self.store.get(&person.id)).await?.is_some() {
                return Err(EngineError::Conflict(format!(
                    "person '{}' already exists",
                    person.id
                )));
            }

            self.commit_with_marker(watch, &person, None)
                .await
                .inspect_err(|err| event!(Level::WARN, error = %err, "person create failed"))?;

            event!(Level::DEBUG, "person created");
            Ok(person)
        }
        .instrument(span)
        .await
    }

    pub async fn get(&self, id: &str) -> Result<Person> {
        if id.trim().is_empty() {
            return Err(EngineError::Validation("ID parameter is missing".to_string()));
        }

        match self.bounded("get", self.store.get(id)).await? {
            Some(bytes) => Person::from_bytes(&bytes),
            None => Err(EngineError::NotFound(id.to_string())),
        }
    }

    /// Timestamp of the last successful write of `id`, if its marker has not
    /// expired yet.
    pub async fn last_modified(&self, id: &str) -> Result<Option<DateTime<Utc>>> {
        let key = expire_key(id);
        self.bounded("get", self.store.get(&key))
            .await?
            .map(|bytes| ExpirationTracker::parse_marker(&bytes))
            .transpose()
    }

    pub async fn ping(&self) -> Result<()> {
        self.bounded("ping", self.store.ping()).await
    }

    /// Write `person` and its expiration marker if the watched key is
    /// unchanged.
    ///
    /// Both keys go into one conditional batch when the store supports it.
    /// Otherwise the record is committed alone and the marker follows with a
    /// plain write; a marker failure is then reported as
    /// [`EngineError::ExpirationMarker`]. With a `lease_deadline`, the marker
    /// write is skipped once it could land after the lease ran out.
    async fn commit_with_marker(
        &self,
        watch: WatchHandle,
        person: &Person,
        lease_deadline: Option<Instant>,
    ) -> Result<()> {
        let record = WriteOp::new(person.id.clone(), person.to_bytes()?);
        let marker = self.expiration.touch(&person.id);

        if self.store.supports_atomic_batch() {
            return self
                .bounded("commit", self.store.commit_if_unchanged(watch, vec![record, marker]))
                .await;
        }

        self.bounded("commit", self.store.commit_if_unchanged(watch, vec![record]))
            .await?;

        let marker_written = match lease_deadline {
            Some(deadline) if !self.fits_in_lease(deadline) => Err(EngineError::Lock(
                "lease ran out before the expiration marker write".to_string(),
            )),
            _ => {
                self.bounded("set", self.store.set(&marker.key, marker.value, marker.ttl))
                    .await
            }
        };
        marker_written.map_err(|err| EngineError::ExpirationMarker {
            person: Box::new(person.clone()),
            reason: err.to_string(),
        })
    }

    /// Whether one more bounded store call is certain to finish before
    /// `deadline`.
    fn fits_in_lease(&self, deadline: Instant) -> bool {
        Instant::now() + self.config.store_op_timeout <= deadline
    }

    /// Run one store round-trip under `store_op_timeout`.
    async fn bounded<T, F>(&self, op: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = StoreResult<T>>,
    {
        match tokio::time::timeout(self.config.store_op_timeout, fut).await {
            Ok(result) => result.map_err(EngineError::from),
            Err(_) => Err(EngineError::Timeout(format!(
                "store {op} exceeded {:?}",
                self.config.store_op_timeout
            ))),
        }
    }
}
