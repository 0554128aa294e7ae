use super::PersonEngine;
use super::merge::merge;
use super::phase::{PhaseTracker, UpdatePhase};
use crate::core::{EngineError, Person, PersonPatch, Result};
use crate::lock::{LockGuard, LockHandle};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{Instrument, Level, event, info_span};

impl PersonEngine {
    /// Apply `patch` while holding the update mutex.
    ///
    /// With the default [`LockScope::Shared`](crate::config::LockScope) every
    /// pessimistic update in the system is serialized. The lock is released
    /// on every exit path; if this future is dropped the guard schedules the
    /// release, and the lease caps the lockout if that release is lost.
    ///
    /// The record key is still watched under the lock, so an optimistic
    /// update that lands between the read and the commit turns this call into
    /// [`EngineError::Conflict`] instead of being overwritten.
    pub async fn update_pessimistic(&self, patch: PersonPatch) -> Result<Person> {
        let lock_name = self.config.lock_scope.lock_name(&patch.id);
        let span = info_span!("person.update.pessimistic", person_id = %patch.id, lock = %lock_name);
        async move {
            let mut phase = PhaseTracker::new("pessimistic");
            let result = self.pessimistic_attempt(&patch, &lock_name, &mut phase).await;
            phase.finish(result)
        }
        .instrument(span)
        .await
    }

    async fn pessimistic_attempt(
        &self,
        patch: &PersonPatch,
        lock_name: &str,
        phase: &mut PhaseTracker,
    ) -> Result<Person> {
        patch.validate()?;

        let guard = LockGuard::acquire(
            Arc::clone(&self.locks),
            lock_name,
            self.config.lock_lease,
            self.config.lock_acquire_timeout,
        )
        .await?;
        let Some(lease_deadline) = guard.handle().map(LockHandle::deadline) else {
            return Err(EngineError::Internal(format!("lock '{lock_name}' granted without a handle")));
        };

        let result = self.locked_update(patch, lease_deadline, phase).await;

        if let Err(err) = guard.release().await {
            event!(Level::WARN, error = %err, "lock release failed, lease will expire");
        }
        result
    }

    async fn locked_update(
        &self,
        patch: &PersonPatch,
        lease_deadline: Instant,
        phase: &mut PhaseTracker,
    ) -> Result<Person> {
        phase.advance(UpdatePhase::Reading);
        let watch = self.bounded("watch", self.store.watch(&patch.id)).await?;
        let Some(bytes) = self.bounded("get", self.store.get(&patch.id)).await? else {
            return Err(EngineError::NotFound(patch.id.clone()));
        };
        let existing = Person::from_bytes(&bytes)?;

        phase.advance(UpdatePhase::Merging);
        let merged = merge(&existing, patch);

        phase.advance(UpdatePhase::Committing);
        if !self.fits_in_lease(lease_deadline) {
            // the commit could land after another writer took the lock over
            return Err(EngineError::Lock(format!(
                "lease too close to expiry to commit '{}'",
                merged.id
            )));
        }
        self.commit_with_marker(watch, &merged, Some(lease_deadline))
            .await?;

        Ok(merged)
    }
}
