use super::PersonEngine;
use super::merge::merge;
use super::phase::{PhaseTracker, UpdatePhase};
use crate::config::ConflictRetryPolicy;
use crate::core::{EngineError, Person, PersonPatch, Result};
use tracing::{Instrument, Level, event, info_span};

impl PersonEngine {
    /// Apply `patch` under a watch on the record key.
    ///
    /// Exactly one attempt: if the record changed between the read and the
    /// commit, nothing is written and [`EngineError::Conflict`] is returned so
    /// the caller can re-issue the call against the new state.
    pub async fn update_optimistic(&self, patch: PersonPatch) -> Result<Person> {
        let span = info_span!("person.update.optimistic", person_id = %patch.id);
        async move {
            let mut phase = PhaseTracker::new("optimistic");
            let result = self.optimistic_attempt(&patch, &mut phase).await;
            phase.finish(result)
        }
        .instrument(span)
        .await
    }

    /// [`update_optimistic`](Self::update_optimistic), re-issued on
    /// [`EngineError::Conflict`] with exponential backoff. Other errors are
    /// returned immediately.
    pub async fn update_optimistic_with_retry(
        &self,
        patch: PersonPatch,
        policy: &ConflictRetryPolicy,
    ) -> Result<Person> {
        let max_attempts = policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.update_optimistic(patch.clone()).await {
                Err(EngineError::Conflict(message)) if attempt < max_attempts => {
                    let backoff = policy.backoff(attempt);
                    event!(
                        Level::DEBUG,
                        person_id = %patch.id,
                        attempt,
                        ?backoff,
                        %message,
                        "retrying optimistic update"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                outcome => return outcome,
            }
        }
    }

    async fn optimistic_attempt(
        &self,
        patch: &PersonPatch,
        phase: &mut PhaseTracker,
    ) -> Result<Person> {
        patch.validate()?;

        phase.advance(UpdatePhase::Reading);
        let watch = self.bounded("watch", self.store.watch(&patch.id)).await?;
        let Some(bytes) = self.bounded("get", self.store.get(&patch.id)).await? else {
            return Err(EngineError::NotFound(patch.id.clone()));
        };
        let existing = Person::from_bytes(&bytes)?;

        phase.advance(UpdatePhase::Merging);
        let merged = merge(&existing, patch);

        phase.advance(UpdatePhase::Committing);
        self.commit_with_marker(watch, &merged, None).await?;

        Ok(merged)
    }
}
