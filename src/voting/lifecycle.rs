//! The Election Lifecycle Manager.
//!
//! Elections only ever move `Draft -> Active -> Completed`. Every transition is
//! a compare-and-set on the stored status, so concurrent transitions of the
//! same election cannot both succeed.

use chrono::{DateTime, Utc};
use log::{debug, info};
use rocket::{
    outcome::try_outcome,
    request::{FromRequest, Outcome, Request},
    State,
};

use crate::error::{Error, Result};
use crate::model::{
    common::{stored_precision, ElectionStatus},
    db::{
        candidate::{Candidate, NewCandidate},
        election::{Election, ElectionCore, NewElection},
    },
    mongodb::Id,
};
use crate::notify::{notify_in_background, SharedNotifier};
use crate::store::Store;

/// Is the election accepting votes at `now`?
///
/// Always evaluate this against freshly loaded data: an election can complete
/// while a vote is in flight.
pub fn is_open_for_voting(election: &ElectionCore, now: DateTime<Utc>) -> bool {
    election.status == ElectionStatus::Active && election.window_contains(now)
}

#[derive(Clone)]
pub struct Lifecycle {
    store: Store,
    notifier: SharedNotifier,
}

impl Lifecycle {
    pub fn new(store: Store, notifier: SharedNotifier) -> Self {
        Self { store, notifier }
    }

    /// Create a new draft election.
    pub async fn create(&self, election: NewElection) -> Result<Election> {
        let election = NewElection {
            start_time: stored_precision(election.start_time),
            end_time: stored_precision(election.end_time),
            created_at: stored_precision(election.created_at),
            ..election
        };
        if election.title.trim().is_empty() {
            return Err(Error::BadRequest("election title must not be empty".to_string()));
        }
        if election.end_time <= election.start_time {
            return Err(Error::BadRequest(
                "election must end after it starts".to_string(),
            ));
        }
        if election.status != ElectionStatus::Draft {
            return Err(Error::BadRequest("new elections must be drafts".to_string()));
        }

        let election = self.store.insert_election(&election).await?;
        info!("Created draft election {} \"{}\"", election.id, election.title);
        Ok(election)
    }

    /// Load an election, failing if it does not exist.
    pub async fn election(&self, id: Id) -> Result<Election> {
        self.store
            .election(id)
            .await?
            .ok_or(Error::ElectionNotFound(id))
    }

    /// All elections with one of the given statuses, oldest first.
    pub async fn elections(&self, statuses: &[ElectionStatus]) -> Result<Vec<Election>> {
        self.store.elections(statuses).await
    }

    pub async fn candidates(&self, id: Id) -> Result<Vec<Candidate>> {
        self.store.candidates(id).await
    }

    /// Add a candidate to a draft election.
    pub async fn add_candidate(&self, candidate: NewCandidate) -> Result<Candidate> {
        if candidate.name.trim().is_empty() {
            return Err(Error::BadRequest("candidate name must not be empty".to_string()));
        }
        let election_id = candidate.election_id;
        match self.store.insert_candidate(&candidate).await? {
            Some(candidate) => {
                info!("Added candidate {} to election {election_id}", candidate.id);
                Ok(candidate)
            }
            None => {
                // Tell a missing election apart from a locked one.
                self.election(election_id).await?;
                Err(Error::ElectionLocked(election_id))
            }
        }
    }

    /// Delete a draft election and its candidates.
    pub async fn delete(&self, id: Id) -> Result<()> {
        if self.store.delete_draft_election(id).await? {
            info!("Deleted draft election {id}");
            Ok(())
        } else {
            self.election(id).await?;
            Err(Error::ElectionLocked(id))
        }
    }

    /// Move an election to `target`.
    ///
    /// Activation requires `now` to be within the election window. Completion
    /// pulls the end of the window back to `now` if `now` falls inside it, so
    /// the window never ends before it starts. Completion also notifies in
    /// the background.
    pub async fn transition(
        &self,
        id: Id,
        target: ElectionStatus,
        now: DateTime<Utc>,
    ) -> Result<Election> {
        let election = self.election(id).await?;
        let from = election.status;
        if !from.can_transition_to(target) {
            return Err(Error::InvalidTransition { from, to: target });
        }

        let end_time = if target == ElectionStatus::Active {
            if !election.window_contains(now) {
                debug!("Refusing to activate election {id} outside its window");
                return Err(Error::ElectionClosed(id));
            }
            election.end_time
        } else {
            let cutoff = stored_precision(now);
            if election.start_time < cutoff && cutoff < election.end_time {
                cutoff
            } else {
                election.end_time
            }
        };

        let updated = match self.store.set_status(id, from, target, end_time).await? {
            Some(updated) => updated,
            None => {
                // Someone else moved it first.
                let current = self.election(id).await?;
                debug!("Election {id} changed to {} underneath us", current.status);
                return Err(Error::InvalidTransition {
                    from: current.status,
                    to: target,
                });
            }
        };
        info!("Election {id} transitioned from {from} to {target}");

        if target == ElectionStatus::Completed {
            notify_in_background(self.notifier.clone(), updated.clone());
        }
        Ok(updated)
    }

    pub fn is_open_for_voting(&self, election: &ElectionCore, now: DateTime<Utc>) -> bool {
        is_open_for_voting(election, now)
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Lifecycle {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let store = try_outcome!(req.guard::<Store>().await);
        let notifier = try_outcome!(req.guard::<&State<SharedNotifier>>().await);
        Outcome::Success(Self::new(store, notifier.inner().clone()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Duration;

    use super::*;
    use crate::model::api::election::CandidateSpec;
    use crate::notify::testing::{BrokenNotifier, RecordingNotifier};
    use crate::notify::LogNotifier;
    use crate::voting::testing::active_election;

    fn lifecycle(store: Store) -> Lifecycle {
        Lifecycle::new(store, Arc::new(LogNotifier))
    }

    #[backend_test]
    async fn create_validates_the_window(store: Store) {
        let lifecycle = lifecycle(store);

        let mut backwards = NewElection::current_example();
        backwards.end_time = backwards.start_time;
        assert!(matches!(
            lifecycle.create(backwards).await,
            Err(Error::BadRequest(_))
        ));

        let mut untitled = NewElection::current_example();
        untitled.title = "  ".to_string();
        assert!(matches!(
            lifecycle.create(untitled).await,
            Err(Error::BadRequest(_))
        ));

        let election = lifecycle.create(NewElection::current_example()).await.unwrap();
        assert_eq!(election.status, ElectionStatus::Draft);
    }

    #[backend_test]
    async fn full_lifecycle(store: Store) {
        let lifecycle = lifecycle(store);
        let (election, _) = active_election(&lifecycle, 2).await;
        assert_eq!(election.status, ElectionStatus::Active);
        assert!(lifecycle.is_open_for_voting(&election, Utc::now()));

        let now = Utc::now();
        let completed = lifecycle
            .transition(election.id, ElectionStatus::Completed, now)
            .await
            .unwrap();
        assert_eq!(completed.status, ElectionStatus::Completed);
        assert_eq!(completed.end_time, stored_precision(now));
        assert!(!lifecycle.is_open_for_voting(&completed, now));
    }

    #[backend_test]
    async fn completed_elections_cannot_reopen(store: Store) {
        let lifecycle = lifecycle(store);
        let (election, _) = active_election(&lifecycle, 1).await;
        lifecycle
            .transition(election.id, ElectionStatus::Completed, Utc::now())
            .await
            .unwrap();

        for target in [
            ElectionStatus::Active,
            ElectionStatus::Draft,
            ElectionStatus::Completed,
        ] {
            let result = lifecycle.transition(election.id, target, Utc::now()).await;
            assert!(
                matches!(
                    result,
                    Err(Error::InvalidTransition {
                        from: ElectionStatus::Completed,
                        ..
                    })
                ),
                "completed -> {target} should be invalid"
            );
        }
    }

    #[backend_test]
    async fn drafts_cannot_skip_activation(store: Store) {
        let lifecycle = lifecycle(store);
        let draft = lifecycle.create(NewElection::current_example()).await.unwrap();
        assert!(matches!(
            lifecycle
                .transition(draft.id, ElectionStatus::Completed, Utc::now())
                .await,
            Err(Error::InvalidTransition { .. })
        ));
    }

    #[backend_test]
    async fn activation_requires_the_window(store: Store) {
        let lifecycle = lifecycle(store);
        for example in [NewElection::future_example(), NewElection::past_example()] {
            let draft = lifecycle.create(example).await.unwrap();
            assert!(matches!(
                lifecycle
                    .transition(draft.id, ElectionStatus::Active, Utc::now())
                    .await,
                Err(Error::ElectionClosed(_))
            ));
        }

        let future = lifecycle.create(NewElection::future_example()).await.unwrap();
        let later = future.start_time + Duration::minutes(1);
        let active = lifecycle
            .transition(future.id, ElectionStatus::Active, later)
            .await
            .unwrap();
        assert_eq!(active.end_time, future.end_time);
    }

    #[backend_test]
    async fn completion_outside_the_window_keeps_its_end(store: Store) {
        let lifecycle = lifecycle(store);

        // Activated early by a clock running ahead, then completed before opening.
        let future = lifecycle.create(NewElection::future_example()).await.unwrap();
        lifecycle
            .transition(
                future.id,
                ElectionStatus::Active,
                future.start_time + Duration::minutes(1),
            )
            .await
            .unwrap();
        let completed = lifecycle
            .transition(future.id, ElectionStatus::Completed, Utc::now())
            .await
            .unwrap();
        assert!(completed.end_time > completed.start_time);
        assert_eq!(completed.end_time, future.end_time);

        let (current, _) = active_election(&lifecycle, 1).await;
        let completed = lifecycle
            .transition(
                current.id,
                ElectionStatus::Completed,
                current.end_time + Duration::hours(1),
            )
            .await
            .unwrap();
        assert_eq!(completed.end_time, current.end_time);
    }

    #[backend_test]
    async fn unknown_elections_are_not_found(store: Store) {
        let lifecycle = lifecycle(store);
        assert!(matches!(
            lifecycle
                .transition(Id::new(), ElectionStatus::Active, Utc::now())
                .await,
            Err(Error::ElectionNotFound(_))
        ));
        assert!(matches!(
            lifecycle.delete(Id::new()).await,
            Err(Error::ElectionNotFound(_))
        ));
    }

    #[backend_test]
    async fn only_drafts_are_editable(store: Store) {
        let lifecycle = lifecycle(store);
        let (election, _) = active_election(&lifecycle, 1).await;

        let late = CandidateSpec::example2().into_candidate(election.id, Utc::now());
        assert!(matches!(
            lifecycle.add_candidate(late).await,
            Err(Error::ElectionLocked(_))
        ));
        assert!(matches!(
            lifecycle.delete(election.id).await,
            Err(Error::ElectionLocked(_))
        ));

        let draft = lifecycle.create(NewElection::current_example()).await.unwrap();
        lifecycle
            .add_candidate(CandidateSpec::example1().into_candidate(draft.id, Utc::now()))
            .await
            .unwrap();
        lifecycle.delete(draft.id).await.unwrap();
        assert!(matches!(
            lifecycle.election(draft.id).await,
            Err(Error::ElectionNotFound(_))
        ));
        assert!(lifecycle.candidates(draft.id).await.unwrap().is_empty());
    }

    #[backend_test]
    async fn concurrent_completions_succeed_once(store: Store) {
        let lifecycle = lifecycle(store);
        let (election, _) = active_election(&lifecycle, 1).await;

        let attempts = (0..8).map(|_| {
            let lifecycle = lifecycle.clone();
            rocket::tokio::spawn(async move {
                lifecycle
                    .transition(election.id, ElectionStatus::Completed, Utc::now())
                    .await
            })
        });
        let mut successes = 0;
        for attempt in attempts.collect::<Vec<_>>() {
            match attempt.await.unwrap() {
                Ok(_) => successes += 1,
                Err(Error::InvalidTransition { .. }) => {}
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(successes, 1);
    }

    #[backend_test]
    async fn completion_notifies(store: Store) {
        let notifier = Arc::new(RecordingNotifier::default());
        let lifecycle = Lifecycle::new(store, notifier.clone());
        let (election, _) = active_election(&lifecycle, 1).await;
        assert!(notifier.completed().await.is_empty());

        lifecycle
            .transition(election.id, ElectionStatus::Completed, Utc::now())
            .await
            .unwrap();
        assert!(notifier.wait_for(election.id).await);
    }

    #[backend_test]
    async fn notification_failures_do_not_fail_completion(store: Store) {
        let lifecycle = Lifecycle::new(store, Arc::new(BrokenNotifier));
        let (election, _) = active_election(&lifecycle, 1).await;

        let completed = lifecycle
            .transition(election.id, ElectionStatus::Completed, Utc::now())
            .await
            .unwrap();
        assert_eq!(completed.status, ElectionStatus::Completed);
    }
}
