use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use rocket::tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::model::{
    common::ElectionStatus,
    db::{
        candidate::{Candidate, NewCandidate},
        election::{Election, NewElection},
        vote::{NewVote, Vote},
    },
    mongodb::Id,
};
use crate::voting::lifecycle::is_open_for_voting;

use super::{ElectionStore, TallySnapshot};

/// A volatile, in-process store.
///
/// A single lock guards all state, so every operation is trivially
/// serialisable. The `(election_id, voter_id)` key set plays the role of the
/// unique index a database would enforce.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    elections: HashMap<Id, Election>,
    /// In insertion order, which is creation order.
    candidates: Vec<Candidate>,
    votes: Vec<Vote>,
    ledger_keys: HashSet<(Id, Id)>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MemoryState {
    fn candidates_of(&self, election_id: Id) -> Vec<Candidate> {
        self.candidates
            .iter()
            .filter(|c| c.election_id == election_id)
            .cloned()
            .collect()
    }

    fn is_draft(&self, election_id: Id) -> bool {
        self.elections
            .get(&election_id)
            .map_or(false, |e| e.status == ElectionStatus::Draft)
    }
}

#[rocket::async_trait]
impl ElectionStore for MemoryStore {
    async fn insert_election(&self, election: &NewElection) -> Result<Election> {
        let election = Election::from_new(election.clone());
        let mut state = self.state.lock().await;
        state.elections.insert(election.id, election.clone());
        Ok(election)
    }

    async fn election(&self, id: Id) -> Result<Option<Election>> {
        Ok(self.state.lock().await.elections.get(&id).cloned())
    }

    async fn elections(&self, statuses: &[ElectionStatus]) -> Result<Vec<Election>> {
        let state = self.state.lock().await;
        let mut elections: Vec<_> = state
            .elections
            .values()
            .filter(|e| statuses.contains(&e.status))
            .cloned()
            .collect();
        elections.sort_by_key(|e| (e.created_at, e.id));
        Ok(elections)
    }

    async fn set_status(
        &self,
        id: Id,
        from: ElectionStatus,
        to: ElectionStatus,
        end_time: DateTime<Utc>,
    ) -> Result<Option<Election>> {
        let mut state = self.state.lock().await;
        match state.elections.get_mut(&id) {
            Some(election) if election.status == from => {
                election.status = to;
                election.end_time = end_time;
                Ok(Some(election.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn delete_draft_election(&self, id: Id) -> Result<bool> {
        let mut state = self.state.lock().await;
        if !state.is_draft(id) {
            return Ok(false);
        }
        state.elections.remove(&id);
        state.candidates.retain(|c| c.election_id != id);
        Ok(true)
    }

    async fn insert_candidate(&self, candidate: &NewCandidate) -> Result<Option<Candidate>> {
        let mut state = self.state.lock().await;
        if !state.is_draft(candidate.election_id) {
            return Ok(None);
        }
        let candidate = Candidate::from_new(candidate.clone());
        state.candidates.push(candidate.clone());
        Ok(Some(candidate))
    }

    async fn candidate(&self, id: Id) -> Result<Option<Candidate>> {
        let state = self.state.lock().await;
        Ok(state.candidates.iter().find(|c| c.id == id).cloned())
    }

    async fn candidates(&self, election_id: Id) -> Result<Vec<Candidate>> {
        Ok(self.state.lock().await.candidates_of(election_id))
    }

    async fn has_vote(&self, election_id: Id, voter_id: Id) -> Result<bool> {
        let state = self.state.lock().await;
        Ok(state.ledger_keys.contains(&(election_id, voter_id)))
    }

    async fn insert_vote(&self, vote: &NewVote) -> Result<Vote> {
        let mut state = self.state.lock().await;

        // Re-check the window under the same lock as the insert.
        let election = state
            .elections
            .get(&vote.election_id)
            .ok_or(Error::ElectionNotFound(vote.election_id))?;
        if !is_open_for_voting(election, vote.cast_at) {
            return Err(Error::ElectionClosed(vote.election_id));
        }

        if !state.ledger_keys.insert((vote.election_id, vote.voter_id)) {
            return Err(Error::DuplicateVote {
                election: vote.election_id,
                voter: vote.voter_id,
            });
        }
        let vote = Vote::from_new(vote.clone());
        state.votes.push(vote.clone());
        Ok(vote)
    }

    async fn tally_snapshot(&self, election_id: Id) -> Result<Option<TallySnapshot>> {
        let state = self.state.lock().await;
        let election = match state.elections.get(&election_id) {
            Some(election) => election.clone(),
            None => return Ok(None),
        };
        let mut counts = HashMap::new();
        for vote in state.votes.iter().filter(|v| v.election_id == election_id) {
            *counts.entry(vote.candidate_id).or_insert(0) += 1;
        }
        Ok(Some(TallySnapshot {
            election,
            candidates: state.candidates_of(election_id),
            counts,
        }))
    }
}
