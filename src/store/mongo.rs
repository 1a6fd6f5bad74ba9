use std::collections::HashMap;
use std::future::Future;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use mongodb::{
    bson::{self, doc, Bson, DateTime as BsonDateTime, Document},
    error::{TRANSIENT_TRANSACTION_ERROR, UNKNOWN_TRANSACTION_COMMIT_RESULT},
    options::{FindOneAndUpdateOptions, FindOptions, ReturnDocument, SessionOptions},
    Client, ClientSession, Database,
};
use rand::Rng;
use rocket::{futures::TryStreamExt, tokio};

use crate::error::{Error, Result};
use crate::model::{
    common::ElectionStatus,
    db::{
        candidate::{Candidate, NewCandidate},
        election::{Election, NewElection},
        vote::{NewVote, Vote, VoteCount},
    },
    mongodb::{ensure_indexes_exist, is_duplicate_key_error, Coll, Id},
};

use super::{ElectionStore, TallySnapshot};

/// How many times a commit with an unknown outcome is attempted.
const MAX_COMMIT_ATTEMPTS: usize = 3;

/// Ceiling on the delay before the first retry of a conflicting transaction.
const BASE_RETRY_DELAY: Duration = Duration::from_millis(5);

/// Ceiling on any single delay between retries.
const MAX_RETRY_DELAY: Duration = Duration::from_millis(250);

/// An [`ElectionStore`] backed by a MongoDB replica set.
///
/// Every write that must observe the election's status does so by updating
/// the election document inside the same transaction. Two such transactions
/// therefore write-conflict, and the loser is retried with jittered backoff
/// for up to `retry_budget` before failing as [`Error::StoreUnavailable`].
pub struct MongoStore {
    client: Client,
    elections: Coll<Election>,
    candidates: Coll<Candidate>,
    votes: Coll<Vote>,
    retry_budget: Duration,
}

impl MongoStore {
    /// Connect to the given database and make sure its indexes exist.
    pub async fn connect(uri: &str, db_name: &str, retry_budget: Duration) -> Result<Self> {
        let client = Client::with_uri_str(uri).await?;
        let db = client.database(db_name);
        let store = Self::with_database(client, &db, retry_budget).await?;
        info!("Connected to database `{db_name}`");
        Ok(store)
    }

    /// Use a database of an existing client, making sure its indexes exist.
    pub async fn with_database(client: Client, db: &Database, retry_budget: Duration) -> Result<Self> {
        ensure_indexes_exist(db).await?;
        Ok(Self {
            client,
            elections: Coll::from_db(db),
            candidates: Coll::from_db(db),
            votes: Coll::from_db(db),
            retry_budget,
        })
    }

    async fn start_transaction(&self) -> Result<ClientSession> {
        let mut session = self.client.start_session(None).await?;
        session.start_transaction(None).await?;
        Ok(session)
    }

    /// Bump the revision of an election matching `filter`, claiming it for
    /// the current transaction. Returns false if nothing matched.
    async fn touch_election(&self, filter: Document, session: &mut ClientSession) -> Result<bool> {
        let result = self
            .elections
            .update_one_with_session(filter, doc! {"$inc": {"revision": 1_i64}}, None, session)
            .await?;
        Ok(result.matched_count > 0)
    }

    async fn try_insert_vote(&self, vote: &NewVote) -> Result<Vote> {
        let mut session = self.start_transaction().await?;

        let cast_at = BsonDateTime::from_chrono(vote.cast_at);
        let open_filter = doc! {
            "_id": vote.election_id,
            "status": ElectionStatus::Active,
            "start_time": {"$lte": cast_at},
            "end_time": {"$gt": cast_at},
        };
        if !self.touch_election(open_filter, &mut session).await? {
            session.abort_transaction().await?;
            return match self.elections.find_one(vote.election_id.as_doc(), None).await? {
                Some(_) => Err(Error::ElectionClosed(vote.election_id)),
                None => Err(Error::ElectionNotFound(vote.election_id)),
            };
        }

        let vote = Vote::from_new(vote.clone());
        if let Err(e) = self
            .votes
            .insert_one_with_session(&vote, None, &mut session)
            .await
        {
            if is_duplicate_key_error(&e) {
                return Err(Error::DuplicateVote {
                    election: vote.election_id,
                    voter: vote.voter_id,
                });
            }
            return Err(e.into());
        }

        commit(&mut session).await?;
        Ok(vote)
    }

    async fn try_insert_candidate(&self, candidate: &NewCandidate) -> Result<Option<Candidate>> {
        let mut session = self.start_transaction().await?;

        let draft_filter = doc! {
            "_id": candidate.election_id,
            "status": ElectionStatus::Draft,
        };
        if !self.touch_election(draft_filter, &mut session).await? {
            session.abort_transaction().await?;
            return Ok(None);
        }

        let candidate = Candidate::from_new(candidate.clone());
        self.candidates
            .insert_one_with_session(&candidate, None, &mut session)
            .await?;

        commit(&mut session).await?;
        Ok(Some(candidate))
    }

    async fn try_delete_draft_election(&self, id: Id) -> Result<bool> {
        let mut session = self.start_transaction().await?;

        let draft_filter = doc! {
            "_id": id,
            "status": ElectionStatus::Draft,
        };
        let deleted = self
            .elections
            .delete_one_with_session(draft_filter, None, &mut session)
            .await?;
        if deleted.deleted_count == 0 {
            session.abort_transaction().await?;
            return Ok(false);
        }
        self.candidates
            .delete_many_with_session(doc! {"election_id": id}, None, &mut session)
            .await?;

        commit(&mut session).await?;
        Ok(true)
    }
}

/// Commit a transaction, retrying if the outcome of the commit is unknown.
async fn commit(session: &mut ClientSession) -> Result<()> {
    let mut attempt = 1;
    loop {
        match session.commit_transaction().await {
            Ok(()) => return Ok(()),
            Err(e)
                if e.contains_label(UNKNOWN_TRANSACTION_COMMIT_RESULT)
                    && attempt < MAX_COMMIT_ATTEMPTS =>
            {
                debug!("Commit result unknown, retrying (attempt {attempt})");
                attempt += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Jittered exponential backoff that gives up at a deadline.
#[derive(Debug)]
struct Backoff {
    deadline: Instant,
    ceiling: Duration,
}

impl Backoff {
    fn until(deadline: Instant) -> Self {
        Self {
            deadline,
            ceiling: BASE_RETRY_DELAY,
        }
    }

    /// The next delay, or `None` if waiting for it would pass the deadline.
    fn next_delay(&mut self) -> Option<Duration> {
        let ceiling = self.ceiling;
        self.ceiling = (ceiling * 2).min(MAX_RETRY_DELAY);
        let delay = rand::thread_rng().gen_range(ceiling / 2..=ceiling);
        (Instant::now() + delay < self.deadline).then_some(delay)
    }
}

/// Run a whole transaction again while it fails with a transient error,
/// typically a write conflict with a concurrent transaction.
///
/// A transaction still conflicting when the retry budget runs out fails as
/// [`Error::StoreUnavailable`], so the caller may try again later.
async fn retry_transient<T, F, Fut>(operation: &str, budget: Duration, mut transaction: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut backoff = Backoff::until(Instant::now() + budget);
    let mut attempt = 1;
    loop {
        match transaction().await {
            Err(Error::Db(e)) if e.contains_label(TRANSIENT_TRANSACTION_ERROR) => {
                match backoff.next_delay() {
                    Some(delay) => {
                        debug!(
                            "Transient error in `{operation}` (attempt {attempt}), retrying in {}ms: {e}",
                            delay.as_millis()
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    None => {
                        warn!("Giving up on `{operation}` after {attempt} attempts: {e}");
                        return Err(Error::StoreUnavailable(format!(
                            "`{operation}` kept conflicting with concurrent writes"
                        )));
                    }
                }
            }
            result => return result,
        }
    }
}

#[rocket::async_trait]
impl ElectionStore for MongoStore {
    async fn insert_election(&self, election: &NewElection) -> Result<Election> {
        let election = Election::from_new(election.clone());
        self.elections.insert_one(&election, None).await?;
        Ok(election)
    }

    async fn election(&self, id: Id) -> Result<Option<Election>> {
        Ok(self.elections.find_one(id.as_doc(), None).await?)
    }

    async fn elections(&self, statuses: &[ElectionStatus]) -> Result<Vec<Election>> {
        let statuses: Vec<Bson> = statuses.iter().map(|s| Bson::from(*s)).collect();
        let filter = doc! {"status": {"$in": statuses}};
        let options = FindOptions::builder()
            .sort(doc! {"created_at": 1, "_id": 1})
            .build();
        Ok(self
            .elections
            .find(filter, options)
            .await?
            .try_collect()
            .await?)
    }

    async fn set_status(
        &self,
        id: Id,
        from: ElectionStatus,
        to: ElectionStatus,
        end_time: DateTime<Utc>,
    ) -> Result<Option<Election>> {
        let filter = doc! {
            "_id": id,
            "status": from,
        };
        let update = doc! {
            "$set": {
                "status": to,
                "end_time": BsonDateTime::from_chrono(end_time),
            },
            "$inc": {"revision": 1_i64},
        };
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();
        Ok(self
            .elections
            .find_one_and_update(filter, update, options)
            .await?)
    }

    async fn delete_draft_election(&self, id: Id) -> Result<bool> {
        retry_transient("delete_draft_election", self.retry_budget, || {
            self.try_delete_draft_election(id)
        })
        .await
    }

    async fn insert_candidate(&self, candidate: &NewCandidate) -> Result<Option<Candidate>> {
        retry_transient("insert_candidate", self.retry_budget, || {
            self.try_insert_candidate(candidate)
        })
        .await
    }

    async fn candidate(&self, id: Id) -> Result<Option<Candidate>> {
        Ok(self.candidates.find_one(id.as_doc(), None).await?)
    }

    async fn candidates(&self, election_id: Id) -> Result<Vec<Candidate>> {
        let options = FindOptions::builder()
            .sort(doc! {"created_at": 1, "_id": 1})
            .build();
        Ok(self
            .candidates
            .find(doc! {"election_id": election_id}, options)
            .await?
            .try_collect()
            .await?)
    }

    async fn has_vote(&self, election_id: Id, voter_id: Id) -> Result<bool> {
        let filter = doc! {
            "election_id": election_id,
            "voter_id": voter_id,
        };
        Ok(self.votes.count_documents(filter, None).await? > 0)
    }

    async fn insert_vote(&self, vote: &NewVote) -> Result<Vote> {
        retry_transient("insert_vote", self.retry_budget, || self.try_insert_vote(vote)).await
    }

    async fn tally_snapshot(&self, election_id: Id) -> Result<Option<TallySnapshot>> {
        // Read everything from one snapshot, so counts match the election state.
        let session_options = SessionOptions::builder().snapshot(true).build();
        let mut session = self.client.start_session(Some(session_options)).await?;

        let election = match self
            .elections
            .find_one_with_session(election_id.as_doc(), None, &mut session)
            .await?
        {
            Some(election) => election,
            None => return Ok(None),
        };

        let options = FindOptions::builder()
            .sort(doc! {"created_at": 1, "_id": 1})
            .build();
        let mut cursor = self
            .candidates
            .find_with_session(doc! {"election_id": election_id}, options, &mut session)
            .await?;
        let mut candidates = Vec::new();
        while let Some(candidate) = cursor.next(&mut session).await {
            candidates.push(candidate?);
        }

        let pipeline = [
            doc! {"$match": {"election_id": election_id}},
            doc! {"$group": {"_id": "$candidate_id", "votes": {"$sum": 1_i64}}},
        ];
        let mut cursor = self
            .votes
            .aggregate_with_session(pipeline, None, &mut session)
            .await?;
        let mut counts = HashMap::new();
        while let Some(row) = cursor.next(&mut session).await {
            let row: VoteCount = bson::from_document(row?)?;
            counts.insert(row.candidate_id, u64::try_from(row.votes).unwrap_or_default());
        }

        Ok(Some(TallySnapshot {
            election,
            candidates,
            counts,
        }))
    }
}
