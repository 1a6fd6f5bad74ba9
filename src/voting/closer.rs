use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use log::{debug, error, info, warn};
use rocket::{
    fairing::{Fairing, Info, Kind},
    futures::future::{BoxFuture, FutureExt},
    tokio::sync::Mutex,
    Build, Rocket,
};

use crate::error::{Error, Result};
use crate::model::{common::ElectionStatus, db::election::Election, mongodb::Id};
use crate::notify::SharedNotifier;
use crate::scheduled_task::ScheduledTask;
use crate::store::Store;

use super::lifecycle::Lifecycle;

/// How long to wait before retrying a closer that could not reach the store.
const RETRY_INTERVAL_SECONDS: i64 = 300;

/// Map from election IDs to closer tasks.
type TaskMap = HashMap<Id, ScheduledTask>;

/// Election closers: scheduled tasks that complete each active election at
/// the end of its window.
pub struct ElectionClosers {
    tasks: Arc<Mutex<TaskMap>>,
}

impl ElectionClosers {
    /// Create an empty set of election closers.
    pub fn new() -> Self {
        Self {
            tasks: Default::default(),
        }
    }

    /// Does the given election have a closer scheduled?
    pub async fn has_closer(&self, election_id: Id) -> bool {
        self.tasks.lock().await.contains_key(&election_id)
    }

    /// Schedule a closer for every active election.
    pub async fn schedule_elections(&self, lifecycle: &Lifecycle) -> Result<()> {
        let active = lifecycle.elections(&[ElectionStatus::Active]).await?;
        for election in active {
            self.schedule_election(lifecycle.clone(), &election).await;
        }
        Ok(())
    }

    /// Schedule a closer for the given election at the end of its window.
    /// If one already exists, it is replaced.
    pub async fn schedule_election(&self, lifecycle: Lifecycle, election: &Election) {
        let closer = Self::closer(election.id, lifecycle, self.tasks.clone());
        // Hold the lock while scheduling, so a closer that runs immediately
        // cannot try to remove itself before it is inserted.
        let mut tasks_locked = self.tasks.lock().await;
        let task = ScheduledTask::new(closer, election.end_time);
        if let Some(previous) = tasks_locked.insert(election.id, task) {
            previous.cancel();
        }
        drop(tasks_locked);
        debug!("Election {} will close at {}", election.id, election.end_time);
    }

    /// Cancel the closer for the given election, if any.
    pub async fn cancel(&self, election_id: Id) {
        let task = self.tasks.lock().await.remove(&election_id);
        if let Some(task) = task {
            task.cancel();
            debug!("Cancelled closer for election {election_id}");
        }
    }

    /// Complete the given election.
    /// Since this is a recursive async function, it must return a `BoxFuture`.
    fn closer(
        election_id: Id,
        lifecycle: Lifecycle,
        tasks: Arc<Mutex<TaskMap>>,
    ) -> BoxFuture<'static, ()> {
        async move {
            debug!("Running closer for election {election_id}");
            let result = lifecycle
                .transition(election_id, ElectionStatus::Completed, Utc::now())
                .await;
            match result {
                Ok(_) => {
                    tasks.lock().await.remove(&election_id);
                    info!("Closed election {election_id} at the end of its window");
                }
                Err(Error::InvalidTransition { from, .. }) => {
                    tasks.lock().await.remove(&election_id);
                    debug!("Closer for election {election_id} had nothing to do, it is {from}");
                }
                Err(Error::ElectionNotFound(_)) => {
                    tasks.lock().await.remove(&election_id);
                    warn!("Closer for election {election_id} found no such election");
                }
                Err(e) => {
                    error!("Closer for election {election_id} failed: {e}");
                    let retry = Self::closer(election_id, lifecycle, tasks.clone());
                    let retry_time = Utc::now() + Duration::seconds(RETRY_INTERVAL_SECONDS);
                    tasks
                        .lock()
                        .await
                        .insert(election_id, ScheduledTask::new(retry, retry_time));
                    warn!("Failed closer will be retried in {RETRY_INTERVAL_SECONDS} seconds");
                }
            }
        }
        .boxed()
    }
}

impl Default for ElectionClosers {
    fn default() -> Self {
        Self::new()
    }
}

/// A fairing that schedules closers for all active elections during Rocket
/// ignition, and places an `ElectionClosers` into managed state.
/// It depends on the store and notifier being in managed state, and so must
/// be attached after the fairings responsible for those.
pub struct ElectionCloserFairing;

#[rocket::async_trait]
impl Fairing for ElectionCloserFairing {
    fn info(&self) -> Info {
        Info {
            name: "Election Closers",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        info!("Scheduling election closers...");
        let lifecycle = match (
            rocket.state::<Store>(),
            rocket.state::<SharedNotifier>(),
        ) {
            (Some(store), Some(notifier)) => Lifecycle::new(store.clone(), notifier.clone()),
            _ => {
                error!("Store and notifier must be available before scheduling closers");
                return Err(rocket);
            }
        };
        let closers = ElectionClosers::new();
        if let Err(e) = closers.schedule_elections(&lifecycle).await {
            error!("Failed to schedule election closers: {e}");
            return Err(rocket);
        }
        info!("...election closers scheduled!");

        rocket = rocket.manage(closers);
        Ok(rocket)
    }
}
