use rocket::{serde::json::Json, Route};

use crate::error::{Error, Result};
use crate::model::{
    api::{
        election::{ElectionDescription, ElectionSummary},
        results::ElectionResults,
    },
    auth::{Admin, AuthToken},
    common::ElectionStatus,
    mongodb::Id,
};
use crate::voting::{Lifecycle, TallyEngine};

pub fn routes() -> Vec<Route> {
    routes![elections, election, election_results]
}

/// Statuses visible to everyone; drafts are for admins only.
const PUBLIC_STATUSES: [ElectionStatus; 2] = [ElectionStatus::Active, ElectionStatus::Completed];
const ALL_STATUSES: [ElectionStatus; 3] = [
    ElectionStatus::Draft,
    ElectionStatus::Active,
    ElectionStatus::Completed,
];

#[get("/elections?<status>")]
async fn elections(
    token: Option<AuthToken<Admin>>,
    status: Option<ElectionStatus>,
    lifecycle: Lifecycle,
) -> Result<Json<Vec<ElectionSummary>>> {
    let visible: &[ElectionStatus] = if token.is_some() {
        &ALL_STATUSES
    } else {
        &PUBLIC_STATUSES
    };
    let statuses: Vec<_> = visible
        .iter()
        .copied()
        .filter(|s| status.map_or(true, |wanted| wanted == *s))
        .collect();
    if statuses.is_empty() {
        return Ok(Json(Vec::new()));
    }

    let elections = lifecycle.elections(&statuses).await?;
    Ok(Json(elections.into_iter().map(Into::into).collect()))
}

#[get("/elections/<election_id>")]
async fn election(
    token: Option<AuthToken<Admin>>,
    election_id: Id,
    lifecycle: Lifecycle,
) -> Result<Json<ElectionDescription>> {
    let election = lifecycle.election(election_id).await?;
    if election.status == ElectionStatus::Draft && token.is_none() {
        return Err(Error::ElectionNotFound(election_id));
    }
    let candidates = lifecycle.candidates(election_id).await?;
    Ok(Json(ElectionDescription::new(election, candidates)))
}

#[get("/elections/<election_id>/results")]
async fn election_results(
    token: Option<AuthToken<Admin>>,
    election_id: Id,
    lifecycle: Lifecycle,
    engine: TallyEngine,
) -> Result<Json<ElectionResults>> {
    match engine.published_tally(election_id).await {
        Ok(tally) => Ok(Json(tally.into())),
        Err(Error::ResultsNotPublished(_)) if token.is_none() => {
            // Drafts stay invisible to the public, even by their results.
            let election = lifecycle.election(election_id).await?;
            if election.status == ElectionStatus::Draft {
                Err(Error::ElectionNotFound(election_id))
            } else {
                Err(Error::ResultsNotPublished(election_id))
            }
        }
        Err(e) => Err(e),
    }
}
