use chrono::Utc;
use log::{debug, info};
use rocket::{serde::json::Json, Route};

use crate::error::Result;
use crate::logging::RequestId;
use crate::model::{
    api::vote::{VoteReceipt, VoteRequest},
    auth::{AuthToken, Voter, VoterIdentity},
    mongodb::Id,
};
use crate::voting::VotingCoordinator;

pub fn routes() -> Vec<Route> {
    routes![cast_vote, has_voted]
}

#[post("/voter/elections/<election_id>/votes", data = "<vote>", format = "json")]
async fn cast_vote(
    token: Result<AuthToken<Voter>>,
    election_id: Id,
    vote: Json<VoteRequest>,
    coordinator: VotingCoordinator,
    request_id: &RequestId,
) -> Result<Json<VoteReceipt>> {
    let voter = VoterIdentity::from(token?);
    let result = coordinator
        .cast_vote(&voter, election_id, vote.candidate.into(), Utc::now())
        .await;
    match result {
        Ok(vote) => {
            info!("req{request_id}: recorded vote {} in election {election_id}", vote.id);
            Ok(Json(vote.into()))
        }
        Err(e) => {
            debug!("req{request_id}: vote in election {election_id} refused: {e}");
            Err(e)
        }
    }
}

#[get("/voter/elections/<election_id>/voted")]
async fn has_voted(
    token: Result<AuthToken<Voter>>,
    election_id: Id,
    coordinator: VotingCoordinator,
) -> Result<Json<bool>> {
    let voter = VoterIdentity::from(token?);
    Ok(Json(coordinator.has_voted(&voter, election_id).await?))
}

#[cfg(test)]
mod tests {
    use rocket::{
        http::{Header, Status},
        local::asynchronous::{Client, LocalResponse},
    };
    use serde::Deserialize;

    use super::*;
    use crate::api::testing::{admin, bearer, create_active, create_draft, id_of};
    use crate::model::{
        api::{election::ElectionSummary, id::ApiId},
        common::ElectionStatus,
    };
    use crate::store::Store;

    #[derive(Deserialize)]
    struct ErrorBody {
        kind: String,
        retryable: bool,
    }

    async fn vote<'c>(
        client: &'c Client,
        voter: Header<'static>,
        election_id: Id,
        candidate: ApiId,
    ) -> LocalResponse<'c> {
        client
            .post(uri!(cast_vote(election_id)))
            .header(voter)
            .json(&VoteRequest { candidate })
            .dispatch()
            .await
    }

    async fn error(response: LocalResponse<'_>) -> ErrorBody {
        response.into_json().await.unwrap()
    }

    #[backend_test]
    async fn vote_once(client: Client, store: Store) {
        let election = create_active(&client).await;
        let id = id_of(election.summary.id);
        let voter_id = Id::new();

        let response = vote(
            &client,
            bearer::<Voter>(voter_id, true),
            id,
            election.candidates[0].id,
        )
        .await;
        assert_eq!(Status::Ok, response.status());
        let receipt: VoteReceipt = response.into_json().await.unwrap();
        assert_eq!(receipt.election_id, election.summary.id);

        let stored = store.tally_snapshot(id).await.unwrap().unwrap();
        assert_eq!(stored.counts.values().sum::<u64>(), 1);

        let response = client
            .get(uri!(has_voted(id)))
            .header(bearer::<Voter>(voter_id, true))
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        assert!(response.into_json::<bool>().await.unwrap());

        let again = vote(
            &client,
            bearer::<Voter>(voter_id, true),
            id,
            election.candidates[1].id,
        )
        .await;
        assert_eq!(Status::Conflict, again.status());
        let body = error(again).await;
        assert_eq!(body.kind, "duplicate_vote");
        assert!(!body.retryable);
    }

    #[backend_test]
    async fn closed_and_duplicate_are_distinguishable(client: Client) {
        let draft = create_draft(&client).await;
        let response = vote(
            &client,
            bearer::<Voter>(Id::new(), true),
            id_of(draft.summary.id),
            draft.candidates[0].id,
        )
        .await;
        assert_eq!(Status::Forbidden, response.status());
        assert_eq!(error(response).await.kind, "election_closed");

        let active = create_active(&client).await;
        let id = id_of(active.summary.id);
        let response = client
            .post(format!("/elections/{id}/complete"))
            .header(admin())
            .dispatch()
            .await;
        let completed: ElectionSummary = response.into_json().await.unwrap();
        assert_eq!(completed.status, ElectionStatus::Completed);

        let response = vote(
            &client,
            bearer::<Voter>(Id::new(), true),
            id,
            active.candidates[0].id,
        )
        .await;
        assert_eq!(Status::Forbidden, response.status());
        assert_eq!(error(response).await.kind, "election_closed");
    }

    #[backend_test]
    async fn voters_must_be_verified(client: Client) {
        let election = create_active(&client).await;
        let response = vote(
            &client,
            bearer::<Voter>(Id::new(), false),
            id_of(election.summary.id),
            election.candidates[0].id,
        )
        .await;
        assert_eq!(Status::Forbidden, response.status());
        assert_eq!(error(response).await.kind, "unverified_voter");
    }

    #[backend_test]
    async fn voters_must_be_authenticated(client: Client) {
        let election = create_active(&client).await;
        let response = client
            .post(uri!(cast_vote(id_of(election.summary.id))))
            .json(&VoteRequest {
                candidate: election.candidates[0].id,
            })
            .dispatch()
            .await;
        assert_eq!(Status::Unauthorized, response.status());
        assert_eq!(error(response).await.kind, "unauthenticated");

        // Admin tokens are not voter tokens.
        let response = vote(
            &client,
            admin(),
            id_of(election.summary.id),
            election.candidates[0].id,
        )
        .await;
        assert_eq!(Status::Unauthorized, response.status());
    }

    #[backend_test]
    async fn candidates_must_stand(client: Client) {
        let first = create_active(&client).await;
        let second = create_active(&client).await;
        let response = vote(
            &client,
            bearer::<Voter>(Id::new(), true),
            id_of(first.summary.id),
            second.candidates[0].id,
        )
        .await;
        assert_eq!(Status::UnprocessableEntity, response.status());
        assert_eq!(error(response).await.kind, "candidate_not_in_election");
    }

    #[backend_test]
    async fn unknown_elections(client: Client) {
        let response = vote(
            &client,
            bearer::<Voter>(Id::new(), true),
            Id::new(),
            Id::new().into(),
        )
        .await;
        assert_eq!(Status::NotFound, response.status());

        let response = client
            .get(uri!(has_voted(Id::new())))
            .header(bearer::<Voter>(Id::new(), true))
            .dispatch()
            .await;
        assert_eq!(Status::NotFound, response.status());
    }
}
