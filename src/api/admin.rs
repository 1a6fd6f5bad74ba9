use chrono::Utc;
use rocket::{serde::json::Json, Route, State};

use crate::error::Result;
use crate::model::{
    api::election::{
        CandidateDescription, CandidateSpec, ElectionDescription, ElectionSpec, ElectionSummary,
    },
    auth::{Admin, AuthToken},
    common::ElectionStatus,
    mongodb::Id,
};
use crate::voting::{ElectionClosers, Lifecycle};

pub fn routes() -> Vec<Route> {
    routes![
        create_election,
        add_candidate,
        activate_election,
        complete_election,
        delete_election,
    ]
}

#[post("/elections", data = "<spec>", format = "json")]
async fn create_election(
    token: Result<AuthToken<Admin>>,
    spec: Json<ElectionSpec>,
    lifecycle: Lifecycle,
) -> Result<Json<ElectionDescription>> {
    token?;
    let election = lifecycle.create(spec.0.into_election(Utc::now())).await?;
    Ok(Json(ElectionDescription::new(election, Vec::new())))
}

#[post("/elections/<election_id>/candidates", data = "<spec>", format = "json")]
async fn add_candidate(
    token: Result<AuthToken<Admin>>,
    election_id: Id,
    spec: Json<CandidateSpec>,
    lifecycle: Lifecycle,
) -> Result<Json<CandidateDescription>> {
    token?;
    let candidate = lifecycle
        .add_candidate(spec.0.into_candidate(election_id, Utc::now()))
        .await?;
    Ok(Json(candidate.into()))
}

#[post("/elections/<election_id>/activate")]
async fn activate_election(
    token: Result<AuthToken<Admin>>,
    election_id: Id,
    lifecycle: Lifecycle,
    closers: &State<ElectionClosers>,
) -> Result<Json<ElectionSummary>> {
    token?;
    let election = lifecycle
        .transition(election_id, ElectionStatus::Active, Utc::now())
        .await?;
    closers.schedule_election(lifecycle, &election).await;
    Ok(Json(election.into()))
}

#[post("/elections/<election_id>/complete")]
async fn complete_election(
    token: Result<AuthToken<Admin>>,
    election_id: Id,
    lifecycle: Lifecycle,
    closers: &State<ElectionClosers>,
) -> Result<Json<ElectionSummary>> {
    token?;
    let election = lifecycle
        .transition(election_id, ElectionStatus::Completed, Utc::now())
        .await?;
    closers.cancel(election_id).await;
    Ok(Json(election.into()))
}

#[delete("/elections/<election_id>")]
async fn delete_election(
    token: Result<AuthToken<Admin>>,
    election_id: Id,
    lifecycle: Lifecycle,
) -> Result<()> {
    token?;
    lifecycle.delete(election_id).await
}

#[cfg(test)]
mod tests {
    use rocket::{
        http::Status,
        local::asynchronous::{Client, LocalResponse},
    };
    use serde::Deserialize;

    use super::*;
    use crate::api::testing::{admin, bearer, create_active, create_draft, id_of};
    use crate::model::auth::Voter;
    use crate::store::Store;

    /// Just the parts of an error body the tests look at.
    #[derive(Deserialize)]
    struct ErrorBody {
        kind: String,
    }

    async fn error_kind(response: LocalResponse<'_>) -> String {
        response.into_json::<ErrorBody>().await.unwrap().kind
    }

    #[backend_test]
    async fn create_and_describe(client: Client, store: Store) {
        let election = create_draft(&client).await;
        assert_eq!(election.summary.status, ElectionStatus::Draft);
        assert_eq!(election.candidates.len(), 2);

        let stored = store.election(id_of(election.summary.id)).await.unwrap().unwrap();
        assert_eq!(stored.title, election.summary.title);
        let candidates = store.candidates(stored.id).await.unwrap();
        let names: Vec<_> = candidates.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, [CandidateSpec::example1().name, CandidateSpec::example2().name]);
    }

    #[backend_test]
    async fn invalid_windows_are_bad_requests(client: Client) {
        let mut spec = ElectionSpec::current_example();
        spec.end_time = spec.start_time - chrono::Duration::minutes(1);
        let response = client
            .post(uri!(create_election()))
            .header(admin())
            .json(&spec)
            .dispatch()
            .await;
        assert_eq!(Status::BadRequest, response.status());
        assert_eq!(error_kind(response).await, "bad_request");
    }

    #[backend_test]
    async fn admin_routes_need_an_admin(client: Client) {
        let anonymous = client
            .post(uri!(create_election()))
            .json(&ElectionSpec::current_example())
            .dispatch()
            .await;
        assert_eq!(Status::Unauthorized, anonymous.status());
        assert_eq!(error_kind(anonymous).await, "unauthenticated");

        let voter = client
            .post(uri!(create_election()))
            .header(bearer::<Voter>(Id::new(), true))
            .json(&ElectionSpec::current_example())
            .dispatch()
            .await;
        assert_eq!(Status::Unauthorized, voter.status());
    }

    #[backend_test]
    async fn activation_schedules_and_completion_cancels(client: Client) {
        let election = create_active(&client).await;
        let id = id_of(election.summary.id);
        assert_eq!(election.summary.status, ElectionStatus::Active);

        let closers = client.rocket().state::<ElectionClosers>().unwrap();
        assert!(closers.has_closer(id).await);

        let response = client
            .post(uri!(complete_election(id)))
            .header(admin())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        let summary: ElectionSummary = response.into_json().await.unwrap();
        assert_eq!(summary.status, ElectionStatus::Completed);
        assert!(!closers.has_closer(id).await);
    }

    #[backend_test]
    async fn completed_elections_stay_completed(client: Client) {
        let election = create_active(&client).await;
        let id = id_of(election.summary.id);
        client
            .post(uri!(complete_election(id)))
            .header(admin())
            .dispatch()
            .await;

        let response = client
            .post(uri!(activate_election(id)))
            .header(admin())
            .dispatch()
            .await;
        assert_eq!(Status::Conflict, response.status());
        assert_eq!(error_kind(response).await, "invalid_transition");
    }

    #[backend_test]
    async fn only_drafts_can_change(client: Client) {
        let election = create_active(&client).await;
        let id = id_of(election.summary.id);

        let response = client
            .post(uri!(add_candidate(id)))
            .header(admin())
            .json(&CandidateSpec::example2())
            .dispatch()
            .await;
        assert_eq!(Status::Conflict, response.status());
        assert_eq!(error_kind(response).await, "election_locked");

        let response = client
            .delete(uri!(delete_election(id)))
            .header(admin())
            .dispatch()
            .await;
        assert_eq!(Status::Conflict, response.status());
    }

    #[backend_test]
    async fn delete_draft(client: Client, store: Store) {
        let election = create_draft(&client).await;
        let id = id_of(election.summary.id);

        let response = client
            .delete(uri!(delete_election(id)))
            .header(admin())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        assert!(store.election(id).await.unwrap().is_none());

        let response = client
            .delete(uri!(delete_election(id)))
            .header(admin())
            .dispatch()
            .await;
        assert_eq!(Status::NotFound, response.status());
        assert_eq!(error_kind(response).await, "election_not_found");
    }
}
