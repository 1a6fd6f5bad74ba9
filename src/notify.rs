//! Best-effort notifications about election lifecycle events.

use std::sync::Arc;

use aws_sdk_sns::Client as SnsClient;
use log::{info, warn};
use rocket::tokio;
use thiserror::Error;

use crate::model::db::election::Election;

#[derive(Debug, Error)]
#[error("Failed to send notification: {0}")]
pub struct NotifyError(pub String);

/// Something that wants to know when an election completes.
#[rocket::async_trait]
pub trait Notifier: Send + Sync {
    async fn election_completed(&self, election: &Election) -> Result<(), NotifyError>;
}

pub type SharedNotifier = Arc<dyn Notifier>;

/// Send the notification without holding up the caller.
/// Failures are logged and otherwise ignored.
pub fn notify_in_background(notifier: SharedNotifier, election: Election) {
    tokio::spawn(async move {
        if let Err(e) = notifier.election_completed(&election).await {
            warn!("Election {} completed, but: {e}", election.id);
        }
    });
}

/// Publishes to an Amazon SNS topic.
pub struct SnsNotifier {
    client: SnsClient,
    topic_arn: String,
}

impl SnsNotifier {
    pub fn new(client: SnsClient, topic_arn: String) -> Self {
        Self { client, topic_arn }
    }
}

#[rocket::async_trait]
impl Notifier for SnsNotifier {
    async fn election_completed(&self, election: &Election) -> Result<(), NotifyError> {
        let message = format!(
            "Voting in \"{}\" has closed. Results are now available.",
            election.title
        );
        self.client
            .publish()
            .topic_arn(&self.topic_arn)
            .subject("Election completed")
            .message(message)
            .send()
            .await
            .map_err(|e| NotifyError(e.to_string()))?;
        info!("Published completion of election {}", election.id);
        Ok(())
    }
}

/// Just logs, for deployments without a notification channel.
pub struct LogNotifier;

#[rocket::async_trait]
impl Notifier for LogNotifier {
    async fn election_completed(&self, election: &Election) -> Result<(), NotifyError> {
        info!("Election {} ({}) completed", election.id, election.title);
        Ok(())
    }
}
