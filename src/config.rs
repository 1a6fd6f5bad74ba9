use std::sync::Arc;
use std::time::Duration;

use aws_config::{BehaviorVersion, SdkConfig};
use aws_credential_types::provider::SharedCredentialsProvider;
use aws_sdk_sns::{
    config::{Credentials, Region},
    Client as SnsClient,
};
use log::{error, info, warn};
use rocket::{
    fairing::{Fairing, Info, Kind},
    Build, Rocket,
};
use serde::Deserialize;

use crate::notify::{LogNotifier, SharedNotifier, SnsNotifier};
use crate::store::{MongoStore, Store};

/// Application configuration, derived from `Rocket.toml` and `ROCKET_*`
/// environment variables. This struct becomes managed state and can be
/// inspected by any endpoint.
#[derive(Deserialize)]
pub struct Config {
    // non-secrets
    #[serde(default = "default_store_timeout_ms")]
    store_timeout_ms: u64,
    #[serde(default)]
    expose_active_results: bool,
    // secrets
    jwt_secret: String,
}

fn default_store_timeout_ms() -> u64 {
    5000
}

impl Config {
    /// Secret key used to verify identity tokens.
    pub fn jwt_secret(&self) -> &[u8] {
        self.jwt_secret.as_bytes()
    }

    /// Upper bound on any single store operation.
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    /// Development override: publish results of elections still being voted on.
    pub fn expose_active_results(&self) -> bool {
        self.expose_active_results
    }
}

/// A fairing that loads the application config and puts it in managed state.
pub struct ConfigFairing;

#[rocket::async_trait]
impl Fairing for ConfigFairing {
    fn info(&self) -> Info {
        Info {
            name: "Config",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        let config = match rocket.figment().extract::<Config>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load application config: {e}");
                return Err(rocket);
            }
        };
        if config.expose_active_results {
            warn!("expose_active_results is set: results of active elections are public");
        }

        rocket = rocket.manage(config);
        Ok(rocket)
    }
}

/// Configuration for the election store.
#[derive(Deserialize)]
struct DbConfig {
    // non-secrets
    #[serde(default = "default_db_name")]
    db_name: String,
    // secrets
    db_uri: Option<String>,
}

fn default_db_name() -> String {
    "evote".to_string()
}

/// A fairing that connects to the configured store and places a [`Store`]
/// into managed state. Without a database URI, the store is in-memory.
/// Must be attached after [`ConfigFairing`].
pub struct StoreFairing;

#[rocket::async_trait]
impl Fairing for StoreFairing {
    fn info(&self) -> Info {
        Info {
            name: "Election Store",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        let timeout = match rocket.state::<Config>() {
            Some(config) => config.store_timeout(),
            None => {
                error!("Config was not available when connecting to the store");
                return Err(rocket);
            }
        };
        let db_config = match rocket.figment().extract::<DbConfig>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load database config: {e}");
                return Err(rocket);
            }
        };

        let store = match db_config.db_uri {
            Some(uri) => {
                info!("Loaded database config, connecting...");
                match MongoStore::connect(&uri, &db_config.db_name, timeout).await {
                    Ok(mongo) => Store::new(Arc::new(mongo), timeout),
                    Err(e) => {
                        error!("Failed to connect to database: {e}");
                        return Err(rocket);
                    }
                }
            }
            None => {
                warn!("No db_uri configured, using a volatile in-memory store");
                Store::in_memory(timeout)
            }
        };
        info!("...election store online!");

        rocket = rocket.manage(store);
        Ok(rocket)
    }
}

/// Configuration for completion notifications via AWS SNS.
#[derive(Deserialize)]
struct AwsConfig {
    // non-secrets
    aws_region: Option<String>,
    aws_access_key_id: Option<String>,
    notification_topic_arn: Option<String>,
    // secrets
    aws_secret_access_key: Option<String>,
}

/// A fairing that places a [`SharedNotifier`] into managed state: Amazon SNS
/// if fully configured, otherwise one that only logs.
pub struct NotifierFairing;

#[rocket::async_trait]
impl Fairing for NotifierFairing {
    fn info(&self) -> Info {
        Info {
            name: "Notifier",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        let config = match rocket.figment().extract::<AwsConfig>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load AWS config: {e}");
                return Err(rocket);
            }
        };

        let notifier: SharedNotifier = match config {
            AwsConfig {
                aws_region: Some(region),
                aws_access_key_id: Some(access_key_id),
                aws_secret_access_key: Some(secret_access_key),
                notification_topic_arn: Some(topic_arn),
            } => {
                let aws_config = SdkConfig::builder()
                    .region(Region::new(region))
                    .credentials_provider(SharedCredentialsProvider::new(Credentials::new(
                        access_key_id,
                        secret_access_key,
                        None,
                        None,
                        "rocket config",
                    )))
                    .behavior_version(BehaviorVersion::latest())
                    .build();
                info!("Loaded Amazon SNS config");
                Arc::new(SnsNotifier::new(SnsClient::new(&aws_config), topic_arn))
            }
            _ => {
                warn!("Amazon SNS is not configured, completion notifications will only be logged");
                Arc::new(LogNotifier)
            }
        };

        rocket = rocket.manage(notifier);
        Ok(rocket)
    }
}
