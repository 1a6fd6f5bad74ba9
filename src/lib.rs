#[macro_use]
extern crate rocket;

#[cfg(test)]
#[macro_use]
extern crate backend_test;

use rocket::{Build, Rocket};

use crate::config::{ConfigFairing, NotifierFairing, StoreFairing};
use crate::logging::LoggerFairing;
use crate::notify::SharedNotifier;
use crate::store::Store;
use crate::voting::{ElectionCloserFairing, ElectionClosers};

pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod notify;
pub mod scheduled_task;
pub mod store;
pub mod voting;

pub use config::Config;

/// Build the server from `Rocket.toml` and the environment.
///
/// Fairing order matters: each fairing relies on the state managed by those
/// before it.
pub fn build() -> Rocket<Build> {
    rocket::build()
        .attach(LoggerFairing)
        .attach(ConfigFairing)
        .attach(StoreFairing)
        .attach(NotifierFairing)
        .attach(ElectionCloserFairing)
        .mount("/", api::routes())
}

/// Build a server around an existing store and notifier, bypassing the
/// configuration fairings. No closers are scheduled for existing elections.
pub fn rocket_for_store_and_notifier(
    config: Config,
    store: Store,
    notifier: SharedNotifier,
) -> Rocket<Build> {
    rocket::build()
        .attach(LoggerFairing)
        .manage(config)
        .manage(store)
        .manage(notifier)
        .manage(ElectionClosers::new())
        .mount("/", api::routes())
}
