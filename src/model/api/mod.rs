//! API-friendly types.
//!
//! The types in this module are serialised in an API-friendly way, e.g.:
//!
//! - IDs are serialised as plain hex strings.
//! - Datetimes are serialised as RFC 3339 strings.

pub mod election;
pub mod id;
pub mod results;
pub mod vote;
