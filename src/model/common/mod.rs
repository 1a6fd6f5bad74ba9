//! Types shared between the database and API representations.

mod status;
mod time;

pub use status::ElectionStatus;
pub use time::stored_precision;
