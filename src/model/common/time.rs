use chrono::{DateTime, SubsecRound, Utc};

/// Truncate a timestamp to the millisecond precision the database keeps, so
/// that records read back compare equal to the ones written.
pub fn stored_precision(time: DateTime<Utc>) -> DateTime<Utc> {
    time.trunc_subsecs(3)
}
