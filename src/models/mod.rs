//! Persisted entity shapes (spec section 3 and section 6's "persisted
//! shape" contracts). These are plain serde structs; the store modules
//! decide how each one is laid out in sqlite.

mod job;
mod market;
mod oauth;
mod user;

pub use job::*;
pub use market::*;
pub use oauth::*;
pub use user::*;

use chrono::{DateTime, Utc};

/// An instant used across the freshness catalog and stock-index timestamps.
/// A zero value (`Utc.timestamp_opt(0, 0)`) means "never collected".
pub type Instant = DateTime<Utc>;

pub fn zero_instant() -> Instant {
    DateTime::<Utc>::UNIX_EPOCH
}

pub fn is_zero_instant(t: Instant) -> bool {
    t == zero_instant()
}
