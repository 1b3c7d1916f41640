//! Pure round-tracking logic: probe parsing, dedup/classification, streaks.
//!
//! Everything here is synchronous and side-effect free so the daemon's poll
//! loop can own the mutable state and tests can drive it deterministically.

pub mod dedup;
pub mod extract;
pub mod streak;
pub mod types;

pub use dedup::DedupEngine;
pub use extract::{format_timer, observe, parse_round_id};
pub use streak::StreakCounter;
pub use types::{AcceptedRound, ColorClass, RoundObservation};
