//! Rating-tier auto-reply policy

use crate::models::{ReplyMode, ReplyModeMap};

/// Looks the rating up in the account's mode map. Unmapped ratings are manual.
pub fn decide(rating: i32, modes: &ReplyModeMap) -> ReplyMode {
    modes
        .get(&rating.to_string())
        .copied()
        .unwrap_or(ReplyMode::Manual)
}
