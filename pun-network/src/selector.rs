//! Channel selection policy.
//!
//! Available channels are ranked by receptivity, highest first, with ties
//! broken by their position in the snapshot (catalog declaration order).
//! Severe misbehaviors (4 and 5) always get the top-ranked channel; milder
//! ones get a uniformly random available channel.

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, info};

use punster_agent::{Channel, Severity};

/// Error types for channel selection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectionError {
    /// Every channel is cooling down
    #[error("No channel available for misbehavior category {category}")]
    NoChannelAvailable { category: String },
}

/// Available channels ranked by receptivity, ties kept in snapshot order.
pub fn rank_available(snapshot: &[Channel], now: DateTime<Utc>) -> Vec<Channel> {
    let mut ranked: Vec<(usize, &Channel)> = snapshot
        .iter()
        .enumerate()
        .filter(|(_, channel)| channel.is_available_at(now))
        .collect();

    ranked.sort_by(|(ia, a), (ib, b)| b.receptivity.cmp(&a.receptivity).then(ia.cmp(ib)));
    ranked.into_iter().map(|(_, channel)| channel.clone()).collect()
}

/// Pick a channel for a misbehavior of the given severity.
pub fn select_channel<R: Rng + ?Sized>(
    snapshot: &[Channel],
    now: DateTime<Utc>,
    severity: Severity,
    category: &str,
    rng: &mut R,
) -> Result<Channel, SelectionError> {
    let ranked = rank_available(snapshot, now);

    debug!(
        available = ranked.len(),
        total = snapshot.len(),
        severity = %severity,
        "Ranked available channels"
    );

    let channel = if severity.is_high() {
        ranked.into_iter().next()
    } else {
        ranked.choose(rng).cloned()
    }
    .ok_or_else(|| SelectionError::NoChannelAvailable {
        category: category.to_string(),
    })?;

    info!(
        channel = %channel.channel_type,
        "Selected channel type \"{}\" for optimal pun delivery",
        channel.channel_type
    );

    Ok(channel)
}
