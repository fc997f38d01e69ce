//! Channel registry - the catalog of delivery channels and their cooldowns.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use punster_agent::{Channel, ChannelType};

use crate::clock::Clock;

/// Error types for registry operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// The catalog lists a channel type twice
    #[error("Channel {0} appears more than once in the catalog")]
    DuplicateChannel(ChannelType),

    /// Receptivity outside 1-100
    #[error("Channel {channel} has receptivity {receptivity}, expected 1-100")]
    InvalidReceptivity { channel: ChannelType, receptivity: u8 },

    /// The channel type is not in this registry's catalog
    #[error("Channel {0} is not in the catalog")]
    UnknownChannel(ChannelType),
}

/// Static definition of a channel in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSpec {
    /// Which channel
    pub channel_type: ChannelType,
    /// Audience receptivity, 1-100
    pub receptivity: u8,
    /// Cooldown between deliveries (seconds)
    pub cooldown_secs: u64,
}

impl ChannelSpec {
    /// Create a catalog entry.
    pub fn new(channel_type: ChannelType, receptivity: u8, cooldown: Duration) -> Self {
        Self {
            channel_type,
            receptivity,
            cooldown_secs: cooldown.as_secs(),
        }
    }

    /// Cooldown as a duration.
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    /// The default catalog, in declaration order.
    pub fn default_catalog() -> Vec<ChannelSpec> {
        const MINUTE: u64 = 60;
        const HOUR: u64 = 60 * MINUTE;

        vec![
            ChannelSpec::new(ChannelType::BedtimeRoutine, 75, Duration::from_secs(24 * HOUR)),
            ChannelSpec::new(ChannelType::CarRide, 65, Duration::from_secs(30 * MINUTE)),
            ChannelSpec::new(ChannelType::DinnerConversation, 80, Duration::from_secs(HOUR)),
            ChannelSpec::new(ChannelType::FamilyGathering, 90, Duration::from_secs(2 * HOUR)),
            ChannelSpec::new(ChannelType::HomeworkSession, 45, Duration::from_secs(3 * HOUR)),
        ]
    }
}

/// Channel operations used by the delivery orchestrator.
pub trait ChannelDirectory: Send + Sync {
    /// Current state of every channel, in catalog order.
    fn snapshot(&self) -> Vec<Channel>;

    /// Whether the channel's cooldown has elapsed.
    fn is_available(&self, channel: &Channel) -> bool;

    /// Record a delivery on the channel at `at`.
    fn mark_used(&self, channel_type: ChannelType, at: DateTime<Utc>) -> Result<(), RegistryError>;

    /// Current time as seen by the registry.
    fn now(&self) -> DateTime<Utc>;
}

/// Registry owning every channel for the process lifetime.
pub struct ChannelRegistry {
    /// Static catalog, in declaration order
    catalog: Vec<ChannelSpec>,
    /// Last delivery per channel
    last_used: DashMap<ChannelType, DateTime<Utc>>,
    /// Time source
    clock: Arc<dyn Clock>,
}

impl ChannelRegistry {
    /// Build a registry from a catalog.
    pub fn new(catalog: Vec<ChannelSpec>, clock: Arc<dyn Clock>) -> Result<Self, RegistryError> {
        validate_catalog(&catalog)?;
        Ok(Self {
            catalog,
            last_used: DashMap::new(),
            clock,
        })
    }

    /// Build a registry from the default catalog.
    pub fn with_default_catalog(clock: Arc<dyn Clock>) -> Self {
        Self {
            catalog: ChannelSpec::default_catalog(),
            last_used: DashMap::new(),
            clock,
        }
    }

    /// Record a delivery on the channel now.
    pub fn mark_used_now(&self, channel_type: ChannelType) -> Result<(), RegistryError> {
        self.mark_used(channel_type, self.clock.now())
    }

    /// The catalog this registry was built from.
    pub fn catalog(&self) -> &[ChannelSpec] {
        &self.catalog
    }

    /// Channels whose cooldown has elapsed, in catalog order.
    pub fn available(&self) -> Vec<Channel> {
        let now = self.clock.now();
        self.snapshot()
            .into_iter()
            .filter(|channel| channel.is_available_at(now))
            .collect()
    }
}

/// Check a catalog for duplicate types and out-of-range receptivity.
pub fn validate_catalog(catalog: &[ChannelSpec]) -> Result<(), RegistryError> {
    let mut seen = HashSet::new();
    for spec in catalog {
        if !seen.insert(spec.channel_type) {
            return Err(RegistryError::DuplicateChannel(spec.channel_type));
        }
        if !(1..=100).contains(&spec.receptivity) {
            return Err(RegistryError::InvalidReceptivity {
                channel: spec.channel_type,
                receptivity: spec.receptivity,
            });
        }
    }
    Ok(())
}

impl ChannelDirectory for ChannelRegistry {
    fn snapshot(&self) -> Vec<Channel> {
        self.catalog
            .iter()
            .map(|spec| Channel {
                channel_type: spec.channel_type,
                receptivity: spec.receptivity,
                cooldown: spec.cooldown(),
                last_used: self.last_used.get(&spec.channel_type).map(|t| *t),
            })
            .collect()
    }

    fn is_available(&self, channel: &Channel) -> bool {
        channel.is_available_at(self.clock.now())
    }

    fn mark_used(&self, channel_type: ChannelType, at: DateTime<Utc>) -> Result<(), RegistryError> {
        if !self.catalog.iter().any(|spec| spec.channel_type == channel_type) {
            return Err(RegistryError::UnknownChannel(channel_type));
        }

        // Timestamps only move forward
        self.last_used
            .entry(channel_type)
            .and_modify(|last| {
                if at > *last {
                    *last = at;
                }
            })
            .or_insert(at);

        debug!(channel = %channel_type, at = %at, "Marked channel as used");
        Ok(())
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;

    fn registry() -> (ChannelRegistry, ManualClock) {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2025, 6, 14, 18, 0, 0).unwrap());
        let registry = ChannelRegistry::with_default_catalog(Arc::new(clock.clone()));
        (registry, clock)
    }

    fn find(registry: &ChannelRegistry, channel_type: ChannelType) -> Channel {
        registry
            .snapshot()
            .into_iter()
            .find(|c| c.channel_type == channel_type)
            .unwrap()
    }

    #[test]
    fn test_snapshot_follows_catalog_order() {
        let (registry, _) = registry();
        let types: Vec<_> = registry.snapshot().iter().map(|c| c.channel_type).collect();
        assert_eq!(types, ChannelType::ALL.to_vec());
        assert!(registry.snapshot().iter().all(|c| registry.is_available(c)));
    }

    #[test]
    fn test_cooldown_window() {
        let (registry, clock) = registry();
        registry.mark_used_now(ChannelType::CarRide).unwrap();

        assert!(!registry.is_available(&find(&registry, ChannelType::CarRide)));

        clock.advance(Duration::from_secs(29 * 60 + 59));
        assert!(!registry.is_available(&find(&registry, ChannelType::CarRide)));

        clock.advance(Duration::from_secs(1));
        assert!(registry.is_available(&find(&registry, ChannelType::CarRide)));
        assert_eq!(registry.available().len(), 5);
    }

    #[test]
    fn test_last_used_only_moves_forward() {
        let (registry, clock) = registry();
        let later = clock.now();
        let earlier = later - chrono::Duration::hours(5);

        registry.mark_used(ChannelType::HomeworkSession, later).unwrap();
        registry.mark_used(ChannelType::HomeworkSession, earlier).unwrap();

        assert_eq!(find(&registry, ChannelType::HomeworkSession).last_used, Some(later));
    }

    #[test]
    fn test_catalog_validation() {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(Utc::now()));

        let duplicate = vec![
            ChannelSpec::new(ChannelType::CarRide, 65, Duration::from_secs(60)),
            ChannelSpec::new(ChannelType::CarRide, 70, Duration::from_secs(60)),
        ];
        assert_eq!(
            ChannelRegistry::new(duplicate, Arc::clone(&clock)).err(),
            Some(RegistryError::DuplicateChannel(ChannelType::CarRide))
        );

        let zero = vec![ChannelSpec::new(ChannelType::CarRide, 0, Duration::from_secs(60))];
        assert!(ChannelRegistry::new(zero, Arc::clone(&clock)).is_err());

        let partial = vec![ChannelSpec::new(ChannelType::CarRide, 65, Duration::from_secs(60))];
        let registry = ChannelRegistry::new(partial, clock).unwrap();
        assert_eq!(
            registry.mark_used_now(ChannelType::BedtimeRoutine),
            Err(RegistryError::UnknownChannel(ChannelType::BedtimeRoutine))
        );
    }
}
