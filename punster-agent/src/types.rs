//! Records exchanged with the Punster API.
//!
//! Field names follow the API's camelCase JSON. Durations travel as numbers:
//! channel cooldowns in milliseconds, reaction durations in seconds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Severity of a misbehavior, `5` being the most consequential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Severity(u8);

impl Severity {
    /// Lowest severity.
    pub const MIN: Severity = Severity(1);
    /// Highest severity.
    pub const MAX: Severity = Severity(5);

    /// Create a severity, rejecting values outside 1-5.
    pub fn new(value: u8) -> Option<Self> {
        (1..=5).contains(&value).then_some(Self(value))
    }

    /// Numeric value.
    pub fn value(&self) -> u8 {
        self.0
    }

    /// Severities 4 and 5 take the deterministic selection path.
    pub fn is_high(&self) -> bool {
        self.0 >= 4
    }
}

impl TryFrom<u8> for Severity {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Severity::new(value).ok_or_else(|| format!("severity must be between 1 and 5, got {}", value))
    }
}

impl From<Severity> for u8 {
    fn from(severity: Severity) -> Self {
        severity.0
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A child's misbehavior, as submitted by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Misbehavior {
    /// Name of the child who misbehaved
    pub child_name: String,
    /// Category the pun should relate to (e.g. TooMuchDeviceTime)
    pub category: String,
    /// Detailed description
    pub description: String,
    /// How consequential the misbehavior is
    pub severity: Severity,
}

impl Misbehavior {
    /// Create a new misbehavior record.
    pub fn new(
        child_name: impl Into<String>,
        category: impl Into<String>,
        description: impl Into<String>,
        severity: Severity,
    ) -> Self {
        Self {
            child_name: child_name.into(),
            category: category.into(),
            description: description.into(),
            severity,
        }
    }
}

/// A pun produced by the creation service.
///
/// Decoding rejects empty lines and a groan potential outside 1-100.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawPun")]
pub struct Pun {
    /// Setup line
    pub setup: String,
    /// Punch line
    pub punchline: String,
    /// Likelihood of a groan, 1-100
    pub groan_potential: u8,
}

impl Pun {
    /// Create a pun, rejecting empty lines and out-of-range groan potential.
    pub fn new(
        setup: impl Into<String>,
        punchline: impl Into<String>,
        groan_potential: u8,
    ) -> Result<Self, String> {
        let setup = setup.into();
        let punchline = punchline.into();

        if setup.trim().is_empty() {
            return Err("pun setup must not be empty".to_string());
        }
        if punchline.trim().is_empty() {
            return Err("pun punchline must not be empty".to_string());
        }
        if !(1..=100).contains(&groan_potential) {
            return Err(format!(
                "groan potential must be between 1 and 100, got {}",
                groan_potential
            ));
        }

        Ok(Self {
            setup,
            punchline,
            groan_potential,
        })
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPun {
    setup: String,
    punchline: String,
    groan_potential: u8,
}

impl TryFrom<RawPun> for Pun {
    type Error = String;

    fn try_from(raw: RawPun) -> Result<Self, Self::Error> {
        Pun::new(raw.setup, raw.punchline, raw.groan_potential)
    }
}

/// The fixed set of delivery channel types, in catalog declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelType {
    BedtimeRoutine,
    CarRide,
    DinnerConversation,
    FamilyGathering,
    HomeworkSession,
}

impl ChannelType {
    /// All channel types in declaration order.
    pub const ALL: [ChannelType; 5] = [
        ChannelType::BedtimeRoutine,
        ChannelType::CarRide,
        ChannelType::DinnerConversation,
        ChannelType::FamilyGathering,
        ChannelType::HomeworkSession,
    ];

    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelType::BedtimeRoutine => "BedtimeRoutine",
            ChannelType::CarRide => "CarRide",
            ChannelType::DinnerConversation => "DinnerConversation",
            ChannelType::FamilyGathering => "FamilyGathering",
            ChannelType::HomeworkSession => "HomeworkSession",
        }
    }
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A delivery channel and its current cooldown state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    /// Which channel this is
    #[serde(rename = "type")]
    pub channel_type: ChannelType,
    /// How receptive the audience will be, 1-100
    pub receptivity: u8,
    /// Required recovery time between deliveries
    #[serde(with = "duration_millis")]
    pub cooldown: Duration,
    /// When the channel was last used
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "chrono::serde::ts_milliseconds_option"
    )]
    pub last_used: Option<DateTime<Utc>>,
}

impl Channel {
    /// Create a channel that has never been used.
    pub fn new(channel_type: ChannelType, receptivity: u8, cooldown: Duration) -> Self {
        Self {
            channel_type,
            receptivity,
            cooldown,
            last_used: None,
        }
    }

    /// Earliest instant the channel may be used again, `None` if never used.
    ///
    /// A cooldown too large to represent yields `Some(DateTime::<Utc>::MAX_UTC)`.
    pub fn available_from(&self) -> Option<DateTime<Utc>> {
        let last_used = self.last_used?;
        let ready = chrono::Duration::from_std(self.cooldown)
            .ok()
            .and_then(|cooldown| last_used.checked_add_signed(cooldown))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Some(ready)
    }

    /// Whether the channel's cooldown has elapsed at `now`.
    pub fn is_available_at(&self, now: DateTime<Utc>) -> bool {
        match self.available_from() {
            None => true,
            Some(ready) => now >= ready,
        }
    }
}

/// Quantitative metrics about a delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryMetrics {
    /// Percentage of the pun that was comprehended (0-100)
    pub comprehension_rate: f64,
    /// Intensity of the reaction (0-100)
    pub reaction_intensity: f64,
    /// How long the reaction lasted
    #[serde(with = "duration_secs")]
    pub reaction_duration: Duration,
    /// Likelihood of the child repeating the pun to others (0-100)
    pub repeat_probability: f64,
    /// Overall success of the delivery (0-100)
    pub delivery_effectiveness: f64,
}

/// Evaluation report produced after a pun is delivered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryReport {
    /// Summary of the overall delivery effectiveness
    pub executive_summary: String,
    /// Narrative of how the delivery unfolded
    pub delivery_narrative: String,
    /// Qualitative observations about the delivery and reaction
    pub observations: Vec<String>,
    /// Recommendations for future deliveries
    pub recommendations: Vec<String>,
    /// Quantitative metrics
    pub metrics: DeliveryMetrics,
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(millis)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

mod duration_secs {
    use serde::{de, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(duration.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs)
            .map_err(|_| de::Error::custom(format!("invalid duration in seconds: {}", secs)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_severity_bounds() {
        assert!(Severity::new(0).is_none());
        assert!(Severity::new(6).is_none());
        assert!(Severity::new(4).unwrap().is_high());
        assert!(!Severity::new(3).unwrap().is_high());

        let parsed: Result<Severity, _> = serde_json::from_str("7");
        assert!(parsed.is_err());
    }

    #[test]
    fn test_pun_decoding_validates_fields() {
        let pun: Pun = serde_json::from_value(serde_json::json!({
            "setup": "Why did the tablet nap?",
            "punchline": "Low battery morale.",
            "groanPotential": 100
        }))
        .unwrap();
        assert_eq!(pun.groan_potential, 100);

        for bad in [
            serde_json::json!({ "setup": "a", "punchline": "b", "groanPotential": 0 }),
            serde_json::json!({ "setup": "a", "punchline": "b", "groanPotential": 101 }),
            serde_json::json!({ "setup": "", "punchline": "b", "groanPotential": 50 }),
            serde_json::json!({ "setup": "a", "punchline": "  ", "groanPotential": 50 }),
        ] {
            assert!(serde_json::from_value::<Pun>(bad.clone()).is_err(), "{bad}");
        }
        assert!(Pun::new("a", "b", 0).is_err());
    }

    #[test]
    fn test_channel_wire_shape() {
        let mut channel = Channel::new(ChannelType::CarRide, 65, Duration::from_secs(30 * 60));
        let json = serde_json::to_value(&channel).unwrap();
        assert_eq!(json["type"], "CarRide");
        assert_eq!(json["cooldown"], 1_800_000);
        assert!(json.get("lastUsed").is_none());

        channel.last_used = Some(Utc.timestamp_millis_opt(1_700_000_000_000).unwrap());
        let json = serde_json::to_value(&channel).unwrap();
        assert_eq!(json["lastUsed"], 1_700_000_000_000i64);
    }

    #[test]
    fn test_channel_availability_respects_cooldown() {
        let used_at = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let mut channel = Channel::new(ChannelType::DinnerConversation, 80, Duration::from_secs(3600));
        assert!(channel.is_available_at(used_at));

        channel.last_used = Some(used_at);
        assert!(!channel.is_available_at(used_at));
        assert!(!channel.is_available_at(used_at + chrono::Duration::minutes(59)));
        assert!(channel.is_available_at(used_at + chrono::Duration::hours(1)));
    }

    #[test]
    fn test_report_decodes_reaction_seconds() {
        let json = serde_json::json!({
            "executiveSummary": "It landed.",
            "deliveryNarrative": "Eyes rolled.",
            "observations": ["Audible sigh"],
            "recommendations": [],
            "metrics": {
                "comprehensionRate": 90,
                "reactionIntensity": 55,
                "reactionDuration": 12.5,
                "repeatProbability": 30.0,
                "deliveryEffectiveness": 72
            }
        });
        let report: DeliveryReport = serde_json::from_value(json).unwrap();
        assert_eq!(report.metrics.reaction_duration, Duration::from_millis(12_500));

        let bad = serde_json::json!({
            "executiveSummary": "",
            "deliveryNarrative": "",
            "observations": [],
            "recommendations": [],
            "metrics": {
                "comprehensionRate": 1,
                "reactionIntensity": 1,
                "reactionDuration": -3,
                "repeatProbability": 1,
                "deliveryEffectiveness": 1
            }
        });
        assert!(serde_json::from_value::<DeliveryReport>(bad).is_err());
    }
}
