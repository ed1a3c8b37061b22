//! Urgency tiers for minutes-until-migration values.
//!
//! Tiers are totally ordered by urgency for display purposes (label,
//! embed color); deduplication treats them as independent keys, so an
//! entity crossing into a tighter tier fires that tier on its own.

use serde::{Deserialize, Serialize};

/// Urgency bucket, ascending. Boundaries are inclusive on the upper edge.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// More than 30 minutes out. Never alerted under the default threshold.
    Scheduled,
    /// 15 < minutes <= 30.
    Upcoming,
    /// 5 < minutes <= 15.
    Soon,
    /// minutes <= 5.
    Imminent,
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Tier::Scheduled => write!(f, "SCHEDULED"),
            Tier::Upcoming => write!(f, "UPCOMING"),
            Tier::Soon => write!(f, "SOON"),
            Tier::Imminent => write!(f, "IMMINENT"),
        }
    }
}

impl Tier {
    /// Human label for notification text.
    pub fn label(&self) -> &'static str {
        match self {
            Tier::Scheduled => "Scheduled",
            Tier::Upcoming => "Upcoming",
            Tier::Soon => "Migrating soon",
            Tier::Imminent => "Migration imminent",
        }
    }

    /// Embed accent color (0xRRGGBB) for the webhook message.
    pub fn color(&self) -> u32 {
        match self {
            Tier::Scheduled => 0x95A5A6,
            Tier::Upcoming => 0xF1C40F,
            Tier::Soon => 0xE67E22,
            Tier::Imminent => 0xE74C3C,
        }
    }
}

/// Map minutes-remaining to a tier. Total on minutes >= 0; evaluated
/// tightest to loosest with inclusive upper edges.
pub fn classify(minutes: f64) -> Tier {
    if minutes <= 5.0 {
        Tier::Imminent
    } else if minutes <= 15.0 {
        Tier::Soon
    } else if minutes <= 30.0 {
        Tier::Upcoming
    } else {
        Tier::Scheduled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boundaries_inclusive() {
        assert_eq!(classify(5.0), Tier::Imminent);
        assert_eq!(classify(15.0), Tier::Soon);
        assert_eq!(classify(30.0), Tier::Upcoming);
        assert_eq!(classify(30.0001), Tier::Scheduled);
    }

    #[test]
    fn test_interior_values() {
        assert_eq!(classify(0.0), Tier::Imminent);
        assert_eq!(classify(4.0), Tier::Imminent);
        assert_eq!(classify(5.5), Tier::Soon);
        assert_eq!(classify(20.0), Tier::Upcoming);
        assert_eq!(classify(1440.0), Tier::Scheduled);
    }

    #[test]
    fn test_urgency_ordering() {
        assert!(Tier::Imminent > Tier::Soon);
        assert!(Tier::Soon > Tier::Upcoming);
        assert!(Tier::Upcoming > Tier::Scheduled);
    }
}
