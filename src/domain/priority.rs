//! Priority tiers
//!
//! Tiers decide between eager loading (critical, high) and background
//! idle-time loading (medium, low).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::TierloadError;

/// Scheduling tier of a resource.
///
/// Variants are declared lowest first so the derived `Ord` gives
/// `Critical > High > Medium > Low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    /// Eager tiers, in issue order.
    pub const EAGER: [Priority; 2] = [Priority::Critical, Priority::High];

    /// Background tiers, in issue order.
    pub const BACKGROUND: [Priority; 2] = [Priority::Medium, Priority::Low];

    /// Returns true if resources of this tier load in Phase 1
    pub fn is_eager(&self) -> bool {
        matches!(self, Priority::Critical | Priority::High)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Critical => "critical",
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = TierloadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "critical" => Ok(Priority::Critical),
            "high" => Ok(Priority::High),
            "medium" => Ok(Priority::Medium),
            "low" => Ok(Priority::Low),
            other => Err(TierloadError::InvalidConfig(format!("unknown priority: {}", other))),
        }
    }
}
