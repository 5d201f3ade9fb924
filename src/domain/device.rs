//! Device classes and network quality
//!
//! Device classification itself lives outside the scheduler; this module only
//! defines the buckets and the width breakpoints hosts use to produce them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Result, TierloadError};

/// Coarse client capability bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    Mobile,
    Tablet,
    Desktop,
}

impl DeviceClass {
    pub const ALL: [DeviceClass; 3] = [DeviceClass::Mobile, DeviceClass::Tablet, DeviceClass::Desktop];

    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceClass::Mobile => "mobile",
            DeviceClass::Tablet => "tablet",
            DeviceClass::Desktop => "desktop",
        }
    }
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceClass {
    type Err = TierloadError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mobile" => Ok(DeviceClass::Mobile),
            "tablet" => Ok(DeviceClass::Tablet),
            "desktop" => Ok(DeviceClass::Desktop),
            other => Err(TierloadError::InvalidConfig(format!("unknown device class: {}", other))),
        }
    }
}

/// Network quality reported by the host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkQuality {
    #[default]
    Fast,
    Slow,
}

/// Viewport width breakpoints (inclusive upper bounds, in CSS pixels).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Breakpoints {
    pub mobile_max_width: u32,
    pub tablet_max_width: u32,
}

impl Default for Breakpoints {
    fn default() -> Self {
        Self {
            mobile_max_width: 767,
            tablet_max_width: 1023,
        }
    }
}

impl Breakpoints {
    /// Map a viewport width onto a device class.
    pub fn classify(&self, width: u32) -> DeviceClass {
        if width <= self.mobile_max_width {
            DeviceClass::Mobile
        } else if width <= self.tablet_max_width {
            DeviceClass::Tablet
        } else {
            DeviceClass::Desktop
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.mobile_max_width >= self.tablet_max_width {
            return Err(TierloadError::InvalidConfig(format!(
                "breakpoints.mobile_max_width ({}) must be < breakpoints.tablet_max_width ({})",
                self.mobile_max_width, self.tablet_max_width
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_default_breakpoints() {
        let bp = Breakpoints::default();
        assert_eq!(bp.classify(320), DeviceClass::Mobile);
        assert_eq!(bp.classify(767), DeviceClass::Mobile);
        assert_eq!(bp.classify(768), DeviceClass::Tablet);
        assert_eq!(bp.classify(1023), DeviceClass::Tablet);
        assert_eq!(bp.classify(1024), DeviceClass::Desktop);
    }

    #[test]
    fn test_breakpoints_validate() {
        assert!(Breakpoints::default().validate().is_ok());
        let bad = Breakpoints {
            mobile_max_width: 1000,
            tablet_max_width: 900,
        };
        assert!(matches!(bad.validate(), Err(TierloadError::InvalidConfig(_))));
    }

    #[test]
    fn test_parse_device_class() {
        assert_eq!("Desktop".parse::<DeviceClass>().unwrap(), DeviceClass::Desktop);
        assert!("watch".parse::<DeviceClass>().is_err());
    }

    #[test]
    fn test_network_quality_default_fast() {
        assert_eq!(NetworkQuality::default(), NetworkQuality::Fast);
    }
}
