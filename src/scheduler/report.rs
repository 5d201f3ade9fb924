//! Outcome reports for scheduling passes

use serde::{Serialize, Serializer};

use crate::domain::DeviceClass;
use crate::error::TierloadError;

fn serialize_error<S: Serializer>(error: &TierloadError, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(error)
}

/// A resource that could not be loaded (or was skipped as misconfigured).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadFailure {
    pub name: String,
    #[serde(serialize_with = "serialize_error")]
    pub error: TierloadError,
}

impl LoadFailure {
    pub fn new(name: impl Into<String>, error: TierloadError) -> Self {
        Self {
            name: name.into(),
            error,
        }
    }
}

/// Result of one selection pass (startup or device-class change).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseReport {
    pub device: DeviceClass,
    /// Names requested during the eager phase, in issue order
    pub issued: Vec<String>,
    pub loaded: Vec<String>,
    pub failed: Vec<LoadFailure>,
    /// Roots skipped because they failed to resolve
    pub rejected: Vec<LoadFailure>,
    /// Background batch roots added to the idle queue
    pub queued: Vec<String>,
}

impl PhaseReport {
    pub fn new(device: DeviceClass) -> Self {
        Self {
            device,
            issued: Vec::new(),
            loaded: Vec::new(),
            failed: Vec::new(),
            rejected: Vec::new(),
            queued: Vec::new(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.rejected.is_empty()
    }
}

/// Result of processing one idle batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub root: String,
    pub order: Vec<String>,
    pub failure: Option<LoadFailure>,
}

impl BatchReport {
    pub fn is_loaded(&self) -> bool {
        self.failure.is_none()
    }
}
