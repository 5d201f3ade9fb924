//! Load state of a single resource

use serde::{Deserialize, Serialize};

/// Lifecycle of a resource inside the load cache.
///
/// `Unloaded -> Loading -> {Loaded, Failed}`. A failed resource only moves
/// back to `Loading` through an explicit retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadState {
    /// Never requested
    Unloaded,
    /// Loader invoked, outcome pending
    Loading,
    /// Loader resolved, value cached
    Loaded,
    /// Loader rejected, error recorded
    Failed,
}

impl LoadState {
    /// Returns true if the current attempt has settled
    pub fn is_settled(&self) -> bool {
        matches!(self, LoadState::Loaded | LoadState::Failed)
    }

    /// Returns true if a request will not start a new loader call
    pub fn is_requested(&self) -> bool {
        matches!(self, LoadState::Loading | LoadState::Loaded)
    }
}
