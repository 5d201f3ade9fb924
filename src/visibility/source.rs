//! Intersection sources
//!
//! The scheduler never talks to a viewport directly. Hosts provide an
//! [`IntersectionSource`] that turns "watch this region" into a stream of
//! visible fractions; dropping the stream ends the observation.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::StreamExt;
use futures::channel::mpsc;
use futures::stream::BoxStream;

use super::geometry::{Margin, Rect, intersection_ratio};

/// Identifier of an observed region.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RegionId(String);

impl RegionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RegionId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Platform primitive reporting how much of a region is visible.
pub trait IntersectionSource: Send + Sync {
    /// Start observing `region`.
    ///
    /// The stream yields the visible fraction (0.0 to 1.0) of the region
    /// within `margin` of the viewport every time it changes. Dropping the
    /// stream releases the observation.
    fn observe(&self, region: &RegionId, margin: Margin) -> BoxStream<'static, f64>;
}

struct Observer {
    region: RegionId,
    margin: Margin,
    tx: mpsc::UnboundedSender<f64>,
}

#[derive(Default)]
struct ManualState {
    viewport: Rect,
    bounds: HashMap<RegionId, Rect>,
    observers: Vec<Observer>,
}

impl ManualState {
    fn prune(&mut self) {
        self.observers.retain(|o| !o.tx.is_closed());
    }

    fn publish(&self, region: &RegionId) {
        let Some(bounds) = self.bounds.get(region).copied() else {
            return;
        };
        let viewport = self.viewport;
        for observer in self.observers.iter().filter(|o| &o.region == region) {
            let _ = observer
                .tx
                .unbounded_send(intersection_ratio(&bounds, &viewport, observer.margin));
        }
    }
}

/// Intersection source driven by the host (or a test).
///
/// Ratios are either computed from region and viewport rectangles, or pushed
/// raw with [`emit`](Self::emit). Cheap to clone; clones share state.
#[derive(Clone, Default)]
pub struct ManualIntersectionSource {
    state: Arc<Mutex<ManualState>>,
}

impl ManualIntersectionSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Source with a known viewport rectangle.
    pub fn with_viewport(viewport: Rect) -> Self {
        let source = Self::default();
        source.lock().viewport = viewport;
        source
    }

    /// Push a raw visible fraction to every observer of `region`.
    pub fn emit(&self, region: &RegionId, ratio: f64) {
        let mut state = self.lock();
        state.prune();
        for observer in state.observers.iter().filter(|o| &o.region == region) {
            let _ = observer.tx.unbounded_send(ratio);
        }
    }

    /// Move or resize a region and notify its observers.
    pub fn place(&self, region: &RegionId, bounds: Rect) {
        let mut state = self.lock();
        state.prune();
        state.bounds.insert(region.clone(), bounds);
        state.publish(region);
    }

    /// Scroll or resize the viewport and notify every placed region.
    pub fn set_viewport(&self, viewport: Rect) {
        let mut state = self.lock();
        state.prune();
        state.viewport = viewport;
        let regions: Vec<RegionId> = state.bounds.keys().cloned().collect();
        for region in &regions {
            state.publish(region);
        }
    }

    /// Number of live observations of `region`.
    pub fn active_observers(&self, region: &RegionId) -> usize {
        let mut state = self.lock();
        state.prune();
        state.observers.iter().filter(|o| &o.region == region).count()
    }

    fn lock(&self) -> MutexGuard<'_, ManualState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl IntersectionSource for ManualIntersectionSource {
    fn observe(&self, region: &RegionId, margin: Margin) -> BoxStream<'static, f64> {
        let (tx, rx) = mpsc::unbounded();
        let mut state = self.lock();
        state.prune();

        // Initial report, as platform observers do on registration
        if let Some(bounds) = state.bounds.get(region) {
            let _ = tx.unbounded_send(intersection_ratio(bounds, &state.viewport, margin));
        }

        state.observers.push(Observer {
            region: region.clone(),
            margin,
            tx,
        });
        rx.boxed()
    }
}
