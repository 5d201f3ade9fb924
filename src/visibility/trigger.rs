//! Visibility trigger and its handle

use std::sync::Mutex;

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::geometry::Margin;
use super::source::{IntersectionSource, RegionId};
use crate::error::{Result, TierloadError};

/// How a region is observed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisibilityOptions {
    /// Visible fraction that counts as "in view"; 0.0 means any overlap
    pub threshold: f64,
    /// Margin around the viewport edge
    pub margin: Margin,
    /// Recompute on every change instead of latching the first trigger
    pub restartable: bool,
    /// Skip observation and report triggered immediately
    pub disabled: bool,
}

impl Default for VisibilityOptions {
    fn default() -> Self {
        Self {
            threshold: 0.1,
            margin: Margin::default(),
            restartable: false,
            disabled: false,
        }
    }
}

impl VisibilityOptions {
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_margin(mut self, margin: Margin) -> Self {
        self.margin = margin;
        self
    }

    pub fn restartable(mut self) -> Self {
        self.restartable = true;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.disabled = true;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(TierloadError::InvalidConfig(format!(
                "visibility.threshold must be within [0, 1], got {}",
                self.threshold
            )));
        }
        Ok(())
    }

    /// Whether a reported visible fraction satisfies the threshold.
    pub fn is_visible(&self, ratio: f64) -> bool {
        if self.threshold <= 0.0 {
            ratio > 0.0
        } else {
            ratio >= self.threshold
        }
    }
}

/// Entry point for observing regions.
pub struct VisibilityTrigger;

impl VisibilityTrigger {
    /// Observe `region` through `source`.
    ///
    /// Must be called inside a tokio runtime unless `options.disabled` is set.
    pub fn observe(source: &dyn IntersectionSource, region: RegionId, options: VisibilityOptions) -> VisibilityHandle {
        if options.disabled {
            let (_tx, rx) = watch::channel(true);
            return VisibilityHandle {
                region,
                state: rx,
                task: Mutex::new(None),
            };
        }

        let (tx, rx) = watch::channel(false);
        let mut stream = source.observe(&region, options.margin);
        let task_region = region.clone();

        let task = tokio::spawn(async move {
            while let Some(ratio) = stream.next().await {
                let visible = options.is_visible(ratio);
                let changed = tx.send_if_modified(|triggered| {
                    if *triggered == visible {
                        return false;
                    }
                    *triggered = visible;
                    true
                });
                if changed {
                    tracing::debug!(region = %task_region, visible, ratio, "Visibility changed");
                }
                if visible && !options.restartable {
                    break;
                }
            }
        });

        VisibilityHandle {
            region,
            state: rx,
            task: Mutex::new(Some(task)),
        }
    }
}

/// Live observation of one region.
///
/// Dropping the handle disposes it.
#[derive(Debug)]
pub struct VisibilityHandle {
    region: RegionId,
    state: watch::Receiver<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl VisibilityHandle {
    pub fn region(&self) -> &RegionId {
        &self.region
    }

    /// Current "should load" value.
    pub fn triggered(&self) -> bool {
        *self.state.borrow()
    }

    /// Receiver notified whenever `triggered` changes.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.state.clone()
    }

    /// Wait until the region triggers.
    ///
    /// Returns false if observation ended (disposed, or the source closed)
    /// without ever triggering.
    pub async fn wait_triggered(&self) -> bool {
        let mut rx = self.state.clone();
        rx.wait_for(|triggered| *triggered).await.is_ok()
    }

    /// True while the underlying observation is installed.
    pub fn is_observing(&self) -> bool {
        self.task
            .lock()
            .map(|task| task.as_ref().is_some_and(|t| !t.is_finished()))
            .unwrap_or(false)
    }

    /// Stop observing. Safe to call any number of times.
    ///
    /// A load already started because of an earlier trigger is not affected.
    pub fn dispose(&self) {
        let task = match self.task.lock() {
            Ok(mut task) => task.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(task) = task {
            tracing::debug!(region = %self.region, "Disposing visibility observation");
            task.abort();
        }
    }
}

impl Drop for VisibilityHandle {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::visibility::{ManualIntersectionSource, Rect};

    async fn settle() {
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
    }

    #[test]
    fn test_options_default() {
        let options = VisibilityOptions::default();
        assert_eq!(options.threshold, 0.1);
        assert!(!options.restartable);
        assert!(!options.disabled);
    }

    #[test]
    fn test_options_validate() {
        assert!(VisibilityOptions::default().validate().is_ok());
        assert!(VisibilityOptions::default().with_threshold(1.5).validate().is_err());
        assert!(VisibilityOptions::default().with_threshold(-0.1).validate().is_err());
    }

    #[test]
    fn test_is_visible_threshold() {
        let options = VisibilityOptions::default().with_threshold(0.1);
        assert!(!options.is_visible(0.05));
        assert!(options.is_visible(0.1));
        assert!(options.is_visible(0.8));

        let any = VisibilityOptions::default().with_threshold(0.0);
        assert!(!any.is_visible(0.0));
        assert!(any.is_visible(0.01));
    }

    #[test]
    fn test_disabled_triggers_immediately_without_observing() {
        let source = ManualIntersectionSource::new();
        let region = RegionId::from("hero");
        let handle = VisibilityTrigger::observe(&source, region.clone(), VisibilityOptions::default().disabled());

        assert!(handle.triggered());
        assert!(!handle.is_observing());
        assert_eq!(source.active_observers(&region), 0);
    }

    #[tokio::test]
    async fn test_non_restartable_latches_once() {
        let source = ManualIntersectionSource::new();
        let region = RegionId::from("reviews");
        let handle = VisibilityTrigger::observe(
            &source,
            region.clone(),
            VisibilityOptions::default().with_threshold(0.1),
        );
        let mut listener = handle.subscribe();
        assert!(!handle.triggered());

        source.emit(&region, 0.05);
        settle().await;
        assert!(!handle.triggered());
        assert!(!listener.has_changed().unwrap());

        source.emit(&region, 0.1);
        assert!(handle.wait_triggered().await);
        assert!(*listener.borrow_and_update());

        // Observation is released after the first trigger
        settle().await;
        assert_eq!(source.active_observers(&region), 0);
        assert!(!handle.is_observing());

        source.emit(&region, 0.0);
        settle().await;
        assert!(handle.triggered());
        assert!(!matches!(listener.has_changed(), Ok(true)));
    }

    #[tokio::test]
    async fn test_restartable_follows_changes() {
        let source = ManualIntersectionSource::new();
        let region = RegionId::from("carousel");
        let handle = VisibilityTrigger::observe(
            &source,
            region.clone(),
            VisibilityOptions::default().with_threshold(0.5).restartable(),
        );

        source.emit(&region, 0.75);
        assert!(handle.wait_triggered().await);

        source.emit(&region, 0.2);
        settle().await;
        assert!(!handle.triggered());
        assert!(handle.is_observing());

        source.emit(&region, 0.9);
        settle().await;
        assert!(handle.triggered());
    }

    #[tokio::test]
    async fn test_margin_is_forwarded_to_source() {
        let source = ManualIntersectionSource::with_viewport(Rect::new(0.0, 0.0, 400.0, 800.0));
        let region = RegionId::from("footer");
        source.place(&region, Rect::new(0.0, 850.0, 400.0, 100.0));

        let tight = VisibilityTrigger::observe(&source, region.clone(), VisibilityOptions::default());
        let loose = VisibilityTrigger::observe(
            &source,
            region.clone(),
            VisibilityOptions::default().with_margin(Margin::uniform(100.0)),
        );
        settle().await;

        assert!(!tight.triggered());
        assert!(loose.triggered());
    }

    #[tokio::test]
    async fn test_dispose_is_idempotent_and_stops_triggering() {
        let source = ManualIntersectionSource::new();
        let region = RegionId::from("hero");
        let handle = VisibilityTrigger::observe(&source, region.clone(), VisibilityOptions::default());
        assert!(handle.is_observing());

        handle.dispose();
        handle.dispose();
        settle().await;

        source.emit(&region, 1.0);
        settle().await;
        assert!(!handle.triggered());
        assert_eq!(source.active_observers(&region), 0);
        assert!(!handle.wait_triggered().await);
    }
}
