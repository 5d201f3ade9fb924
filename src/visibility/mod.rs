//! Visibility triggers
//!
//! A visibility trigger watches one region and reports a single boolean,
//! "should load", once the region becomes relevant. The platform primitive
//! that reports intersection changes is abstracted behind
//! [`IntersectionSource`], so the trigger logic runs the same against a real
//! viewport or a fake one in tests.

mod geometry;
mod source;
mod trigger;

pub use geometry::{Margin, Rect, intersection_ratio};
pub use source::{IntersectionSource, ManualIntersectionSource, RegionId};
pub use trigger::{VisibilityHandle, VisibilityOptions, VisibilityTrigger};
