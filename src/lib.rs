//! Tierload - device-aware, priority-tiered resource load scheduler
//!
//! Tierload decides which lazily-loadable resources to load, when, and in what
//! order: critical and high priority resources eagerly on startup, medium and
//! low priority ones during idle time, and anything else on demand or when its
//! region scrolls into view. Dependencies always load first, and every
//! resource is loaded at most once.

pub mod cache;
pub mod domain;
pub mod error;
pub mod registry;
pub mod resolver;
pub mod scheduler;
pub mod visibility;

pub use cache::LoadCache;
pub use domain::{DeviceClass, LoadState, LoadedResource, Priority, ResourceDescriptor, loader};
pub use error::{Result, TierloadError};
pub use registry::Registry;
pub use scheduler::Scheduler;
