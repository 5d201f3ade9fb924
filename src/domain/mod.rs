//! Domain types for tierload
//!
//! This module contains the core domain types:
//! - Priority: The four scheduling tiers (critical > high > medium > low)
//! - DeviceClass / NetworkQuality: Coarse client capability buckets
//! - ResourceDescriptor: Static description of one lazily-loadable resource
//! - LoadState: Lifecycle of a resource inside the load cache

pub mod descriptor;
pub mod device;
pub mod priority;
pub mod state;

pub use descriptor::{LoadedResource, Loader, LoaderError, LoaderFuture, ResourceDescriptor, loader};
pub use device::{Breakpoints, DeviceClass, NetworkQuality};
pub use priority::Priority;
pub use state::LoadState;
