//! Load descriptor registry
//!
//! A read-only table of resource descriptors, keyed by name and kept in
//! registration order. Registration order matters: it is the order in which
//! the scheduler selects resources within a tier.

mod manifest;

pub use manifest::{Manifest, ManifestEntry};

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::{DeviceClass, Priority, ResourceDescriptor};
use crate::error::{Result, TierloadError};
use crate::resolver::DependencyResolver;

/// Immutable name → descriptor table.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    descriptors: Vec<Arc<ResourceDescriptor>>,
    index: HashMap<String, usize>,
}

impl Registry {
    /// Start building a registry.
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Build a registry from descriptors, failing on the first duplicate name.
    pub fn from_descriptors(descriptors: impl IntoIterator<Item = ResourceDescriptor>) -> Result<Self> {
        let mut builder = Self::builder();
        for descriptor in descriptors {
            builder = builder.register(descriptor);
        }
        builder.build()
    }

    /// Get a descriptor by name
    pub fn lookup(&self, name: &str) -> Option<&Arc<ResourceDescriptor>> {
        self.index.get(name).map(|&i| &self.descriptors[i])
    }

    /// Like `lookup`, but an unknown name is an error.
    pub fn get(&self, name: &str) -> Result<&Arc<ResourceDescriptor>> {
        self.lookup(name)
            .ok_or_else(|| TierloadError::UnknownResource(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// All descriptors in registration order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<ResourceDescriptor>> {
        self.descriptors.iter()
    }

    /// Descriptors of one tier that apply to a device class, in registration order.
    pub fn select(&self, device: DeviceClass, priority: Priority) -> impl Iterator<Item = &Arc<ResourceDescriptor>> {
        self.descriptors
            .iter()
            .filter(move |d| d.priority == priority && d.applies_to(device))
    }

    pub fn names(&self) -> Vec<&str> {
        self.descriptors.iter().map(|d| d.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Report every dangling dependency and dependency cycle.
    ///
    /// Neither is rejected at build time (they only fail the requests that hit
    /// them), so hosts call this from tests or at startup in debug builds.
    pub fn validate(&self) -> Vec<TierloadError> {
        let mut errors = Vec::new();

        for descriptor in &self.descriptors {
            for dependency in &descriptor.dependencies {
                if !self.contains(dependency) {
                    errors.push(TierloadError::UnknownResource(format!(
                        "{} (dependency of {})",
                        dependency, descriptor.name
                    )));
                }
            }
        }

        let resolver = DependencyResolver::new(self);
        let mut seen_cycles: Vec<Vec<String>> = Vec::new();
        for descriptor in &self.descriptors {
            if let Err(TierloadError::CyclicDependency(cycle)) = resolver.resolve(&descriptor.name) {
                let mut key = cycle.clone();
                key.pop();
                key.sort();
                if !seen_cycles.contains(&key) {
                    seen_cycles.push(key);
                    errors.push(TierloadError::CyclicDependency(cycle));
                }
            }
        }

        errors
    }
}

/// Collects descriptors, deferring duplicate detection to `build`.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    descriptors: Vec<ResourceDescriptor>,
}

impl RegistryBuilder {
    pub fn register(mut self, descriptor: ResourceDescriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    /// Freeze the registry. A repeated name is a configuration error.
    pub fn build(self) -> Result<Registry> {
        let mut registry = Registry::default();
        for descriptor in self.descriptors {
            if registry.index.contains_key(&descriptor.name) {
                return Err(TierloadError::DuplicateResource(descriptor.name));
            }
            registry
                .index
                .insert(descriptor.name.clone(), registry.descriptors.len());
            registry.descriptors.push(Arc::new(descriptor));
        }
        Ok(registry)
    }
}
