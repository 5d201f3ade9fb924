//! Dependency resolution
//!
//! Computes the load order for a resource: its transitive dependencies first,
//! each name exactly once, the requested name last. Cycles are detected on the
//! current resolution path and rejected instead of looped over.

use std::collections::HashSet;

use crate::error::{Result, TierloadError};
use crate::registry::Registry;

/// Resolves dependency closures against a registry.
#[derive(Debug, Clone, Copy)]
pub struct DependencyResolver<'a> {
    registry: &'a Registry,
}

/// Merged resolution of several roots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// Every name to load, dependencies first, in first-seen order
    pub order: Vec<String>,
    /// Roots that resolved cleanly
    pub roots: Vec<String>,
    /// Roots that failed to resolve, with the reason
    pub rejected: Vec<(String, TierloadError)>,
}

impl<'a> DependencyResolver<'a> {
    pub fn new(registry: &'a Registry) -> Self {
        Self { registry }
    }

    /// Ordered dependency closure of `name`, ending with `name` itself.
    pub fn resolve(&self, name: &str) -> Result<Vec<String>> {
        let mut order = Vec::new();
        let mut done = HashSet::new();
        let mut path = Vec::new();
        self.visit(name, &mut path, &mut done, &mut order)?;
        Ok(order)
    }

    /// Resolve several roots and merge their closures preserving first-seen order.
    ///
    /// A root that fails to resolve contributes nothing to `order`; the others
    /// are unaffected.
    pub fn resolve_many<I, S>(&self, names: I) -> Resolution
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut resolution = Resolution::default();
        let mut seen = HashSet::new();

        for name in names {
            let name = name.as_ref();
            match self.resolve(name) {
                Ok(closure) => {
                    for item in closure {
                        if seen.insert(item.clone()) {
                            resolution.order.push(item);
                        }
                    }
                    resolution.roots.push(name.to_string());
                }
                Err(e) => resolution.rejected.push((name.to_string(), e)),
            }
        }

        resolution
    }

    fn visit(
        &self,
        name: &str,
        path: &mut Vec<String>,
        done: &mut HashSet<String>,
        order: &mut Vec<String>,
    ) -> Result<()> {
        if done.contains(name) {
            return Ok(());
        }

        if let Some(start) = path.iter().position(|p| p == name) {
            let mut cycle = path[start..].to_vec();
            cycle.push(name.to_string());
            return Err(TierloadError::CyclicDependency(cycle));
        }

        let descriptor = self.registry.get(name)?;

        path.push(name.to_string());
        for dependency in &descriptor.dependencies {
            self.visit(dependency, path, done, order)?;
        }
        path.pop();

        done.insert(name.to_string());
        order.push(name.to_string());
        Ok(())
    }
}
