//! Resource selection for a device class.
//!
//! Selection decides what a scheduling pass will load and in which order:
//! - Eager tiers (critical, then high): every applicable root, resolved and
//!   merged in first-seen order, each name issued once across both tiers
//! - Background tiers (medium, then low): one idle batch per applicable root,
//!   registry order within a tier
//! - Roots that fail to resolve are rejected without affecting the rest

use std::collections::HashSet;

use serde::Serialize;

use super::idle::IdleBatch;
use super::report::LoadFailure;
use crate::domain::{DeviceClass, Priority};
use crate::registry::Registry;
use crate::resolver::DependencyResolver;

/// Eager work for one tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TierPlan {
    pub priority: Priority,
    /// Applicable roots of this tier that resolved cleanly
    pub roots: Vec<String>,
    /// Names to issue for this tier, dependencies first
    pub order: Vec<String>,
}

/// Everything a scheduling pass would do for one device class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadPlan {
    pub device: DeviceClass,
    pub eager: Vec<TierPlan>,
    pub background: Vec<IdleBatch>,
    pub rejected: Vec<LoadFailure>,
}

impl LoadPlan {
    /// All eager names in issue order.
    pub fn eager_order(&self) -> Vec<&str> {
        self.eager
            .iter()
            .flat_map(|tier| tier.order.iter().map(String::as_str))
            .collect()
    }
}

/// Build the load plan for `device`.
pub fn plan(registry: &Registry, device: DeviceClass) -> LoadPlan {
    let resolver = DependencyResolver::new(registry);
    let mut eager = Vec::new();
    let mut rejected = Vec::new();
    let mut issued = HashSet::new();

    for priority in Priority::EAGER {
        let roots: Vec<&str> = registry
            .select(device, priority)
            .map(|d| d.name.as_str())
            .collect();
        let resolution = resolver.resolve_many(roots);

        rejected.extend(
            resolution
                .rejected
                .into_iter()
                .map(|(name, error)| LoadFailure::new(name, error)),
        );

        let order = resolution
            .order
            .into_iter()
            .filter(|name| issued.insert(name.clone()))
            .collect();

        eager.push(TierPlan {
            priority,
            roots: resolution.roots,
            order,
        });
    }

    let mut background = Vec::new();
    for priority in Priority::BACKGROUND {
        for descriptor in registry.select(device, priority) {
            match resolver.resolve(&descriptor.name) {
                Ok(order) => background.push(IdleBatch {
                    root: descriptor.name.clone(),
                    priority,
                    order,
                }),
                Err(error) => rejected.push(LoadFailure::new(descriptor.name.clone(), error)),
            }
        }
    }

    LoadPlan {
        device,
        eager,
        background,
        rejected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ResourceDescriptor, loader};
    use crate::error::TierloadError;

    fn desc(name: &str, priority: Priority) -> ResourceDescriptor {
        ResourceDescriptor::new(name, priority, loader(|| async { Ok::<_, std::io::Error>(()) }))
    }

    #[test]
    fn test_plan_abc_scenario() {
        let registry = Registry::from_descriptors([
            desc("a", Priority::Critical),
            desc("b", Priority::High).depends_on("a"),
            desc("c", Priority::Low),
        ])
        .unwrap();

        let plan = plan(&registry, DeviceClass::Mobile);
        assert_eq!(plan.eager_order(), vec!["a", "b"]);
        assert_eq!(plan.eager[0].priority, Priority::Critical);
        assert_eq!(plan.eager[0].order, vec!["a".to_string()]);
        assert_eq!(plan.eager[1].order, vec!["b".to_string()]);
        assert_eq!(plan.background.len(), 1);
        assert_eq!(plan.background[0].root, "c");
        assert!(plan.rejected.is_empty());
    }

    #[test]
    fn test_plan_excludes_other_devices() {
        let registry = Registry::from_descriptors([
            desc("shell", Priority::Critical),
            desc("touch-nav", Priority::High).for_devices([DeviceClass::Mobile, DeviceClass::Tablet]),
            desc("hover-cards", Priority::Medium).for_devices([DeviceClass::Mobile]),
        ])
        .unwrap();

        let plan = plan(&registry, DeviceClass::Desktop);
        assert_eq!(plan.eager_order(), vec!["shell"]);
        assert!(plan.background.is_empty());
    }

    #[test]
    fn test_plan_background_tier_order() {
        let registry = Registry::from_descriptors([
            desc("low-1", Priority::Low),
            desc("medium-1", Priority::Medium),
            desc("low-2", Priority::Low),
            desc("medium-2", Priority::Medium),
        ])
        .unwrap();

        let plan = plan(&registry, DeviceClass::Tablet);
        let roots: Vec<&str> = plan.background.iter().map(|b| b.root.as_str()).collect();
        assert_eq!(roots, vec!["medium-1", "medium-2", "low-1", "low-2"]);
    }

    #[test]
    fn test_plan_dependency_pulled_from_other_tier_issued_once() {
        let registry = Registry::from_descriptors([
            desc("icons", Priority::Medium),
            desc("core", Priority::Critical).depends_on("icons"),
            desc("menu", Priority::High).depends_on("core"),
        ])
        .unwrap();

        let plan = plan(&registry, DeviceClass::Mobile);
        assert_eq!(plan.eager[0].order, vec!["icons".to_string(), "core".to_string()]);
        assert_eq!(plan.eager[1].order, vec!["menu".to_string()]);
        assert_eq!(plan.background[0].order, vec!["icons".to_string()]);
    }

    #[test]
    fn test_plan_rejects_misconfigured_roots() {
        let registry = Registry::from_descriptors([
            desc("a", Priority::Critical).depends_on("b"),
            desc("b", Priority::Critical).depends_on("a"),
            desc("ok", Priority::High),
            desc("dangling", Priority::Low).depends_on("ghost"),
        ])
        .unwrap();

        let plan = plan(&registry, DeviceClass::Mobile);
        assert_eq!(plan.eager_order(), vec!["ok"]);
        assert!(plan.background.is_empty());
        assert_eq!(plan.rejected.len(), 3);
        assert!(
            plan.rejected
                .iter()
                .any(|f| f.name == "dangling" && f.error == TierloadError::UnknownResource("ghost".to_string()))
        );
    }
}
