//! Registry manifests loaded from YAML
//!
//! A manifest carries everything about a resource except its loader, which
//! the host binds per entry when converting the manifest into a registry.
//!
//! ```yaml
//! resources:
//!   - name: shell
//!     priority: critical
//!   - name: charts
//!     priority: medium
//!     devices: [desktop, tablet]
//!     dependencies: [shell]
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::Registry;
use crate::domain::{DeviceClass, Loader, Priority, ResourceDescriptor};
use crate::error::{ManifestError, TierloadError};

fn all_devices() -> Vec<DeviceClass> {
    DeviceClass::ALL.to_vec()
}

/// One resource as written in a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub name: String,
    pub priority: Priority,
    #[serde(default = "all_devices")]
    pub devices: Vec<DeviceClass>,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

/// Manifest file structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub resources: Vec<ManifestEntry>,
}

impl Manifest {
    /// Load a manifest from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ManifestError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Load a manifest from a YAML string
    pub fn from_yaml(content: &str) -> Result<Self, ManifestError> {
        let manifest: Manifest = serde_yaml::from_str(content)?;
        for entry in &manifest.resources {
            if entry.devices.is_empty() {
                return Err(TierloadError::InvalidConfig(format!("resource {} lists no devices", entry.name)).into());
            }
        }
        Ok(manifest)
    }

    /// Build a registry, asking `bind` for the loader of each entry.
    pub fn into_registry<F>(self, mut bind: F) -> Result<Registry, ManifestError>
    where
        F: FnMut(&ManifestEntry) -> Loader,
    {
        let mut builder = Registry::builder();
        for entry in self.resources {
            let loader = bind(&entry);
            let mut descriptor =
                ResourceDescriptor::new(entry.name, entry.priority, loader).for_devices(entry.devices);
            for dependency in entry.dependencies {
                descriptor = descriptor.depends_on(dependency);
            }
            builder = builder.register(descriptor);
        }
        Ok(builder.build()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::loader;
    use tempfile::TempDir;

    const MANIFEST: &str = r#"
resources:
  - name: shell
    priority: critical
  - name: charts
    priority: medium
    devices: [desktop, tablet]
    dependencies: [shell]
"#;

    fn noop(_: &ManifestEntry) -> Loader {
        loader(|| async { Ok::<_, std::io::Error>(()) })
    }

    #[test]
    fn test_parse_manifest_defaults() {
        let manifest = Manifest::from_yaml(MANIFEST).unwrap();
        assert_eq!(manifest.resources.len(), 2);
        assert_eq!(manifest.resources[0].devices, DeviceClass::ALL.to_vec());
        assert!(manifest.resources[0].dependencies.is_empty());
        assert_eq!(manifest.resources[1].dependencies, vec!["shell".to_string()]);
    }

    #[test]
    fn test_into_registry_binds_every_entry() {
        let manifest = Manifest::from_yaml(MANIFEST).unwrap();
        let mut bound = Vec::new();
        let registry = manifest
            .into_registry(|entry| {
                bound.push(entry.name.clone());
                noop(entry)
            })
            .unwrap();

        assert_eq!(bound, vec!["shell".to_string(), "charts".to_string()]);
        let charts = registry.lookup("charts").unwrap();
        assert!(charts.applies_to(DeviceClass::Desktop));
        assert!(!charts.applies_to(DeviceClass::Mobile));
    }

    #[test]
    fn test_duplicate_entries_rejected() {
        let yaml = r#"
resources:
  - name: shell
    priority: critical
  - name: shell
    priority: low
"#;
        let manifest = Manifest::from_yaml(yaml).unwrap();
        let err = manifest.into_registry(noop).unwrap_err();
        assert!(matches!(
            err,
            ManifestError::Registry(TierloadError::DuplicateResource(ref name)) if name == "shell"
        ));
    }

    #[test]
    fn test_empty_devices_rejected() {
        let yaml = r#"
resources:
  - name: shell
    priority: critical
    devices: []
"#;
        assert!(matches!(
            Manifest::from_yaml(yaml),
            Err(ManifestError::Registry(TierloadError::InvalidConfig(_)))
        ));
    }

    #[test]
    fn test_unknown_priority_rejected() {
        let yaml = r#"
resources:
  - name: shell
    priority: urgent
"#;
        assert!(matches!(Manifest::from_yaml(yaml), Err(ManifestError::Yaml(_))));
    }

    #[test]
    fn test_from_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("resources.yml");
        std::fs::write(&path, MANIFEST).unwrap();

        let manifest = Manifest::from_file(&path).unwrap();
        assert_eq!(manifest.resources[0].name, "shell");

        let missing = Manifest::from_file(temp.path().join("missing.yml"));
        assert!(matches!(missing, Err(ManifestError::Io(_))));
    }
}
