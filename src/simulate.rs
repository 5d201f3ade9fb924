//! Simulated loaders for exercising a manifest without real resources.
//!
//! Simulation settings sit next to the manifest fields of each entry:
//!
//! ```yaml
//! resources:
//!   - name: charts
//!     priority: medium
//!     latency_ms: 120
//!   - name: reviews
//!     priority: low
//!     fail: true
//!     visible_after_ms: 300
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use tierload::domain::{Loader, loader};
use tierload::registry::{Manifest, Registry};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SimulationEntry {
    pub name: String,
    pub latency_ms: u64,
    pub fail: bool,
    /// Region scrolls into view this long after startup
    pub visible_after_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct SimulationFile {
    #[serde(default)]
    resources: Vec<SimulationEntry>,
}

/// Value produced by a simulated loader.
#[derive(Debug, Clone, Serialize)]
pub struct SimulatedValue {
    pub name: String,
    pub loaded_at: DateTime<Utc>,
}

/// A manifest plus per-entry simulation settings.
pub struct Simulation {
    pub registry: Registry,
    pub entries: HashMap<String, SimulationEntry>,
}

impl Simulation {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).context(format!("Failed to read manifest {}", path.display()))?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let manifest = Manifest::from_yaml(content).context("Failed to parse manifest")?;
        let file: SimulationFile = serde_yaml::from_str(content).context("Failed to parse simulation settings")?;
        let entries: HashMap<String, SimulationEntry> =
            file.resources.into_iter().map(|e| (e.name.clone(), e)).collect();

        let registry = manifest
            .into_registry(|entry| {
                let settings = entries.get(&entry.name).cloned().unwrap_or_default();
                simulated_loader(entry.name.clone(), settings)
            })
            .context("Failed to build registry")?;

        Ok(Self { registry, entries })
    }

    /// Entries that load when their region becomes visible.
    pub fn visible_after(&self) -> Vec<(String, Duration)> {
        let mut out: Vec<_> = self
            .entries
            .values()
            .filter_map(|e| e.visible_after_ms.map(|ms| (e.name.clone(), Duration::from_millis(ms))))
            .collect();
        out.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        out
    }
}

fn simulated_loader(name: String, settings: SimulationEntry) -> Loader {
    let latency = Duration::from_millis(settings.latency_ms);
    let fail = settings.fail;
    loader(move || {
        let name = name.clone();
        async move {
            tokio::time::sleep(latency).await;
            if fail {
                return Err(format!("simulated failure loading {}", name));
            }
            Ok(SimulatedValue {
                name,
                loaded_at: Utc::now(),
            })
        }
    })
}
