use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tierload::domain::Breakpoints;
use tierload::scheduler::SchedulerConfig;
use tierload::visibility::VisibilityOptions;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Resource manifest used when no --manifest is given
    pub manifest: Option<PathBuf>,
    pub breakpoints: Breakpoints,
    pub scheduler: SchedulerConfig,
    pub visibility: VisibilityOptions,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            manifest: None,
            breakpoints: Breakpoints::default(),
            scheduler: SchedulerConfig::default(),
            visibility: VisibilityOptions::default(),
        }
    }
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try primary location: ~/.config/<project>/<project>.yml
        let project_name = env!("CARGO_PKG_NAME");
        if let Some(config_dir) = dirs::config_dir() {
            let primary_config = config_dir.join(project_name).join(format!("{}.yml", project_name));
            if primary_config.exists() {
                match Self::load_from_file(&primary_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from {}: {}", primary_config.display(), e);
                    }
                }
            }
        }

        // Try fallback location: ./<project>.yml
        let fallback_config = PathBuf::from(format!("{}.yml", project_name));
        if fallback_config.exists() {
            match Self::load_from_file(&fallback_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!("Failed to load config from {}: {}", fallback_config.display(), e);
                }
            }
        }

        // No config file found, use defaults
        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        config.validate()?;

        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Reject values the scheduler cannot run with
    pub fn validate(&self) -> Result<()> {
        self.breakpoints.validate()?;
        self.scheduler.validate()?;
        self.visibility.validate()?;
        Ok(())
    }

    /// Manifest to use: the explicit path wins over the configured one
    pub fn manifest_path(&self, explicit: Option<&PathBuf>) -> Result<PathBuf> {
        explicit
            .or(self.manifest.as_ref())
            .cloned()
            .ok_or_else(|| eyre::eyre!("No manifest given; pass --manifest or set `manifest` in the config file"))
    }
}
