//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - plan: show what a scheduling pass would load for a device
//! - simulate: run the scheduler against simulated loaders
//! - validate: check a manifest for dangling dependencies and cycles

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tierload::domain::DeviceClass;

/// Tierload - device-aware, priority-tiered resource load scheduler
#[derive(Parser, Debug)]
#[command(name = "tierload")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Options shared by commands that target one device class
#[derive(Args, Debug, Clone)]
pub struct TargetArgs {
    /// Resource manifest (overrides the config file)
    #[arg(short, long)]
    pub manifest: Option<PathBuf>,

    /// Device class to schedule for (mobile, tablet, desktop)
    #[arg(short, long, conflicts_with = "width")]
    pub device: Option<DeviceClass>,

    /// Viewport width in pixels, classified with the configured breakpoints
    #[arg(short, long)]
    pub width: Option<u32>,

    /// Print machine-readable JSON
    #[arg(long)]
    pub json: bool,
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show the eager tiers and background batches for a device
    Plan {
        #[command(flatten)]
        target: TargetArgs,
    },

    /// Run a scheduling pass against simulated loaders
    Simulate {
        #[command(flatten)]
        target: TargetArgs,

        /// Load these resources on demand after the eager phase
        #[arg(short, long = "request")]
        requests: Vec<String>,

        /// Report a slow network, holding background batches until the end
        #[arg(long)]
        slow_network: bool,
    },

    /// Check a manifest for dangling dependencies and cycles
    Validate {
        /// Resource manifest (overrides the config file)
        #[arg(short, long)]
        manifest: Option<PathBuf>,

        /// Print machine-readable JSON
        #[arg(long)]
        json: bool,
    },
}
