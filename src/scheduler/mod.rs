//! Scheduler module for tiered resource loading.
//!
//! This module provides:
//! - **Selection**: Picks the resources relevant to a device class, tier by tier,
//!   and orders them by dependency.
//! - **Idle queue**: Background batches processed one at a time, yielding to the
//!   host between batches.
//! - **Scheduler**: Orchestrates eager loading, background loading, on-demand
//!   requests and device-class changes on top of the load cache.
//!
//! # Architecture
//!
//! 1. `initialize(device)` selects critical and high tier resources and loads
//!    them in dependency order, critical first
//! 2. Medium and low tier resources are queued as idle batches
//! 3. The idle worker waits for the host to go idle, lets any eager or
//!    on-demand load finish, then loads the next batch
//! 4. `request_now(name)` loads any resource immediately, bypassing tiers and
//!    device filtering
//!
//! # Example
//!
//! ```ignore
//! use tierload::scheduler::Scheduler;
//!
//! let scheduler = Scheduler::new(registry);
//! let report = scheduler.initialize(DeviceClass::Mobile).await;
//! let worker = scheduler.spawn_idle_worker();
//!
//! let charts = scheduler.request_now("charts").await?;
//! ```

mod config;
mod idle;
mod manager;
mod report;
mod select;

pub use config::SchedulerConfig;
pub use idle::{IdleBatch, IdleQueue, IdleSignal, ManualIdle, TimerIdle};
pub use manager::{IdleWorker, Scheduler};
pub use report::{BatchReport, LoadFailure, PhaseReport};
pub use select::{LoadPlan, TierPlan, plan};
