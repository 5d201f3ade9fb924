//! Scheduler orchestrating eager, background and on-demand loading.
//!
//! The Scheduler:
//! 1. Runs a selection pass on startup and on every device-class change
//! 2. Loads the eager tiers in dependency order, critical before high
//! 3. Queues background batches and hands them to the idle worker
//! 4. Serves on-demand requests, which always run ahead of idle batches

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use futures::FutureExt;
use futures::future::{BoxFuture, join_all};
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;

use super::config::SchedulerConfig;
use super::idle::{IdleBatch, IdleQueue, IdleSignal, TimerIdle};
use super::report::{BatchReport, LoadFailure, PhaseReport};
use super::select;
use crate::cache::LoadCache;
use crate::domain::{DeviceClass, LoadState, LoadedResource, NetworkQuality};
use crate::error::{Result, TierloadError};
use crate::registry::Registry;
use crate::resolver::DependencyResolver;
use crate::visibility::VisibilityHandle;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct SchedulerInner {
    registry: Arc<Registry>,
    cache: LoadCache,
    config: SchedulerConfig,
    idle: Arc<dyn IdleSignal>,
    device: Mutex<Option<DeviceClass>>,
    network: Mutex<NetworkQuality>,
    queue: Mutex<IdleQueue>,
    /// Signalled when batches are queued
    queue_changed: Notify,
    /// Signalled when foreground work finishes or the network recovers
    foreground_changed: Notify,
    /// Eager passes and on-demand requests currently running
    foreground: AtomicUsize,
}

/// Requeues a popped batch unless it settled.
struct InFlightBatch<'a> {
    inner: &'a SchedulerInner,
    batch: Option<IdleBatch>,
}

impl Drop for InFlightBatch<'_> {
    fn drop(&mut self) {
        let Some(batch) = self.batch.take() else {
            return;
        };
        tracing::debug!(root = %batch.root, "Requeuing interrupted idle batch");
        if lock(&self.inner.queue).requeue(batch) {
            self.inner.queue_changed.notify_waiters();
        }
    }
}

/// Marks foreground work for the lifetime of the guard.
struct ForegroundGuard<'a> {
    inner: &'a SchedulerInner,
}

impl<'a> ForegroundGuard<'a> {
    fn new(inner: &'a SchedulerInner) -> Self {
        inner.foreground.fetch_add(1, Ordering::SeqCst);
        Self { inner }
    }
}

impl Drop for ForegroundGuard<'_> {
    fn drop(&mut self) {
        self.inner.foreground.fetch_sub(1, Ordering::SeqCst);
        self.inner.foreground_changed.notify_waiters();
    }
}

/// Device-aware resource load scheduler.
///
/// Cheap to clone; clones are handles to the same scheduler.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

impl Scheduler {
    /// Create a scheduler over `registry` with default configuration.
    pub fn new(registry: Registry) -> Self {
        Self::with_config(registry, SchedulerConfig::default())
    }

    /// Create a scheduler using the fixed-delay idle fallback.
    pub fn with_config(registry: Registry, config: SchedulerConfig) -> Self {
        let idle = Arc::new(TimerIdle::new(config.idle_fallback_delay()));
        Self::with_idle_signal(registry, config, idle)
    }

    /// Create a scheduler driven by the host's idle signal.
    pub fn with_idle_signal(registry: Registry, config: SchedulerConfig, idle: Arc<dyn IdleSignal>) -> Self {
        let registry = Arc::new(registry);
        Self {
            inner: Arc::new(SchedulerInner {
                cache: LoadCache::new(registry.clone()),
                registry,
                config,
                idle,
                device: Mutex::new(None),
                network: Mutex::new(NetworkQuality::default()),
                queue: Mutex::new(IdleQueue::new()),
                queue_changed: Notify::new(),
                foreground_changed: Notify::new(),
                foreground: AtomicUsize::new(0),
            }),
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.inner.registry
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    /// Device class of the last selection pass.
    pub fn device_class(&self) -> Option<DeviceClass> {
        *lock(&self.inner.device)
    }

    /// Run the startup selection pass for `device`.
    ///
    /// Loads the critical tier, then the high tier, and queues the background
    /// tiers once both have settled.
    pub async fn initialize(&self, device: DeviceClass) -> PhaseReport {
        *lock(&self.inner.device) = Some(device);
        tracing::info!(device = %device, "Initializing scheduler");
        self.run_selection(device).await
    }

    /// Re-run selection after the device class changed.
    ///
    /// Returns None if `device` is the class already in effect. Resources
    /// already loaded or loading are never reloaded.
    pub async fn on_device_class_change(&self, device: DeviceClass) -> Option<PhaseReport> {
        {
            let mut current = lock(&self.inner.device);
            if *current == Some(device) {
                return None;
            }
            tracing::info!(from = ?*current, to = %device, "Device class changed");
            *current = Some(device);
        }
        Some(self.run_selection(device).await)
    }

    /// Follow a device classifier, re-running selection on every change.
    pub fn follow_device_class(&self, mut classes: watch::Receiver<DeviceClass>) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            loop {
                let device = *classes.borrow_and_update();
                this.on_device_class_change(device).await;
                if classes.changed().await.is_err() {
                    break;
                }
            }
        })
    }

    /// Load `name` and its dependencies now, ignoring tiers and device class.
    ///
    /// Runs ahead of any pending idle batch.
    pub async fn request_now(&self, name: &str) -> Result<LoadedResource> {
        let _guard = ForegroundGuard::new(&self.inner);
        self.check_resolves(name)?;
        self.load_tree(name.to_string(), false).await
    }

    /// Start a new attempt for `name`, retrying every failed resource in its
    /// dependency closure first.
    pub async fn retry(&self, name: &str) -> Result<LoadedResource> {
        let _guard = ForegroundGuard::new(&self.inner);
        self.check_resolves(name)?;
        self.load_tree(name.to_string(), true).await
    }

    /// Wait for a visibility trigger, then load `name` on demand.
    ///
    /// Returns None if the observation ended without triggering.
    pub async fn request_when_visible(&self, trigger: &VisibilityHandle, name: &str) -> Option<Result<LoadedResource>> {
        if !trigger.wait_triggered().await {
            tracing::debug!(name = %name, region = %trigger.region(), "Observation ended before trigger");
            return None;
        }
        Some(self.request_now(name).await)
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.inner.cache.is_loaded(name)
    }

    pub fn state(&self, name: &str) -> LoadState {
        self.inner.cache.state(name)
    }

    pub fn loaded_names(&self) -> BTreeSet<String> {
        self.inner.cache.loaded_names()
    }

    /// Cached value, if `name` is loaded. Never starts a load.
    pub fn value(&self, name: &str) -> Option<LoadedResource> {
        self.inner.cache.value(name)
    }

    /// Recorded error, if `name` failed.
    pub fn error(&self, name: &str) -> Option<TierloadError> {
        self.inner.cache.error(name)
    }

    pub fn loaded_at(&self, name: &str) -> Option<DateTime<Utc>> {
        self.inner.cache.loaded_at(name)
    }

    /// Number of loader attempts started for `name`.
    pub fn attempts(&self, name: &str) -> u32 {
        self.inner.cache.attempts(name)
    }

    /// Roots waiting on the idle queue, in processing order.
    pub fn pending_background(&self) -> Vec<String> {
        lock(&self.inner.queue).roots()
    }

    pub fn network_quality(&self) -> NetworkQuality {
        *lock(&self.inner.network)
    }

    /// Update network quality; a slow network can hold background batches.
    pub fn set_network_quality(&self, quality: NetworkQuality) {
        let previous = std::mem::replace(&mut *lock(&self.inner.network), quality);
        if previous != quality {
            tracing::info!(quality = ?quality, "Network quality changed");
            self.inner.foreground_changed.notify_waiters();
        }
    }

    /// Load the next queued batch immediately, without waiting for idle time.
    ///
    /// If the returned future is dropped before the batch settles, the batch
    /// goes back to the front of the queue.
    pub async fn process_next_idle_batch(&self) -> Option<BatchReport> {
        let batch = lock(&self.inner.queue).pop()?;
        let mut in_flight = InFlightBatch {
            inner: &self.inner,
            batch: Some(batch.clone()),
        };
        let report = self.load_batch(batch).await;
        in_flight.batch = None;
        Some(report)
    }

    /// Load every queued batch, in order.
    pub async fn drain_idle_queue(&self) -> Vec<BatchReport> {
        let mut reports = Vec::new();
        while let Some(report) = self.process_next_idle_batch().await {
            reports.push(report);
        }
        reports
    }

    /// Spawn the background worker that processes the idle queue.
    ///
    /// The worker stops when the returned handle is shut down or dropped.
    pub fn spawn_idle_worker(&self) -> IdleWorker {
        let (shutdown, mut stop) = watch::channel(false);
        let this = self.clone();
        let handle = tokio::spawn(async move {
            tracing::debug!("Idle worker started");
            loop {
                tokio::select! {
                    _ = stop.changed() => break,
                    _ = this.idle_step() => {}
                }
            }
            tracing::debug!("Idle worker stopped");
        });
        IdleWorker { handle, shutdown }
    }

    async fn idle_step(&self) {
        self.wait_for_queued().await;
        self.inner.idle.idle().await;
        self.wait_for_foreground().await;
        self.process_next_idle_batch().await;
    }

    async fn wait_for_queued(&self) {
        loop {
            let notified = self.inner.queue_changed.notified();
            if !lock(&self.inner.queue).is_empty() {
                return;
            }
            notified.await;
        }
    }

    async fn wait_for_foreground(&self) {
        loop {
            let notified = self.inner.foreground_changed.notified();
            if self.background_allowed() {
                return;
            }
            notified.await;
        }
    }

    fn background_allowed(&self) -> bool {
        if self.inner.foreground.load(Ordering::SeqCst) > 0 {
            return false;
        }
        !(self.inner.config.pause_background_on_slow_network && self.network_quality() == NetworkQuality::Slow)
    }

    async fn run_selection(&self, device: DeviceClass) -> PhaseReport {
        let plan = select::plan(&self.inner.registry, device);
        let mut report = PhaseReport::new(device);

        for rejected in &plan.rejected {
            tracing::error!(name = %rejected.name, error = %rejected.error, "Skipping misconfigured resource");
        }
        report.rejected = plan.rejected;

        {
            let _guard = ForegroundGuard::new(&self.inner);
            for tier in &plan.eager {
                tracing::debug!(tier = %tier.priority, order = ?tier.order, "Issuing eager tier");
                let loads = tier.order.iter().map(|name| self.load_tree(name.clone(), false));
                let outcomes = join_all(loads).await;

                for (name, outcome) in tier.order.iter().zip(outcomes) {
                    report.issued.push(name.clone());
                    match outcome {
                        Ok(_) => report.loaded.push(name.clone()),
                        Err(error) => {
                            tracing::warn!(name = %name, error = %error, "Eager load failed");
                            report.failed.push(LoadFailure::new(name.clone(), error));
                        }
                    }
                }
            }
        }

        report.queued = self.enqueue_background(device, plan.background);
        tracing::info!(
            device = %device,
            loaded = report.loaded.len(),
            failed = report.failed.len(),
            queued = report.queued.len(),
            "Eager phase settled"
        );
        report
    }

    fn enqueue_background(&self, device: DeviceClass, batches: Vec<IdleBatch>) -> Vec<String> {
        let mut queued = Vec::new();
        {
            let mut queue = lock(&self.inner.queue);
            let registry = &self.inner.registry;
            queue.retain(|batch| registry.lookup(&batch.root).is_some_and(|d| d.applies_to(device)));

            for batch in batches {
                if self.inner.cache.state(&batch.root) != LoadState::Unloaded {
                    continue;
                }
                let root = batch.root.clone();
                if queue.push(batch) {
                    queued.push(root);
                }
            }
        }
        if !queued.is_empty() {
            self.inner.queue_changed.notify_waiters();
        }
        queued
    }

    async fn load_batch(&self, batch: IdleBatch) -> BatchReport {
        tracing::debug!(root = %batch.root, order = ?batch.order, "Loading idle batch");
        let failure = match self.load_tree(batch.root.clone(), false).await {
            Ok(_) => None,
            Err(error) => {
                tracing::warn!(root = %batch.root, error = %error, "Background load failed");
                Some(LoadFailure::new(batch.root.clone(), error))
            }
        };
        BatchReport {
            root: batch.root,
            order: batch.order,
            failure,
        }
    }

    fn check_resolves(&self, name: &str) -> Result<()> {
        if let Err(error) = DependencyResolver::new(&self.inner.registry).resolve(name) {
            tracing::error!(name = %name, error = %error, "Rejected on-demand request");
            return Err(error);
        }
        Ok(())
    }

    /// Load `name` after all of its dependencies have loaded.
    ///
    /// Callers must have resolved `name` first; resolution rejects cycles, so
    /// the recursion terminates. Independent dependencies load concurrently.
    fn load_tree(&self, name: String, retry: bool) -> BoxFuture<'static, Result<LoadedResource>> {
        let this = self.clone();
        async move {
            let descriptor = Arc::clone(this.inner.registry.get(&name)?);
            if let Some(value) = this.inner.cache.value(&name) {
                return Ok(value);
            }

            let loads = descriptor
                .dependencies
                .iter()
                .map(|dependency| this.load_tree(dependency.clone(), retry));
            let outcomes = join_all(loads).await;

            for (dependency, outcome) in descriptor.dependencies.iter().zip(outcomes) {
                if let Err(source) = outcome {
                    return Err(TierloadError::DependencyFailed {
                        name,
                        dependency: dependency.clone(),
                        source: Box::new(source),
                    });
                }
            }

            if retry {
                this.inner.cache.retry(&name).await
            } else {
                this.inner.cache.request(&name).await
            }
        }
        .boxed()
    }
}

/// Handle to the background idle worker.
pub struct IdleWorker {
    handle: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

impl IdleWorker {
    /// Stop the worker and wait for it to exit.
    ///
    /// An interrupted batch is requeued at the front, so a later worker picks
    /// it up again. Loads it already started keep running in the cache.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.handle.await {
            tracing::error!(error = ?e, "Idle worker panicked");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}
