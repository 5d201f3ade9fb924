//! Load deduplication and caching
//!
//! The cache owns the per-name load state. It guarantees at most one loader
//! call per attempt: concurrent requesters of a `Loading` resource share the
//! in-flight outcome, and later requesters get the recorded outcome.
//!
//! A failed resource stays failed. `request` hands back the recorded error
//! without calling the loader again; only `retry` starts a new attempt.

use std::collections::{BTreeSet, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};

use crate::domain::{LoadState, LoadedResource, LoaderError, ResourceDescriptor};
use crate::error::{Result, TierloadError};
use crate::registry::Registry;

/// Future handed to requesters of a resource.
pub type LoadFuture = BoxFuture<'static, Result<LoadedResource>>;

type SharedLoad = Shared<LoadFuture>;

enum Slot {
    Loading { attempt: u32, load: SharedLoad },
    Loaded { attempt: u32, value: LoadedResource, loaded_at: DateTime<Utc> },
    Failed { attempt: u32, error: TierloadError },
}

impl Slot {
    fn state(&self) -> LoadState {
        match self {
            Slot::Loading { .. } => LoadState::Loading,
            Slot::Loaded { .. } => LoadState::Loaded,
            Slot::Failed { .. } => LoadState::Failed,
        }
    }

    fn attempt(&self) -> u32 {
        match self {
            Slot::Loading { attempt, .. } | Slot::Loaded { attempt, .. } | Slot::Failed { attempt, .. } => *attempt,
        }
    }
}

/// Per-name load state table with single-flight loading.
///
/// Cheap to clone; clones share the same table.
#[derive(Clone)]
pub struct LoadCache {
    registry: Arc<Registry>,
    slots: Arc<Mutex<HashMap<String, Slot>>>,
}

impl LoadCache {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            slots: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Request a resource.
    ///
    /// - `Loaded`: resolves immediately with the cached value.
    /// - `Loading`: resolves with the outcome of the in-flight attempt.
    /// - `Unloaded`: starts an attempt, calling the loader exactly once.
    /// - `Failed`: resolves with the recorded error.
    ///
    /// Dependencies are not consulted here; ordering is the scheduler's job.
    pub fn request(&self, name: &str) -> LoadFuture {
        self.request_inner(name, false)
    }

    /// Start a new attempt for a failed resource.
    ///
    /// Behaves like `request` for resources that are not `Failed`.
    pub fn retry(&self, name: &str) -> LoadFuture {
        self.request_inner(name, true)
    }

    fn request_inner(&self, name: &str, retry_failed: bool) -> LoadFuture {
        let descriptor = match self.registry.get(name) {
            Ok(d) => Arc::clone(d),
            Err(e) => return futures::future::ready(Err(e)).boxed(),
        };

        let mut slots = self.lock();
        let attempt = match slots.get(name) {
            Some(Slot::Loaded { value, .. }) => {
                return futures::future::ready(Ok(value.clone())).boxed();
            }
            Some(Slot::Loading { load, .. }) => return load.clone().boxed(),
            Some(Slot::Failed { error, attempt }) => {
                if !retry_failed {
                    return futures::future::ready(Err(error.clone())).boxed();
                }
                tracing::info!(name = %name, attempt = attempt + 1, "Retrying failed resource");
                attempt + 1
            }
            None => 1,
        };

        let load = self.start_attempt(descriptor, attempt);
        slots.insert(
            name.to_string(),
            Slot::Loading {
                attempt,
                load: load.clone(),
            },
        );
        drop(slots);

        // Drive the attempt on the runtime so it completes even if every
        // requester stops awaiting.
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(load.clone());
        }

        load.boxed()
    }

    fn start_attempt(&self, descriptor: Arc<ResourceDescriptor>, attempt: u32) -> SharedLoad {
        let cache = self.clone();
        async move {
            tracing::debug!(name = %descriptor.name, attempt, "Invoking loader");
            let outcome = match Self::invoke(&descriptor).await {
                Some(result) => result.map_err(|e| TierloadError::LoaderFailure {
                    name: descriptor.name.clone(),
                    message: e.to_string(),
                }),
                None => {
                    tracing::error!(name = %descriptor.name, attempt, "Loader panicked");
                    Err(TierloadError::LoaderFailure {
                        name: descriptor.name.clone(),
                        message: "loader panicked".to_string(),
                    })
                }
            };
            cache.settle(&descriptor.name, attempt, &outcome);
            outcome
        }
        .boxed()
        .shared()
    }

    /// Run the loader, returning None if it panicked.
    ///
    /// The shared future must always resolve, panics included.
    async fn invoke(descriptor: &ResourceDescriptor) -> Option<std::result::Result<LoadedResource, LoaderError>> {
        let call = std::panic::catch_unwind(AssertUnwindSafe(|| (descriptor.loader)())).ok()?;
        AssertUnwindSafe(call).catch_unwind().await.ok()
    }

    fn settle(&self, name: &str, attempt: u32, outcome: &Result<LoadedResource>) {
        let mut slots = self.lock();
        if slots.get(name).map(Slot::attempt) != Some(attempt) {
            return;
        }
        let slot = match outcome {
            Ok(value) => {
                tracing::info!(name = %name, attempt, "Resource loaded");
                Slot::Loaded {
                    attempt,
                    value: value.clone(),
                    loaded_at: Utc::now(),
                }
            }
            Err(error) => {
                tracing::warn!(name = %name, attempt, error = %error, "Resource failed to load");
                Slot::Failed {
                    attempt,
                    error: error.clone(),
                }
            }
        };
        slots.insert(name.to_string(), slot);
    }

    /// Current state of a resource (`Unloaded` if never requested).
    pub fn state(&self, name: &str) -> LoadState {
        self.lock()
            .get(name)
            .map(Slot::state)
            .unwrap_or(LoadState::Unloaded)
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.state(name) == LoadState::Loaded
    }

    /// Cached value, if the resource is loaded.
    pub fn value(&self, name: &str) -> Option<LoadedResource> {
        match self.lock().get(name) {
            Some(Slot::Loaded { value, .. }) => Some(value.clone()),
            _ => None,
        }
    }

    /// Recorded error, if the resource failed.
    pub fn error(&self, name: &str) -> Option<TierloadError> {
        match self.lock().get(name) {
            Some(Slot::Failed { error, .. }) => Some(error.clone()),
            _ => None,
        }
    }

    /// When the resource finished loading.
    pub fn loaded_at(&self, name: &str) -> Option<DateTime<Utc>> {
        match self.lock().get(name) {
            Some(Slot::Loaded { loaded_at, .. }) => Some(*loaded_at),
            _ => None,
        }
    }

    /// Number of attempts started for a resource.
    pub fn attempts(&self, name: &str) -> u32 {
        self.lock().get(name).map(Slot::attempt).unwrap_or(0)
    }

    pub fn loaded_names(&self) -> BTreeSet<String> {
        self.names_in(LoadState::Loaded)
    }

    pub fn failed_names(&self) -> BTreeSet<String> {
        self.names_in(LoadState::Failed)
    }

    fn names_in(&self, state: LoadState) -> BTreeSet<String> {
        self.lock()
            .iter()
            .filter(|(_, slot)| slot.state() == state)
            .map(|(name, _)| name.clone())
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Priority, loader};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::oneshot;

    fn counting(name: &str, calls: Arc<AtomicUsize>) -> ResourceDescriptor {
        let tag = name.to_string();
        ResourceDescriptor::new(
            name,
            Priority::High,
            loader(move || {
                let calls = calls.clone();
                let tag = tag.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::task::yield_now().await;
                    Ok::<_, std::io::Error>(tag)
                }
            }),
        )
    }

    fn failing(name: &str, calls: Arc<AtomicUsize>) -> ResourceDescriptor {
        ResourceDescriptor::new(
            name,
            Priority::High,
            loader(move || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(std::io::Error::other("offline"))
                }
            }),
        )
    }

    fn cache_of(descs: Vec<ResourceDescriptor>) -> LoadCache {
        LoadCache::new(Arc::new(Registry::from_descriptors(descs).unwrap()))
    }

    #[tokio::test]
    async fn test_concurrent_requests_share_one_loader_call() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = cache_of(vec![counting("charts", calls.clone())]);

        let (a, b, c) = futures::join!(cache.request("charts"), cache.request("charts"), cache.request("charts"));

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let (a, b, c) = (a.unwrap(), b.unwrap(), c.unwrap());
        assert!(a.ptr_eq(&b));
        assert!(b.ptr_eq(&c));
        assert_eq!(a.downcast_ref::<String>().unwrap(), "charts");
    }

    #[tokio::test]
    async fn test_loaded_returns_cached_value() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = cache_of(vec![counting("charts", calls.clone())]);

        let first = cache.request("charts").await.unwrap();
        for _ in 0..5 {
            let again = cache.request("charts").await.unwrap();
            assert!(again.ptr_eq(&first));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.attempts("charts"), 1);
        assert!(cache.loaded_at("charts").is_some());
    }

    #[tokio::test]
    async fn test_state_transitions() {
        let (tx, rx) = oneshot::channel::<()>();
        let rx = Arc::new(Mutex::new(Some(rx)));
        let desc = ResourceDescriptor::new(
            "gated",
            Priority::Low,
            loader(move || {
                let rx = rx.lock().unwrap().take();
                async move {
                    if let Some(rx) = rx {
                        let _ = rx.await;
                    }
                    Ok::<_, std::io::Error>(7u8)
                }
            }),
        );
        let cache = cache_of(vec![desc]);

        assert_eq!(cache.state("gated"), LoadState::Unloaded);
        let pending = cache.request("gated");
        assert_eq!(cache.state("gated"), LoadState::Loading);

        tx.send(()).unwrap();
        let value = pending.await.unwrap();
        assert_eq!(value.downcast_ref::<u8>(), Some(&7));
        assert_eq!(cache.state("gated"), LoadState::Loaded);
        assert_eq!(cache.loaded_names(), BTreeSet::from(["gated".to_string()]));
    }

    #[tokio::test]
    async fn test_attempt_completes_without_awaiting_requester() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = cache_of(vec![counting("bg", calls.clone())]);

        drop(cache.request("bg"));
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(cache.is_loaded("bg"));
    }

    #[tokio::test]
    async fn test_failure_is_shared_and_terminal() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = cache_of(vec![failing("x", calls.clone())]);

        let (a, b) = futures::join!(cache.request("x"), cache.request("x"));
        let expected = TierloadError::LoaderFailure {
            name: "x".to_string(),
            message: "offline".to_string(),
        };
        assert_eq!(a.unwrap_err(), expected);
        assert_eq!(b.unwrap_err(), expected);
        assert_eq!(cache.state("x"), LoadState::Failed);

        // No auto-retry: the recorded failure is returned as-is
        assert_eq!(cache.request("x").await.unwrap_err(), expected);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.error("x"), Some(expected));
        assert_eq!(cache.failed_names(), BTreeSet::from(["x".to_string()]));
    }

    #[tokio::test]
    async fn test_retry_starts_new_attempt() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = cache_of(vec![failing("x", calls.clone())]);

        assert!(cache.request("x").await.is_err());
        assert!(cache.retry("x").await.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.attempts("x"), 2);
    }

    #[tokio::test]
    async fn test_retry_on_loaded_is_a_cache_hit() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = cache_of(vec![counting("ok", calls.clone())]);

        cache.request("ok").await.unwrap();
        cache.retry("ok").await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_panicking_loader_is_recorded_as_failed() {
        let calls = Arc::new(AtomicUsize::new(0));
        let desc = {
            let calls = calls.clone();
            ResourceDescriptor::new(
                "boom",
                Priority::High,
                loader(move || {
                    let attempt = calls.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if attempt == 0 {
                            panic!("loader exploded");
                        }
                        Ok::<_, std::io::Error>(attempt)
                    }
                }),
            )
        };
        let cache = cache_of(vec![desc]);

        let expected = TierloadError::LoaderFailure {
            name: "boom".to_string(),
            message: "loader panicked".to_string(),
        };
        assert_eq!(cache.request("boom").await.unwrap_err(), expected);
        assert_eq!(cache.state("boom"), LoadState::Failed);
        assert_eq!(cache.request("boom").await.unwrap_err(), expected);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let value = cache.retry("boom").await.unwrap();
        assert_eq!(value.downcast_ref::<usize>(), Some(&1));
        assert_eq!(cache.state("boom"), LoadState::Loaded);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_loader_panicking_before_future_is_recorded_as_failed() {
        let desc = ResourceDescriptor::new("eager-boom", Priority::High, Arc::new(|| -> crate::domain::LoaderFuture {
            panic!("constructor exploded")
        }));
        let cache = cache_of(vec![desc]);

        assert!(matches!(
            cache.request("eager-boom").await,
            Err(TierloadError::LoaderFailure { .. })
        ));
        assert_eq!(cache.state("eager-boom"), LoadState::Failed);
    }

    #[tokio::test]
    async fn test_unknown_resource() {
        let cache = cache_of(vec![]);
        assert_eq!(
            cache.request("ghost").await.unwrap_err(),
            TierloadError::UnknownResource("ghost".to_string())
        );
        assert_eq!(cache.state("ghost"), LoadState::Unloaded);
    }
}
