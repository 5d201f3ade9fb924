//! Resource descriptors and the loader abstraction
//!
//! A descriptor is created once at startup and never mutated. The loader is an
//! opaque, caller-supplied function producing a future of the resource value;
//! the scheduler never looks inside either.

use std::any::Any;
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;

use super::device::DeviceClass;
use super::priority::Priority;

/// Error type loaders reject with.
pub type LoaderError = Box<dyn std::error::Error + Send + Sync>;

/// Future returned by a loader call.
pub type LoaderFuture = BoxFuture<'static, Result<LoadedResource, LoaderError>>;

/// No-argument function producing a loader future.
pub type Loader = Arc<dyn Fn() -> LoaderFuture + Send + Sync>;

/// Adapt a plain async closure into a [`Loader`].
///
/// ```ignore
/// let charts = loader(|| async { Ok::<_, std::io::Error>(ChartModule::new()) });
/// ```
pub fn loader<F, Fut, T, E>(f: F) -> Loader
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Any + Send + Sync,
    E: Into<LoaderError>,
{
    Arc::new(move || {
        f().map(|outcome| {
            outcome
                .map(LoadedResource::new)
                .map_err(|e| -> LoaderError { e.into() })
        })
        .boxed()
    })
}

/// Opaque value produced by a loader.
///
/// Cloning shares the same allocation, so every requester of a resource sees
/// the identical value.
#[derive(Clone)]
pub struct LoadedResource(Arc<dyn Any + Send + Sync>);

impl LoadedResource {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    /// Borrow the value as `T`, if that is what the loader produced.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    /// Take a shared handle to the value as `T`.
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.0.clone().downcast::<T>().ok()
    }

    /// True if both handles point at the same loaded value.
    pub fn ptr_eq(&self, other: &LoadedResource) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for LoadedResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("LoadedResource").finish_non_exhaustive()
    }
}

/// Static description of one lazily-loadable resource.
#[derive(Clone)]
pub struct ResourceDescriptor {
    /// Unique identifier
    pub name: String,

    /// Scheduling tier
    pub priority: Priority,

    /// Device classes for which this resource is eagerly relevant
    pub device_classes: HashSet<DeviceClass>,

    /// Resources that must be loaded first, in declaration order
    pub dependencies: Vec<String>,

    /// Caller-supplied loader
    pub loader: Loader,
}

impl ResourceDescriptor {
    /// Create a descriptor relevant to every device class, with no dependencies.
    pub fn new(name: impl Into<String>, priority: Priority, loader: Loader) -> Self {
        Self {
            name: name.into(),
            priority,
            device_classes: DeviceClass::ALL.into_iter().collect(),
            dependencies: Vec::new(),
            loader,
        }
    }

    /// Restrict the descriptor to the given device classes.
    pub fn for_devices(mut self, devices: impl IntoIterator<Item = DeviceClass>) -> Self {
        self.device_classes = devices.into_iter().collect();
        self
    }

    /// Append a dependency, ignoring repeats.
    pub fn depends_on(mut self, dependency: impl Into<String>) -> Self {
        let dependency = dependency.into();
        if !self.dependencies.contains(&dependency) {
            self.dependencies.push(dependency);
        }
        self
    }

    pub fn applies_to(&self, device: DeviceClass) -> bool {
        self.device_classes.contains(&device)
    }
}

impl fmt::Debug for ResourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceDescriptor")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("device_classes", &self.device_classes)
            .field("dependencies", &self.dependencies)
            .finish_non_exhaustive()
    }
}
