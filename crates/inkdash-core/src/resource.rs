//! Lazy, shared, single-instance resource lifecycle.
//!
//! Sources share expensive process-wide resources (an HTML renderer, an
//! HTTP client, a hardware link) without the scheduler knowing about them
//! upfront, and without paying for resources no active source needs. A
//! provider is started at most once per process; only kinds that were
//! actually requested are ever started or stopped.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Key identifying a kind of shared resource.
///
/// An explicit string key rather than type identity, so collaborator crates
/// can introduce kinds without touching this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceKind(&'static str);

impl ResourceKind {
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// A started resource instance, downcast by the requester via [`ResourceRegistry::get_as`].
pub type SharedResource = Arc<dyn Any + Send + Sync>;

/// Creates and tears down one kind of shared resource.
#[async_trait]
pub trait ResourceProvider: Send + Sync {
    async fn start(&self) -> anyhow::Result<SharedResource>;
    async fn stop(&self) -> anyhow::Result<()>;
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("no provider registered for resource kind `{0}`")]
    UnknownKind(ResourceKind),
    #[error("provider for `{kind}` failed to start")]
    StartFailed {
        kind: ResourceKind,
        #[source]
        source: anyhow::Error,
    },
    #[error("resource `{0}` is not of the requested type")]
    WrongType(ResourceKind),
}

#[derive(Default)]
struct StartedResources {
    instances: HashMap<ResourceKind, SharedResource>,
    /// Creation order, for reverse-order shutdown.
    order: Vec<ResourceKind>,
}

/// Registry mapping resource kinds to lazily-created singleton instances.
pub struct ResourceRegistry {
    providers: HashMap<ResourceKind, Box<dyn ResourceProvider>>,
    started: Mutex<StartedResources>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
            started: Mutex::new(StartedResources::default()),
        }
    }

    /// Register a provider for `kind`. Driver-time only; a later
    /// registration for the same kind replaces the earlier one.
    pub fn register(&mut self, kind: ResourceKind, provider: Box<dyn ResourceProvider>) {
        self.providers.insert(kind, provider);
    }

    /// Return the shared instance for `kind`, starting its provider on the
    /// first call and caching the result. Subsequent calls return the
    /// identical instance without re-invoking the provider.
    pub async fn get(&self, kind: ResourceKind) -> Result<SharedResource, RegistryError> {
        let mut started = self.started.lock().await;
        if let Some(existing) = started.instances.get(&kind) {
            return Ok(Arc::clone(existing));
        }

        let provider = self
            .providers
            .get(&kind)
            .ok_or(RegistryError::UnknownKind(kind))?;
        debug!(kind = %kind, "starting resource provider");
        let instance = provider
            .start()
            .await
            .map_err(|source| RegistryError::StartFailed { kind, source })?;

        started.instances.insert(kind, Arc::clone(&instance));
        started.order.push(kind);
        Ok(instance)
    }

    /// Typed variant of [`get`](Self::get).
    pub async fn get_as<T: Any + Send + Sync>(
        &self,
        kind: ResourceKind,
    ) -> Result<Arc<T>, RegistryError> {
        let instance = self.get(kind).await?;
        instance
            .downcast::<T>()
            .map_err(|_| RegistryError::WrongType(kind))
    }

    /// Tear down every resource that was actually created, in reverse
    /// creation order. Individual failures are logged and do not abort the
    /// remaining teardown steps. Kinds never requested are left untouched.
    pub async fn shutdown(&self) {
        let mut started = self.started.lock().await;
        let order = std::mem::take(&mut started.order);
        for kind in order.into_iter().rev() {
            started.instances.remove(&kind);
            let Some(provider) = self.providers.get(&kind) else {
                continue;
            };
            debug!(kind = %kind, "stopping resource provider");
            if let Err(e) = provider.stop().await {
                warn!(kind = %kind, error = %format!("{e:#}"), "resource teardown failed");
            }
        }
    }
}

impl Default for ResourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
