//! The provider registry: registration, lease binding, cleanup and statistics

use crate::config::RegistryConfiguration;
use crate::errors::{PoolError, PoolResult};
use crate::factory::{HandleOps, ResourceFactory};
use crate::lease::{Lease, LeaseHooks};
use crate::metrics::PoolStats;
use crate::provider::{Provider, ProviderEntry};

use dashmap::DashMap;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Registry of persistent handle providers.
///
/// One registry is meant to live as long as the process or worker that owns
/// it. Each provider pairs a [`ResourceFactory`] with a free list per
/// namespace; leases obtained through [`concede`](Self::concede) acquire and
/// release handles against those free lists, subject to the configured
/// per-provider quota.
///
/// Only idle handles are owned by the registry. Handles still leased out
/// when a provider is replaced or the registry shuts down are not recalled;
/// when they are released later they are destroyed instead of pooled.
///
/// # Examples
///
/// ```
/// use raphf::{FnOps, Registry, RegistryConfiguration};
///
/// let registry = Registry::new(RegistryConfiguration::new().with_limit(10));
/// registry
///     .provide("http\\Client\\Curl", FnOps::<String, str>::new().with_create(|host| Some(format!("conn:{host}"))))
///     .unwrap();
///
/// let lease = registry
///     .concede::<FnOps<String, str>>("http\\Client\\Curl", "php.net:80")
///     .unwrap();
/// let conn = lease.acquire("php.net:80").unwrap();
/// lease.release(conn);
///
/// assert_eq!(registry.cleanup(None, Some("php.net:80")), 1);
/// ```
pub struct Registry {
    providers: DashMap<String, Arc<dyn ProviderEntry>>,
    config: RegistryConfiguration,
}

impl Registry {
    /// Create an empty registry
    pub fn new(config: RegistryConfiguration) -> Self {
        debug!(limit = config.persistent_handle_limit, "Persistent handle registry initialized.");
        Self {
            providers: DashMap::new(),
            config,
        }
    }

    /// Create an empty registry configured from the environment
    pub fn from_env() -> PoolResult<Self> {
        Ok(Self::new(RegistryConfiguration::from_env()?))
    }

    pub fn config(&self) -> &RegistryConfiguration {
        &self.config
    }

    /// The per-provider quota, `None` when unlimited
    pub fn limit(&self) -> Option<usize> {
        self.config.limit()
    }

    /// Register `ops` as the provider `name`.
    ///
    /// A provider already registered under `name` is torn down first: its
    /// idle handles are destroyed through its own factory before the new
    /// provider becomes visible.
    pub fn provide<O: HandleOps>(&self, name: &str, ops: O) -> PoolResult<()> {
        self.provide_factory(name, ResourceFactory::new(ops))
    }

    /// Register a provider whose user data is finalized by `dtor` once the
    /// last reference to its factory is gone
    pub fn provide_with_dtor<O, F>(&self, name: &str, ops: O, dtor: F) -> PoolResult<()>
    where
        O: HandleOps,
        F: FnOnce(&O) + Send + 'static,
    {
        self.provide_factory(name, ResourceFactory::with_data_dtor(ops, dtor))
    }

    /// Register an existing factory as the provider `name`.
    ///
    /// The registry takes over this reference to the factory.
    pub fn provide_factory<O: HandleOps>(
        &self,
        name: &str,
        factory: ResourceFactory<O>,
    ) -> PoolResult<()> {
        if name.is_empty() {
            return Err(PoolError::EmptyProviderName);
        }

        if let Some((_, previous)) = self.providers.remove(name) {
            debug!(provider = name, "Replacing persistent handle provider.");
            previous.teardown();
        }

        let provider: Arc<dyn ProviderEntry> = Arc::new(Provider::new(name, factory));
        self.providers.insert(name.to_owned(), provider);
        debug!(provider = name, "Registered persistent handle provider.");
        Ok(())
    }

    /// Bind a lease for namespace `ident` to the provider `name`
    pub fn concede<O: HandleOps>(&self, name: &str, ident: &str) -> PoolResult<Lease<O>> {
        self.concede_with(name, ident, LeaseHooks::new())
    }

    /// Bind a lease with wakeup/retire hooks
    pub fn concede_with<O: HandleOps>(
        &self,
        name: &str,
        ident: &str,
        hooks: LeaseHooks<O::Handle>,
    ) -> PoolResult<Lease<O>> {
        let entry = self
            .providers
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| PoolError::UnknownProvider(name.to_owned()))?;

        let provider = entry
            .into_any()
            .downcast::<Provider<O>>()
            .map_err(|_| PoolError::ProviderTypeMismatch(name.to_owned()))?;

        debug!(provider = name, ident, "Conceded lease.");
        Ok(Lease::new(provider, ident, hooks, self.limit()))
    }

    /// Bind a lease, `None` if no such provider is registered
    pub fn try_concede<O: HandleOps>(&self, name: &str, ident: &str) -> Option<Lease<O>> {
        self.concede(name, ident).ok()
    }

    /// Destroy idle handles, never leased ones.
    ///
    /// * provider and namespace: that one namespace of that provider
    /// * provider only: every namespace of that provider
    /// * namespace only: that namespace in every provider
    /// * neither: everything
    ///
    /// Empty strings count as not given. Returns the number of handles
    /// destroyed.
    pub fn cleanup(&self, name: Option<&str>, ident: Option<&str>) -> usize {
        let name = name.filter(|name| !name.is_empty());
        let ident = ident.filter(|ident| !ident.is_empty());

        let destroyed = match name {
            Some(name) => self
                .providers
                .get(name)
                .map(|entry| Arc::clone(entry.value()))
                .map_or(0, |provider| provider.cleanup(ident)),
            None => self
                .entries()
                .iter()
                .map(|provider| provider.cleanup(ident))
                .sum(),
        };

        debug!(
            provider = name.unwrap_or("*"),
            ident = ident.unwrap_or("*"),
            destroyed,
            "Cleaned up persistent handles."
        );
        destroyed
    }

    /// Snapshot of used/free counts per provider and namespace.
    ///
    /// `None` if no provider is registered.
    pub fn stat_all(&self) -> Option<PoolStats> {
        if self.providers.is_empty() {
            return None;
        }

        let mut stats = PoolStats::new();
        for provider in self.entries() {
            stats.insert(provider.name(), provider.stats());
        }
        Some(stats)
    }

    /// Export statistics as a flat map, empty when nothing is registered
    pub fn export_metrics(&self) -> HashMap<String, String> {
        self.stat_all().map(|stats| stats.export()).unwrap_or_default()
    }

    /// Export statistics in Prometheus format
    #[cfg(feature = "metrics")]
    pub fn export_metrics_prometheus(
        &self,
        tags: Option<&HashMap<String, String>>,
    ) -> PoolResult<String> {
        let stats = self.stat_all().unwrap_or_default();
        crate::metrics::MetricsExporter::export_prometheus(&stats, tags)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.providers.contains_key(name)
    }

    /// Names of all registered providers, sorted
    pub fn provider_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Tear down every provider and drop the registry
    pub fn shutdown(self) {
        drop(self);
    }

    fn teardown_all(&mut self) -> usize {
        let names: Vec<String> = self.providers.iter().map(|e| e.key().clone()).collect();
        let mut destroyed = 0;
        for name in names {
            if let Some((_, provider)) = self.providers.remove(&name) {
                destroyed += provider.teardown();
            }
        }
        destroyed
    }

    // Provider callbacks run user code, so never call them while holding a
    // map shard lock.
    fn entries(&self) -> Vec<Arc<dyn ProviderEntry>> {
        self.providers
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(RegistryConfiguration::default())
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        let destroyed = self.teardown_all();
        debug!(destroyed, "Persistent handle registry shut down.");
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("providers", &self.provider_names())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::FnOps;
    use crate::metrics::HandleStats;

    struct Numbers;

    impl HandleOps for Numbers {
        type Handle = u64;
        type Init = u64;

        fn create(&self, init: &u64) -> Option<u64> {
            Some(*init)
        }
    }

    #[test]
    fn test_empty_name_rejected() {
        let registry = Registry::default();
        assert_eq!(registry.provide("", Numbers), Err(PoolError::EmptyProviderName));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_concede_unknown_provider() {
        let registry = Registry::default();
        let err = registry.concede::<Numbers>("nope", "ns").unwrap_err();
        assert_eq!(err, PoolError::UnknownProvider("nope".to_string()));
        assert!(registry.try_concede::<Numbers>("nope", "ns").is_none());
    }

    #[test]
    fn test_concede_type_mismatch() {
        let registry = Registry::default();
        registry.provide("numbers", Numbers).unwrap();
        let err = registry.concede::<FnOps<u64>>("numbers", "ns").unwrap_err();
        assert_eq!(err, PoolError::ProviderTypeMismatch("numbers".to_string()));
    }

    #[test]
    fn test_stat_all_empty_registry() {
        let registry = Registry::default();
        assert!(registry.stat_all().is_none());
        assert!(registry.export_metrics().is_empty());

        registry.provide("numbers", Numbers).unwrap();
        let stats = registry.stat_all().unwrap();
        assert_eq!(stats.len(), 1);
        assert!(stats.provider("numbers").unwrap().is_empty());
    }

    #[test]
    fn test_lease_carries_limit() {
        let registry = Registry::new(RegistryConfiguration::new().with_limit(3));
        registry.provide("numbers", Numbers).unwrap();
        let lease = registry.concede::<Numbers>("numbers", "ns").unwrap();
        assert_eq!(lease.limit(), Some(3));
        assert_eq!(lease.provider_name(), "numbers");
        assert_eq!(lease.ident(), "ns");
    }

    #[test]
    fn test_cleanup_filters() {
        let registry = Registry::default();
        registry.provide("a", Numbers).unwrap();
        registry.provide("b", Numbers).unwrap();

        for (provider, ident) in [("a", "x"), ("a", "y"), ("b", "x")] {
            let lease = registry.concede::<Numbers>(provider, ident).unwrap();
            let h = lease.acquire(&1).unwrap();
            lease.release(h);
        }

        assert_eq!(registry.cleanup(Some(""), Some("x")), 2);
        assert_eq!(registry.cleanup(Some("missing"), None), 0);
        assert_eq!(registry.cleanup(Some("a"), Some("y")), 1);

        let stats = registry.stat_all().unwrap();
        assert_eq!(stats.total_free(), 0);
        // cleanup of a single namespace keeps its list
        assert_eq!(stats.get("b", "x"), Some(HandleStats { used: 0, free: 0 }));

        // a full sweep drops lists with nothing leased
        assert_eq!(registry.cleanup(None, None), 0);
        let stats = registry.stat_all().unwrap();
        assert!(stats.provider("a").unwrap().is_empty());
        assert!(stats.provider("b").unwrap().is_empty());
    }

    #[test]
    fn test_provider_names_sorted() {
        let registry = Registry::default();
        registry.provide("zeta", Numbers).unwrap();
        registry.provide("alpha", Numbers).unwrap();
        assert_eq!(registry.provider_names(), vec!["alpha", "zeta"]);
        assert!(registry.contains("zeta"));
        assert_eq!(registry.len(), 2);
    }

    #[cfg(feature = "metrics")]
    #[test]
    fn test_prometheus_on_empty_registry() {
        let registry = Registry::default();
        let output = registry.export_metrics_prometheus(None).unwrap();
        assert!(!output.contains("raphf_handles_used{"));
    }
}
