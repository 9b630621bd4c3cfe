//! Leases: a namespace bound to a provider, through which handles are
//! acquired, duplicated and released

use crate::errors::{PoolError, PoolResult};
use crate::factory::{HandleOps, ResourceFactory};
use crate::provider::Provider;

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use tracing::debug;

/// Callback run on a handle as it moves between idle and leased.
///
/// Receives the lease's namespace identifier and may replace the handle.
pub type Hook<H> = Arc<dyn Fn(&str, &mut H) + Send + Sync>;

/// Optional wakeup and retire callbacks of a lease.
///
/// `wakeup` runs on a handle taken from the free list (never on a freshly
/// constructed one). `retire` runs on a released handle right before it is
/// pooled (never on one destroyed because of the quota).
///
/// # Examples
///
/// ```
/// use raphf::LeaseHooks;
///
/// let hooks = LeaseHooks::<Vec<u8>>::new()
///     .on_wakeup(|_ident, buf| buf.push(1))
///     .on_retire(|_ident, buf| buf.clear());
/// assert!(hooks.has_wakeup());
/// assert!(hooks.has_retire());
/// ```
pub struct LeaseHooks<H> {
    wakeup: Option<Hook<H>>,
    retire: Option<Hook<H>>,
}

impl<H> LeaseHooks<H> {
    pub fn new() -> Self {
        Self {
            wakeup: None,
            retire: None,
        }
    }

    /// Refresh a handle that is being reused
    pub fn on_wakeup<F>(mut self, wakeup: F) -> Self
    where
        F: Fn(&str, &mut H) + Send + Sync + 'static,
    {
        self.wakeup = Some(Arc::new(wakeup));
        self
    }

    /// Scrub a handle that is about to go idle
    pub fn on_retire<F>(mut self, retire: F) -> Self
    where
        F: Fn(&str, &mut H) + Send + Sync + 'static,
    {
        self.retire = Some(Arc::new(retire));
        self
    }

    pub fn has_wakeup(&self) -> bool {
        self.wakeup.is_some()
    }

    pub fn has_retire(&self) -> bool {
        self.retire.is_some()
    }
}

impl<H> Default for LeaseHooks<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> Clone for LeaseHooks<H> {
    fn clone(&self) -> Self {
        Self {
            wakeup: self.wakeup.clone(),
            retire: self.retire.clone(),
        }
    }
}

impl<H> fmt::Debug for LeaseHooks<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LeaseHooks")
            .field("wakeup", &self.has_wakeup())
            .field("retire", &self.has_retire())
            .finish()
    }
}

/// A binding of one namespace identifier to a registered provider.
///
/// Obtained from [`Registry::concede`](crate::Registry::concede). A lease
/// never owns handles: every handle obtained through [`acquire`](Self::acquire)
/// or [`duplicate`](Self::duplicate) must be handed back through
/// [`release`](Self::release) exactly once.
///
/// # Examples
///
/// ```
/// use raphf::{FnOps, Registry};
///
/// let registry = Registry::default();
/// registry
///     .provide("counter", FnOps::<u32>::new().with_create(|_| Some(7)))
///     .unwrap();
///
/// let lease = registry.concede::<FnOps<u32>>("counter", "example.org:80").unwrap();
/// let handle = lease.acquire(&()).unwrap();
/// assert_eq!(handle, 7);
/// lease.release(handle);
///
/// let stats = registry.stat_all().unwrap();
/// assert_eq!(stats.get("counter", "example.org:80").unwrap().free, 1);
/// ```
pub struct Lease<O: HandleOps> {
    provider: Arc<Provider<O>>,
    ident: String,
    hooks: LeaseHooks<O::Handle>,
    limit: Option<usize>,
}

impl<O: HandleOps> Lease<O> {
    pub(crate) fn new(
        provider: Arc<Provider<O>>,
        ident: &str,
        hooks: LeaseHooks<O::Handle>,
        limit: Option<usize>,
    ) -> Self {
        Self {
            provider,
            ident: ident.to_owned(),
            hooks,
            limit,
        }
    }

    /// Name of the provider this lease is bound to
    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Namespace identifier of this lease
    pub fn ident(&self) -> &str {
        &self.ident
    }

    /// The quota this lease enforces on release
    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// Acquire a handle, reusing the most recently released idle one if any
    pub fn acquire(&self, init: &O::Init) -> PoolResult<O::Handle> {
        self.try_acquire(init)
            .ok_or_else(|| self.construction_failed())
    }

    /// Acquire a handle, `None` if the factory produced nothing
    pub fn try_acquire(&self, init: &O::Init) -> Option<O::Handle> {
        self.provider
            .acquire(&self.ident, init, self.hooks.wakeup.as_ref())
    }

    /// Copy a handle into a second, independently leased one.
    ///
    /// The free list is never consulted.
    pub fn duplicate(&self, handle: &O::Handle) -> PoolResult<O::Handle> {
        self.try_duplicate(handle)
            .ok_or_else(|| self.construction_failed())
    }

    /// Copy a handle, `None` if the factory cannot copy it
    pub fn try_duplicate(&self, handle: &O::Handle) -> Option<O::Handle> {
        self.provider.duplicate(&self.ident, handle)
    }

    /// Hand a leased handle back; it is pooled, or destroyed if the provider
    /// is at its quota
    pub fn release(&self, handle: O::Handle) {
        self.provider
            .release(&self.ident, handle, self.limit, self.hooks.retire.as_ref());
    }

    /// Acquire a handle that is released automatically when dropped
    pub fn checkout(&self, init: &O::Init) -> PoolResult<PooledHandle<'_, O>> {
        let handle = self.acquire(init)?;
        Ok(PooledHandle {
            lease: self,
            handle: Some(handle),
        })
    }

    /// Another reference to the provider's factory
    pub fn factory(&self) -> ResourceFactory<O> {
        self.provider.factory().add_ref()
    }

    /// Turn this lease into a plain factory whose create, copy and destroy
    /// are acquire, duplicate and release
    ///
    /// # Examples
    ///
    /// ```
    /// use raphf::{FnOps, Registry};
    ///
    /// let registry = Registry::default();
    /// registry.provide("p", FnOps::<u8>::new().with_create(|_| Some(1))).unwrap();
    ///
    /// let factory = registry.concede::<FnOps<u8>>("p", "ns").unwrap().into_factory();
    /// let handle = factory.construct(&()).unwrap();
    /// factory.destroy(handle);
    ///
    /// let stats = registry.stat_all().unwrap();
    /// assert_eq!(stats.get("p", "ns").unwrap().free, 1);
    /// ```
    pub fn into_factory(self) -> ResourceFactory<Lease<O>> {
        ResourceFactory::new(self)
    }

    /// Give up the lease. Handles it produced are unaffected.
    pub fn abandon(self) {
        debug!(provider = %self.provider.name(), ident = %self.ident, "Abandoning lease.");
    }

    fn construction_failed(&self) -> PoolError {
        PoolError::ConstructionFailed {
            provider: self.provider.name().to_owned(),
            ident: self.ident.clone(),
        }
    }
}

impl<O: HandleOps> Clone for Lease<O> {
    fn clone(&self) -> Self {
        Self {
            provider: Arc::clone(&self.provider),
            ident: self.ident.clone(),
            hooks: self.hooks.clone(),
            limit: self.limit,
        }
    }
}

impl<O: HandleOps> fmt::Debug for Lease<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lease")
            .field("provider", &self.provider.name())
            .field("ident", &self.ident)
            .field("hooks", &self.hooks)
            .field("limit", &self.limit)
            .finish()
    }
}

impl<O: HandleOps> HandleOps for Lease<O> {
    type Handle = O::Handle;
    type Init = O::Init;

    fn create(&self, init: &O::Init) -> Option<O::Handle> {
        self.try_acquire(init)
    }

    fn copy(&self, handle: &O::Handle) -> Option<O::Handle> {
        self.try_duplicate(handle)
    }

    fn destroy(&self, handle: O::Handle) {
        self.release(handle);
    }
}

/// A leased handle that goes back to its lease when dropped
pub struct PooledHandle<'a, O: HandleOps> {
    lease: &'a Lease<O>,
    handle: Option<O::Handle>,
}

impl<O: HandleOps> PooledHandle<'_, O> {
    /// Detach the handle; the caller becomes responsible for releasing it
    pub fn into_inner(mut self) -> O::Handle {
        self.handle.take().expect("Handle already taken")
    }
}

impl<O: HandleOps> Deref for PooledHandle<'_, O> {
    type Target = O::Handle;

    fn deref(&self) -> &Self::Target {
        self.handle.as_ref().expect("Handle already taken")
    }
}

impl<O: HandleOps> DerefMut for PooledHandle<'_, O> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.handle.as_mut().expect("Handle already taken")
    }
}

impl<O: HandleOps> Drop for PooledHandle<'_, O> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.lease.release(handle);
        }
    }
}
