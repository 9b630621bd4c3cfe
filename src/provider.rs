//! Named providers: one factory plus a free list per namespace

use crate::factory::{HandleOps, ResourceFactory};
use crate::handle_list::HandleList;
use crate::lease::Hook;
use crate::metrics::HandleStats;

use parking_lot::Mutex;
use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, trace, warn};

struct ProviderState<H> {
    lists: HashMap<String, HandleList<H>>,
    used_total: usize,
    retired: bool,
}

impl<H> ProviderState<H> {
    fn list(&mut self, ident: &str) -> &mut HandleList<H> {
        self.lists.entry(ident.to_owned()).or_default()
    }

    /// Drain idle handles from every namespace, dropping lists that have
    /// nothing leased
    fn drain_all(&mut self) -> Vec<H> {
        let mut doomed = Vec::new();
        self.lists.retain(|_, list| {
            doomed.extend(list.drain_idle());
            list.used() > 0
        });
        doomed
    }
}

/// A registered factory together with its per-namespace handle lists.
///
/// Callbacks into the factory or into lease hooks never run while the state
/// lock is held.
pub(crate) struct Provider<O: HandleOps> {
    name: String,
    factory: ResourceFactory<O>,
    state: Mutex<ProviderState<O::Handle>>,
}

impl<O: HandleOps> Provider<O> {
    pub fn new(name: impl Into<String>, factory: ResourceFactory<O>) -> Self {
        Self {
            name: name.into(),
            factory,
            state: Mutex::new(ProviderState {
                lists: HashMap::new(),
                used_total: 0,
                retired: false,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn factory(&self) -> &ResourceFactory<O> {
        &self.factory
    }

    #[cfg(test)]
    pub fn used_total(&self) -> usize {
        self.state.lock().used_total
    }

    /// Reuse the most recent idle handle of `ident`, or construct one
    pub fn acquire(
        &self,
        ident: &str,
        init: &O::Init,
        wakeup: Option<&Hook<O::Handle>>,
    ) -> Option<O::Handle> {
        let idle = {
            let mut state = self.state.lock();
            let state = &mut *state;
            let list = state.lists.entry(ident.to_owned()).or_default();
            let idle = list.pop_idle();
            if idle.is_some() {
                list.lease_one();
                state.used_total += 1;
            }
            idle
        };

        if let Some(mut handle) = idle {
            trace!(provider = %self.name, ident, "Reusing idle handle.");
            if let Some(wakeup) = wakeup {
                wakeup(ident, &mut handle);
            }
            return Some(handle);
        }

        let handle = self.factory.construct(init)?;
        trace!(provider = %self.name, ident, "Created new handle.");

        let mut state = self.state.lock();
        state.list(ident).lease_one();
        state.used_total += 1;
        Some(handle)
    }

    /// Copy a leased handle; the copy counts as leased
    pub fn duplicate(&self, ident: &str, handle: &O::Handle) -> Option<O::Handle> {
        let copy = self.factory.duplicate(handle)?;
        trace!(provider = %self.name, ident, "Duplicated handle.");

        let mut state = self.state.lock();
        state.list(ident).lease_one();
        state.used_total += 1;
        Some(copy)
    }

    /// Return a leased handle, pooling it unless the provider is at its quota.
    ///
    /// The quota is compared against the leased total before this handle is
    /// taken off it, so with `limit == leased` every release destroys.
    pub fn release(
        &self,
        ident: &str,
        mut handle: O::Handle,
        limit: Option<usize>,
        retire: Option<&Hook<O::Handle>>,
    ) {
        let keep = {
            let mut state = self.state.lock();
            let state = &mut *state;
            let over_quota = limit.is_some_and(|limit| state.used_total >= limit);
            let keep = !over_quota && !state.retired;

            if !state.list(ident).return_one() {
                warn!(provider = %self.name, ident, "Released a handle that was not leased from this namespace.");
            }
            match state.used_total.checked_sub(1) {
                Some(used_total) => state.used_total = used_total,
                None => warn!(provider = %self.name, "Released more handles than were leased."),
            }

            keep
        };

        if !keep {
            trace!(provider = %self.name, ident, "Destroying released handle.");
            self.factory.destroy(handle);
            return;
        }

        if let Some(retire) = retire {
            retire(ident, &mut handle);
        }

        let mut state = self.state.lock();
        if state.retired {
            drop(state);
            self.factory.destroy(handle);
        } else {
            state.list(ident).push_idle(handle);
        }
    }

    /// Destroy idle handles of one namespace, or of all namespaces.
    ///
    /// Returns how many handles were destroyed. A namespace that was never
    /// referenced is not created.
    pub fn cleanup(&self, ident: Option<&str>) -> usize {
        let doomed = {
            let mut state = self.state.lock();
            match ident {
                Some(ident) => state
                    .lists
                    .get_mut(ident)
                    .map(HandleList::drain_idle)
                    .unwrap_or_default(),
                None => state.drain_all(),
            }
        };

        let count = doomed.len();
        for handle in doomed {
            self.factory.destroy(handle);
        }

        if count > 0 {
            debug!(provider = %self.name, ident = ident.unwrap_or("*"), count, "Destroyed idle handles.");
        }
        count
    }

    /// Retire the provider, destroying all of its idle handles.
    ///
    /// Handles still leased out are not reachable from here; once they come
    /// back through a lease they are destroyed rather than pooled.
    pub fn teardown(&self) -> usize {
        let (doomed, leased) = {
            let mut state = self.state.lock();
            state.retired = true;
            (state.drain_all(), state.used_total)
        };

        if leased > 0 {
            warn!(provider = %self.name, leased, "Tearing down provider with handles still leased.");
        }

        let count = doomed.len();
        for handle in doomed {
            self.factory.destroy(handle);
        }
        debug!(provider = %self.name, destroyed = count, "Provider torn down.");
        count
    }

    pub fn stats(&self) -> BTreeMap<String, HandleStats> {
        let state = self.state.lock();
        state
            .lists
            .iter()
            .map(|(ident, list)| {
                (
                    ident.clone(),
                    HandleStats {
                        used: list.used(),
                        free: list.free_count(),
                    },
                )
            })
            .collect()
    }
}

impl<O: HandleOps> Drop for Provider<O> {
    fn drop(&mut self) {
        for list in self.state.get_mut().lists.values_mut() {
            for handle in list.drain_idle() {
                self.factory.destroy(handle);
            }
        }
    }
}

/// The type-erased face of a provider, as stored by the registry.
pub(crate) trait ProviderEntry: Send + Sync {
    fn name(&self) -> &str;

    fn cleanup(&self, ident: Option<&str>) -> usize;

    fn teardown(&self) -> usize;

    fn stats(&self) -> BTreeMap<String, HandleStats>;

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<O: HandleOps> ProviderEntry for Provider<O> {
    fn name(&self) -> &str {
        Provider::name(self)
    }

    fn cleanup(&self, ident: Option<&str>) -> usize {
        Provider::cleanup(self, ident)
    }

    fn teardown(&self) -> usize {
        Provider::teardown(self)
    }

    fn stats(&self) -> BTreeMap<String, HandleStats> {
        Provider::stats(self)
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}
