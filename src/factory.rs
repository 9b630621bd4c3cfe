//! Resource factories: the create/copy/destroy capability and its shared owner

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// The operations a factory offers for one kind of handle.
///
/// The implementing value doubles as the factory's opaque user data. Every
/// method is optional: by default `create` and `copy` produce nothing and
/// `destroy` simply drops the handle.
///
/// # Examples
///
/// ```
/// use raphf::{HandleOps, ResourceFactory};
///
/// struct Sockets;
///
/// impl HandleOps for Sockets {
///     type Handle = String;
///     type Init = str;
///
///     fn create(&self, addr: &str) -> Option<String> {
///         Some(format!("socket:{addr}"))
///     }
/// }
///
/// let factory = ResourceFactory::new(Sockets);
/// assert_eq!(factory.construct("php.net:80").as_deref(), Some("socket:php.net:80"));
/// assert_eq!(factory.duplicate(&"x".to_string()), None);
/// ```
pub trait HandleOps: Send + Sync + 'static {
    /// The pooled resource
    type Handle: Send + 'static;

    /// Argument passed through to `create`
    type Init: ?Sized;

    /// Construct a new handle
    fn create(&self, init: &Self::Init) -> Option<Self::Handle> {
        let _ = init;
        None
    }

    /// Produce an independent copy of a handle
    fn copy(&self, handle: &Self::Handle) -> Option<Self::Handle> {
        let _ = handle;
        None
    }

    /// Dispose of a handle
    fn destroy(&self, handle: Self::Handle) {
        drop(handle);
    }
}

type CreateFn<H, I> = Box<dyn Fn(&I) -> Option<H> + Send + Sync>;
type CopyFn<H> = Box<dyn Fn(&H) -> Option<H> + Send + Sync>;
type DestroyFn<H> = Box<dyn Fn(H) + Send + Sync>;

/// [`HandleOps`] assembled from closures, any of which may be left out.
///
/// # Examples
///
/// ```
/// use raphf::{FnOps, ResourceFactory};
///
/// let ops = FnOps::<u32, u32>::new().with_create(|seed| Some(seed * 2));
/// let factory = ResourceFactory::new(ops);
/// assert_eq!(factory.construct(&21), Some(42));
/// ```
pub struct FnOps<H, I: ?Sized = ()> {
    create: Option<CreateFn<H, I>>,
    copy: Option<CopyFn<H>>,
    destroy: Option<DestroyFn<H>>,
}

impl<H, I: ?Sized> FnOps<H, I> {
    pub fn new() -> Self {
        Self {
            create: None,
            copy: None,
            destroy: None,
        }
    }

    pub fn with_create<F>(mut self, create: F) -> Self
    where
        F: Fn(&I) -> Option<H> + Send + Sync + 'static,
    {
        self.create = Some(Box::new(create));
        self
    }

    pub fn with_copy<F>(mut self, copy: F) -> Self
    where
        F: Fn(&H) -> Option<H> + Send + Sync + 'static,
    {
        self.copy = Some(Box::new(copy));
        self
    }

    pub fn with_destroy<F>(mut self, destroy: F) -> Self
    where
        F: Fn(H) + Send + Sync + 'static,
    {
        self.destroy = Some(Box::new(destroy));
        self
    }
}

impl<H, I: ?Sized> Default for FnOps<H, I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H, I> HandleOps for FnOps<H, I>
where
    H: Send + 'static,
    I: ?Sized + 'static,
{
    type Handle = H;
    type Init = I;

    fn create(&self, init: &I) -> Option<H> {
        self.create.as_ref().and_then(|create| create(init))
    }

    fn copy(&self, handle: &H) -> Option<H> {
        self.copy.as_ref().and_then(|copy| copy(handle))
    }

    fn destroy(&self, handle: H) {
        if let Some(destroy) = &self.destroy {
            destroy(handle);
        }
    }
}

type DataDtor<O> = Box<dyn FnOnce(&O) + Send>;

struct FactoryCore<O> {
    ops: O,
    dtor: Mutex<Option<DataDtor<O>>>,
}

impl<O> Drop for FactoryCore<O> {
    fn drop(&mut self) {
        if let Some(dtor) = self.dtor.get_mut().take() {
            dtor(&self.ops);
        }
    }
}

/// A reference counted factory wrapping a set of [`HandleOps`].
///
/// Cloning (or [`add_ref`](Self::add_ref)) creates another co-owner. The
/// optional data destructor runs exactly once, when the last owner is gone.
///
/// # Examples
///
/// ```
/// use raphf::{FnOps, ResourceFactory};
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// let dtor_calls = Arc::new(AtomicUsize::new(0));
/// let calls = Arc::clone(&dtor_calls);
/// let factory = ResourceFactory::with_data_dtor(FnOps::<u8>::new(), move |_| {
///     calls.fetch_add(1, Ordering::SeqCst);
/// });
///
/// let second = factory.add_ref();
/// assert_eq!(second.ref_count(), 2);
/// assert_eq!(factory.release(), 1);
/// assert_eq!(dtor_calls.load(Ordering::SeqCst), 0);
/// assert_eq!(second.release(), 0);
/// assert_eq!(dtor_calls.load(Ordering::SeqCst), 1);
/// ```
pub struct ResourceFactory<O: HandleOps> {
    core: Arc<FactoryCore<O>>,
}

impl<O: HandleOps> ResourceFactory<O> {
    /// Create a factory with a reference count of one
    pub fn new(ops: O) -> Self {
        Self {
            core: Arc::new(FactoryCore {
                ops,
                dtor: Mutex::new(None),
            }),
        }
    }

    /// Create a factory whose user data is finalized by `dtor` once the
    /// last reference is released
    pub fn with_data_dtor<F>(ops: O, dtor: F) -> Self
    where
        F: FnOnce(&O) + Send + 'static,
    {
        Self {
            core: Arc::new(FactoryCore {
                ops,
                dtor: Mutex::new(Some(Box::new(dtor))),
            }),
        }
    }

    /// Register another owner of this factory
    pub fn add_ref(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }

    /// Number of owners currently sharing this factory
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.core)
    }

    /// Give up this reference, returning how many remain.
    ///
    /// When the count reaches zero the data destructor runs and the factory
    /// is freed.
    pub fn release(self) -> usize {
        match Arc::try_unwrap(self.core) {
            Ok(core) => {
                drop(core);
                0
            }
            Err(core) => Arc::strong_count(&core) - 1,
        }
    }

    /// Whether both values refer to the same factory
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.core, &other.core)
    }

    /// The ops (and user data) this factory delegates to
    pub fn ops(&self) -> &O {
        &self.core.ops
    }

    /// Construct a new handle, `None` if the ops cannot create one
    pub fn construct(&self, init: &O::Init) -> Option<O::Handle> {
        let handle = self.core.ops.create(init);
        trace!(created = handle.is_some(), "Constructed handle.");
        handle
    }

    /// Copy a handle, `None` if the ops cannot copy
    pub fn duplicate(&self, handle: &O::Handle) -> Option<O::Handle> {
        self.core.ops.copy(handle)
    }

    /// Destroy a handle
    pub fn destroy(&self, handle: O::Handle) {
        trace!("Destroying handle.");
        self.core.ops.destroy(handle);
    }
}

impl<O: HandleOps> Clone for ResourceFactory<O> {
    fn clone(&self) -> Self {
        self.add_ref()
    }
}

impl<O: HandleOps> fmt::Debug for ResourceFactory<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceFactory")
            .field("ref_count", &self.ref_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Empty;

    impl HandleOps for Empty {
        type Handle = u32;
        type Init = ();
    }

    #[test]
    fn test_absent_ops_yield_nothing() {
        let factory = ResourceFactory::new(Empty);
        assert_eq!(factory.construct(&()), None);
        assert_eq!(factory.duplicate(&7), None);
        factory.destroy(7);
    }

    #[test]
    fn test_fn_ops_delegate() {
        let destroyed = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&destroyed);
        let ops = FnOps::<u32, u32>::new()
            .with_create(|seed| Some(*seed))
            .with_copy(|h| Some(h + 100))
            .with_destroy(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        let factory = ResourceFactory::new(ops);

        assert_eq!(factory.construct(&5), Some(5));
        assert_eq!(factory.duplicate(&5), Some(105));
        factory.destroy(5);
        assert_eq!(destroyed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_refcount_and_dtor_runs_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let factory = ResourceFactory::with_data_dtor(Empty, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(factory.ref_count(), 1);

        let a = factory.add_ref();
        let b = a.clone();
        assert_eq!(factory.ref_count(), 3);
        assert!(a.ptr_eq(&b));

        assert_eq!(a.release(), 2);
        drop(b);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        assert_eq!(factory.release(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_without_release_runs_dtor() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        {
            let _factory = ResourceFactory::with_data_dtor(Empty, move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
