//! Per-namespace free list of idle handles

/// Idle handles of one (provider, namespace) pair plus the number of
/// handles currently leased out of it.
///
/// Idle handles are reused last-in first-out so recently used (warm) handles
/// stay in rotation.
#[derive(Debug)]
pub(crate) struct HandleList<H> {
    free: Vec<H>,
    used: usize,
}

impl<H> HandleList<H> {
    pub fn new() -> Self {
        Self {
            free: Vec::new(),
            used: 0,
        }
    }

    /// Take the most recently pushed idle handle
    pub fn pop_idle(&mut self) -> Option<H> {
        self.free.pop()
    }

    pub fn push_idle(&mut self, handle: H) {
        self.free.push(handle);
    }

    /// Remove every idle handle, leaving `used` untouched
    pub fn drain_idle(&mut self) -> Vec<H> {
        std::mem::take(&mut self.free)
    }

    pub fn lease_one(&mut self) {
        self.used += 1;
    }

    /// Returns `false` if nothing was leased, in which case `used` stays at zero
    pub fn return_one(&mut self) -> bool {
        match self.used.checked_sub(1) {
            Some(used) => {
                self.used = used;
                true
            }
            None => false,
        }
    }

    pub fn used(&self) -> usize {
        self.used
    }

    pub fn free_count(&self) -> usize {
        self.free.len()
    }
}

impl<H> Default for HandleList<H> {
    fn default() -> Self {
        Self::new()
    }
}
