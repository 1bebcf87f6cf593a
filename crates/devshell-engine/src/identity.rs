//! Identity caches between the two runtimes
//!
//! Two independent weak tables keep values that cross the runtime boundary
//! from being wrapped twice:
//! - host value id to the native object created for it
//! - native object identity to the host wrapper created for it
//!
//! Neither table keeps anything alive. An entry is dead once the last strong
//! reference elsewhere is dropped, and a dead entry reads as absent, which
//! means "re-create". Dead entries are purged by [`IdentityCacheBridge::purge`]
//! and, amortized, on insertion: a table is swept once it has grown to twice
//! the number of entries that survived its previous sweep.

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::any::Any;
use std::sync::{Arc, Weak};

/// Identity key for an object - its pointer address
type ObjectId = usize;

/// Identity cache used by hosted sessions
pub type SessionIdentityCache = IdentityCacheBridge<dyn Any + Send + Sync, dyn Any + Send + Sync>;

/// Table size below which insertion never sweeps
const MIN_SWEEP_LEN: usize = 32;

/// Host value id assigned by the host runtime
pub type HostValueId = i32;

struct IdentityEntry<N: ?Sized, H: ?Sized> {
    /// Guards against a dead key whose address was reused
    key: Weak<N>,
    wrapper: Weak<H>,
}

struct Tables<N: ?Sized, H: ?Sized> {
    by_host_id: FxHashMap<HostValueId, Weak<N>>,
    by_native: FxHashMap<ObjectId, IdentityEntry<N, H>>,
    /// Length at which the next insertion sweeps `by_host_id`
    host_id_sweep_at: usize,
    /// Length at which the next insertion sweeps `by_native`
    native_sweep_at: usize,
}

impl<N: ?Sized, H: ?Sized> Tables<N, H> {
    fn empty() -> Self {
        Self {
            by_host_id: FxHashMap::default(),
            by_native: FxHashMap::default(),
            host_id_sweep_at: MIN_SWEEP_LEN,
            native_sweep_at: MIN_SWEEP_LEN,
        }
    }

    fn sweep_host_ids(&mut self) {
        self.by_host_id.retain(|_, weak| weak.strong_count() > 0);
        self.host_id_sweep_at = next_sweep(self.by_host_id.len());
    }

    fn sweep_natives(&mut self) {
        self.by_native.retain(|_, entry| is_live(entry));
        self.native_sweep_at = next_sweep(self.by_native.len());
    }
}

fn next_sweep(live: usize) -> usize {
    (live * 2).max(MIN_SWEEP_LEN)
}

/// Weak caches mapping values across the runtime boundary
///
/// `N` is the native object type and `H` the host wrapper type.
pub struct IdentityCacheBridge<N: ?Sized, H: ?Sized> {
    tables: Mutex<Tables<N, H>>,
}

fn object_id<T: ?Sized>(object: &Arc<T>) -> ObjectId {
    Arc::as_ptr(object) as *const () as ObjectId
}

impl<N: ?Sized, H: ?Sized> IdentityCacheBridge<N, H> {
    /// Create empty caches
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(Tables::empty()),
        }
    }

    /// Native object previously cached for a host value id, if still alive
    pub fn get_native(&self, host_id: HostValueId) -> Option<Arc<N>> {
        self.tables
            .lock()
            .by_host_id
            .get(&host_id)
            .and_then(Weak::upgrade)
    }

    /// Remember the native object created for a host value id
    pub fn put_native(&self, host_id: HostValueId, native: &Arc<N>) {
        let mut tables = self.tables.lock();
        if tables.by_host_id.len() >= tables.host_id_sweep_at {
            tables.sweep_host_ids();
        }
        tables.by_host_id.insert(host_id, Arc::downgrade(native));
    }

    /// Host wrapper previously cached for a native object, if both are alive
    pub fn get_wrapper(&self, native: &Arc<N>) -> Option<Arc<H>> {
        let tables = self.tables.lock();
        let entry = tables.by_native.get(&object_id(native))?;
        let key = entry.key.upgrade()?;
        if object_id(&key) != object_id(native) {
            return None;
        }
        entry.wrapper.upgrade()
    }

    /// Remember the host wrapper created for a native object
    pub fn put_wrapper(&self, native: &Arc<N>, wrapper: &Arc<H>) {
        let mut tables = self.tables.lock();
        if tables.by_native.len() >= tables.native_sweep_at {
            tables.sweep_natives();
        }
        tables.by_native.insert(
            object_id(native),
            IdentityEntry {
                key: Arc::downgrade(native),
                wrapper: Arc::downgrade(wrapper),
            },
        );
    }

    /// Drop dead entries from both tables
    ///
    /// # Returns
    /// Number of entries removed
    pub fn purge(&self) -> usize {
        let mut tables = self.tables.lock();
        let before = tables.by_host_id.len() + tables.by_native.len();
        tables.sweep_host_ids();
        tables.sweep_natives();
        before - (tables.by_host_id.len() + tables.by_native.len())
    }

    /// Number of live host-id entries
    pub fn native_len(&self) -> usize {
        self.tables
            .lock()
            .by_host_id
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    /// Number of live identity entries
    pub fn wrapper_len(&self) -> usize {
        self.tables
            .lock()
            .by_native
            .values()
            .filter(|entry| is_live(entry))
            .count()
    }

    /// Number of live entries in both tables
    pub fn len(&self) -> usize {
        self.native_len() + self.wrapper_len()
    }

    /// Whether both tables are empty of live entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Empty both tables at once
    pub fn clear(&self) {
        *self.tables.lock() = Tables::empty();
    }
}

fn is_live<N: ?Sized, H: ?Sized>(entry: &IdentityEntry<N, H>) -> bool {
    entry.key.strong_count() > 0 && entry.wrapper.strong_count() > 0
}

impl<N: ?Sized, H: ?Sized> Default for IdentityCacheBridge<N, H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N: ?Sized, H: ?Sized> std::fmt::Debug for IdentityCacheBridge<N, H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tables = self.tables.lock();
        f.debug_struct("IdentityCacheBridge")
            .field("by_host_id", &tables.by_host_id.len())
            .field("by_native", &tables.by_native.len())
            .finish()
    }
}
