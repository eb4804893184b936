// ── Object manager ──
//
// Pools for the objects churned on the dispatch path. A checkout hands
// ownership to exactly one guard; drop resets the object and returns it.
// Overflow past the pool's capacity allocates fresh objects, and returns
// recycle up to the capacity, so a burst never fails.

use std::sync::{Arc, Mutex};

use ommlink_rdm::StatusMsg;
use ommlink_rdm::directory::Service;

/// An object that can be wiped and reused.
pub(crate) trait Reusable: Send + 'static {
    fn reset(&mut self);
}

impl Reusable for Service {
    fn reset(&mut self) {
        self.clear();
    }
}

impl Reusable for StatusMsg {
    fn reset(&mut self) {
        *self = StatusMsg::default();
    }
}

/// A fixed-capacity free list for one object type.
pub(crate) struct Pool<T: Reusable> {
    free: Mutex<Vec<T>>,
    capacity: usize,
    make: fn() -> T,
}

impl<T: Reusable> Pool<T> {
    pub(crate) fn new(capacity: usize, make: fn() -> T) -> Arc<Self> {
        let mut free = Vec::with_capacity(capacity);
        free.resize_with(capacity, make);
        Arc::new(Self {
            free: Mutex::new(free),
            capacity,
            make,
        })
    }

    /// Check out an object. Falls back to a fresh allocation when the free
    /// list is empty.
    pub(crate) fn get(self: &Arc<Self>) -> Pooled<T> {
        let value = self
            .free
            .lock()
            .ok()
            .and_then(|mut free| free.pop())
            .unwrap_or_else(|| (self.make)());
        Pooled {
            value: Some(value),
            pool: Arc::clone(self),
        }
    }

    /// Objects currently sitting in the free list.
    pub(crate) fn available(&self) -> usize {
        self.free.lock().map(|free| free.len()).unwrap_or(0)
    }

    fn put_back(&self, mut value: T) {
        value.reset();
        if let Ok(mut free) = self.free.lock() {
            if free.len() < self.capacity {
                free.push(value);
            }
        }
    }
}

/// Owning guard over a pooled object. The object returns to its pool on
/// drop; while the guard lives, nothing else can reach the object.
pub(crate) struct Pooled<T: Reusable> {
    value: Option<T>,
    pool: Arc<Pool<T>>,
}

impl<T: Reusable> std::ops::Deref for Pooled<T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.value.as_ref().expect("pooled value present until drop")
    }
}

impl<T: Reusable> std::ops::DerefMut for Pooled<T> {
    fn deref_mut(&mut self) -> &mut T {
        self.value.as_mut().expect("pooled value present until drop")
    }
}

impl<T: Reusable> Drop for Pooled<T> {
    fn drop(&mut self) {
        if let Some(value) = self.value.take() {
            self.pool.put_back(value);
        }
    }
}

// ── ObjectManager ───────────────────────────────────────────────────

/// Per-instance pools, sized once from configuration and shared by the
/// callback clients.
pub(crate) struct ObjectManager {
    pub(crate) services: Arc<Pool<Service>>,
    pub(crate) status_msgs: Arc<Pool<StatusMsg>>,
}

impl ObjectManager {
    pub(crate) fn new(pool_size: usize) -> Self {
        Self {
            services: Pool::new(pool_size, Service::default),
            status_msgs: Pool::new(pool_size, StatusMsg::default),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use ommlink_rdm::data::MapAction;
    use pretty_assertions::assert_eq;

    #[test]
    fn checkout_removes_from_free_list() {
        let pool: Arc<Pool<Service>> = Pool::new(2, Service::default);
        assert_eq!(pool.available(), 2);

        let first = pool.get();
        let second = pool.get();
        assert_eq!(pool.available(), 0);

        // Overflow allocates rather than failing.
        let third = pool.get();
        assert_eq!(pool.available(), 0);

        drop(first);
        drop(second);
        drop(third);
        // Returns recycle only up to capacity.
        assert_eq!(pool.available(), 2);
    }

    #[test]
    fn returned_objects_are_reset() {
        let pool: Arc<Pool<Service>> = Pool::new(1, Service::default);

        {
            let mut service = pool.get();
            service.service_id = 99;
            service.action = MapAction::Delete;
        }

        let recycled = pool.get();
        assert_eq!(recycled.service_id, 0);
        assert_eq!(recycled.action, MapAction::Add);
    }

    #[test]
    fn guards_own_distinct_objects() {
        let pool: Arc<Pool<Service>> = Pool::new(2, Service::default);

        let mut a = pool.get();
        let mut b = pool.get();
        a.service_id = 1;
        b.service_id = 2;

        // Two live guards never alias: mutating one leaves the other alone.
        assert_eq!(a.service_id, 1);
        assert_eq!(b.service_id, 2);
    }

    #[test]
    fn double_checkout_after_return_reuses_storage_once() {
        let pool: Arc<Pool<Service>> = Pool::new(1, Service::default);
        drop(pool.get());
        let _held = pool.get();
        // The single pooled object is out; a second checkout must not hand
        // out the same storage again.
        assert_eq!(pool.available(), 0);
        let fresh = pool.get();
        assert_eq!(fresh.service_id, 0);
    }
}
