// ── Directory cache ──

use indexmap::IndexMap;

use ommlink_rdm::State;
use ommlink_rdm::directory::Service;

/// Ordered collection of cached services plus the stream state a refresh
/// built from the cache carries.
///
/// Invariant: each service id appears at most once — `IndexMap` keyed by
/// id enforces it while preserving insertion order for deterministic
/// refresh payloads.
#[derive(Debug, Default)]
pub(crate) struct DirectoryCache {
    pub(crate) state: State,
    services: IndexMap<u16, Service>,
}

impl DirectoryCache {
    pub(crate) fn new() -> Self {
        Self {
            state: State::open_ok("Source Directory Refresh Completed"),
            services: IndexMap::new(),
        }
    }

    pub(crate) fn clear(&mut self) {
        self.state = State::open_ok("Source Directory Refresh Completed");
        self.services.clear();
    }

    /// Insert or replace a service row.
    pub(crate) fn put(&mut self, service: Service) {
        self.services.insert(service.service_id, service);
    }

    pub(crate) fn get(&self, service_id: u16) -> Option<&Service> {
        self.services.get(&service_id)
    }

    pub(crate) fn get_mut(&mut self, service_id: u16) -> Option<&mut Service> {
        self.services.get_mut(&service_id)
    }

    pub(crate) fn remove(&mut self, service_id: u16) -> Option<Service> {
        self.services.shift_remove(&service_id)
    }

    pub(crate) fn contains(&self, service_id: u16) -> bool {
        self.services.contains_key(&service_id)
    }

    pub(crate) fn services(&self) -> impl Iterator<Item = &Service> {
        self.services.values()
    }

    pub(crate) fn len(&self) -> usize {
        self.services.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}
