// ── User item stream registries ──
//
// Handle ↔ stream-id correlation for user item subscriptions. Created at
// registration, destroyed on stream close or channel teardown. Lookups on
// the dispatch path are by stream id; user calls are by handle.

use std::any::Any;
use std::sync::Arc;

use dashmap::DashMap;

use ommlink_rdm::DomainType;

use crate::client::ConsumerClient;

/// One open item subscription.
pub(crate) struct SingleItem {
    pub(crate) handle: u64,
    pub(crate) stream_id: i32,
    pub(crate) domain: DomainType,
    pub(crate) name: Option<String>,
    pub(crate) service_id: Option<u16>,
    pub(crate) streaming: bool,
    pub(crate) client: Arc<dyn ConsumerClient>,
    pub(crate) closure: Option<Arc<dyn Any + Send + Sync>>,
}

pub(crate) struct ItemCallbackClient {
    by_handle: DashMap<u64, Arc<SingleItem>>,
    by_stream: DashMap<i32, u64>,
}

impl ItemCallbackClient {
    pub(crate) fn new() -> Self {
        Self {
            by_handle: DashMap::new(),
            by_stream: DashMap::new(),
        }
    }

    pub(crate) fn insert(&self, item: Arc<SingleItem>) {
        self.by_stream.insert(item.stream_id, item.handle);
        self.by_handle.insert(item.handle, item);
    }

    pub(crate) fn by_handle(&self, handle: u64) -> Option<Arc<SingleItem>> {
        self.by_handle
            .get(&handle)
            .map(|entry| Arc::clone(entry.value()))
    }

    pub(crate) fn by_stream(&self, stream_id: i32) -> Option<Arc<SingleItem>> {
        let handle = *self.by_stream.get(&stream_id)?;
        self.by_handle(handle)
    }

    pub(crate) fn remove(&self, handle: u64) -> Option<Arc<SingleItem>> {
        let (_, item) = self.by_handle.remove(&handle)?;
        self.by_stream.remove(&item.stream_id);
        Some(item)
    }

    /// Remove and return every item (channel teardown).
    pub(crate) fn drain(&self) -> Vec<Arc<SingleItem>> {
        let items: Vec<Arc<SingleItem>> = self
            .by_handle
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        self.by_handle.clear();
        self.by_stream.clear();
        items
    }

    /// Registered items without removing them (status fan-out).
    pub(crate) fn snapshot(&self) -> Vec<Arc<SingleItem>> {
        self.by_handle
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.by_handle.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    struct Noop;
    impl ConsumerClient for Noop {}

    fn item(handle: u64, stream_id: i32) -> Arc<SingleItem> {
        Arc::new(SingleItem {
            handle,
            stream_id,
            domain: DomainType::MarketPrice,
            name: Some("IBM.N".into()),
            service_id: Some(10),
            streaming: true,
            client: Arc::new(Noop),
            closure: None,
        })
    }

    #[test]
    fn lookups_work_both_ways() {
        let items = ItemCallbackClient::new();
        items.insert(item(1, 100));
        items.insert(item(2, 101));

        assert_eq!(items.by_stream(100).map(|i| i.handle), Some(1));
        assert_eq!(items.by_handle(2).map(|i| i.stream_id), Some(101));
        assert!(items.by_stream(999).is_none());
        assert!(items.by_handle(999).is_none());
    }

    #[test]
    fn remove_clears_both_maps() {
        let items = ItemCallbackClient::new();
        items.insert(item(1, 100));

        let removed = items.remove(1).expect("registered");
        assert_eq!(removed.stream_id, 100);
        assert!(items.by_stream(100).is_none());
        assert!(items.remove(1).is_none());
    }

    #[test]
    fn drain_empties_the_registry() {
        let items = ItemCallbackClient::new();
        items.insert(item(1, 100));
        items.insert(item(2, 101));

        let drained = items.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(items.len(), 0);
    }
}
