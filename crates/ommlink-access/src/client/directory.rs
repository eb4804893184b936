// ── Consumer-side directory subscriptions ──
//
// The network feeds one cache through the shared merge engine; every
// subscriber sees payloads re-derived from it through its own requested
// filter mask and optional service scope. A subscriber can never receive
// a filter it did not ask for, whatever the upstream sent.

use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use tracing::warn;

use ommlink_rdm::data::Payload;
use ommlink_rdm::directory::Service;
use ommlink_rdm::{DomainType, MsgKey, RefreshMsg, State, UpdateMsg};

use crate::base::DIRECTORY_STREAM_ID;
use crate::client::ConsumerClient;
use crate::directory::{DirectoryServiceStore, StoreRole, encode_pooled_services};
use crate::error::AccessError;
use crate::pool::{Pool, Pooled};

/// One directory subscriber.
pub(crate) struct DirectoryItem {
    pub(crate) handle: u64,
    pub(crate) filter: u32,
    pub(crate) service_id: Option<u16>,
    pub(crate) service_name: Option<String>,
    pub(crate) streaming: bool,
    pub(crate) client: Arc<dyn ConsumerClient>,
    pub(crate) closure: Option<Arc<dyn Any + Send + Sync>>,
}

/// Service scope of a subscriber, resolved against the cache at fan-out
/// time so late-arriving services are picked up.
enum Scope {
    All,
    Service(u16),
    /// Scoped by a name the cache does not (yet) know.
    Unknown,
}

pub(crate) struct DirectoryCallbackClient {
    pub(crate) store: DirectoryServiceStore,
    items: DashMap<u64, Arc<DirectoryItem>>,
    initial_seen: AtomicBool,
}

impl DirectoryCallbackClient {
    pub(crate) fn new(
        instance_name: impl Into<String>,
        pool: Arc<Pool<Service>>,
    ) -> Self {
        Self {
            store: DirectoryServiceStore::new(StoreRole::Consumer, instance_name, pool),
            items: DashMap::new(),
            initial_seen: AtomicBool::new(false),
        }
    }

    pub(crate) fn register(&self, item: Arc<DirectoryItem>) {
        self.items.insert(item.handle, item);
    }

    pub(crate) fn unregister(&self, handle: u64) -> bool {
        self.items.remove(&handle).is_some()
    }

    pub(crate) fn snapshot(&self) -> Vec<Arc<DirectoryItem>> {
        self.items
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// Whether the initial network refresh has been applied.
    pub(crate) fn initial_seen(&self) -> bool {
        self.initial_seen.load(Ordering::Acquire)
    }

    pub(crate) fn mark_initial(&self) {
        self.initial_seen.store(true, Ordering::Release);
    }

    pub(crate) fn clear(&self) {
        self.items.clear();
        self.store.clear();
        self.initial_seen.store(false, Ordering::Release);
    }

    // ── Per-subscriber payload derivation ────────────────────────────

    /// Image for one subscriber out of the cache (registration replay and
    /// post-refresh fan-out). An empty image is still a valid response —
    /// the subscriber learns the directory holds nothing it asked for.
    pub(crate) fn refresh_for_item(&self, item: &DirectoryItem) -> RefreshMsg {
        let (services, achieved) = match self.scope(item) {
            Scope::All => self.store.filter_cache(item.filter, true, None),
            Scope::Service(id) => self.store.filter_cache(item.filter, true, Some(id)),
            Scope::Unknown => (Vec::new(), 0),
        };
        self.build_refresh(item, &services, achieved, self.store.directory_state())
    }

    /// Incremental fan-out of a submitted delta. `None` when nothing in
    /// the delta falls inside the subscriber's filter and scope.
    pub(crate) fn update_for_item(
        &self,
        item: &DirectoryItem,
        services: &[Service],
    ) -> Option<UpdateMsg> {
        let (filtered, achieved) = match self.scope(item) {
            Scope::All => self.store.filter_input(services, item.filter, false, None),
            Scope::Service(id) => {
                self.store
                    .filter_input(services, item.filter, false, Some(id))
            }
            Scope::Unknown => return None,
        };
        if filtered.is_empty() {
            return None;
        }

        let payload = match encode_pooled_services(&filtered) {
            Ok(map) => Payload::Map(map),
            Err(err) => {
                warn!(error = %AccessError::from(err), "directory update fan-out dropped");
                return None;
            }
        };
        Some(UpdateMsg {
            stream_id: DIRECTORY_STREAM_ID,
            domain: DomainType::Source,
            key: self.response_key(item, achieved),
            payload,
        })
    }

    fn build_refresh(
        &self,
        item: &DirectoryItem,
        services: &[Pooled<Service>],
        achieved: u32,
        state: State,
    ) -> RefreshMsg {
        let payload = match encode_pooled_services(services) {
            Ok(map) => Payload::Map(map),
            Err(err) => {
                warn!(error = %AccessError::from(err), "directory refresh fan-out truncated");
                Payload::None
            }
        };
        RefreshMsg {
            stream_id: DIRECTORY_STREAM_ID,
            domain: DomainType::Source,
            key: self.response_key(item, achieved),
            state,
            solicited: true,
            complete: true,
            clear_cache: false,
            payload,
        }
    }

    fn response_key(&self, item: &DirectoryItem, achieved: u32) -> MsgKey {
        let mut key = MsgKey::default().with_filter(achieved);
        if let Scope::Service(id) = self.scope(item) {
            key = key.with_service_id(id);
        }
        key
    }

    fn scope(&self, item: &DirectoryItem) -> Scope {
        if let Some(id) = item.service_id {
            return Scope::Service(id);
        }
        match &item.service_name {
            Some(name) => match self.store.service_id_by_name(name) {
                Some(id) => Scope::Service(id),
                None => Scope::Unknown,
            },
            None => Scope::All,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use ommlink_rdm::data::MapAction;
    use ommlink_rdm::directory::{
        DirectoryRefresh, ServiceInfo, ServiceState, filter_flags,
    };
    use pretty_assertions::assert_eq;

    struct Noop;
    impl ConsumerClient for Noop {}

    fn client() -> DirectoryCallbackClient {
        DirectoryCallbackClient::new("Test_1", Pool::new(8, Service::default))
    }

    fn item(filter: u32, service_name: Option<&str>) -> DirectoryItem {
        DirectoryItem {
            handle: 1,
            filter,
            service_id: None,
            service_name: service_name.map(str::to_owned),
            streaming: true,
            client: Arc::new(Noop),
            closure: None,
        }
    }

    fn seed(client: &DirectoryCallbackClient, id: u16, name: &str) {
        client.store.apply_services(&[Service {
            service_id: id,
            action: MapAction::Add,
            info: Some(ServiceInfo {
                service_name: name.to_owned(),
                ..ServiceInfo::default()
            }),
            state: Some(ServiceState::default()),
            ..Service::default()
        }]);
    }

    #[test]
    fn replay_respects_requested_filter() {
        let directory = client();
        seed(&directory, 10, "FEED");

        let subscriber = item(filter_flags::STATE, None);
        let refresh = directory.refresh_for_item(&subscriber);

        let decoded = DirectoryRefresh::from_refresh(&refresh).unwrap();
        assert_eq!(decoded.services.len(), 1);
        // Info was cached but not requested.
        assert!(decoded.services[0].info.is_none());
        assert!(decoded.services[0].state.is_some());
        assert_eq!(refresh.key.filter, Some(filter_flags::STATE));
    }

    #[test]
    fn name_scope_resolves_against_cache() {
        let directory = client();
        seed(&directory, 10, "FEED_A");
        seed(&directory, 11, "FEED_B");

        let subscriber = item(filter_flags::ALL, Some("FEED_B"));
        let refresh = directory.refresh_for_item(&subscriber);
        let decoded = DirectoryRefresh::from_refresh(&refresh).unwrap();
        assert_eq!(decoded.services.len(), 1);
        assert_eq!(decoded.services[0].service_id, 11);
        assert_eq!(refresh.key.service_id, Some(11));
    }

    #[test]
    fn unknown_name_scope_yields_empty_image() {
        let directory = client();
        seed(&directory, 10, "FEED");

        let subscriber = item(filter_flags::ALL, Some("NOT_THERE"));
        let refresh = directory.refresh_for_item(&subscriber);
        let decoded = DirectoryRefresh::from_refresh(&refresh).unwrap();
        assert!(decoded.services.is_empty());
    }

    #[test]
    fn update_outside_filter_is_suppressed() {
        let directory = client();
        seed(&directory, 10, "FEED");

        let delta = [Service {
            service_id: 10,
            action: MapAction::Update,
            load: Some(ommlink_rdm::directory::ServiceLoad {
                open_window: Some(5),
                ..Default::default()
            }),
            ..Service::default()
        }];

        let subscriber = item(filter_flags::STATE, None);
        assert!(directory.update_for_item(&subscriber, &delta).is_none());

        let wide = item(filter_flags::LOAD, None);
        let update = directory.update_for_item(&wide, &delta).expect("in filter");
        assert_eq!(update.key.filter, Some(filter_flags::LOAD));
    }

    #[test]
    fn initial_flag_flips_once() {
        let directory = client();
        assert!(!directory.initial_seen());
        directory.mark_initial();
        assert!(directory.initial_seen());
        directory.clear();
        assert!(!directory.initial_seen());
    }
}
