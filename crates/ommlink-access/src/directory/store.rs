// ── Directory service store ──
//
// Service name ↔ id bookkeeping plus the filter-scoped attribute cache.
// Incoming add/update/delete actions merge into the cache under one lock;
// responses are re-derived per subscriber through the requested filter
// mask. The merge rules follow the directory domain's update semantics:
//
//   - ADD inserts wholesale when the id is new and reconciles the
//     name → id maps.
//   - UPDATE with a filter whose own action is Update overlays only the
//     fields present in the delta; any other action replaces the filter
//     wholesale. Filters absent from the delta are never touched.
//   - Group entries always replace, never merge.
//   - DELETE drops the row and both name-map directions.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use tracing::{debug, warn};

use ommlink_rdm::data::{FilterAction, Map, MapAction, Payload};
use ommlink_rdm::directory::{
    DirectoryRefresh, Service, ServiceGroup, ServiceInfo, ServiceLink, ServiceLoad, ServiceState,
    filter_flags, filter_ids,
};
use ommlink_rdm::{RdmError, State};

use crate::directory::DirectoryCache;
use crate::error::{AccessError, ErrorCode};
use crate::pool::{Pool, Pooled};

/// Which side of the wire owns this store. Providers reject duplicate
/// service ids and names on ADD; consumers accept whatever the network
/// says and replace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StoreRole {
    Consumer,
    Provider,
}

/// Change notifications out of the store.
pub(crate) trait DirectoryStoreListener: Send + Sync {
    fn on_service_delete(&self, _service_id: u16) {}
    fn on_service_state_change(&self, _service_id: u16, _state: &ServiceState) {}
    fn on_service_group_change(&self, _service_id: u16, _groups: &[ServiceGroup]) {}
}

struct StoreInner {
    name_to_id: HashMap<String, u16>,
    id_to_name: HashMap<u16, String>,
    cache: DirectoryCache,
}

pub(crate) struct DirectoryServiceStore {
    role: StoreRole,
    instance_name: String,
    inner: Mutex<StoreInner>,
    pool: Arc<Pool<Service>>,
    listener: OnceLock<Arc<dyn DirectoryStoreListener>>,
}

impl DirectoryServiceStore {
    pub(crate) fn new(
        role: StoreRole,
        instance_name: impl Into<String>,
        pool: Arc<Pool<Service>>,
    ) -> Self {
        Self {
            role,
            instance_name: instance_name.into(),
            inner: Mutex::new(StoreInner {
                name_to_id: HashMap::new(),
                id_to_name: HashMap::new(),
                cache: DirectoryCache::new(),
            }),
            pool,
            listener: OnceLock::new(),
        }
    }

    /// Attach the change listener. Only the first call wins.
    pub(crate) fn set_listener(&self, listener: Arc<dyn DirectoryStoreListener>) {
        let _ = self.listener.set(listener);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StoreInner> {
        // A poisoned store lock means a callback panicked mid-merge; the
        // cache may be mid-transition but the maps are still usable.
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    // ── Name map ─────────────────────────────────────────────────────

    pub(crate) fn service_id_by_name(&self, name: &str) -> Option<u16> {
        self.lock().name_to_id.get(name).copied()
    }

    pub(crate) fn service_name_by_id(&self, service_id: u16) -> Option<String> {
        self.lock().id_to_name.get(&service_id).cloned()
    }

    pub(crate) fn service_count(&self) -> usize {
        self.lock().cache.len()
    }

    pub(crate) fn directory_state(&self) -> State {
        self.lock().cache.state.clone()
    }

    pub(crate) fn set_directory_state(&self, state: State) {
        self.lock().cache.state = state;
    }

    /// Whether the cached state filter allows new requests for a service.
    /// Unknown services do not accept requests.
    pub(crate) fn is_accepting_requests(&self, service_id: u16) -> bool {
        let inner = self.lock();
        match inner.cache.get(service_id) {
            Some(service) => match &service.state {
                Some(state) => state.service_up && state.accepting_requests.unwrap_or(true),
                None => true,
            },
            None => false,
        }
    }

    /// Seed the cache from configuration (provider API control).
    pub(crate) fn seed(&self, services: &[Service]) -> Result<(), AccessError> {
        let mut inner = self.lock();
        for service in services {
            if inner.cache.contains(service.service_id) {
                return Err(AccessError::usage(
                    ErrorCode::InvalidOperation,
                    format!(
                        "Attempt to add a service with Id of {} while a service with the same id is already added",
                        service.service_id
                    ),
                ));
            }
            map_service_name(&mut inner, service);
            inner.cache.put(normalized_row(service));
        }
        Ok(())
    }

    pub(crate) fn clear(&self) {
        let mut inner = self.lock();
        inner.name_to_id.clear();
        inner.id_to_name.clear();
        inner.cache.clear();
    }

    // ── Payload validation ───────────────────────────────────────────

    /// Validate a submitted directory payload and decode it into typed
    /// services. Mirrors the structural checks a submit must pass before
    /// any merge happens: UInt map keys, FilterList containers, a named
    /// Info filter on every ADD, no Info filter on UPDATE entries, and
    /// (for providers) no duplicate ids or names on ADD.
    pub(crate) fn decode_directory(&self, payload: &Payload) -> Result<Vec<Service>, AccessError> {
        let map = match payload {
            Payload::Map(map) => map,
            Payload::None => {
                warn!(
                    instance = %self.instance_name,
                    "submitted source directory contains no payload"
                );
                return Ok(Vec::new());
            }
            other => {
                return Err(AccessError::usage(
                    ErrorCode::InvalidArgument,
                    format!(
                        "Attempt to specify SourceDirectory with a container of {} rather than the expected Map",
                        other.data_type()
                    ),
                ));
            }
        };

        if map.is_empty() {
            warn!(
                instance = %self.instance_name,
                "submitted SourceDirectory map contains no entries"
            );
            return Ok(Vec::new());
        }

        if map.key_type() != Some(ommlink_rdm::DataType::UInt) {
            return Err(AccessError::usage(
                ErrorCode::InvalidArgument,
                format!(
                    "Attempt to specify SourceDirectory with a Map using key DataType of {} while the expected key DataType is UInt",
                    map.key_type().map_or_else(|| "NoData".to_owned(), |t| t.to_string())
                ),
            ));
        }

        let mut services = Vec::with_capacity(map.len());
        for entry in map {
            if entry.action != MapAction::Delete
                && entry.payload.as_filter_list().is_none()
            {
                return Err(AccessError::usage(
                    ErrorCode::InvalidArgument,
                    format!(
                        "Attempt to specify Service with a container of {} rather than the expected FilterList",
                        entry.payload.data_type()
                    ),
                ));
            }

            if entry.action == MapAction::Update {
                if let Some(filter_list) = entry.payload.as_filter_list() {
                    if filter_list.find(filter_ids::INFO).is_some() {
                        return Err(AccessError::usage(
                            ErrorCode::InvalidOperation,
                            format!(
                                "Attempt to update Info filter of service with id of {} while this is not allowed",
                                entry.key.as_uint().unwrap_or_default()
                            ),
                        ));
                    }
                }
            }

            let service = Service::from_map_entry(entry).map_err(AccessError::from)?;

            match service.action {
                MapAction::Add => self.check_add(&service)?,
                MapAction::Update | MapAction::Delete => {}
            }

            services.push(service);
        }
        Ok(services)
    }

    fn check_add(&self, service: &Service) -> Result<(), AccessError> {
        let Some(name) = service.name() else {
            return Err(AccessError::usage(
                ErrorCode::InvalidArgument,
                format!(
                    "Attempt to specify service Info filter without required Service Name for service id of {}",
                    service.service_id
                ),
            ));
        };

        if self.role == StoreRole::Provider {
            let inner = self.lock();
            if let Some(existing) = inner.id_to_name.get(&service.service_id) {
                return Err(AccessError::usage(
                    ErrorCode::InvalidOperation,
                    format!(
                        "Attempt to add a service with name of {existing} and Id of {} while a service with the same id is already added",
                        service.service_id
                    ),
                ));
            }
            if inner.name_to_id.contains_key(name) {
                return Err(AccessError::usage(
                    ErrorCode::InvalidOperation,
                    format!(
                        "Attempt to add a service with name of {name} and Id of {} while a service with the same name is already added",
                        service.service_id
                    ),
                ));
            }
        }
        Ok(())
    }

    // ── Merge ────────────────────────────────────────────────────────

    /// Apply a typed refresh: optionally clear, then merge its services
    /// and record the refresh stream state.
    pub(crate) fn apply_refresh(&self, refresh: &DirectoryRefresh) {
        if refresh.clear_cache {
            self.clear();
        }
        self.set_directory_state(refresh.state.clone());
        self.apply_services(&refresh.services);
    }

    /// Merge a batch of service actions into the cache.
    pub(crate) fn apply_services(&self, services: &[Service]) {
        for service in services {
            match service.action {
                MapAction::Add => self.apply_add(service),
                MapAction::Update => self.apply_update(service),
                MapAction::Delete => self.apply_delete(service.service_id),
            }
        }
    }

    fn apply_add(&self, submitted: &Service) {
        let (state_change, group_change) = {
            let mut inner = self.lock();
            map_service_name(&mut inner, submitted);
            if !inner.cache.contains(submitted.service_id) {
                inner.cache.put(normalized_row(submitted));
                debug!(
                    instance = %self.instance_name,
                    service_id = submitted.service_id,
                    name = submitted.name().unwrap_or(""),
                    "service added to directory cache"
                );
            }
            (notify_state(submitted), notify_groups(submitted))
        };
        self.fire(submitted, state_change, group_change);
    }

    fn apply_update(&self, submitted: &Service) {
        let (state_change, group_change) = {
            let mut inner = self.lock();
            map_service_name(&mut inner, submitted);
            let Some(row) = inner.cache.get_mut(submitted.service_id) else {
                debug!(
                    instance = %self.instance_name,
                    service_id = submitted.service_id,
                    "update for unknown service ignored"
                );
                return;
            };
            merge_service(row, submitted);
            (notify_state(submitted), notify_groups(submitted))
        };
        self.fire(submitted, state_change, group_change);
    }

    fn apply_delete(&self, service_id: u16) {
        {
            let mut inner = self.lock();
            if let Some(name) = inner.id_to_name.remove(&service_id) {
                inner.name_to_id.remove(&name);
            }
            inner.cache.remove(service_id);
        }
        if let Some(listener) = self.listener.get() {
            listener.on_service_delete(service_id);
        }
    }

    fn fire(&self, submitted: &Service, state_change: bool, group_change: bool) {
        let Some(listener) = self.listener.get() else {
            return;
        };
        if state_change {
            if let Some(state) = &submitted.state {
                listener.on_service_state_change(submitted.service_id, state);
            }
        }
        if group_change {
            listener.on_service_group_change(submitted.service_id, &submitted.groups);
        }
    }

    // ── Filter reconstruction ────────────────────────────────────────

    /// Derive a response service list from the cache for one subscriber.
    /// Returns the pooled services plus the achieved filter mask.
    pub(crate) fn filter_cache(
        &self,
        filter: u32,
        initial: bool,
        scope: Option<u16>,
    ) -> (Vec<Pooled<Service>>, u32) {
        let inner = self.lock();
        filter_service_iter(&self.pool, inner.cache.services(), filter, initial, scope)
    }

    /// Derive a response service list from a submitted delta (ongoing
    /// update fan-out) rather than the cache.
    pub(crate) fn filter_input(
        &self,
        input: &[Service],
        filter: u32,
        initial: bool,
        scope: Option<u16>,
    ) -> (Vec<Pooled<Service>>, u32) {
        filter_service_iter(&self.pool, input.iter(), filter, initial, scope)
    }

    /// Build the provider's full refresh payload from the cache.
    pub(crate) fn refresh_from_cache(&self, filter: u32) -> Result<(Map, u32, State), AccessError> {
        let (services, achieved) = self.filter_cache(filter, true, None);
        let map = encode_pooled_services(&services)?;
        Ok((map, achieved, self.directory_state()))
    }
}

// ── Merge helpers ───────────────────────────────────────────────────

fn notify_state(submitted: &Service) -> bool {
    submitted
        .state
        .as_ref()
        .is_some_and(|s| s.action != FilterAction::Clear)
}

fn notify_groups(submitted: &Service) -> bool {
    !submitted.groups.is_empty()
}

/// A cache row is always an existing service, whatever action the message
/// that created it carried.
fn normalized_row(submitted: &Service) -> Service {
    let mut row = submitted.clone();
    row.action = MapAction::Add;
    row
}

fn map_service_name(inner: &mut StoreInner, service: &Service) {
    let Some(name) = service.name() else {
        return;
    };
    // Reconcile renames: drop the stale forward mapping when this id was
    // previously known under another name, and the stale reverse mapping
    // when the name pointed at another id.
    if let Some(old_name) = inner.id_to_name.get(&service.service_id) {
        if old_name != name {
            let old_name = old_name.clone();
            inner.name_to_id.remove(&old_name);
        }
    }
    inner.name_to_id.insert(name.to_owned(), service.service_id);
    inner.id_to_name.insert(service.service_id, name.to_owned());
}

/// Merge one submitted service into its cache row, filter by filter.
fn merge_service(row: &mut Service, submitted: &Service) {
    if let Some(delta) = &submitted.info {
        match row.info.as_mut() {
            Some(cached) if delta.action == FilterAction::Update => overlay_info(cached, delta),
            _ => row.info = Some(delta.clone()),
        }
    }

    if let Some(delta) = &submitted.state {
        match row.state.as_mut() {
            Some(cached) if delta.action == FilterAction::Update => overlay_state(cached, delta),
            _ => row.state = Some(delta.clone()),
        }
    }

    if let Some(delta) = &submitted.load {
        match row.load.as_mut() {
            Some(cached) if delta.action == FilterAction::Update => overlay_load(cached, delta),
            _ => row.load = Some(*delta),
        }
    }

    if let Some(delta) = &submitted.link {
        match row.link.as_mut() {
            Some(cached) if delta.action == FilterAction::Update => overlay_links(cached, delta),
            _ => row.link = Some(delta.clone()),
        }
    }

    if let Some(delta) = &submitted.data {
        // No sub-fields to overlay; the data filter always replaces.
        row.data = Some(delta.clone());
    }

    // Group states never merge.
    if !submitted.groups.is_empty() {
        row.groups = submitted.groups.clone();
    }
}

fn overlay_info(cached: &mut ServiceInfo, delta: &ServiceInfo) {
    cached.service_name = delta.service_name.clone();
    if delta.vendor.is_some() {
        cached.vendor = delta.vendor.clone();
    }
    if delta.is_source.is_some() {
        cached.is_source = delta.is_source;
    }
    if !delta.capabilities.is_empty() {
        cached.capabilities = delta.capabilities.clone();
    }
    if !delta.dictionaries_provided.is_empty() {
        cached.dictionaries_provided = delta.dictionaries_provided.clone();
    }
    if !delta.dictionaries_used.is_empty() {
        cached.dictionaries_used = delta.dictionaries_used.clone();
    }
    if !delta.qos.is_empty() {
        cached.qos = delta.qos.clone();
    }
    if delta.supports_qos_range.is_some() {
        cached.supports_qos_range = delta.supports_qos_range;
    }
    if delta.item_list.is_some() {
        cached.item_list = delta.item_list.clone();
    }
    if delta.accepting_consumer_status.is_some() {
        cached.accepting_consumer_status = delta.accepting_consumer_status;
    }
}

fn overlay_state(cached: &mut ServiceState, delta: &ServiceState) {
    cached.service_up = delta.service_up;
    if delta.accepting_requests.is_some() {
        cached.accepting_requests = delta.accepting_requests;
    }
    if delta.status.is_some() {
        cached.status = delta.status.clone();
    }
}

fn overlay_load(cached: &mut ServiceLoad, delta: &ServiceLoad) {
    if delta.open_limit.is_some() {
        cached.open_limit = delta.open_limit;
    }
    if delta.open_window.is_some() {
        cached.open_window = delta.open_window;
    }
    if delta.load_factor.is_some() {
        cached.load_factor = delta.load_factor;
    }
}

/// Link lists merge by link name: known names update field-wise, unknown
/// names append.
fn overlay_links(cached: &mut ServiceLink, delta: &ServiceLink) {
    for submitted in &delta.links {
        match cached.links.iter_mut().find(|l| l.name == submitted.name) {
            Some(existing) => {
                if submitted.link_type.is_some() {
                    existing.link_type = submitted.link_type;
                }
                if submitted.link_code.is_some() {
                    existing.link_code = submitted.link_code;
                }
                if submitted.text.is_some() {
                    existing.text = submitted.text.clone();
                }
                existing.link_state = submitted.link_state;
            }
            None => cached.links.push(submitted.clone()),
        }
    }
}

// ── Filter reconstruction helpers ───────────────────────────────────

fn filter_service_iter<'a>(
    pool: &Arc<Pool<Service>>,
    input: impl Iterator<Item = &'a Service>,
    filter: u32,
    initial: bool,
    scope: Option<u16>,
) -> (Vec<Pooled<Service>>, u32) {
    let mut output = Vec::new();
    let mut achieved = 0;

    for service in input {
        if let Some(scope_id) = scope {
            if service.service_id != scope_id {
                continue;
            }
        }

        let mut response = pool.get();
        if service.action == MapAction::Delete {
            // Deletions pass through untouched regardless of the mask.
            response.service_id = service.service_id;
            response.action = MapAction::Delete;
            output.push(response);
            continue;
        }

        let applied = apply_directory_service(filter, initial, service, &mut response);
        if applied != 0 {
            achieved |= applied;
            output.push(response);
        }
        // Services contributing nothing drop here and their pooled object
        // returns to the free list.
    }

    (output, achieved)
}

/// Copy onto `response` only the filters `service` has AND the caller
/// requested, tagging each with action Set on an initial response.
/// Returns the achieved filter mask; zero means the service contributed
/// nothing.
pub(crate) fn apply_directory_service(
    filter: u32,
    initial: bool,
    service: &Service,
    response: &mut Service,
) -> u32 {
    let mut achieved = 0;

    if let Some(info) = &service.info {
        if filter & filter_flags::INFO != 0 {
            let mut copy = info.clone();
            if initial {
                copy.action = FilterAction::Set;
            }
            response.info = Some(copy);
            achieved |= filter_flags::INFO;
        }
    }

    if let Some(state) = &service.state {
        if filter & filter_flags::STATE != 0 {
            let mut copy = state.clone();
            if initial {
                copy.action = FilterAction::Set;
            }
            response.state = Some(copy);
            achieved |= filter_flags::STATE;
        }
    }

    if let Some(load) = &service.load {
        if filter & filter_flags::LOAD != 0 {
            let mut copy = *load;
            if initial {
                copy.action = FilterAction::Set;
            }
            response.load = Some(copy);
            achieved |= filter_flags::LOAD;
        }
    }

    if let Some(link) = &service.link {
        if filter & filter_flags::LINK != 0 {
            let mut copy = link.clone();
            if initial {
                copy.action = FilterAction::Set;
            }
            response.link = Some(copy);
            achieved |= filter_flags::LINK;
        }
    }

    if let Some(data) = &service.data {
        if filter & filter_flags::DATA != 0 {
            let mut copy = data.clone();
            if initial {
                copy.action = FilterAction::Set;
            }
            response.data = Some(copy);
            achieved |= filter_flags::DATA;
        }
    }

    if !service.groups.is_empty() && filter & filter_flags::GROUP != 0 {
        response.groups = service.groups.clone();
        achieved |= filter_flags::GROUP;
    }

    if achieved != 0 {
        response.service_id = service.service_id;
        response.action = if initial {
            MapAction::Add
        } else {
            service.action
        };
    }

    achieved
}

/// Encode pooled response services into the wire-shaped Map payload.
pub(crate) fn encode_pooled_services(services: &[Pooled<Service>]) -> Result<Map, RdmError> {
    let mut builder = Map::builder();
    for service in services {
        let entry = service.to_map_entry();
        builder = builder.entry(entry.key, entry.action, entry.payload);
    }
    builder.complete()
}

// ── Tests ───────────────────────────────────────────────────────────
