//! Typed views of the source directory domain.
//!
//! On the wire a directory payload is a Map keyed by service id; each
//! entry carries a FilterList whose entries hold the filter bundles
//! (info/state/load/link/data, plus repeated group entries). The types
//! here round-trip between that container shape and `Service`, so the
//! cache and merge logic upstream work on fields, not containers.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::data::{
    ElementList, FilterAction, FilterEntry, FilterList, Map, MapAction, MapEntry, MapKey, Payload,
    Value,
};
use crate::error::RdmError;
use crate::msg::{DomainType, Message, MsgKey, RefreshMsg, RequestMsg, UpdateMsg};
use crate::state::{Qos, State};

/// Filter mask bits a caller may request.
pub mod filter_flags {
    pub const INFO: u32 = 0x01;
    pub const STATE: u32 = 0x02;
    pub const GROUP: u32 = 0x04;
    pub const LOAD: u32 = 0x08;
    pub const DATA: u32 = 0x10;
    pub const LINK: u32 = 0x20;
    pub const ALL: u32 = INFO | STATE | GROUP | LOAD | DATA | LINK;
}

/// Filter entry ids as they appear in the FilterList.
pub mod filter_ids {
    pub const INFO: u8 = 1;
    pub const STATE: u8 = 2;
    pub const GROUP: u8 = 3;
    pub const LOAD: u8 = 4;
    pub const DATA: u8 = 5;
    pub const LINK: u8 = 6;
}

/// Element names used by the directory domain.
pub mod names {
    pub const NAME: &str = "Name";
    pub const VENDOR: &str = "Vendor";
    pub const IS_SOURCE: &str = "IsSource";
    pub const CAPABILITIES: &str = "Capabilities";
    pub const DICTIONARIES_PROVIDED: &str = "DictionariesProvided";
    pub const DICTIONARIES_USED: &str = "DictionariesUsed";
    pub const QOS: &str = "QoS";
    pub const SUPPORTS_QOS_RANGE: &str = "SupportsQoSRange";
    pub const ITEM_LIST: &str = "ItemList";
    pub const ACCEPTING_CONSUMER_STATUS: &str = "AcceptingConsumerStatus";
    pub const SERVICE_STATE: &str = "ServiceState";
    pub const ACCEPTING_REQUESTS: &str = "AcceptingRequests";
    pub const STATUS: &str = "Status";
    pub const OPEN_LIMIT: &str = "OpenLimit";
    pub const OPEN_WINDOW: &str = "OpenWindow";
    pub const LOAD_FACTOR: &str = "LoadFactor";
    pub const TYPE: &str = "Type";
    pub const LINK_STATE: &str = "LinkState";
    pub const LINK_CODE: &str = "LinkCode";
    pub const TEXT: &str = "Text";
    pub const DATA: &str = "Data";
    pub const GROUP: &str = "Group";
    pub const MERGED_TO_GROUP: &str = "MergedToGroup";
}

// ── Filter bundles ──────────────────────────────────────────────────

/// Info filter: identity and capabilities of a service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ServiceInfo {
    pub action: FilterAction,
    pub service_name: String,
    pub vendor: Option<String>,
    pub is_source: Option<bool>,
    /// Domain ids this service can serve.
    pub capabilities: Vec<u8>,
    pub dictionaries_provided: Vec<String>,
    pub dictionaries_used: Vec<String>,
    pub qos: Vec<Qos>,
    pub supports_qos_range: Option<bool>,
    pub item_list: Option<String>,
    pub accepting_consumer_status: Option<bool>,
}

/// State filter: availability of a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceState {
    pub action: FilterAction,
    pub service_up: bool,
    pub accepting_requests: Option<bool>,
    pub status: Option<State>,
}

impl Default for ServiceState {
    fn default() -> Self {
        Self {
            action: FilterAction::default(),
            service_up: true,
            accepting_requests: None,
            status: None,
        }
    }
}

/// Load filter: advertised capacity hints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ServiceLoad {
    pub action: FilterAction,
    pub open_limit: Option<u64>,
    pub open_window: Option<u64>,
    pub load_factor: Option<u64>,
}

/// One named link inside the link filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LinkEntry {
    pub name: String,
    pub link_type: Option<u64>,
    pub link_state: u64,
    pub link_code: Option<u64>,
    pub text: Option<String>,
}

/// Link filter: upstream connections feeding this service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ServiceLink {
    pub action: FilterAction,
    pub links: Vec<LinkEntry>,
}

/// Data filter: broadcast payload attached to the whole service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ServiceData {
    pub action: FilterAction,
    pub data: Bytes,
}

/// Group filter entry: item-group state change. Never merged — each
/// occurrence replaces whatever a consumer held for the group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ServiceGroup {
    pub action: FilterAction,
    pub group: Bytes,
    pub merged_to_group: Option<Bytes>,
    pub status: Option<State>,
}

// ── Service ─────────────────────────────────────────────────────────

/// One advertised service: its id, map action, and whichever filter
/// bundles the message carried. Absent bundles are `None`, which is what
/// the merge logic upstream keys on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Service {
    pub service_id: u16,
    pub action: MapAction,
    pub info: Option<ServiceInfo>,
    pub state: Option<ServiceState>,
    pub load: Option<ServiceLoad>,
    pub link: Option<ServiceLink>,
    pub data: Option<ServiceData>,
    pub groups: Vec<ServiceGroup>,
}

impl Service {
    pub fn name(&self) -> Option<&str> {
        self.info.as_ref().map(|i| i.service_name.as_str())
    }

    /// Filter mask describing which bundles are present.
    pub fn present_filters(&self) -> u32 {
        let mut mask = 0;
        if self.info.is_some() {
            mask |= filter_flags::INFO;
        }
        if self.state.is_some() {
            mask |= filter_flags::STATE;
        }
        if self.load.is_some() {
            mask |= filter_flags::LOAD;
        }
        if self.link.is_some() {
            mask |= filter_flags::LINK;
        }
        if self.data.is_some() {
            mask |= filter_flags::DATA;
        }
        if !self.groups.is_empty() {
            mask |= filter_flags::GROUP;
        }
        mask
    }

    /// Reset to the empty state, keeping allocations where possible.
    /// Pooled instances are cleared through this before reuse.
    pub fn clear(&mut self) {
        self.service_id = 0;
        self.action = MapAction::Add;
        self.info = None;
        self.state = None;
        self.load = None;
        self.link = None;
        self.data = None;
        self.groups.clear();
    }

    // ── Container encode ─────────────────────────────────────────────

    /// Encode into a map entry keyed by service id.
    pub fn to_map_entry(&self) -> MapEntry {
        let payload = if self.action == MapAction::Delete {
            Payload::None
        } else {
            Payload::FilterList(self.to_filter_list())
        };
        MapEntry {
            key: MapKey::UInt(u64::from(self.service_id)),
            action: self.action,
            payload,
        }
    }

    fn to_filter_list(&self) -> FilterList {
        let mut builder = FilterList::builder();

        if let Some(info) = &self.info {
            builder = builder.entry(
                filter_ids::INFO,
                info.action,
                Payload::ElementList(encode_info(info)),
            );
        }
        if let Some(state) = &self.state {
            builder = builder.entry(
                filter_ids::STATE,
                state.action,
                Payload::ElementList(encode_state(state)),
            );
        }
        if let Some(load) = &self.load {
            builder = builder.entry(
                filter_ids::LOAD,
                load.action,
                Payload::ElementList(encode_load(load)),
            );
        }
        if let Some(link) = &self.link {
            builder = builder.entry(filter_ids::LINK, link.action, encode_links(link));
        }
        if let Some(data) = &self.data {
            builder = builder.entry(
                filter_ids::DATA,
                data.action,
                Payload::ElementList(
                    ElementList::builder()
                        .buffer(names::DATA, data.data.clone())
                        .complete(),
                ),
            );
        }
        for group in &self.groups {
            builder = builder.entry(
                filter_ids::GROUP,
                group.action,
                Payload::ElementList(encode_group(group)),
            );
        }

        builder.complete()
    }

    // ── Container decode ─────────────────────────────────────────────

    /// Decode a map entry back into a service.
    pub fn from_map_entry(entry: &MapEntry) -> Result<Self, RdmError> {
        let raw_id = entry.key.as_uint().ok_or_else(|| RdmError::UnexpectedPayload(
            format!("service map key must be UInt, got {}", entry.key.data_type()),
        ))?;
        let service_id =
            u16::try_from(raw_id).map_err(|_| RdmError::InvalidValue {
                field: "service_id",
                reason: format!("{raw_id} exceeds the service id range"),
            })?;

        let mut service = Service {
            service_id,
            action: entry.action,
            ..Service::default()
        };

        if entry.action == MapAction::Delete {
            return Ok(service);
        }

        let filter_list = entry.payload.as_filter_list().ok_or_else(|| {
            RdmError::UnexpectedPayload(format!(
                "service entry must carry a FilterList, got {}",
                entry.payload.data_type()
            ))
        })?;

        for filter in filter_list {
            service.apply_filter_entry(filter)?;
        }
        Ok(service)
    }

    fn apply_filter_entry(&mut self, entry: &FilterEntry) -> Result<(), RdmError> {
        match entry.id {
            filter_ids::INFO => {
                self.info = Some(decode_info(entry)?);
            }
            filter_ids::STATE => {
                self.state = Some(decode_state(entry)?);
            }
            filter_ids::LOAD => {
                self.load = Some(decode_load(entry)?);
            }
            filter_ids::LINK => {
                self.link = Some(decode_links(entry)?);
            }
            filter_ids::DATA => {
                let el = require_element_list(entry)?;
                self.data = Some(ServiceData {
                    action: entry.action,
                    data: el.buffer(names::DATA).cloned().unwrap_or_default(),
                });
            }
            filter_ids::GROUP => {
                self.groups.push(decode_group(entry)?);
            }
            _ => {
                // Unknown filter ids are ignored; newer peers may advertise
                // filters this build does not model.
            }
        }
        Ok(())
    }
}

// ── Per-filter encode/decode helpers ────────────────────────────────

fn encode_info(info: &ServiceInfo) -> ElementList {
    ElementList::builder()
        .ascii(names::NAME, info.service_name.clone())
        .opt(names::VENDOR, info.vendor.clone().map(Value::Ascii))
        .opt(
            names::IS_SOURCE,
            info.is_source.map(|v| Value::UInt(u64::from(v))),
        )
        .array(
            names::CAPABILITIES,
            crate::data::OmmArray::from_uints(info.capabilities.iter().map(|c| u64::from(*c))),
        )
        .array(
            names::DICTIONARIES_PROVIDED,
            crate::data::OmmArray::from_asciis(info.dictionaries_provided.clone()),
        )
        .array(
            names::DICTIONARIES_USED,
            crate::data::OmmArray::from_asciis(info.dictionaries_used.clone()),
        )
        .array(names::QOS, crate::data::OmmArray::from_qos(info.qos.clone()))
        .opt(
            names::SUPPORTS_QOS_RANGE,
            info.supports_qos_range.map(|v| Value::UInt(u64::from(v))),
        )
        .opt(names::ITEM_LIST, info.item_list.clone().map(Value::Ascii))
        .opt(
            names::ACCEPTING_CONSUMER_STATUS,
            info.accepting_consumer_status
                .map(|v| Value::UInt(u64::from(v))),
        )
        .complete()
}

fn decode_info(entry: &FilterEntry) -> Result<ServiceInfo, RdmError> {
    let el = require_element_list(entry)?;
    let service_name = el.ascii(names::NAME)?.to_owned();
    if service_name.is_empty() {
        return Err(RdmError::InvalidValue {
            field: "Name",
            reason: "service name must not be blank".into(),
        });
    }

    let capabilities = match el.array(names::CAPABILITIES) {
        Ok(arr) => arr
            .uints()?
            .into_iter()
            .map(|v| {
                u8::try_from(v).map_err(|_| RdmError::InvalidValue {
                    field: "Capabilities",
                    reason: format!("{v} is not a valid domain id"),
                })
            })
            .collect::<Result<Vec<_>, _>>()?,
        Err(_) => Vec::new(),
    };

    Ok(ServiceInfo {
        action: entry.action,
        service_name,
        vendor: el.ascii(names::VENDOR).ok().map(str::to_owned),
        is_source: el.uint(names::IS_SOURCE).ok().map(|v| v != 0),
        capabilities,
        dictionaries_provided: el
            .array(names::DICTIONARIES_PROVIDED)
            .ok()
            .map(crate::data::OmmArray::asciis)
            .transpose()?
            .unwrap_or_default(),
        dictionaries_used: el
            .array(names::DICTIONARIES_USED)
            .ok()
            .map(crate::data::OmmArray::asciis)
            .transpose()?
            .unwrap_or_default(),
        qos: el
            .array(names::QOS)
            .ok()
            .map(crate::data::OmmArray::qos_entries)
            .transpose()?
            .unwrap_or_default(),
        supports_qos_range: el.uint(names::SUPPORTS_QOS_RANGE).ok().map(|v| v != 0),
        item_list: el.ascii(names::ITEM_LIST).ok().map(str::to_owned),
        accepting_consumer_status: el
            .uint(names::ACCEPTING_CONSUMER_STATUS)
            .ok()
            .map(|v| v != 0),
    })
}

fn encode_state(state: &ServiceState) -> ElementList {
    ElementList::builder()
        .uint(names::SERVICE_STATE, u64::from(state.service_up))
        .opt(
            names::ACCEPTING_REQUESTS,
            state.accepting_requests.map(|v| Value::UInt(u64::from(v))),
        )
        .opt(names::STATUS, state.status.clone().map(Value::State))
        .complete()
}

fn decode_state(entry: &FilterEntry) -> Result<ServiceState, RdmError> {
    let el = require_element_list(entry)?;
    Ok(ServiceState {
        action: entry.action,
        service_up: el.uint(names::SERVICE_STATE)? != 0,
        accepting_requests: el.uint(names::ACCEPTING_REQUESTS).ok().map(|v| v != 0),
        status: el.state(names::STATUS).ok().cloned(),
    })
}

fn encode_load(load: &ServiceLoad) -> ElementList {
    ElementList::builder()
        .opt(names::OPEN_LIMIT, load.open_limit.map(Value::UInt))
        .opt(names::OPEN_WINDOW, load.open_window.map(Value::UInt))
        .opt(names::LOAD_FACTOR, load.load_factor.map(Value::UInt))
        .complete()
}

fn decode_load(entry: &FilterEntry) -> Result<ServiceLoad, RdmError> {
    let el = require_element_list(entry)?;
    Ok(ServiceLoad {
        action: entry.action,
        open_limit: el.uint(names::OPEN_LIMIT).ok(),
        open_window: el.uint(names::OPEN_WINDOW).ok(),
        load_factor: el.uint(names::LOAD_FACTOR).ok(),
    })
}

fn encode_links(link: &ServiceLink) -> Payload {
    let mut builder = Map::builder();
    for entry in &link.links {
        let el = ElementList::builder()
            .opt(names::TYPE, entry.link_type.map(Value::UInt))
            .uint(names::LINK_STATE, entry.link_state)
            .opt(names::LINK_CODE, entry.link_code.map(Value::UInt))
            .opt(names::TEXT, entry.text.clone().map(Value::Ascii))
            .complete();
        builder = builder.add(MapKey::Ascii(entry.name.clone()), Payload::ElementList(el));
    }
    // Link names are homogeneous ascii keys; the builder cannot fail here.
    Payload::Map(builder.complete().unwrap_or_default())
}

fn decode_links(entry: &FilterEntry) -> Result<ServiceLink, RdmError> {
    let map = entry.payload.as_map().ok_or_else(|| {
        RdmError::UnexpectedPayload(format!(
            "link filter must carry a Map, got {}",
            entry.payload.data_type()
        ))
    })?;

    let mut links = Vec::with_capacity(map.len());
    for map_entry in map {
        let name = map_entry
            .key
            .as_ascii()
            .ok_or_else(|| RdmError::UnexpectedPayload("link key must be Ascii".into()))?
            .to_owned();
        if map_entry.action == MapAction::Delete {
            continue;
        }
        let el = map_entry.payload.as_element_list().ok_or_else(|| {
            RdmError::UnexpectedPayload("link entry must carry an ElementList".into())
        })?;
        links.push(LinkEntry {
            name,
            link_type: el.uint(names::TYPE).ok(),
            link_state: el.uint(names::LINK_STATE).unwrap_or(0),
            link_code: el.uint(names::LINK_CODE).ok(),
            text: el.ascii(names::TEXT).ok().map(str::to_owned),
        });
    }

    Ok(ServiceLink {
        action: entry.action,
        links,
    })
}

fn encode_group(group: &ServiceGroup) -> ElementList {
    ElementList::builder()
        .buffer(names::GROUP, group.group.clone())
        .opt(
            names::MERGED_TO_GROUP,
            group.merged_to_group.clone().map(Value::Buffer),
        )
        .opt(names::STATUS, group.status.clone().map(Value::State))
        .complete()
}

fn decode_group(entry: &FilterEntry) -> Result<ServiceGroup, RdmError> {
    let el = require_element_list(entry)?;
    Ok(ServiceGroup {
        action: entry.action,
        group: el.buffer(names::GROUP)?.clone(),
        merged_to_group: el.buffer(names::MERGED_TO_GROUP).ok().cloned(),
        status: el.state(names::STATUS).ok().cloned(),
    })
}

fn require_element_list(entry: &FilterEntry) -> Result<&ElementList, RdmError> {
    entry.payload.as_element_list().ok_or_else(|| {
        RdmError::UnexpectedPayload(format!(
            "filter entry {} must carry an ElementList, got {}",
            entry.id,
            entry.payload.data_type()
        ))
    })
}

// ── Directory messages ──────────────────────────────────────────────

/// Consumer directory subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryRequest {
    pub stream_id: i32,
    pub filter: u32,
    pub service_id: Option<u16>,
    pub service_name: Option<String>,
    pub streaming: bool,
}

impl Default for DirectoryRequest {
    fn default() -> Self {
        Self {
            stream_id: 0,
            filter: filter_flags::INFO | filter_flags::STATE | filter_flags::GROUP,
            service_id: None,
            service_name: None,
            streaming: true,
        }
    }
}

impl DirectoryRequest {
    pub fn to_message(&self) -> Message {
        let mut key = MsgKey::default().with_filter(self.filter);
        if let Some(id) = self.service_id {
            key = key.with_service_id(id);
        }
        if let Some(name) = &self.service_name {
            key = key.with_service_name(name.clone());
        }
        Message::Request(RequestMsg {
            stream_id: self.stream_id,
            domain: DomainType::Source,
            key,
            streaming: self.streaming,
            priority: None,
            payload: Payload::None,
        })
    }

    pub fn from_request(msg: &RequestMsg) -> Self {
        Self {
            stream_id: msg.stream_id,
            filter: msg.key.filter.unwrap_or(filter_flags::ALL),
            service_id: msg.key.service_id,
            service_name: msg.key.service_name.clone(),
            streaming: msg.streaming,
        }
    }
}

/// Full directory image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectoryRefresh {
    pub stream_id: i32,
    pub state: State,
    pub filter: u32,
    pub solicited: bool,
    pub clear_cache: bool,
    pub services: Vec<Service>,
}

impl Default for DirectoryRefresh {
    fn default() -> Self {
        Self {
            stream_id: 0,
            state: State::open_ok("Source Directory Refresh Completed"),
            filter: 0,
            solicited: true,
            clear_cache: true,
            services: Vec::new(),
        }
    }
}

impl DirectoryRefresh {
    pub fn to_message(&self) -> Result<Message, RdmError> {
        Ok(Message::Refresh(RefreshMsg {
            stream_id: self.stream_id,
            domain: DomainType::Source,
            key: MsgKey::default().with_filter(self.filter),
            state: self.state.clone(),
            solicited: self.solicited,
            complete: true,
            clear_cache: self.clear_cache,
            payload: Payload::Map(encode_services(&self.services)?),
        }))
    }

    pub fn from_refresh(msg: &RefreshMsg) -> Result<Self, RdmError> {
        Ok(Self {
            stream_id: msg.stream_id,
            state: msg.state.clone(),
            filter: msg.key.filter.unwrap_or(0),
            solicited: msg.solicited,
            clear_cache: msg.clear_cache,
            services: decode_services(&msg.payload)?,
        })
    }
}

/// Incremental directory change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DirectoryUpdate {
    pub stream_id: i32,
    pub filter: u32,
    pub services: Vec<Service>,
}

impl DirectoryUpdate {
    pub fn to_message(&self) -> Result<Message, RdmError> {
        Ok(Message::Update(UpdateMsg {
            stream_id: self.stream_id,
            domain: DomainType::Source,
            key: MsgKey::default().with_filter(self.filter),
            payload: Payload::Map(encode_services(&self.services)?),
        }))
    }

    pub fn from_update(msg: &UpdateMsg) -> Result<Self, RdmError> {
        Ok(Self {
            stream_id: msg.stream_id,
            filter: msg.key.filter.unwrap_or(0),
            services: decode_services(&msg.payload)?,
        })
    }
}

/// Encode a service list into the wire-shaped Map payload.
pub fn encode_services(services: &[Service]) -> Result<Map, RdmError> {
    let mut builder = Map::builder();
    for service in services {
        let entry = service.to_map_entry();
        builder = builder.entry(entry.key, entry.action, entry.payload);
    }
    builder.complete()
}

/// Decode a directory payload back into services.
pub fn decode_services(payload: &Payload) -> Result<Vec<Service>, RdmError> {
    match payload {
        Payload::None => Ok(Vec::new()),
        Payload::Map(map) => map.iter().map(Service::from_map_entry).collect(),
        other => Err(RdmError::UnexpectedPayload(format!(
            "directory payload must be a Map, got {}",
            other.data_type()
        ))),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::state::StatusCode;
    use pretty_assertions::assert_eq;

    pub(crate) fn sample_service(id: u16, name: &str) -> Service {
        Service {
            service_id: id,
            action: MapAction::Add,
            info: Some(ServiceInfo {
                service_name: name.to_owned(),
                vendor: Some("ommlink".into()),
                is_source: Some(false),
                capabilities: vec![
                    DomainType::MarketPrice.code(),
                    DomainType::MarketByOrder.code(),
                ],
                dictionaries_provided: vec!["RWFFld".into(), "RWFEnum".into()],
                dictionaries_used: vec!["RWFFld".into()],
                qos: vec![Qos::realtime_tick_by_tick()],
                supports_qos_range: Some(false),
                item_list: None,
                accepting_consumer_status: Some(true),
                ..ServiceInfo::default()
            }),
            state: Some(ServiceState {
                service_up: true,
                accepting_requests: Some(true),
                ..ServiceState::default()
            }),
            load: Some(ServiceLoad {
                open_limit: Some(100),
                open_window: Some(50),
                load_factor: None,
                ..ServiceLoad::default()
            }),
            link: Some(ServiceLink {
                links: vec![LinkEntry {
                    name: "upstream-a".into(),
                    link_type: Some(1),
                    link_state: 1,
                    link_code: None,
                    text: Some("connected".into()),
                }],
                ..ServiceLink::default()
            }),
            data: None,
            groups: Vec::new(),
        }
    }

    #[test]
    fn service_round_trips_through_map_entry() {
        let service = sample_service(10, "DIRECT_FEED");
        let entry = service.to_map_entry();
        let back = Service::from_map_entry(&entry).unwrap();
        assert_eq!(back, service);
    }

    #[test]
    fn delete_entry_carries_no_payload() {
        let service = Service {
            service_id: 12,
            action: MapAction::Delete,
            ..Service::default()
        };
        let entry = service.to_map_entry();
        assert_eq!(entry.payload, Payload::None);

        let back = Service::from_map_entry(&entry).unwrap();
        assert_eq!(back.action, MapAction::Delete);
        assert_eq!(back.present_filters(), 0);
    }

    #[test]
    fn blank_service_name_rejected() {
        let mut service = sample_service(10, "FEED");
        service.info.as_mut().unwrap().service_name = String::new();
        let entry = service.to_map_entry();
        let err = Service::from_map_entry(&entry).unwrap_err();
        assert!(matches!(err, RdmError::InvalidValue { field: "Name", .. }));
    }

    #[test]
    fn out_of_range_service_id_rejected() {
        let entry = MapEntry {
            key: MapKey::UInt(u64::from(u16::MAX) + 1),
            action: MapAction::Add,
            payload: Payload::FilterList(FilterList::builder().complete()),
        };
        assert!(matches!(
            Service::from_map_entry(&entry).unwrap_err(),
            RdmError::InvalidValue { field: "service_id", .. }
        ));
    }

    #[test]
    fn group_entries_round_trip_and_repeat() {
        let mut service = sample_service(10, "FEED");
        service.groups = vec![
            ServiceGroup {
                action: FilterAction::Set,
                group: Bytes::from_static(b"\x00\x01"),
                merged_to_group: None,
                status: Some(State::open_suspect(StatusCode::None, "group suspect")),
            },
            ServiceGroup {
                action: FilterAction::Set,
                group: Bytes::from_static(b"\x00\x02"),
                merged_to_group: Some(Bytes::from_static(b"\x00\x01")),
                status: None,
            },
        ];

        let back = Service::from_map_entry(&service.to_map_entry()).unwrap();
        assert_eq!(back.groups.len(), 2);
        assert_eq!(back, service);
        assert_ne!(back.present_filters() & filter_flags::GROUP, 0);
    }

    #[test]
    fn refresh_round_trips_through_message() {
        let refresh = DirectoryRefresh {
            stream_id: 2,
            filter: filter_flags::INFO | filter_flags::STATE,
            services: vec![sample_service(10, "FEED_A"), sample_service(11, "FEED_B")],
            ..DirectoryRefresh::default()
        };

        let Message::Refresh(msg) = refresh.to_message().unwrap() else {
            panic!("expected refresh");
        };
        assert_eq!(msg.domain, DomainType::Source);

        let back = DirectoryRefresh::from_refresh(&msg).unwrap();
        assert_eq!(back, refresh);
    }

    #[test]
    fn non_map_payload_rejected() {
        let msg = UpdateMsg {
            stream_id: 2,
            domain: DomainType::Source,
            key: MsgKey::default(),
            payload: Payload::ElementList(ElementList::builder().complete()),
        };
        assert!(matches!(
            DirectoryUpdate::from_update(&msg).unwrap_err(),
            RdmError::UnexpectedPayload(_)
        ));
    }

    #[test]
    fn present_filters_reflects_bundles() {
        let service = sample_service(10, "FEED");
        let mask = service.present_filters();
        assert_eq!(
            mask,
            filter_flags::INFO | filter_flags::STATE | filter_flags::LOAD | filter_flags::LINK
        );
    }
}
