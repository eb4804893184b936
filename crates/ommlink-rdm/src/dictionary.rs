//! Typed views of the dictionary domain.
//!
//! Dictionary payloads are opaque to this layer: the field and enum
//! definitions are produced and consumed by the codec behind the reactor.
//! What this layer models is the request shape (name, service, verbosity)
//! and the multi-part refresh bookkeeping.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::data::Payload;
use crate::error::RdmError;
use crate::msg::{DomainType, Message, MsgKey, RefreshMsg, RequestMsg};
use crate::state::State;

/// Verbosity masks a dictionary consumer may request.
pub mod verbosity {
    pub const INFO: u32 = 0x00;
    pub const MINIMAL: u32 = 0x03;
    pub const NORMAL: u32 = 0x07;
    pub const VERBOSE: u32 = 0x0F;
}

/// Well-known dictionary names.
pub const FIELD_DICTIONARY_NAME: &str = "RWFFld";
pub const ENUM_TYPE_DICTIONARY_NAME: &str = "RWFEnum";

/// Consumer dictionary subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DictionaryRequest {
    pub stream_id: i32,
    pub name: String,
    pub service_id: Option<u16>,
    pub service_name: Option<String>,
    pub verbosity: u32,
    pub streaming: bool,
}

impl Default for DictionaryRequest {
    fn default() -> Self {
        Self {
            stream_id: 0,
            name: FIELD_DICTIONARY_NAME.to_owned(),
            service_id: None,
            service_name: None,
            verbosity: verbosity::NORMAL,
            streaming: true,
        }
    }
}

impl DictionaryRequest {
    pub fn to_message(&self) -> Message {
        let mut key = MsgKey::default()
            .with_name(self.name.clone())
            .with_filter(self.verbosity);
        if let Some(id) = self.service_id {
            key = key.with_service_id(id);
        }
        if let Some(name) = &self.service_name {
            key = key.with_service_name(name.clone());
        }
        Message::Request(RequestMsg {
            stream_id: self.stream_id,
            domain: DomainType::Dictionary,
            key,
            streaming: self.streaming,
            priority: None,
            payload: Payload::None,
        })
    }

    pub fn from_request(msg: &RequestMsg) -> Result<Self, RdmError> {
        Ok(Self {
            stream_id: msg.stream_id,
            name: msg
                .key
                .name
                .clone()
                .ok_or(RdmError::MissingField("dictionary name"))?,
            service_id: msg.key.service_id,
            service_name: msg.key.service_name.clone(),
            verbosity: msg.key.filter.unwrap_or(verbosity::NORMAL),
            streaming: msg.streaming,
        })
    }
}

/// One part of a (possibly multi-part) dictionary refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DictionaryRefresh {
    pub stream_id: i32,
    pub name: String,
    pub verbosity: u32,
    pub state: State,
    pub solicited: bool,
    /// Final part flag; parts before the last arrive with this unset.
    pub complete: bool,
    pub part: Bytes,
}

impl Default for DictionaryRefresh {
    fn default() -> Self {
        Self {
            stream_id: 0,
            name: FIELD_DICTIONARY_NAME.to_owned(),
            verbosity: verbosity::NORMAL,
            state: State::open_ok("Dictionary refresh"),
            solicited: true,
            complete: true,
            part: Bytes::new(),
        }
    }
}

impl DictionaryRefresh {
    pub fn to_message(&self) -> Message {
        Message::Refresh(RefreshMsg {
            stream_id: self.stream_id,
            domain: DomainType::Dictionary,
            key: MsgKey::default()
                .with_name(self.name.clone())
                .with_filter(self.verbosity),
            state: self.state.clone(),
            solicited: self.solicited,
            complete: self.complete,
            clear_cache: false,
            payload: Payload::Opaque(self.part.clone()),
        })
    }

    pub fn from_refresh(msg: &RefreshMsg) -> Result<Self, RdmError> {
        Ok(Self {
            stream_id: msg.stream_id,
            name: msg
                .key
                .name
                .clone()
                .ok_or(RdmError::MissingField("dictionary name"))?,
            verbosity: msg.key.filter.unwrap_or(verbosity::NORMAL),
            state: msg.state.clone(),
            solicited: msg.solicited,
            complete: msg.complete,
            part: msg.payload.as_opaque().cloned().unwrap_or_default(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn request_round_trip() {
        let request = DictionaryRequest {
            stream_id: 3,
            name: ENUM_TYPE_DICTIONARY_NAME.to_owned(),
            service_name: Some("FEED".into()),
            verbosity: verbosity::VERBOSE,
            ..DictionaryRequest::default()
        };

        let Message::Request(msg) = request.to_message() else {
            panic!("expected request");
        };
        assert_eq!(msg.domain, DomainType::Dictionary);
        assert_eq!(DictionaryRequest::from_request(&msg).unwrap(), request);
    }

    #[test]
    fn refresh_parts_keep_complete_flag() {
        let part = DictionaryRefresh {
            stream_id: 3,
            complete: false,
            part: Bytes::from_static(b"chunk-1"),
            ..DictionaryRefresh::default()
        };

        let Message::Refresh(msg) = part.to_message() else {
            panic!("expected refresh");
        };
        assert!(!msg.complete);

        let back = DictionaryRefresh::from_refresh(&msg).unwrap();
        assert_eq!(back.part, Bytes::from_static(b"chunk-1"));
        assert!(!back.complete);
    }

    #[test]
    fn refresh_without_name_rejected() {
        let msg = RefreshMsg {
            stream_id: 3,
            domain: DomainType::Dictionary,
            ..RefreshMsg::default()
        };
        assert_eq!(
            DictionaryRefresh::from_refresh(&msg),
            Err(RdmError::MissingField("dictionary name"))
        );
    }
}
