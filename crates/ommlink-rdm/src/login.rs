//! Typed views of the login domain.
//!
//! Login attributes ride in the message payload as an ElementList; the
//! views here do the round-trip so callers never touch element names.

use serde::{Deserialize, Serialize};

use crate::data::{ElementList, Payload, Value};
use crate::error::RdmError;
use crate::msg::{DomainType, Message, MsgKey, RefreshMsg, RequestMsg, StatusMsg};
use crate::state::State;

/// The login stream is always stream id 1.
pub const LOGIN_STREAM_ID: i32 = 1;

/// Element names used by the login domain.
pub mod names {
    pub const APPLICATION_ID: &str = "ApplicationId";
    pub const APPLICATION_NAME: &str = "ApplicationName";
    pub const POSITION: &str = "Position";
    pub const ALLOW_SUSPECT_DATA: &str = "AllowSuspectData";
    pub const SINGLE_OPEN: &str = "SingleOpen";
    pub const SUPPORT_BATCH_REQUESTS: &str = "SupportBatchRequests";
    pub const ROLE: &str = "Role";
    pub const PASSWORD: &str = "Password";
}

/// Login roles as carried in the request attributes.
pub const ROLE_CONSUMER: u64 = 0;
pub const ROLE_PROVIDER: u64 = 1;

// ── LoginRequest ────────────────────────────────────────────────────

/// Outbound login request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginRequest {
    pub name: String,
    pub application_id: Option<String>,
    pub application_name: Option<String>,
    pub position: Option<String>,
    /// Carried in the request attributes, never echoed on responses.
    pub password: Option<String>,
    pub allow_suspect_data: bool,
    pub single_open: bool,
    pub role: u64,
}

impl Default for LoginRequest {
    fn default() -> Self {
        Self {
            name: String::new(),
            application_id: None,
            application_name: None,
            position: None,
            password: None,
            allow_suspect_data: true,
            single_open: true,
            role: ROLE_CONSUMER,
        }
    }
}

impl LoginRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn to_message(&self) -> Message {
        let attribs = ElementList::builder()
            .opt(
                names::APPLICATION_ID,
                self.application_id.clone().map(Value::Ascii),
            )
            .opt(
                names::APPLICATION_NAME,
                self.application_name.clone().map(Value::Ascii),
            )
            .opt(names::POSITION, self.position.clone().map(Value::Ascii))
            .opt(names::PASSWORD, self.password.clone().map(Value::Ascii))
            .uint(names::ALLOW_SUSPECT_DATA, u64::from(self.allow_suspect_data))
            .uint(names::SINGLE_OPEN, u64::from(self.single_open))
            .uint(names::ROLE, self.role)
            .complete();

        Message::Request(RequestMsg {
            stream_id: LOGIN_STREAM_ID,
            domain: DomainType::Login,
            key: MsgKey::default().with_name(self.name.clone()),
            streaming: true,
            priority: None,
            payload: Payload::ElementList(attribs),
        })
    }

    pub fn from_request(msg: &RequestMsg) -> Result<Self, RdmError> {
        let name = msg
            .key
            .name
            .clone()
            .ok_or(RdmError::MissingField("key name"))?;

        let mut request = Self::new(name);
        if let Some(attribs) = msg.payload.as_element_list() {
            request.application_id = attribs
                .ascii(names::APPLICATION_ID)
                .ok()
                .map(str::to_owned);
            request.application_name = attribs
                .ascii(names::APPLICATION_NAME)
                .ok()
                .map(str::to_owned);
            request.position = attribs.ascii(names::POSITION).ok().map(str::to_owned);
            request.password = attribs.ascii(names::PASSWORD).ok().map(str::to_owned);
            if let Ok(v) = attribs.uint(names::ALLOW_SUSPECT_DATA) {
                request.allow_suspect_data = v != 0;
            }
            if let Ok(v) = attribs.uint(names::SINGLE_OPEN) {
                request.single_open = v != 0;
            }
            if let Ok(v) = attribs.uint(names::ROLE) {
                request.role = v;
            }
        }
        Ok(request)
    }
}

// ── LoginRefresh ────────────────────────────────────────────────────

/// Inbound login acknowledgment with the features the peer granted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginRefresh {
    pub name: String,
    pub state: State,
    pub solicited: bool,
    pub application_id: Option<String>,
    pub position: Option<String>,
    pub allow_suspect_data: bool,
    pub single_open: bool,
    pub support_batch_requests: bool,
}

impl Default for LoginRefresh {
    fn default() -> Self {
        Self {
            name: String::new(),
            state: State::open_ok("Login accepted"),
            solicited: true,
            application_id: None,
            position: None,
            allow_suspect_data: true,
            single_open: true,
            support_batch_requests: false,
        }
    }
}

impl LoginRefresh {
    pub fn to_message(&self) -> Message {
        let attribs = ElementList::builder()
            .opt(
                names::APPLICATION_ID,
                self.application_id.clone().map(Value::Ascii),
            )
            .opt(names::POSITION, self.position.clone().map(Value::Ascii))
            .uint(names::ALLOW_SUSPECT_DATA, u64::from(self.allow_suspect_data))
            .uint(names::SINGLE_OPEN, u64::from(self.single_open))
            .uint(
                names::SUPPORT_BATCH_REQUESTS,
                u64::from(self.support_batch_requests),
            )
            .complete();

        Message::Refresh(RefreshMsg {
            stream_id: LOGIN_STREAM_ID,
            domain: DomainType::Login,
            key: MsgKey::default().with_name(self.name.clone()),
            state: self.state.clone(),
            solicited: self.solicited,
            complete: true,
            clear_cache: false,
            payload: Payload::ElementList(attribs),
        })
    }

    pub fn from_refresh(msg: &RefreshMsg) -> Result<Self, RdmError> {
        let mut refresh = Self {
            name: msg.key.name.clone().unwrap_or_default(),
            state: msg.state.clone(),
            solicited: msg.solicited,
            ..Self::default()
        };

        if let Some(attribs) = msg.payload.as_element_list() {
            refresh.application_id = attribs
                .ascii(names::APPLICATION_ID)
                .ok()
                .map(str::to_owned);
            refresh.position = attribs.ascii(names::POSITION).ok().map(str::to_owned);
            if let Ok(v) = attribs.uint(names::ALLOW_SUSPECT_DATA) {
                refresh.allow_suspect_data = v != 0;
            }
            if let Ok(v) = attribs.uint(names::SINGLE_OPEN) {
                refresh.single_open = v != 0;
            }
            if let Ok(v) = attribs.uint(names::SUPPORT_BATCH_REQUESTS) {
                refresh.support_batch_requests = v != 0;
            }
        }
        Ok(refresh)
    }
}

// ── LoginStatus ─────────────────────────────────────────────────────

/// Inbound login state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LoginStatus {
    pub name: Option<String>,
    pub state: Option<State>,
}

impl LoginStatus {
    pub fn to_message(&self) -> Message {
        Message::Status(StatusMsg {
            stream_id: LOGIN_STREAM_ID,
            domain: DomainType::Login,
            key: match &self.name {
                Some(name) => MsgKey::default().with_name(name.clone()),
                None => MsgKey::default(),
            },
            state: self.state.clone(),
        })
    }

    pub fn from_status(msg: &StatusMsg) -> Self {
        Self {
            name: msg.key.name.clone(),
            state: msg.state.clone(),
        }
    }
}
