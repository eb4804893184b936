// ── Message classes ──
//
// The five OMM message classes this layer routes, plus generic messages.
// A message is addressed by stream id; the key identifies the item within
// its domain.

use serde::{Deserialize, Serialize};

use crate::data::Payload;
use crate::state::State;

/// RDM domain of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum DomainType {
    Login,
    Source,
    Dictionary,
    #[default]
    MarketPrice,
    MarketByOrder,
    MarketByPrice,
    SymbolList,
    /// User-defined domain, passed through untouched.
    Custom(u8),
}

impl DomainType {
    /// Numeric domain id as used on the wire.
    pub fn code(self) -> u8 {
        match self {
            Self::Login => 1,
            Self::Source => 4,
            Self::Dictionary => 5,
            Self::MarketPrice => 6,
            Self::MarketByOrder => 7,
            Self::MarketByPrice => 8,
            Self::SymbolList => 10,
            Self::Custom(code) => code,
        }
    }

    pub fn from_code(code: u8) -> Self {
        match code {
            1 => Self::Login,
            4 => Self::Source,
            5 => Self::Dictionary,
            6 => Self::MarketPrice,
            7 => Self::MarketByOrder,
            8 => Self::MarketByPrice,
            10 => Self::SymbolList,
            other => Self::Custom(other),
        }
    }

    /// Administrative domains are owned by the access layer's callback
    /// clients rather than user item streams.
    pub fn is_admin(self) -> bool {
        matches!(self, Self::Login | Self::Source | Self::Dictionary)
    }
}

impl std::fmt::Display for DomainType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Login => write!(f, "Login"),
            Self::Source => write!(f, "Source"),
            Self::Dictionary => write!(f, "Dictionary"),
            Self::MarketPrice => write!(f, "MarketPrice"),
            Self::MarketByOrder => write!(f, "MarketByOrder"),
            Self::MarketByPrice => write!(f, "MarketByPrice"),
            Self::SymbolList => write!(f, "SymbolList"),
            Self::Custom(code) => write!(f, "Custom({code})"),
        }
    }
}

/// Item identification carried on requests and echoed on responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct MsgKey {
    pub name: Option<String>,
    pub name_type: Option<u8>,
    pub service_id: Option<u16>,
    /// Service by name; the access layer resolves it to an id before
    /// submitting to the reactor.
    pub service_name: Option<String>,
    /// Requested filter mask (directory and dictionary domains).
    pub filter: Option<u32>,
}

impl MsgKey {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_service_id(mut self, id: u16) -> Self {
        self.service_id = Some(id);
        self
    }

    pub fn with_service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = Some(name.into());
        self
    }

    pub fn with_filter(mut self, filter: u32) -> Self {
        self.filter = Some(filter);
        self
    }
}

// ── Message structs ─────────────────────────────────────────────────

/// Subscription request. `streaming: false` asks for a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RequestMsg {
    pub stream_id: i32,
    pub domain: DomainType,
    pub key: MsgKey,
    pub streaming: bool,
    /// Priority class and count, when the caller states one.
    pub priority: Option<(u8, u16)>,
    pub payload: Payload,
}

/// Solicited or unsolicited image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RefreshMsg {
    pub stream_id: i32,
    pub domain: DomainType,
    pub key: MsgKey,
    pub state: State,
    pub solicited: bool,
    /// Final part of a multi-part refresh.
    pub complete: bool,
    pub clear_cache: bool,
    pub payload: Payload,
}

/// Incremental change to an open item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct UpdateMsg {
    pub stream_id: i32,
    pub domain: DomainType,
    pub key: MsgKey,
    pub payload: Payload,
}

/// State change without data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct StatusMsg {
    pub stream_id: i32,
    pub domain: DomainType,
    pub key: MsgKey,
    pub state: Option<State>,
}

/// Stream close; no response is expected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CloseMsg {
    pub stream_id: i32,
    pub domain: DomainType,
}

/// Bidirectional message on an open stream, passed through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct GenericMsg {
    pub stream_id: i32,
    pub domain: DomainType,
    pub key: MsgKey,
    pub complete: bool,
    pub payload: Payload,
}

/// Any message the reactor delivers or accepts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    Request(RequestMsg),
    Refresh(RefreshMsg),
    Update(UpdateMsg),
    Status(StatusMsg),
    Close(CloseMsg),
    Generic(GenericMsg),
}

impl Message {
    pub fn stream_id(&self) -> i32 {
        match self {
            Self::Request(m) => m.stream_id,
            Self::Refresh(m) => m.stream_id,
            Self::Update(m) => m.stream_id,
            Self::Status(m) => m.stream_id,
            Self::Close(m) => m.stream_id,
            Self::Generic(m) => m.stream_id,
        }
    }

    pub fn domain(&self) -> DomainType {
        match self {
            Self::Request(m) => m.domain,
            Self::Refresh(m) => m.domain,
            Self::Update(m) => m.domain,
            Self::Status(m) => m.domain,
            Self::Close(m) => m.domain,
            Self::Generic(m) => m.domain,
        }
    }

    /// Message class name for log lines.
    pub fn class_name(&self) -> &'static str {
        match self {
            Self::Request(_) => "Request",
            Self::Refresh(_) => "Refresh",
            Self::Update(_) => "Update",
            Self::Status(_) => "Status",
            Self::Close(_) => "Close",
            Self::Generic(_) => "Generic",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn domain_codes_round_trip() {
        for domain in [
            DomainType::Login,
            DomainType::Source,
            DomainType::Dictionary,
            DomainType::MarketPrice,
            DomainType::MarketByOrder,
            DomainType::MarketByPrice,
            DomainType::SymbolList,
            DomainType::Custom(200),
        ] {
            assert_eq!(DomainType::from_code(domain.code()), domain);
        }
    }

    #[test]
    fn admin_domains_flagged() {
        assert!(DomainType::Login.is_admin());
        assert!(DomainType::Source.is_admin());
        assert!(DomainType::Dictionary.is_admin());
        assert!(!DomainType::MarketPrice.is_admin());
        assert!(!DomainType::Custom(42).is_admin());
    }

    #[test]
    fn message_accessors_reach_all_classes() {
        let close = Message::Close(CloseMsg {
            stream_id: 5,
            domain: DomainType::MarketPrice,
        });
        assert_eq!(close.stream_id(), 5);
        assert_eq!(close.domain(), DomainType::MarketPrice);
        assert_eq!(close.class_name(), "Close");
    }
}
