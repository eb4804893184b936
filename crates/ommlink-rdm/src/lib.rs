//! OMM container model and RDM domain messages.
//!
//! This crate owns the in-memory message model shared by the access layer
//! and the reactor seam: primitive values, the container family
//! (ElementList, OmmArray, FilterList, Map), message classes
//! (request/refresh/update/status/close/generic), and typed views of the
//! standard administrative domains (login, directory, dictionary).
//!
//! Wire encoding is not here. Containers serialize with serde so in-memory
//! transports and config round-trips work; a binary codec lives behind the
//! reactor boundary.

pub mod data;
pub mod dictionary;
pub mod directory;
pub mod error;
pub mod login;
pub mod msg;
pub mod state;

// ── Primary re-exports ──────────────────────────────────────────────
pub use data::{
    DataType, ElementEntry, ElementList, FilterAction, FilterEntry, FilterList, Map, MapAction,
    MapEntry, MapKey, OmmArray, Payload, Value,
};
pub use error::RdmError;
pub use msg::{
    CloseMsg, DomainType, GenericMsg, Message, MsgKey, RefreshMsg, RequestMsg, StatusMsg,
    UpdateMsg,
};
pub use state::{DataState, Qos, QosRate, QosTimeliness, State, StatusCode, StreamState};
