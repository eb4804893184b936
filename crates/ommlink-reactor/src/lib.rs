//! The reactor boundary the access layer builds on.
//!
//! The real transport/reactor runtime — connection management,
//! reconnection, encryption, binary wire encoding — lives outside this
//! workspace. This crate pins down the surface the access layer consumes:
//! connect, per-channel submit/ioctl/close, and the event stream a reactor
//! delivers (channel lifecycle events and inbound messages).
//!
//! [`loopback`] provides an in-memory implementation for tests and
//! examples. It carries none of a real reactor's policy: no reconnection,
//! no backoff, no wire format.

pub mod channel;
pub mod connect;
pub mod error;
pub mod event;
pub mod loopback;

pub use channel::{IoctlCode, Reactor, ReactorChannel};
pub use connect::ConnectOptions;
pub use error::ReactorError;
pub use event::{ChannelEvent, ReactorEvent};
pub use loopback::{LoopbackPeer, LoopbackReactor};
