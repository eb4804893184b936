//! High-level OMM consumer/provider API over an external reactor runtime.
//!
//! The hard parts of the transport — connection management, reconnection,
//! encryption, the binary wire format — live behind the
//! [`ommlink_reactor`] seam. This crate owns what sits on top:
//!
//! - callback clients translating reactor events into message objects and
//!   fanning them out to registered [`ConsumerClient`]/[`ProviderClient`]
//!   implementations,
//! - per-instance object pools for the messages churned on the dispatch
//!   path,
//! - the directory service store with its add/update/delete merge rules
//!   and per-subscriber filter reconstruction,
//! - the [`Consumer`] and [`Provider`] instance facades.
//!
//! ```no_run
//! use std::sync::Arc;
//! use ommlink_access::{Consumer, ConsumerClient, ConsumerConfig, ConsumerEvent};
//! use ommlink_rdm::{DomainType, MsgKey, RefreshMsg, RequestMsg};
//!
//! struct Printer;
//!
//! impl ConsumerClient for Printer {
//!     fn on_refresh(&self, event: &ConsumerEvent, refresh: &RefreshMsg) {
//!         println!("refresh on handle {}: {}", event.handle, refresh.state);
//!     }
//! }
//!
//! # async fn run(reactor: Arc<dyn ommlink_reactor::Reactor>) -> Result<(), ommlink_access::AccessError> {
//! let consumer = Consumer::new(ConsumerConfig::default(), reactor);
//! consumer.connect().await?;
//! let request = RequestMsg {
//!     domain: DomainType::MarketPrice,
//!     key: MsgKey::default()
//!         .with_name("IBM.N")
//!         .with_service_name("DIRECT_FEED"),
//!     streaming: true,
//!     ..RequestMsg::default()
//! };
//! let handle = consumer.register_client(&request, Arc::new(Printer), None)?;
//! # let _ = handle;
//! # Ok(())
//! # }
//! ```

mod base;
pub mod client;
pub mod config;
mod consumer;
mod directory;
pub mod error;
mod pool;
mod provider;

pub use client::{
    ChannelState, ConsumerClient, ConsumerEvent, ProviderClient, ProviderEvent,
};
pub use config::{
    AdminControl, ConsumerConfig, LoginIdentity, OperationModel, ProviderConfig,
};
pub use consumer::Consumer;
pub use error::{AccessError, ErrorClient, ErrorCode};
pub use provider::Provider;
