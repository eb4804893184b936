//! User-facing callback traits and the callback clients behind them.
//!
//! A consumer or provider instance translates reactor events into message
//! objects and fans them out through these traits. Every callback runs on
//! the instance's dispatch path, one at a time; implementations should
//! hand work off rather than block.

pub(crate) mod channel;
pub(crate) mod dictionary;
pub(crate) mod directory;
pub(crate) mod item;
pub(crate) mod login;

pub use channel::ChannelState;

use std::any::Any;
use std::sync::Arc;

use ommlink_rdm::{GenericMsg, Message, RefreshMsg, StatusMsg, UpdateMsg};

/// Context delivered alongside every consumer callback.
#[derive(Clone)]
pub struct ConsumerEvent {
    /// Handle returned by `register_client` for this subscription.
    pub handle: u64,
    /// The closure object supplied at registration, if any.
    pub closure: Option<Arc<dyn Any + Send + Sync>>,
    /// Name of the channel the message arrived on.
    pub channel_name: String,
}

impl std::fmt::Debug for ConsumerEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsumerEvent")
            .field("handle", &self.handle)
            .field("has_closure", &self.closure.is_some())
            .field("channel_name", &self.channel_name)
            .finish()
    }
}

/// Callbacks a consumer application registers per subscription. All
/// methods default to no-ops so implementations pick what they care about.
///
/// [`on_all`](Self::on_all) fires for every inbound message on the
/// subscription before the class-specific callback; synthesized messages
/// (channel-down status fan-out, cache replays) invoke only the specific
/// callback.
pub trait ConsumerClient: Send + Sync {
    fn on_refresh(&self, _event: &ConsumerEvent, _refresh: &RefreshMsg) {}
    fn on_update(&self, _event: &ConsumerEvent, _update: &UpdateMsg) {}
    fn on_status(&self, _event: &ConsumerEvent, _status: &StatusMsg) {}
    fn on_generic(&self, _event: &ConsumerEvent, _generic: &GenericMsg) {}
    fn on_all(&self, _event: &ConsumerEvent, _msg: &Message) {}
}

/// Context delivered alongside every provider callback.
#[derive(Clone)]
pub struct ProviderEvent {
    /// Handle returned by `register_client` for this registration.
    pub handle: u64,
    /// The closure object supplied at registration, if any.
    pub closure: Option<Arc<dyn Any + Send + Sync>>,
    /// Name of the channel the message arrived on.
    pub channel_name: String,
}

impl std::fmt::Debug for ProviderEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderEvent")
            .field("handle", &self.handle)
            .field("has_closure", &self.closure.is_some())
            .field("channel_name", &self.channel_name)
            .finish()
    }
}

/// Callbacks a provider application registers, mirroring
/// [`ConsumerClient`]. A non-interactive provider sees its login stream
/// (refresh, status) and generic messages the peer sends back on it.
pub trait ProviderClient: Send + Sync {
    fn on_refresh(&self, _event: &ProviderEvent, _refresh: &RefreshMsg) {}
    fn on_status(&self, _event: &ProviderEvent, _status: &StatusMsg) {}
    fn on_generic(&self, _event: &ProviderEvent, _generic: &GenericMsg) {}
    fn on_all(&self, _event: &ProviderEvent, _msg: &Message) {}
}
