// ── Events a reactor delivers to its consumer ──

use ommlink_rdm::Message;

/// Channel lifecycle notifications, mirroring the wrapped reactor's
/// callback set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// The channel object exists; not yet usable.
    Opened,
    /// The transport connection is established.
    Up,
    /// Admin handshakes are done; the channel is fully usable.
    Ready,
    /// The channel dropped and the reactor will not recover it.
    Down { reason: String },
    /// The channel dropped and the reactor is reconnecting on its own.
    DownReconnecting { reason: String },
    /// The underlying socket changed; consumers re-register interest.
    FdChange,
}

impl ChannelEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Opened => "Opened",
            Self::Up => "Up",
            Self::Ready => "Ready",
            Self::Down { .. } => "Down",
            Self::DownReconnecting { .. } => "DownReconnecting",
            Self::FdChange => "FdChange",
        }
    }
}

/// One event on the queue a reactor fills for its consumer.
#[derive(Debug, Clone)]
pub enum ReactorEvent {
    /// A channel lifecycle transition.
    Channel {
        channel_id: u64,
        event: ChannelEvent,
    },
    /// An inbound message, already decoded by the reactor's codec.
    Msg { channel_id: u64, message: Message },
}
