use thiserror::Error;

/// Failures surfaced across the reactor boundary.
///
/// The access layer maps these into its own user-facing error type; no
/// retry happens on either side of this boundary — reconnection policy
/// belongs to the reactor implementation.
#[derive(Debug, Error)]
pub enum ReactorError {
    /// Initial connection establishment failed.
    #[error("connect to {endpoint} failed: {reason}")]
    ConnectFailed { endpoint: String, reason: String },

    /// The channel is down; submits are rejected until the reactor brings
    /// it back up.
    #[error("channel {channel_id} is down")]
    ChannelDown { channel_id: u64 },

    /// A submit was accepted by this layer but rejected by the transport.
    #[error("submit on channel {channel_id} failed: {reason}")]
    SubmitFailed { channel_id: u64, reason: String },

    /// An ioctl value was rejected.
    #[error("ioctl {code} on channel {channel_id} failed: {reason}")]
    IoctlFailed {
        channel_id: u64,
        code: &'static str,
        reason: String,
    },

    /// The reactor has shut down and accepts no further calls.
    #[error("reactor has shut down")]
    Shutdown,
}

impl ReactorError {
    /// Whether the failure is tied to channel availability rather than a
    /// caller mistake.
    pub fn is_channel_down(&self) -> bool {
        matches!(self, Self::ChannelDown { .. } | Self::Shutdown)
    }
}
