// ── The reactor trait seam ──
//
// Object-safe and fully synchronous: submit is a non-blocking enqueue and
// events flow back through the queue given at connect time. This mirrors
// the wrapped runtime's contract — the consumer pumps a queue, it is never
// called back on reactor threads.

use tokio::sync::mpsc;

use ommlink_rdm::Message;

use crate::connect::ConnectOptions;
use crate::error::ReactorError;
use crate::event::ReactorEvent;

/// Per-channel ioctl knobs the access layer may forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoctlCode {
    /// Bytes buffered before the transport signals back-pressure.
    HighWaterMark,
    /// Message size above which the transport compresses.
    CompressionThreshold,
    /// Size of the system write buffer.
    SystemWriteBufferSize,
}

impl IoctlCode {
    pub fn name(self) -> &'static str {
        match self {
            Self::HighWaterMark => "HighWaterMark",
            Self::CompressionThreshold => "CompressionThreshold",
            Self::SystemWriteBufferSize => "SystemWriteBufferSize",
        }
    }
}

/// The connection-establishment surface of a reactor runtime.
pub trait Reactor: Send + Sync {
    /// Open a channel toward `options.endpoint`.
    ///
    /// Lifecycle events and inbound messages for the new channel are
    /// pushed into `events`. Returns a handle for submitting outbound
    /// messages.
    fn connect(
        &self,
        options: &ConnectOptions,
        events: mpsc::UnboundedSender<ReactorEvent>,
    ) -> Result<Box<dyn ReactorChannel>, ReactorError>;
}

/// A live channel owned by a reactor.
pub trait ReactorChannel: Send + Sync {
    /// Identifier correlating this handle with [`ReactorEvent`]s.
    fn channel_id(&self) -> u64;

    /// Enqueue an outbound message. Non-blocking; failures are immediate
    /// (channel down) rather than delivery reports.
    fn submit(&self, message: Message) -> Result<(), ReactorError>;

    /// Forward a transport tuning knob.
    fn ioctl(&self, code: IoctlCode, value: u64) -> Result<(), ReactorError>;

    /// Close the channel. Further submits fail with `ChannelDown`.
    fn close(&self) -> Result<(), ReactorError>;
}
