//! In-memory reactor for tests and examples.
//!
//! One half implements [`Reactor`]; the other half, [`LoopbackPeer`],
//! plays the remote end: it observes every submitted message and injects
//! channel events and inbound messages. There is no reconnection, no
//! backoff, and no wire format here — the loopback exists so the layers
//! above can be driven end-to-end without a real transport.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::debug;

use ommlink_rdm::Message;

use crate::channel::{IoctlCode, Reactor, ReactorChannel};
use crate::connect::ConnectOptions;
use crate::error::ReactorError;
use crate::event::{ChannelEvent, ReactorEvent};

/// One recorded ioctl call, for assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IoctlRecord {
    pub channel_id: u64,
    pub code: IoctlCode,
    pub value: u64,
}

struct ChannelSlot {
    events: mpsc::UnboundedSender<ReactorEvent>,
    closed: Arc<AtomicBool>,
    name: String,
}

struct Shared {
    next_channel_id: AtomicU64,
    refuse_connects: AtomicU64,
    channels: Mutex<HashMap<u64, ChannelSlot>>,
    submitted_tx: mpsc::UnboundedSender<(u64, Message)>,
    ioctls: Mutex<Vec<IoctlRecord>>,
}

/// In-memory [`Reactor`] implementation.
pub struct LoopbackReactor {
    shared: Arc<Shared>,
}

/// The remote end of a [`LoopbackReactor`].
pub struct LoopbackPeer {
    shared: Arc<Shared>,
    submitted_rx: mpsc::UnboundedReceiver<(u64, Message)>,
}

impl LoopbackReactor {
    /// Create a connected reactor/peer pair.
    pub fn new() -> (Self, LoopbackPeer) {
        let (submitted_tx, submitted_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            next_channel_id: AtomicU64::new(1),
            refuse_connects: AtomicU64::new(0),
            channels: Mutex::new(HashMap::new()),
            submitted_tx,
            ioctls: Mutex::new(Vec::new()),
        });
        (
            Self {
                shared: Arc::clone(&shared),
            },
            LoopbackPeer {
                shared,
                submitted_rx,
            },
        )
    }
}

impl Reactor for LoopbackReactor {
    fn connect(
        &self,
        options: &ConnectOptions,
        events: mpsc::UnboundedSender<ReactorEvent>,
    ) -> Result<Box<dyn ReactorChannel>, ReactorError> {
        let refusals = self.shared.refuse_connects.load(Ordering::SeqCst);
        if refusals > 0 {
            self.shared
                .refuse_connects
                .store(refusals - 1, Ordering::SeqCst);
            return Err(ReactorError::ConnectFailed {
                endpoint: options.endpoint.to_string(),
                reason: "connection refused by loopback".to_owned(),
            });
        }

        let channel_id = self.shared.next_channel_id.fetch_add(1, Ordering::SeqCst);
        let closed = Arc::new(AtomicBool::new(false));

        if let Ok(mut channels) = self.shared.channels.lock() {
            channels.insert(
                channel_id,
                ChannelSlot {
                    events: events.clone(),
                    closed: Arc::clone(&closed),
                    name: options.name.clone(),
                },
            );
        }

        debug!(channel_id, name = %options.name, endpoint = %options.endpoint, "loopback channel opened");

        // A loopback connection is up the moment it exists.
        let _ = events.send(ReactorEvent::Channel {
            channel_id,
            event: ChannelEvent::Opened,
        });
        let _ = events.send(ReactorEvent::Channel {
            channel_id,
            event: ChannelEvent::Up,
        });

        Ok(Box::new(LoopbackChannel {
            channel_id,
            closed,
            shared: Arc::clone(&self.shared),
        }))
    }
}

struct LoopbackChannel {
    channel_id: u64,
    closed: Arc<AtomicBool>,
    shared: Arc<Shared>,
}

impl ReactorChannel for LoopbackChannel {
    fn channel_id(&self) -> u64 {
        self.channel_id
    }

    fn submit(&self, message: Message) -> Result<(), ReactorError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ReactorError::ChannelDown {
                channel_id: self.channel_id,
            });
        }
        self.shared
            .submitted_tx
            .send((self.channel_id, message))
            .map_err(|_| ReactorError::Shutdown)
    }

    fn ioctl(&self, code: IoctlCode, value: u64) -> Result<(), ReactorError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ReactorError::ChannelDown {
                channel_id: self.channel_id,
            });
        }
        if let Ok(mut log) = self.shared.ioctls.lock() {
            log.push(IoctlRecord {
                channel_id: self.channel_id,
                code,
                value,
            });
        }
        Ok(())
    }

    fn close(&self) -> Result<(), ReactorError> {
        self.closed.store(true, Ordering::SeqCst);
        if let Ok(mut channels) = self.shared.channels.lock() {
            channels.remove(&self.channel_id);
        }
        debug!(channel_id = self.channel_id, "loopback channel closed");
        Ok(())
    }
}

impl LoopbackPeer {
    /// Refuse the next `count` connect attempts, for failover tests.
    pub fn refuse_connects(&self, count: u64) {
        self.shared.refuse_connects.store(count, Ordering::SeqCst);
    }

    /// Receive the next message submitted by the layer under test.
    pub async fn next_submit(&mut self) -> Option<(u64, Message)> {
        self.submitted_rx.recv().await
    }

    /// Receive a submitted message without waiting.
    pub fn try_next_submit(&mut self) -> Option<(u64, Message)> {
        self.submitted_rx.try_recv().ok()
    }

    /// Inject an inbound message on a channel. Returns false if the
    /// channel is unknown or its consumer is gone.
    pub fn send_msg(&self, channel_id: u64, message: Message) -> bool {
        self.send_event_inner(channel_id, ReactorEvent::Msg {
            channel_id,
            message,
        })
    }

    /// Inject a channel lifecycle event.
    pub fn send_channel_event(&self, channel_id: u64, event: ChannelEvent) -> bool {
        self.send_event_inner(channel_id, ReactorEvent::Channel { channel_id, event })
    }

    /// Mark a channel down and deliver the corresponding event. Submits on
    /// the consumer side fail afterwards.
    pub fn fail_channel(&self, channel_id: u64, reason: &str, reconnecting: bool) -> bool {
        if let Ok(channels) = self.shared.channels.lock() {
            if let Some(slot) = channels.get(&channel_id) {
                slot.closed.store(true, Ordering::SeqCst);
            }
        }
        let event = if reconnecting {
            ChannelEvent::DownReconnecting {
                reason: reason.to_owned(),
            }
        } else {
            ChannelEvent::Down {
                reason: reason.to_owned(),
            }
        };
        self.send_channel_event(channel_id, event)
    }

    /// Reopen a failed channel (the loopback stand-in for the reactor's
    /// own recovery) and deliver `Up`.
    pub fn recover_channel(&self, channel_id: u64) -> bool {
        if let Ok(channels) = self.shared.channels.lock() {
            if let Some(slot) = channels.get(&channel_id) {
                slot.closed.store(false, Ordering::SeqCst);
            }
        }
        self.send_channel_event(channel_id, ChannelEvent::Up)
    }

    /// Every ioctl the consumer forwarded, in call order.
    pub fn ioctl_log(&self) -> Vec<IoctlRecord> {
        self.shared
            .ioctls
            .lock()
            .map(|log| log.clone())
            .unwrap_or_default()
    }

    /// Name of a live channel, if it exists.
    pub fn channel_name(&self, channel_id: u64) -> Option<String> {
        self.shared
            .channels
            .lock()
            .ok()
            .and_then(|channels| channels.get(&channel_id).map(|slot| slot.name.clone()))
    }

    /// Whether the consumer has closed the channel.
    pub fn is_closed(&self, channel_id: u64) -> bool {
        self.shared
            .channels
            .lock()
            .map(|channels| !channels.contains_key(&channel_id))
            .unwrap_or(true)
    }

    fn send_event_inner(&self, channel_id: u64, event: ReactorEvent) -> bool {
        let Ok(channels) = self.shared.channels.lock() else {
            return false;
        };
        match channels.get(&channel_id) {
            Some(slot) => slot.events.send(event).is_ok(),
            None => false,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use ommlink_rdm::{CloseMsg, DomainType};
    use pretty_assertions::assert_eq;

    fn close_msg(stream_id: i32) -> Message {
        Message::Close(CloseMsg {
            stream_id,
            domain: DomainType::MarketPrice,
        })
    }

    #[tokio::test]
    async fn connect_delivers_opened_and_up() {
        let (reactor, _peer) = LoopbackReactor::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let channel = reactor.connect(&ConnectOptions::default(), tx).unwrap();

        let ReactorEvent::Channel { channel_id, event } = rx.recv().await.unwrap() else {
            panic!("expected a channel event");
        };
        assert_eq!(channel_id, channel.channel_id());
        assert_eq!(event, ChannelEvent::Opened);

        let ReactorEvent::Channel { event, .. } = rx.recv().await.unwrap() else {
            panic!("expected a channel event");
        };
        assert_eq!(event, ChannelEvent::Up);
    }

    #[tokio::test]
    async fn submits_reach_the_peer() {
        let (reactor, mut peer) = LoopbackReactor::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let channel = reactor.connect(&ConnectOptions::default(), tx).unwrap();

        channel.submit(close_msg(5)).unwrap();
        let (channel_id, message) = peer.next_submit().await.unwrap();
        assert_eq!(channel_id, channel.channel_id());
        assert_eq!(message.stream_id(), 5);
    }

    #[tokio::test]
    async fn failed_channel_rejects_submits() {
        let (reactor, peer) = LoopbackReactor::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let channel = reactor.connect(&ConnectOptions::default(), tx).unwrap();

        assert!(peer.fail_channel(channel.channel_id(), "link lost", true));
        let err = channel.submit(close_msg(1)).unwrap_err();
        assert!(err.is_channel_down());

        // Drain: Opened, Up, then the failure event.
        rx.recv().await.unwrap();
        rx.recv().await.unwrap();
        let ReactorEvent::Channel { event, .. } = rx.recv().await.unwrap() else {
            panic!("expected a channel event");
        };
        assert_eq!(
            event,
            ChannelEvent::DownReconnecting {
                reason: "link lost".into()
            }
        );

        // Recovery flips the flag back.
        assert!(peer.recover_channel(channel.channel_id()));
        channel.submit(close_msg(2)).unwrap();
    }

    #[tokio::test]
    async fn refused_connects_count_down() {
        let (reactor, peer) = LoopbackReactor::new();
        peer.refuse_connects(1);

        let (tx, _rx) = mpsc::unbounded_channel();
        let err = reactor.connect(&ConnectOptions::default(), tx.clone());
        assert!(matches!(err, Err(ReactorError::ConnectFailed { .. })));

        assert!(reactor.connect(&ConnectOptions::default(), tx).is_ok());
    }

    #[tokio::test]
    async fn ioctls_are_recorded() {
        let (reactor, peer) = LoopbackReactor::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let channel = reactor.connect(&ConnectOptions::default(), tx).unwrap();

        channel.ioctl(IoctlCode::HighWaterMark, 4096).unwrap();
        channel.ioctl(IoctlCode::CompressionThreshold, 30).unwrap();

        assert_eq!(
            peer.ioctl_log(),
            vec![
                IoctlRecord {
                    channel_id: channel.channel_id(),
                    code: IoctlCode::HighWaterMark,
                    value: 4096,
                },
                IoctlRecord {
                    channel_id: channel.channel_id(),
                    code: IoctlCode::CompressionThreshold,
                    value: 30,
                },
            ]
        );
    }

    #[tokio::test]
    async fn close_removes_the_channel() {
        let (reactor, peer) = LoopbackReactor::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let channel = reactor.connect(&ConnectOptions::default(), tx).unwrap();

        assert!(!peer.is_closed(channel.channel_id()));
        channel.close().unwrap();
        assert!(peer.is_closed(channel.channel_id()));
        assert!(!peer.send_msg(channel.channel_id(), close_msg(1)));
    }
}
