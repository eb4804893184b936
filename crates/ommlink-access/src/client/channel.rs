// ── Channel lifecycle handling ──
//
// One ChannelInfo per live channel. Created when a connect attempt
// succeeds, replaced on failover, removed at uninitialize. State changes
// are published through a watch channel so observers never poll.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;
use tracing::{debug, info, warn};
use url::Url;

use ommlink_rdm::Message;
use ommlink_reactor::{ChannelEvent, ConnectOptions, IoctlCode, ReactorChannel};

use crate::error::{AccessError, ErrorCode};

/// Externally observable channel availability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelState {
    /// No channel, or a channel that exists but is not yet connected.
    #[default]
    Initializing,
    /// The transport connection is established.
    Up,
    /// Admin handshakes are done; fully usable.
    Ready,
    /// Dropped; the reactor is recovering it on its own.
    DownReconnecting,
    /// Dropped for good.
    Down,
}

/// Bookkeeping for the live channel of an instance.
pub(crate) struct ChannelInfo {
    pub(crate) name: String,
    pub(crate) endpoint: Url,
    pub(crate) channel_id: u64,
    pub(crate) channel: Arc<dyn ReactorChannel>,
    options: ConnectOptions,
}

pub(crate) struct ChannelCallbackClient {
    instance_name: String,
    state_tx: watch::Sender<ChannelState>,
    active: Mutex<Option<ChannelInfo>>,
}

impl ChannelCallbackClient {
    pub(crate) fn new(instance_name: impl Into<String>) -> Self {
        let (state_tx, _) = watch::channel(ChannelState::Initializing);
        Self {
            instance_name: instance_name.into(),
            state_tx,
            active: Mutex::new(None),
        }
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<ChannelState> {
        self.state_tx.subscribe()
    }

    pub(crate) fn state(&self) -> ChannelState {
        *self.state_tx.borrow()
    }

    pub(crate) fn channel_name(&self) -> Option<String> {
        self.lock().as_ref().map(|info| info.name.clone())
    }

    /// Take ownership of a freshly connected channel.
    pub(crate) fn activate(&self, options: &ConnectOptions, channel: Box<dyn ReactorChannel>) {
        let info = ChannelInfo {
            name: options.name.clone(),
            endpoint: options.endpoint.clone(),
            channel_id: channel.channel_id(),
            channel: Arc::from(channel),
            options: options.clone(),
        };
        info!(
            instance = %self.instance_name,
            channel = %info.name,
            endpoint = %info.endpoint,
            "channel attached"
        );
        *self.lock() = Some(info);
        let _ = self.state_tx.send(ChannelState::Initializing);
    }

    pub(crate) fn channel(&self) -> Option<Arc<dyn ReactorChannel>> {
        self.lock()
            .as_ref()
            .map(|info| Arc::clone(&info.channel))
    }

    /// Handle a lifecycle event. Returns false when the event belongs to a
    /// channel this instance no longer owns (a torn-down failover attempt).
    pub(crate) fn on_channel_event(&self, channel_id: u64, event: &ChannelEvent) -> bool {
        let guard = self.lock();
        let Some(info) = guard.as_ref() else {
            debug!(channel_id, "event without an active channel ignored");
            return false;
        };
        if info.channel_id != channel_id {
            debug!(channel_id, "event for a stale channel ignored");
            return false;
        }

        match event {
            ChannelEvent::Opened => {}
            ChannelEvent::Up => {
                self.apply_initial_ioctls(info);
                let _ = self.state_tx.send(ChannelState::Up);
            }
            ChannelEvent::Ready => {
                let _ = self.state_tx.send(ChannelState::Ready);
            }
            ChannelEvent::DownReconnecting { reason } => {
                warn!(
                    instance = %self.instance_name,
                    channel = %info.name,
                    %reason,
                    "channel down, reactor reconnecting"
                );
                let _ = self.state_tx.send(ChannelState::DownReconnecting);
            }
            ChannelEvent::Down { reason } => {
                warn!(
                    instance = %self.instance_name,
                    channel = %info.name,
                    %reason,
                    "channel down"
                );
                let _ = self.state_tx.send(ChannelState::Down);
            }
            ChannelEvent::FdChange => {
                // Socket registration is the reactor's business; nothing to
                // re-register at this layer.
                debug!(instance = %self.instance_name, channel = %info.name, "channel fd changed");
            }
        }
        true
    }

    pub(crate) fn submit(&self, message: Message) -> Result<(), AccessError> {
        match self.channel() {
            Some(channel) => channel.submit(message).map_err(AccessError::from),
            None => Err(AccessError::usage(
                ErrorCode::Failure,
                "no active channel to submit on",
            )),
        }
    }

    pub(crate) fn ioctl(&self, code: IoctlCode, value: u64) -> Result<(), AccessError> {
        match self.channel() {
            Some(channel) => channel.ioctl(code, value).map_err(AccessError::from),
            None => Err(AccessError::usage(
                ErrorCode::Failure,
                "no active channel to modify",
            )),
        }
    }

    /// Close and drop the active channel.
    pub(crate) fn close(&self) {
        if let Some(info) = self.lock().take() {
            if let Err(err) = info.channel.close() {
                debug!(channel = %info.name, error = %err, "channel close reported an error");
            }
        }
        let _ = self.state_tx.send(ChannelState::Down);
    }

    fn apply_initial_ioctls(&self, info: &ChannelInfo) {
        let initial = [
            (IoctlCode::HighWaterMark, info.options.high_water_mark),
            (
                IoctlCode::CompressionThreshold,
                info.options.compression_threshold,
            ),
        ];
        for (code, value) in initial {
            let Some(value) = value else { continue };
            if let Err(err) = info.channel.ioctl(code, value) {
                warn!(
                    instance = %self.instance_name,
                    channel = %info.name,
                    code = code.name(),
                    error = %err,
                    "initial ioctl rejected"
                );
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<ChannelInfo>> {
        match self.active.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
