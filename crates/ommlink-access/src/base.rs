// ── Shared dispatch machinery ──
//
// One instance owns one reactor event queue. Every callback an instance
// ever makes runs while the queue's lock is held, whether the pump is the
// background task (ApiDispatch) or a user's dispatch() call (UserDispatch).
// That lock is the instance's user lock: callbacks are strictly sequential
// and never race registration bookkeeping.

use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use ommlink_reactor::ReactorEvent;

/// Stream id of an instance's own source directory stream. The login
/// stream id is fixed by the login domain itself.
pub(crate) const DIRECTORY_STREAM_ID: i32 = 2;

/// First stream id handed to user item and dictionary streams; everything
/// below is reserved for admin streams.
const FIRST_ITEM_STREAM_ID: i32 = 100;

/// Issues the non-zero handles returned to callers. Handles are unique for
/// the lifetime of the instance and never reused.
pub(crate) struct HandleSeq(AtomicU64);

impl HandleSeq {
    pub(crate) fn new() -> Self {
        Self(AtomicU64::new(1))
    }

    pub(crate) fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}

/// Issues stream ids for item and dictionary subscriptions.
pub(crate) struct StreamSeq(AtomicI32);

impl StreamSeq {
    pub(crate) fn new() -> Self {
        Self(AtomicI32::new(FIRST_ITEM_STREAM_ID))
    }

    pub(crate) fn next(&self) -> i32 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}

/// Consumers of the event queue: a consumer or provider instance.
pub(crate) trait EventSink: Send + Sync {
    fn process_event(&self, event: ReactorEvent);
}

/// The reactor event queue plus the lock callbacks run under.
pub(crate) struct EventQueue {
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<ReactorEvent>>,
}

impl EventQueue {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<ReactorEvent>) -> Self {
        Self {
            rx: tokio::sync::Mutex::new(rx),
        }
    }

    /// Dispatch at most one event. Returns false when the timeout elapsed
    /// or the queue is closed.
    pub(crate) async fn dispatch_one(&self, sink: &dyn EventSink, timeout: Duration) -> bool {
        let mut rx = self.rx.lock().await;
        match tokio::time::timeout(timeout, rx.recv()).await {
            Ok(Some(event)) => {
                sink.process_event(event);
                true
            }
            Ok(None) | Err(_) => false,
        }
    }

    /// Pump events until `done()` holds or the deadline passes. Returns
    /// whether the condition was reached. Used for the connect-time admin
    /// handshakes, which complete before any background pump starts.
    pub(crate) async fn pump_until(
        &self,
        sink: &dyn EventSink,
        deadline: Instant,
        mut done: impl FnMut() -> bool,
    ) -> bool {
        let mut rx = self.rx.lock().await;
        while !done() {
            let Ok(event) = tokio::time::timeout_at(deadline, rx.recv()).await else {
                return false;
            };
            let Some(event) = event else {
                return false;
            };
            sink.process_event(event);
        }
        true
    }

    /// Background pump for the ApiDispatch operation model. Holds the
    /// queue lock for its whole life; user dispatch calls are rejected
    /// before they ever contend for it.
    pub(crate) async fn run(&self, sink: &dyn EventSink, cancel: CancellationToken) {
        let mut rx = self.rx.lock().await;
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                event = rx.recv() => {
                    let Some(event) = event else { break };
                    sink.process_event(event);
                }
            }
        }
        debug!("dispatch pump stopped");
    }
}
