// ── Dictionary stream bookkeeping ──
//
// Dictionary payloads stay opaque here; the layer tracks per-name streams
// and reassembles multi-part refreshes so the application can tell a
// partial dictionary from a complete one.

use std::any::Any;
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::{Bytes, BytesMut};
use dashmap::DashMap;

use crate::client::ConsumerClient;

#[derive(Default)]
struct PartLog {
    parts: Vec<Bytes>,
    complete: bool,
}

/// One open dictionary stream.
pub(crate) struct DictionaryItem {
    pub(crate) handle: u64,
    pub(crate) stream_id: i32,
    pub(crate) name: String,
    pub(crate) client: Arc<dyn ConsumerClient>,
    pub(crate) closure: Option<Arc<dyn Any + Send + Sync>>,
    parts: Mutex<PartLog>,
}

impl DictionaryItem {
    pub(crate) fn new(
        handle: u64,
        stream_id: i32,
        name: String,
        client: Arc<dyn ConsumerClient>,
        closure: Option<Arc<dyn Any + Send + Sync>>,
    ) -> Self {
        Self {
            handle,
            stream_id,
            name,
            client,
            closure,
            parts: Mutex::new(PartLog::default()),
        }
    }

    /// Record one refresh part. `clear` restarts accumulation, which is
    /// how an unsolicited re-send of the dictionary begins.
    pub(crate) fn record_part(&self, part: Bytes, complete: bool, clear: bool) {
        let mut log = self.lock();
        if clear {
            log.parts.clear();
        }
        if !part.is_empty() {
            log.parts.push(part);
        }
        log.complete = complete;
    }

    pub(crate) fn is_complete(&self) -> bool {
        self.lock().complete
    }

    pub(crate) fn part_count(&self) -> usize {
        self.lock().parts.len()
    }

    /// All received parts, concatenated in arrival order.
    pub(crate) fn assembled(&self) -> Bytes {
        let log = self.lock();
        let mut buf = BytesMut::with_capacity(log.parts.iter().map(Bytes::len).sum());
        for part in &log.parts {
            buf.extend_from_slice(part);
        }
        buf.freeze()
    }

    fn lock(&self) -> MutexGuard<'_, PartLog> {
        match self.parts.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

pub(crate) struct DictionaryCallbackClient {
    by_handle: DashMap<u64, Arc<DictionaryItem>>,
    by_stream: DashMap<i32, u64>,
}

impl DictionaryCallbackClient {
    pub(crate) fn new() -> Self {
        Self {
            by_handle: DashMap::new(),
            by_stream: DashMap::new(),
        }
    }

    pub(crate) fn insert(&self, item: Arc<DictionaryItem>) {
        self.by_stream.insert(item.stream_id, item.handle);
        self.by_handle.insert(item.handle, item);
    }

    pub(crate) fn by_stream(&self, stream_id: i32) -> Option<Arc<DictionaryItem>> {
        let handle = *self.by_stream.get(&stream_id)?;
        self.by_handle
            .get(&handle)
            .map(|entry| Arc::clone(entry.value()))
    }

    pub(crate) fn remove(&self, handle: u64) -> Option<Arc<DictionaryItem>> {
        let (_, item) = self.by_handle.remove(&handle)?;
        self.by_stream.remove(&item.stream_id);
        Some(item)
    }

    pub(crate) fn clear(&self) {
        self.by_handle.clear();
        self.by_stream.clear();
    }
}
