// ── Login stream bookkeeping ──
//
// The instance owns the login stream; applications observe it through
// registered listeners. The latest granted refresh is kept for replay so
// a listener registered after the handshake still sees the image.
//
// Generic over the callback trait because both instance roles carry a
// login stream; the instance invokes the trait methods, this client only
// keeps the books.

use std::any::Any;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use dashmap::DashMap;

use ommlink_rdm::State;
use ommlink_rdm::login::LoginRefresh;

/// One registered login listener.
pub(crate) struct LoginItem<C: ?Sized> {
    pub(crate) handle: u64,
    pub(crate) client: Arc<C>,
    pub(crate) closure: Option<Arc<dyn Any + Send + Sync>>,
}

impl<C: ?Sized> Clone for LoginItem<C> {
    fn clone(&self) -> Self {
        Self {
            handle: self.handle,
            client: Arc::clone(&self.client),
            closure: self.closure.clone(),
        }
    }
}

pub(crate) struct LoginCallbackClient<C: ?Sized> {
    items: DashMap<u64, LoginItem<C>>,
    latest: ArcSwapOption<LoginRefresh>,
    denied: ArcSwapOption<State>,
}

impl<C: ?Sized + Send + Sync> LoginCallbackClient<C> {
    pub(crate) fn new() -> Self {
        Self {
            items: DashMap::new(),
            latest: ArcSwapOption::empty(),
            denied: ArcSwapOption::empty(),
        }
    }

    pub(crate) fn register(
        &self,
        handle: u64,
        client: Arc<C>,
        closure: Option<Arc<dyn Any + Send + Sync>>,
    ) {
        self.items.insert(
            handle,
            LoginItem {
                handle,
                client,
                closure,
            },
        );
    }

    pub(crate) fn unregister(&self, handle: u64) -> bool {
        self.items.remove(&handle).is_some()
    }

    /// Record the peer's latest granted refresh for replay.
    pub(crate) fn record_refresh(&self, refresh: &LoginRefresh) {
        self.latest.store(Some(Arc::new(refresh.clone())));
    }

    pub(crate) fn latest_refresh(&self) -> Option<Arc<LoginRefresh>> {
        self.latest.load_full()
    }

    /// Record a terminal rejection of the login stream. Only non-open
    /// states land here; the connect handshake keys on it.
    pub(crate) fn record_denied(&self, state: &State) {
        self.denied.store(Some(Arc::new(state.clone())));
    }

    pub(crate) fn denied(&self) -> Option<Arc<State>> {
        self.denied.load_full()
    }

    /// Listener snapshot for fan-out. The instance invokes the callbacks
    /// so no map shard is held across user code.
    pub(crate) fn snapshot(&self) -> Vec<LoginItem<C>> {
        self.items.iter().map(|entry| entry.value().clone()).collect()
    }

    pub(crate) fn clear(&self) {
        self.items.clear();
        self.latest.store(None);
        self.denied.store(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ommlink_rdm::StatusCode;
    use pretty_assertions::assert_eq;

    trait Probe: Send + Sync {}
    struct NoopProbe;
    impl Probe for NoopProbe {}

    fn client() -> LoginCallbackClient<dyn Probe> {
        LoginCallbackClient::new()
    }

    #[test]
    fn latest_refresh_is_replayable() {
        let login = client();
        assert!(login.latest_refresh().is_none());

        let refresh = LoginRefresh {
            name: "user".into(),
            support_batch_requests: true,
            ..LoginRefresh::default()
        };
        login.record_refresh(&refresh);

        let replay = login.latest_refresh().expect("recorded");
        assert_eq!(replay.name, "user");
        assert!(replay.support_batch_requests);
    }

    #[test]
    fn registrations_survive_until_unregistered() {
        let login = client();
        login.register(5, Arc::new(NoopProbe), None);
        assert_eq!(login.snapshot().len(), 1);

        assert!(login.unregister(5));
        assert!(!login.unregister(5));
        assert!(login.snapshot().is_empty());
    }

    #[test]
    fn denied_state_is_sticky_until_clear() {
        let login = client();
        login.record_denied(&State::closed(StatusCode::NotAuthorized, "denied"));
        assert_eq!(
            login.denied().expect("denied").code,
            StatusCode::NotAuthorized
        );

        login.clear();
        assert!(login.denied().is_none());
    }
}
