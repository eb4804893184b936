//! The non-interactive provider instance.
//!
//! A provider logs in to its peer, advertises a source directory, and
//! publishes item streams it opens itself. Under `ApiControl` the
//! directory is built from configuration and submitted automatically;
//! under `UserControl` the application submits directory messages, which
//! are validated and merged into the instance's store before forwarding.

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use ommlink_rdm::directory::filter_flags;
use ommlink_rdm::login::{LOGIN_STREAM_ID, LoginRefresh};
use ommlink_rdm::{
    DataState, DomainType, Message, MsgKey, Payload, RefreshMsg, RequestMsg, State, StatusCode,
    StreamState,
};
use ommlink_reactor::{ChannelEvent, IoctlCode, Reactor, ReactorEvent};

use crate::base::{DIRECTORY_STREAM_ID, EventQueue, EventSink, HandleSeq};
use crate::client::channel::ChannelCallbackClient;
use crate::client::login::LoginCallbackClient;
use crate::client::{ChannelState, ProviderClient, ProviderEvent};
use crate::config::{AdminControl, OperationModel, ProviderConfig};
use crate::directory::{DirectoryServiceStore, StoreRole};
use crate::error::{AccessError, ErrorClient, ErrorCode, deliver_error, route_error};
use crate::pool::ObjectManager;

/// Bookkeeping for one stream the application publishes on.
struct PublishedItem {
    domain: DomainType,
    name: Option<String>,
}

/// A non-interactive provider of OMM services over a reactor runtime.
#[derive(Clone)]
pub struct Provider {
    inner: Arc<ProviderInner>,
}

struct ProviderInner {
    config: ProviderConfig,
    instance_id: Uuid,
    reactor: Arc<dyn Reactor>,
    event_tx: mpsc::UnboundedSender<ReactorEvent>,
    events: EventQueue,
    channel: ChannelCallbackClient,
    login: LoginCallbackClient<dyn ProviderClient>,
    store: DirectoryServiceStore,
    published: DashMap<i32, PublishedItem>,
    pools: ObjectManager,
    handles: HandleSeq,
    error_client: OnceLock<Arc<dyn ErrorClient>>,
    /// Set while a recovered channel still owes the peer a directory
    /// image (ApiControl only).
    republish_directory: AtomicBool,
    cancel: CancellationToken,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl Provider {
    /// Create an instance. Does not connect; call
    /// [`connect`](Self::connect) to bring the channel up, log in, and
    /// (under ApiControl) advertise the configured directory.
    pub fn new(config: ProviderConfig, reactor: Arc<dyn Reactor>) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let pools = ObjectManager::new(config.pool_size);
        let store = DirectoryServiceStore::new(
            StoreRole::Provider,
            config.instance_name.clone(),
            Arc::clone(&pools.services),
        );

        Self {
            inner: Arc::new(ProviderInner {
                instance_id: Uuid::new_v4(),
                reactor,
                event_tx,
                events: EventQueue::new(event_rx),
                channel: ChannelCallbackClient::new(config.instance_name.clone()),
                login: LoginCallbackClient::new(),
                store,
                published: DashMap::new(),
                pools,
                handles: HandleSeq::new(),
                error_client: OnceLock::new(),
                republish_directory: AtomicBool::new(false),
                cancel: CancellationToken::new(),
                pump: Mutex::new(None),
                config,
            }),
        }
    }

    /// Register the alternative error delivery path. Only the first call
    /// wins; later calls are ignored.
    pub fn register_error_client(&self, client: Arc<dyn ErrorClient>) {
        let _ = self.inner.error_client.set(client);
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Connect the channel, log in, and advertise the directory when the
    /// instance controls it.
    pub async fn connect(&self) -> Result<(), AccessError> {
        let inner = &self.inner;
        if inner.channel.channel().is_some() {
            return Err(AccessError::usage(
                ErrorCode::InvalidOperation,
                "instance is already connected",
            ));
        }

        let options = &inner.config.channel;
        let channel = inner
            .reactor
            .connect(options, inner.event_tx.clone())
            .map_err(AccessError::from)?;
        inner.channel.activate(options, channel);

        let deadline = Instant::now() + options.connect_timeout;
        inner
            .events
            .pump_until(inner.as_ref(), deadline, || {
                !matches!(inner.channel.state(), ChannelState::Initializing)
            })
            .await;
        if !matches!(
            inner.channel.state(),
            ChannelState::Up | ChannelState::Ready
        ) {
            inner.channel.close();
            return Err(AccessError::usage(
                ErrorCode::Failure,
                format!("channel {} did not come up", options.name),
            ));
        }

        if let Err(err) = self.admin_handshakes().await {
            // Release the channel and handshake state so a later
            // connect() starts clean.
            inner.login.clear();
            inner.store.clear();
            inner.channel.close();
            return Err(err);
        }

        if inner.config.operation_model == OperationModel::ApiDispatch {
            let sink = Arc::clone(inner);
            let cancel = inner.cancel.clone();
            let handle = tokio::spawn(async move {
                sink.events.run(sink.as_ref(), cancel).await;
            });
            *lock_pump(&inner.pump) = Some(handle);
        }

        info!(
            instance = %inner.config.instance_name,
            instance_id = %inner.instance_id,
            services = inner.store.service_count(),
            "provider initialized"
        );
        Ok(())
    }

    /// Tear the instance down: stop the pump, drop published-stream
    /// bookkeeping, and release the channel. Idempotent.
    pub async fn uninitialize(&self) {
        let inner = &self.inner;
        inner.cancel.cancel();
        let pump = lock_pump(&inner.pump).take();
        if let Some(handle) = pump {
            let _ = handle.await;
        }

        inner.published.clear();
        inner.login.clear();
        inner.channel.close();

        info!(
            instance = %inner.config.instance_name,
            instance_id = %inner.instance_id,
            "provider uninitialized"
        );
    }

    /// Pump at most one event (UserDispatch only). Returns whether an
    /// event was dispatched before the timeout.
    pub async fn dispatch(&self, timeout: Duration) -> Result<bool, AccessError> {
        if self.inner.config.operation_model != OperationModel::UserDispatch {
            return self.route_value(AccessError::usage(
                ErrorCode::InvalidOperation,
                "dispatch() requires OperationModel::UserDispatch",
            ));
        }
        Ok(self
            .inner
            .events
            .dispatch_one(self.inner.as_ref(), timeout)
            .await)
    }

    // ── Observation ──────────────────────────────────────────────────

    pub fn channel_state(&self) -> watch::Receiver<ChannelState> {
        self.inner.channel.subscribe()
    }

    pub fn channel_name(&self) -> Option<String> {
        self.inner.channel.channel_name()
    }

    /// Resolve an advertised service name to its id.
    pub fn service_id_by_name(&self, name: &str) -> Option<u16> {
        self.inner.store.service_id_by_name(name)
    }

    /// Whether an advertised service currently accepts new requests,
    /// according to the cached state filter.
    pub fn is_accepting_requests(&self, service_id: u16) -> bool {
        self.inner.store.is_accepting_requests(service_id)
    }

    // ── Registration ─────────────────────────────────────────────────

    /// Register for the instance's login stream events. Only the login
    /// domain is open for registration on a provider.
    pub fn register_client(
        &self,
        request: &RequestMsg,
        client: Arc<dyn ProviderClient>,
        closure: Option<Arc<dyn Any + Send + Sync>>,
    ) -> Result<u64, AccessError> {
        if request.domain != DomainType::Login {
            return self.route_value(AccessError::usage(
                ErrorCode::InvalidOperation,
                format!(
                    "only Login domain registrations are supported on a provider, got {}",
                    request.domain
                ),
            ));
        }

        let inner = &self.inner;
        let handle = inner.handles.next();
        inner
            .login
            .register(handle, Arc::clone(&client), closure.clone());
        if let Some(refresh) = inner.login.latest_refresh() {
            if let Message::Refresh(msg) = refresh.to_message() {
                let event = inner.provider_event(handle, closure);
                client.on_refresh(&event, &msg);
            }
        }
        Ok(handle)
    }

    pub fn unregister(&self, handle: u64) -> Result<(), AccessError> {
        if self.inner.login.unregister(handle) {
            Ok(())
        } else {
            route_error(
                self.error_client(),
                AccessError::handle(handle, "unregister on an unknown handle"),
            )
        }
    }

    // ── Publishing ───────────────────────────────────────────────────

    /// Submit an outbound message: directory refresh/update/status under
    /// UserControl, or refresh/update/status/generic on an item stream
    /// the application publishes.
    pub fn submit(&self, message: Message) -> Result<(), AccessError> {
        match self.do_submit(message) {
            Ok(()) => Ok(()),
            Err(err) => route_error(self.error_client(), err),
        }
    }

    /// Forward a transport tuning knob to the live channel.
    pub fn modify_ioctl(&self, code: IoctlCode, value: u64) -> Result<(), AccessError> {
        match self.inner.channel.ioctl(code, value) {
            Ok(()) => Ok(()),
            Err(err) => route_error(self.error_client(), err),
        }
    }

    // ── Internals ────────────────────────────────────────────────────

    async fn admin_handshakes(&self) -> Result<(), AccessError> {
        self.login_handshake().await?;
        let inner = &self.inner;
        if inner.config.directory_admin_control == AdminControl::ApiControl {
            inner.store.seed(&inner.config.services)?;
            inner.publish_directory()?;
        }
        Ok(())
    }

    async fn login_handshake(&self) -> Result<(), AccessError> {
        let inner = &self.inner;
        let request = inner.config.login.to_login_request(true).to_message();
        inner.channel.submit(request)?;

        let deadline = Instant::now() + inner.config.login_request_timeout;
        inner
            .events
            .pump_until(inner.as_ref(), deadline, || {
                inner.login.latest_refresh().is_some() || inner.login.denied().is_some()
            })
            .await;

        if let Some(state) = inner.login.denied() {
            return Err(AccessError::usage(
                ErrorCode::Failure,
                format!("login request rejected: {state}"),
            ));
        }
        match inner.login.latest_refresh() {
            Some(refresh) if refresh.state.stream_state == StreamState::Open => {
                debug!(user = %refresh.name, state = %refresh.state, "login accepted");
                Ok(())
            }
            Some(refresh) => Err(AccessError::usage(
                ErrorCode::Failure,
                format!("login refresh carries state {}", refresh.state),
            )),
            None => Err(AccessError::usage(
                ErrorCode::Failure,
                format!(
                    "login request timed out after {:?}",
                    inner.config.login_request_timeout
                ),
            )),
        }
    }

    fn do_submit(&self, message: Message) -> Result<(), AccessError> {
        match message.domain() {
            DomainType::Source => self.submit_directory(message),
            DomainType::Login => Err(AccessError::usage(
                ErrorCode::InvalidOperation,
                "the login stream is managed by the instance",
            )),
            _ => self.submit_item(message),
        }
    }

    fn submit_directory(&self, message: Message) -> Result<(), AccessError> {
        let inner = &self.inner;
        if inner.config.directory_admin_control == AdminControl::ApiControl {
            return Err(AccessError::usage(
                ErrorCode::InvalidOperation,
                "attempt to submit a SourceDirectory message while directory admin control is ApiControl",
            ));
        }

        match &message {
            Message::Refresh(msg) => {
                let services = inner.store.decode_directory(&msg.payload)?;
                if msg.clear_cache {
                    inner.store.clear();
                }
                inner.store.set_directory_state(msg.state.clone());
                inner.store.apply_services(&services);
            }
            Message::Update(msg) => {
                let services = inner.store.decode_directory(&msg.payload)?;
                inner.store.apply_services(&services);
            }
            Message::Status(_) => {}
            other => {
                return Err(AccessError::usage(
                    ErrorCode::InvalidArgument,
                    format!(
                        "cannot submit a {} on the directory stream",
                        other.class_name()
                    ),
                ));
            }
        }
        inner.channel.submit(message)
    }

    fn submit_item(&self, message: Message) -> Result<(), AccessError> {
        let inner = &self.inner;
        match &message {
            Message::Refresh(msg) => {
                if let Some(service_id) = msg.key.service_id {
                    if inner.config.directory_admin_control == AdminControl::ApiControl
                        && inner.store.service_name_by_id(service_id).is_none()
                    {
                        warn!(
                            service_id,
                            stream_id = msg.stream_id,
                            "publishing on a service the directory does not advertise"
                        );
                    }
                }
                inner.published.insert(
                    msg.stream_id,
                    PublishedItem {
                        domain: msg.domain,
                        name: msg.key.name.clone(),
                    },
                );
            }
            Message::Update(msg) => self.require_published(msg.stream_id, &message)?,
            Message::Generic(msg) => self.require_published(msg.stream_id, &message)?,
            Message::Status(msg) => {
                if let Some(state) = &msg.state {
                    if state.stream_state != StreamState::Open {
                        inner.published.remove(&msg.stream_id);
                    }
                }
            }
            other => {
                return Err(AccessError::usage(
                    ErrorCode::InvalidArgument,
                    format!("cannot publish a {} message", other.class_name()),
                ));
            }
        }
        inner.channel.submit(message)
    }

    fn require_published(&self, stream_id: i32, message: &Message) -> Result<(), AccessError> {
        let Some(item) = self.inner.published.get(&stream_id) else {
            return Err(AccessError::usage(
                ErrorCode::InvalidOperation,
                format!(
                    "attempt to submit a {} on stream {stream_id} before a refresh",
                    message.class_name()
                ),
            ));
        };
        if item.domain != message.domain() {
            return Err(AccessError::usage(
                ErrorCode::InvalidArgument,
                format!(
                    "stream {stream_id} publishes {} ({}), not {}",
                    item.domain,
                    item.name.as_deref().unwrap_or(""),
                    message.domain()
                ),
            ));
        }
        Ok(())
    }

    fn error_client(&self) -> Option<&dyn ErrorClient> {
        self.inner.error_client.get().map(Arc::as_ref)
    }

    fn route_value<T: Default>(&self, err: AccessError) -> Result<T, AccessError> {
        match self.error_client() {
            Some(client) => {
                deliver_error(client, &err);
                Ok(T::default())
            }
            None => Err(err),
        }
    }
}

// ── Dispatch-side handling ──────────────────────────────────────────

impl EventSink for ProviderInner {
    fn process_event(&self, event: ReactorEvent) {
        match event {
            ReactorEvent::Channel { channel_id, event } => self.on_channel_event(channel_id, &event),
            ReactorEvent::Msg { message, .. } => self.on_message(&message),
        }
    }
}

impl ProviderInner {
    fn provider_event(
        &self,
        handle: u64,
        closure: Option<Arc<dyn Any + Send + Sync>>,
    ) -> ProviderEvent {
        ProviderEvent {
            handle,
            closure,
            channel_name: self.channel.channel_name().unwrap_or_default(),
        }
    }

    fn dispatch_failure(&self, err: AccessError) {
        match self.error_client.get() {
            Some(client) => deliver_error(client.as_ref(), &err),
            None => warn!(error = %err, "dispatch failure"),
        }
    }

    /// Build and submit the full directory image out of the store.
    fn publish_directory(&self) -> Result<(), AccessError> {
        let (map, achieved, state) = self.store.refresh_from_cache(filter_flags::ALL)?;
        let message = Message::Refresh(RefreshMsg {
            stream_id: DIRECTORY_STREAM_ID,
            domain: DomainType::Source,
            key: MsgKey::default().with_filter(achieved),
            state,
            solicited: false,
            complete: true,
            clear_cache: true,
            payload: Payload::Map(map),
        });
        self.channel.submit(message)?;
        debug!(
            services = self.store.service_count(),
            "directory image published"
        );
        Ok(())
    }

    fn on_channel_event(&self, channel_id: u64, event: &ChannelEvent) {
        let prev = self.channel.state();
        if !self.channel.on_channel_event(channel_id, event) {
            return;
        }
        match event {
            ChannelEvent::Up if prev == ChannelState::DownReconnecting => {
                debug!("channel recovered, replaying login request");
                let login = self.config.login.to_login_request(true).to_message();
                if let Err(err) = self.channel.submit(login) {
                    self.dispatch_failure(err);
                }
                if self.config.directory_admin_control == AdminControl::ApiControl {
                    // The peer lost our image with the channel; send it
                    // again once login is re-granted.
                    self.republish_directory.store(true, Ordering::Release);
                }
            }
            ChannelEvent::DownReconnecting { .. } => self.fan_out_channel_down(false),
            ChannelEvent::Down { .. } => self.fan_out_channel_down(true),
            _ => {}
        }
    }

    fn fan_out_channel_down(&self, terminal: bool) {
        let state = if terminal {
            State {
                stream_state: StreamState::ClosedRecover,
                data_state: DataState::Suspect,
                code: StatusCode::None,
                text: "channel down".into(),
            }
        } else {
            State::open_suspect(StatusCode::None, "channel down, reconnecting")
        };

        for item in self.login.snapshot() {
            let mut status = self.pools.status_msgs.get();
            status.stream_id = LOGIN_STREAM_ID;
            status.domain = DomainType::Login;
            status.state = Some(state.clone());
            let event = self.provider_event(item.handle, item.closure.clone());
            item.client.on_status(&event, &status);
        }

        if terminal {
            self.published.clear();
        }
    }

    fn on_message(&self, message: &Message) {
        if message.stream_id() != LOGIN_STREAM_ID {
            debug!(
                stream_id = message.stream_id(),
                class = message.class_name(),
                "message outside the login stream dropped"
            );
            return;
        }

        match message {
            Message::Refresh(msg) => {
                match LoginRefresh::from_refresh(msg) {
                    Ok(refresh) => self.login.record_refresh(&refresh),
                    Err(err) => self.dispatch_failure(err.into()),
                }
                if self.republish_directory.swap(false, Ordering::AcqRel) {
                    if let Err(err) = self.publish_directory() {
                        self.dispatch_failure(err);
                    }
                }
                for item in self.login.snapshot() {
                    let event = self.provider_event(item.handle, item.closure.clone());
                    item.client.on_all(&event, message);
                    item.client.on_refresh(&event, msg);
                }
            }
            Message::Status(msg) => {
                if let Some(state) = &msg.state {
                    if state.stream_state != StreamState::Open {
                        self.login.record_denied(state);
                    }
                }
                for item in self.login.snapshot() {
                    let event = self.provider_event(item.handle, item.closure.clone());
                    item.client.on_all(&event, message);
                    item.client.on_status(&event, msg);
                }
            }
            Message::Generic(msg) => {
                for item in self.login.snapshot() {
                    let event = self.provider_event(item.handle, item.closure.clone());
                    item.client.on_all(&event, message);
                    item.client.on_generic(&event, msg);
                }
            }
            other => debug!(
                class = other.class_name(),
                "unexpected message on the login stream"
            ),
        }
    }
}

fn lock_pump(
    pump: &Mutex<Option<JoinHandle<()>>>,
) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
    match pump.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
