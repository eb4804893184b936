//! The consumer instance.
//!
//! `Consumer::connect` walks the configured channel list until one comes
//! up, performs the login handshake, subscribes the instance's own
//! directory stream, and then either starts the background dispatch pump
//! (ApiDispatch) or leaves pumping to `dispatch()` calls (UserDispatch).
//!
//! Cheaply cloneable via `Arc`; all methods take `&self`.

use std::any::Any;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use ommlink_rdm::dictionary::DictionaryRefresh;
use ommlink_rdm::directory::{
    DirectoryRefresh, DirectoryRequest, DirectoryUpdate, ServiceState, filter_flags,
};
use ommlink_rdm::login::{LOGIN_STREAM_ID, LoginRefresh};
use ommlink_rdm::{
    DataState, DomainType, GenericMsg, Message, RequestMsg, State, StatusCode, StreamState,
};
use ommlink_reactor::{ChannelEvent, IoctlCode, Reactor, ReactorEvent};

use crate::base::{DIRECTORY_STREAM_ID, EventQueue, EventSink, HandleSeq, StreamSeq};
use crate::client::channel::ChannelCallbackClient;
use crate::client::dictionary::{DictionaryCallbackClient, DictionaryItem};
use crate::client::directory::{DirectoryCallbackClient, DirectoryItem};
use crate::client::item::{ItemCallbackClient, SingleItem};
use crate::client::login::LoginCallbackClient;
use crate::client::{ChannelState, ConsumerClient, ConsumerEvent};
use crate::config::{ConsumerConfig, OperationModel};
use crate::directory::DirectoryStoreListener;
use crate::error::{AccessError, ErrorClient, ErrorCode, deliver_error, route_error};
use crate::pool::ObjectManager;

/// A consumer of OMM services over a reactor runtime.
#[derive(Clone)]
pub struct Consumer {
    inner: Arc<ConsumerInner>,
}

struct ConsumerInner {
    config: ConsumerConfig,
    instance_id: Uuid,
    reactor: Arc<dyn Reactor>,
    event_tx: mpsc::UnboundedSender<ReactorEvent>,
    events: EventQueue,
    channel: ChannelCallbackClient,
    login: LoginCallbackClient<dyn ConsumerClient>,
    directory: DirectoryCallbackClient,
    dictionary: DictionaryCallbackClient,
    items: ItemCallbackClient,
    pools: ObjectManager,
    handles: HandleSeq,
    streams: StreamSeq,
    error_client: OnceLock<Arc<dyn ErrorClient>>,
    cancel: CancellationToken,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl Consumer {
    /// Create an instance. Does not connect; call
    /// [`connect`](Self::connect) to bring the channel up and run the
    /// admin handshakes.
    pub fn new(config: ConsumerConfig, reactor: Arc<dyn Reactor>) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let pools = ObjectManager::new(config.pool_size);
        let directory =
            DirectoryCallbackClient::new(config.instance_name.clone(), Arc::clone(&pools.services));

        Self {
            inner: Arc::new(ConsumerInner {
                instance_id: Uuid::new_v4(),
                reactor,
                event_tx,
                events: EventQueue::new(event_rx),
                channel: ChannelCallbackClient::new(config.instance_name.clone()),
                login: LoginCallbackClient::new(),
                directory,
                dictionary: DictionaryCallbackClient::new(),
                items: ItemCallbackClient::new(),
                pools,
                handles: HandleSeq::new(),
                streams: StreamSeq::new(),
                error_client: OnceLock::new(),
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

    /// Connect, log in, and load the initial directory.
    ///
    /// Connection failures are returned, never routed to the error
    /// client: with no instance up yet there is nothing to keep using.
    pub async fn connect(&self) -> Result<(), AccessError> {
        let inner = &self.inner;
        if inner.channel.channel().is_some() {
            return Err(AccessError::usage(
                ErrorCode::InvalidOperation,
                "instance is already connected",
            ));
        }

        // Items on a deleted or downed service learn about it through the
        // store's change notifications.
        inner
            .directory
            .store
            .set_listener(Arc::clone(inner) as Arc<dyn DirectoryStoreListener>);

        self.attach_channel().await?;
        if let Err(err) = self.admin_handshakes().await {
            // Release the channel and handshake state so a later
            // connect() starts clean.
            inner.login.clear();
            inner.directory.clear();
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
            services = inner.directory.store.service_count(),
            "consumer initialized"
        );
        Ok(())
    }

    /// Tear the instance down: stop the pump, close open streams, and
    /// release the channel. Idempotent.
    pub async fn uninitialize(&self) {
        let inner = &self.inner;
        inner.cancel.cancel();
        let pump = lock_pump(&inner.pump).take();
        if let Some(handle) = pump {
            let _ = handle.await;
        }

        debug!(open_items = inner.items.len(), "closing item streams");
        for item in inner.items.drain() {
            let close = Message::Close(ommlink_rdm::CloseMsg {
                stream_id: item.stream_id,
                domain: item.domain,
            });
            if let Err(err) = inner.channel.submit(close) {
                debug!(error = %err, "close on teardown not delivered");
            }
        }
        inner.dictionary.clear();
        inner.login.clear();
        inner.directory.clear();
        inner.channel.close();

        info!(
            instance = %inner.config.instance_name,
            instance_id = %inner.instance_id,
            "consumer uninitialized"
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

    /// Name of the currently attached channel.
    pub fn channel_name(&self) -> Option<String> {
        self.inner.channel.channel_name()
    }

    // ── Registration ─────────────────────────────────────────────────

    /// Open a subscription. Routes by domain: login, directory, and
    /// dictionary requests go to the instance's admin clients; everything
    /// else opens a user item stream. Returns the non-zero handle for the
    /// subscription, or 0 when the failure went to the error client.
    pub fn register_client(
        &self,
        request: &RequestMsg,
        client: Arc<dyn ConsumerClient>,
        closure: Option<Arc<dyn Any + Send + Sync>>,
    ) -> Result<u64, AccessError> {
        match self.do_register(request, client, closure) {
            Ok(handle) => Ok(handle),
            Err(err) => self.route_value(err),
        }
    }

    /// Change an open subscription (priority, streaming mode, filter) by
    /// resubmitting its request on the existing stream.
    pub fn reissue(&self, handle: u64, request: &RequestMsg) -> Result<(), AccessError> {
        match self.do_reissue(handle, request) {
            Ok(()) => Ok(()),
            Err(err) => route_error(self.error_client(), err),
        }
    }

    fn do_reissue(&self, handle: u64, request: &RequestMsg) -> Result<(), AccessError> {
        let inner = &self.inner;
        let Some(item) = inner.items.by_handle(handle) else {
            return Err(AccessError::handle(handle, "reissue on an unknown handle"));
        };
        if request.domain != item.domain {
            return Err(AccessError::usage(
                ErrorCode::InvalidArgument,
                format!(
                    "reissue domain {} does not match the open stream's {}",
                    request.domain, item.domain
                ),
            ));
        }
        let mut msg = request.clone();
        msg.stream_id = item.stream_id;
        inner.channel.submit(Message::Request(msg))
    }

    /// Close a subscription and drop its bookkeeping.
    pub fn unregister(&self, handle: u64) -> Result<(), AccessError> {
        match self.do_unregister(handle) {
            Ok(()) => Ok(()),
            Err(err) => route_error(self.error_client(), err),
        }
    }

    /// Send a generic message on an open item stream.
    pub fn submit(&self, handle: u64, generic: GenericMsg) -> Result<(), AccessError> {
        let inner = &self.inner;
        let result = match inner.items.by_handle(handle) {
            Some(item) => {
                let mut msg = generic;
                msg.stream_id = item.stream_id;
                msg.domain = item.domain;
                inner.channel.submit(Message::Generic(msg))
            }
            None => Err(AccessError::handle(handle, "submit on an unknown handle")),
        };
        match result {
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

    // ── Connect internals ────────────────────────────────────────────

    async fn attach_channel(&self) -> Result<(), AccessError> {
        let inner = &self.inner;
        let mut last_error: Option<AccessError> = None;

        for options in &inner.config.channels {
            match inner.reactor.connect(options, inner.event_tx.clone()) {
                Ok(channel) => {
                    inner.channel.activate(options, channel);
                    let deadline = Instant::now() + options.connect_timeout;
                    inner
                        .events
                        .pump_until(inner.as_ref(), deadline, || {
                            !matches!(inner.channel.state(), ChannelState::Initializing)
                        })
                        .await;
                    match inner.channel.state() {
                        ChannelState::Up | ChannelState::Ready => return Ok(()),
                        state => {
                            warn!(
                                channel = %options.name,
                                ?state,
                                "channel did not come up, trying the next one"
                            );
                            inner.channel.close();
                            last_error = Some(AccessError::usage(
                                ErrorCode::Failure,
                                format!("channel {} did not come up", options.name),
                            ));
                        }
                    }
                }
                Err(err) => {
                    warn!(channel = %options.name, error = %err, "connect attempt failed");
                    last_error = Some(err.into());
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            AccessError::usage(ErrorCode::InvalidArgument, "no channels configured")
        }))
    }

    async fn admin_handshakes(&self) -> Result<(), AccessError> {
        self.login_handshake().await?;
        self.directory_handshake().await
    }

    async fn login_handshake(&self) -> Result<(), AccessError> {
        let inner = &self.inner;
        let request = inner.config.login.to_login_request(false).to_message();
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

    async fn directory_handshake(&self) -> Result<(), AccessError> {
        let inner = &self.inner;
        let request = DirectoryRequest {
            stream_id: DIRECTORY_STREAM_ID,
            filter: inner.config.directory_filter,
            ..DirectoryRequest::default()
        };
        inner.channel.submit(request.to_message())?;

        let deadline = Instant::now() + inner.config.directory_request_timeout;
        let seen = inner
            .events
            .pump_until(inner.as_ref(), deadline, || inner.directory.initial_seen())
            .await;
        if seen {
            Ok(())
        } else {
            Err(AccessError::usage(
                ErrorCode::Failure,
                format!(
                    "directory request timed out after {:?}",
                    inner.config.directory_request_timeout
                ),
            ))
        }
    }

    // ── Registration internals ───────────────────────────────────────

    fn do_register(
        &self,
        request: &RequestMsg,
        client: Arc<dyn ConsumerClient>,
        closure: Option<Arc<dyn Any + Send + Sync>>,
    ) -> Result<u64, AccessError> {
        let inner = &self.inner;
        match request.domain {
            DomainType::Login => {
                let handle = inner.handles.next();
                inner.login.register(handle, Arc::clone(&client), closure.clone());
                if let Some(refresh) = inner.login.latest_refresh() {
                    // Replay the image so a late registrant sees stream state.
                    if let Message::Refresh(msg) = refresh.to_message() {
                        let event = inner.consumer_event(handle, closure);
                        client.on_refresh(&event, &msg);
                    }
                }
                Ok(handle)
            }

            DomainType::Source => {
                let handle = inner.handles.next();
                let item = Arc::new(DirectoryItem {
                    handle,
                    filter: request.key.filter.unwrap_or(filter_flags::ALL),
                    service_id: request.key.service_id,
                    service_name: request.key.service_name.clone(),
                    streaming: request.streaming,
                    client: Arc::clone(&client),
                    closure: closure.clone(),
                });
                inner.directory.register(Arc::clone(&item));
                if inner.directory.initial_seen() {
                    let msg = inner.directory.refresh_for_item(&item);
                    let event = inner.consumer_event(handle, closure);
                    client.on_refresh(&event, &msg);
                    if !item.streaming {
                        inner.directory.unregister(handle);
                    }
                }
                Ok(handle)
            }

            DomainType::Dictionary => {
                let mut req = ommlink_rdm::dictionary::DictionaryRequest::from_request(request)?;
                req.service_id = inner.resolve_service(req.service_id, req.service_name.as_deref())?;
                req.service_name = None;
                req.stream_id = inner.streams.next();
                inner.channel.submit(req.to_message())?;

                let handle = inner.handles.next();
                inner.dictionary.insert(Arc::new(DictionaryItem::new(
                    handle,
                    req.stream_id,
                    req.name,
                    client,
                    closure,
                )));
                Ok(handle)
            }

            _ => {
                let service_id =
                    inner.resolve_service(request.key.service_id, request.key.service_name.as_deref())?;

                let mut msg = request.clone();
                msg.stream_id = inner.streams.next();
                msg.key.service_id = service_id;
                msg.key.service_name = None;
                inner.channel.submit(Message::Request(msg.clone()))?;

                let handle = inner.handles.next();
                inner.items.insert(Arc::new(SingleItem {
                    handle,
                    stream_id: msg.stream_id,
                    domain: msg.domain,
                    name: msg.key.name,
                    service_id,
                    streaming: msg.streaming,
                    client,
                    closure,
                }));
                Ok(handle)
            }
        }
    }

    fn do_unregister(&self, handle: u64) -> Result<(), AccessError> {
        let inner = &self.inner;
        if inner.login.unregister(handle) || inner.directory.unregister(handle) {
            return Ok(());
        }
        if let Some(item) = inner.dictionary.remove(handle) {
            self.close_stream(item.stream_id, DomainType::Dictionary);
            return Ok(());
        }
        if let Some(item) = inner.items.remove(handle) {
            self.close_stream(item.stream_id, item.domain);
            return Ok(());
        }
        Err(AccessError::handle(
            handle,
            "unregister on an unknown handle",
        ))
    }

    fn close_stream(&self, stream_id: i32, domain: DomainType) {
        let close = Message::Close(ommlink_rdm::CloseMsg { stream_id, domain });
        if let Err(err) = self.inner.channel.submit(close) {
            // The stream dies with the channel anyway.
            debug!(stream_id, error = %err, "close not delivered");
        }
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

// ── Dispatch-side message handling ──────────────────────────────────

impl EventSink for ConsumerInner {
    fn process_event(&self, event: ReactorEvent) {
        match event {
            ReactorEvent::Channel { channel_id, event } => self.on_channel_event(channel_id, &event),
            ReactorEvent::Msg { message, .. } => self.on_message(message),
        }
    }
}

impl ConsumerInner {
    fn consumer_event(
        &self,
        handle: u64,
        closure: Option<Arc<dyn Any + Send + Sync>>,
    ) -> ConsumerEvent {
        ConsumerEvent {
            handle,
            closure,
            channel_name: self.channel.channel_name().unwrap_or_default(),
        }
    }

    fn resolve_service(
        &self,
        service_id: Option<u16>,
        service_name: Option<&str>,
    ) -> Result<Option<u16>, AccessError> {
        match (service_id, service_name) {
            (Some(id), _) => Ok(Some(id)),
            (None, Some(name)) => match self.directory.store.service_id_by_name(name) {
                Some(id) => Ok(Some(id)),
                None => Err(AccessError::usage(
                    ErrorCode::InvalidArgument,
                    format!("service '{name}' is not known to the directory"),
                )),
            },
            (None, None) => Ok(None),
        }
    }

    fn dispatch_failure(&self, err: AccessError) {
        match self.error_client.get() {
            Some(client) => deliver_error(client.as_ref(), &err),
            None => warn!(error = %err, "dispatch failure"),
        }
    }

    // ── Channel events ───────────────────────────────────────────────

    fn on_channel_event(&self, channel_id: u64, event: &ChannelEvent) {
        let prev = self.channel.state();
        if !self.channel.on_channel_event(channel_id, event) {
            return;
        }
        match event {
            ChannelEvent::Up if prev == ChannelState::DownReconnecting => {
                self.resume_admin_streams();
            }
            ChannelEvent::DownReconnecting { .. } => self.fan_out_channel_down(false),
            ChannelEvent::Down { .. } => self.fan_out_channel_down(true),
            _ => {}
        }
    }

    /// The reactor recovered the transport; replay the admin handshakes so
    /// the peer re-grants the login and directory streams.
    fn resume_admin_streams(&self) {
        debug!("channel recovered, replaying admin requests");
        let login = self.config.login.to_login_request(false).to_message();
        if let Err(err) = self.channel.submit(login) {
            self.dispatch_failure(err);
        }
        let directory = DirectoryRequest {
            stream_id: DIRECTORY_STREAM_ID,
            filter: self.config.directory_filter,
            ..DirectoryRequest::default()
        };
        if let Err(err) = self.channel.submit(directory.to_message()) {
            self.dispatch_failure(err);
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

        for login_item in self.login.snapshot() {
            let mut status = self.pools.status_msgs.get();
            status.stream_id = LOGIN_STREAM_ID;
            status.domain = DomainType::Login;
            status.state = Some(state.clone());
            let event = self.consumer_event(login_item.handle, login_item.closure.clone());
            login_item.client.on_status(&event, &status);
        }

        for item in self.items.snapshot() {
            let mut status = self.pools.status_msgs.get();
            status.stream_id = item.stream_id;
            status.domain = item.domain;
            status.key.name.clone_from(&item.name);
            status.key.service_id = item.service_id;
            status.state = Some(state.clone());
            let event = self.consumer_event(item.handle, item.closure.clone());
            item.client.on_status(&event, &status);
        }

        if terminal {
            // Channel teardown destroys items; re-registering opens fresh
            // streams on whatever channel comes next.
            self.items.drain();
            self.dictionary.clear();
        }
    }

    fn fan_out_service_status(&self, service_id: u16, state: &State, destroy: bool) {
        for item in self.items.snapshot() {
            if item.service_id != Some(service_id) {
                continue;
            }
            let mut status = self.pools.status_msgs.get();
            status.stream_id = item.stream_id;
            status.domain = item.domain;
            status.key.name.clone_from(&item.name);
            status.key.service_id = item.service_id;
            status.state = Some(state.clone());
            let event = self.consumer_event(item.handle, item.closure.clone());
            item.client.on_status(&event, &status);
            if destroy {
                self.items.remove(item.handle);
            }
        }
    }

    // ── Inbound messages ─────────────────────────────────────────────

    fn on_message(&self, message: Message) {
        let stream_id = message.stream_id();
        if stream_id == LOGIN_STREAM_ID {
            self.on_login_msg(&message);
        } else if stream_id == DIRECTORY_STREAM_ID {
            self.on_directory_msg(&message);
        } else if let Some(item) = self.dictionary.by_stream(stream_id) {
            self.on_dictionary_msg(&item, &message);
        } else if let Some(item) = self.items.by_stream(stream_id) {
            self.on_item_msg(&item, &message);
        } else {
            debug!(
                stream_id,
                class = message.class_name(),
                "message on unknown stream dropped"
            );
        }
    }

    fn on_login_msg(&self, message: &Message) {
        match message {
            Message::Refresh(msg) => {
                match LoginRefresh::from_refresh(msg) {
                    Ok(refresh) => self.login.record_refresh(&refresh),
                    Err(err) => self.dispatch_failure(err.into()),
                }
                for item in self.login.snapshot() {
                    let event = self.consumer_event(item.handle, item.closure.clone());
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
                    let event = self.consumer_event(item.handle, item.closure.clone());
                    item.client.on_all(&event, message);
                    item.client.on_status(&event, msg);
                }
            }
            Message::Update(msg) => {
                for item in self.login.snapshot() {
                    let event = self.consumer_event(item.handle, item.closure.clone());
                    item.client.on_all(&event, message);
                    item.client.on_update(&event, msg);
                }
            }
            Message::Generic(msg) => {
                for item in self.login.snapshot() {
                    let event = self.consumer_event(item.handle, item.closure.clone());
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

    fn on_directory_msg(&self, message: &Message) {
        match message {
            Message::Refresh(msg) => {
                let refresh = match DirectoryRefresh::from_refresh(msg) {
                    Ok(refresh) => refresh,
                    Err(err) => return self.dispatch_failure(err.into()),
                };
                self.directory.store.apply_refresh(&refresh);
                self.directory.mark_initial();

                for item in self.directory.snapshot() {
                    let out = self.directory.refresh_for_item(&item);
                    let event = self.consumer_event(item.handle, item.closure.clone());
                    item.client.on_refresh(&event, &out);
                    if !item.streaming {
                        self.directory.unregister(item.handle);
                    }
                }
            }
            Message::Update(msg) => {
                let update = match DirectoryUpdate::from_update(msg) {
                    Ok(update) => update,
                    Err(err) => return self.dispatch_failure(err.into()),
                };
                self.directory.store.apply_services(&update.services);

                for item in self.directory.snapshot() {
                    if let Some(out) = self.directory.update_for_item(&item, &update.services) {
                        let event = self.consumer_event(item.handle, item.closure.clone());
                        item.client.on_update(&event, &out);
                    }
                }
            }
            Message::Status(msg) => {
                for item in self.directory.snapshot() {
                    let event = self.consumer_event(item.handle, item.closure.clone());
                    item.client.on_all(&event, message);
                    item.client.on_status(&event, msg);
                }
            }
            other => debug!(
                class = other.class_name(),
                "unexpected message on the directory stream"
            ),
        }
    }

    fn on_dictionary_msg(&self, item: &Arc<DictionaryItem>, message: &Message) {
        let event = self.consumer_event(item.handle, item.closure.clone());
        item.client.on_all(&event, message);
        match message {
            Message::Refresh(msg) => {
                match DictionaryRefresh::from_refresh(msg) {
                    Ok(part) => {
                        item.record_part(part.part, part.complete, msg.clear_cache);
                        if item.is_complete() {
                            debug!(
                                dictionary = %item.name,
                                parts = item.part_count(),
                                bytes = item.assembled().len(),
                                "dictionary refresh complete"
                            );
                        }
                    }
                    Err(err) => self.dispatch_failure(err.into()),
                }
                item.client.on_refresh(&event, msg);
            }
            Message::Status(msg) => {
                item.client.on_status(&event, msg);
                if let Some(state) = &msg.state {
                    if matches!(
                        state.stream_state,
                        StreamState::Closed | StreamState::ClosedRedirected
                    ) {
                        self.dictionary.remove(item.handle);
                    }
                }
            }
            other => debug!(
                class = other.class_name(),
                "unexpected message on a dictionary stream"
            ),
        }
    }

    fn on_item_msg(&self, item: &Arc<SingleItem>, message: &Message) {
        let event = self.consumer_event(item.handle, item.closure.clone());
        item.client.on_all(&event, message);
        match message {
            Message::Refresh(msg) => {
                item.client.on_refresh(&event, msg);
                if msg.complete && !item.streaming {
                    // Snapshot satisfied; the stream is gone on both sides.
                    self.items.remove(item.handle);
                }
            }
            Message::Update(msg) => item.client.on_update(&event, msg),
            Message::Status(msg) => {
                item.client.on_status(&event, msg);
                if let Some(state) = &msg.state {
                    if matches!(
                        state.stream_state,
                        StreamState::Closed | StreamState::ClosedRedirected
                    ) {
                        self.items.remove(item.handle);
                    }
                }
            }
            Message::Generic(msg) => item.client.on_generic(&event, msg),
            other => debug!(
                class = other.class_name(),
                stream_id = item.stream_id,
                "unexpected message on an item stream"
            ),
        }
    }
}

impl DirectoryStoreListener for ConsumerInner {
    /// Streams on a deleted service cannot recover in place; close them
    /// so the application re-requests once the service reappears.
    fn on_service_delete(&self, service_id: u16) {
        let state = State {
            stream_state: StreamState::ClosedRecover,
            data_state: DataState::Suspect,
            code: StatusCode::None,
            text: "service deleted".into(),
        };
        self.fan_out_service_status(service_id, &state, true);
    }

    fn on_service_state_change(&self, service_id: u16, service_state: &ServiceState) {
        if service_state.service_up {
            return;
        }
        let state = State::open_suspect(StatusCode::None, "service down");
        self.fan_out_service_status(service_id, &state, false);
    }
}

fn lock_pump(pump: &Mutex<Option<JoinHandle<()>>>) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
    match pump.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
