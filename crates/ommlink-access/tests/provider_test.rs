// Integration tests for `Provider` against the loopback reactor.
#![allow(clippy::unwrap_used)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use ommlink_access::{
    AccessError, AdminControl, ErrorCode, Provider, ProviderClient, ProviderConfig, ProviderEvent,
};
use ommlink_rdm::data::MapAction;
use ommlink_rdm::directory::{
    DirectoryRefresh, DirectoryUpdate, Service, ServiceInfo, ServiceState, filter_flags,
};
use ommlink_rdm::login::{LOGIN_STREAM_ID, LoginRefresh, LoginRequest, ROLE_PROVIDER};
use ommlink_rdm::{
    DomainType, GenericMsg, Message, MsgKey, Payload, RefreshMsg, State, StatusMsg, StreamState,
    UpdateMsg,
};
use ommlink_reactor::{LoopbackPeer, LoopbackReactor};

// ── Helpers ─────────────────────────────────────────────────────────

#[derive(Default)]
struct Recording {
    refreshes: Mutex<Vec<RefreshMsg>>,
    statuses: Mutex<Vec<StatusMsg>>,
    generics: Mutex<Vec<GenericMsg>>,
}

impl ProviderClient for Recording {
    fn on_refresh(&self, _event: &ProviderEvent, refresh: &RefreshMsg) {
        self.refreshes.lock().unwrap().push(refresh.clone());
    }
    fn on_status(&self, _event: &ProviderEvent, status: &StatusMsg) {
        self.statuses.lock().unwrap().push(status.clone());
    }
    fn on_generic(&self, _event: &ProviderEvent, generic: &GenericMsg) {
        self.generics.lock().unwrap().push(generic.clone());
    }
}

fn sample_service(id: u16, name: &str) -> Service {
    Service {
        service_id: id,
        action: MapAction::Add,
        info: Some(ServiceInfo {
            service_name: name.to_owned(),
            capabilities: vec![DomainType::MarketPrice.code()],
            ..ServiceInfo::default()
        }),
        state: Some(ServiceState::default()),
        ..Service::default()
    }
}

/// Accept the provider's login request and grant it.
async fn answer_provider_login(mut peer: LoopbackPeer) -> LoopbackPeer {
    let (channel_id, msg) = peer.next_submit().await.expect("login request");
    let Message::Request(request) = msg else {
        panic!("expected a login request");
    };
    assert_eq!(request.domain, DomainType::Login);
    let decoded = LoginRequest::from_request(&request).expect("decode");
    assert_eq!(decoded.role, ROLE_PROVIDER);

    let refresh = LoginRefresh {
        name: decoded.name,
        ..LoginRefresh::default()
    };
    assert!(peer.send_msg(channel_id, refresh.to_message()));
    peer
}

fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

async fn connected_provider(config: ProviderConfig) -> (Provider, LoopbackPeer, u64) {
    init_tracing();
    let (reactor, peer) = LoopbackReactor::new();
    let responder = tokio::spawn(answer_provider_login(peer));
    let provider = Provider::new(config, Arc::new(reactor));
    provider.connect().await.expect("connect");
    let peer = responder.await.expect("responder");
    (provider, peer, 1)
}

async fn wait_for(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}

fn api_control_config() -> ProviderConfig {
    ProviderConfig {
        services: vec![sample_service(10, "NI_PUB")],
        ..ProviderConfig::default()
    }
}

fn item_refresh(stream_id: i32) -> Message {
    Message::Refresh(RefreshMsg {
        stream_id,
        domain: DomainType::MarketPrice,
        key: MsgKey::default().with_name("IBM.N").with_service_id(10),
        state: State::open_ok("OK"),
        solicited: false,
        complete: true,
        clear_cache: false,
        payload: Payload::None,
    })
}

// ── Directory: ApiControl ───────────────────────────────────────────

#[tokio::test]
async fn test_api_control_publishes_configured_directory() {
    let (provider, mut peer, _) = connected_provider(api_control_config()).await;

    let (_, msg) = peer.next_submit().await.expect("directory image");
    let Message::Refresh(refresh) = msg else {
        panic!("expected a refresh");
    };
    assert_eq!(refresh.domain, DomainType::Source);
    assert!(!refresh.solicited);
    assert!(refresh.clear_cache);

    let decoded = DirectoryRefresh::from_refresh(&refresh).expect("decode");
    assert_eq!(decoded.services.len(), 1);
    assert_eq!(decoded.services[0].name(), Some("NI_PUB"));
    assert_eq!(decoded.services[0].action, MapAction::Add);

    assert_eq!(provider.service_id_by_name("NI_PUB"), Some(10));
    assert!(provider.is_accepting_requests(10));
    assert!(!provider.is_accepting_requests(99));
}

#[tokio::test]
async fn test_api_control_rejects_user_directory_submits() {
    let (provider, mut peer, _) = connected_provider(api_control_config()).await;
    peer.next_submit().await.expect("directory image");

    let update = DirectoryUpdate {
        stream_id: 2,
        filter: filter_flags::STATE,
        services: vec![Service {
            service_id: 10,
            action: MapAction::Update,
            state: Some(ServiceState {
                service_up: false,
                ..ServiceState::default()
            }),
            ..Service::default()
        }],
    };
    let err = provider
        .submit(update.to_message().expect("encode"))
        .expect_err("directory is api-controlled");
    assert!(matches!(
        err,
        AccessError::InvalidUsage {
            code: ErrorCode::InvalidOperation,
            ..
        }
    ));
    assert!(peer.try_next_submit().is_none());
}

#[tokio::test]
async fn test_duplicate_configured_service_ids_fail_connect() {
    let (reactor, peer) = LoopbackReactor::new();
    let responder = tokio::spawn(answer_provider_login(peer));

    let config = ProviderConfig {
        services: vec![sample_service(10, "A"), sample_service(10, "B")],
        ..ProviderConfig::default()
    };
    let provider = Provider::new(config, Arc::new(reactor));
    let err = provider.connect().await.expect_err("duplicate ids");
    assert!(matches!(
        err,
        AccessError::InvalidUsage {
            code: ErrorCode::InvalidOperation,
            ..
        }
    ));
    responder.await.expect("responder");
}

// ── Directory: UserControl ──────────────────────────────────────────

#[tokio::test]
async fn test_user_control_validates_merges_and_forwards() {
    let config = ProviderConfig {
        directory_admin_control: AdminControl::UserControl,
        ..ProviderConfig::default()
    };
    let (provider, mut peer, _) = connected_provider(config).await;

    let refresh = DirectoryRefresh {
        stream_id: 2,
        filter: filter_flags::INFO | filter_flags::STATE,
        services: vec![sample_service(11, "USER_FEED")],
        ..DirectoryRefresh::default()
    };
    provider
        .submit(refresh.to_message().expect("encode"))
        .expect("submit refresh");

    // Merged into the store and forwarded to the wire.
    assert_eq!(provider.service_id_by_name("USER_FEED"), Some(11));
    let (_, msg) = peer.next_submit().await.expect("forwarded refresh");
    assert_eq!(msg.domain(), DomainType::Source);

    // An update carrying an Info filter is structurally invalid and must
    // not reach the wire.
    let bad = DirectoryUpdate {
        stream_id: 2,
        filter: filter_flags::INFO,
        services: vec![Service {
            action: MapAction::Update,
            ..sample_service(11, "USER_FEED")
        }],
    };
    let err = provider
        .submit(bad.to_message().expect("encode"))
        .expect_err("info on update");
    assert!(matches!(
        err,
        AccessError::InvalidUsage {
            code: ErrorCode::InvalidOperation,
            ..
        }
    ));
    assert!(peer.try_next_submit().is_none());

    // A state-only update merges fine.
    let update = DirectoryUpdate {
        stream_id: 2,
        filter: filter_flags::STATE,
        services: vec![Service {
            service_id: 11,
            action: MapAction::Update,
            state: Some(ServiceState {
                service_up: false,
                accepting_requests: Some(false),
                ..ServiceState::default()
            }),
            ..Service::default()
        }],
    };
    provider
        .submit(update.to_message().expect("encode"))
        .expect("submit update");
    assert!(!provider.is_accepting_requests(11));
    let (_, msg) = peer.next_submit().await.expect("forwarded update");
    assert_eq!(msg.domain(), DomainType::Source);
}

// ── Item publishing ─────────────────────────────────────────────────

#[tokio::test]
async fn test_item_publishing_tracks_streams() {
    let (provider, mut peer, _) = connected_provider(api_control_config()).await;
    peer.next_submit().await.expect("directory image");

    // An update before any refresh has no stream to ride on.
    let early = Message::Update(UpdateMsg {
        stream_id: 5,
        domain: DomainType::MarketPrice,
        key: MsgKey::default(),
        payload: Payload::None,
    });
    let err = provider.submit(early).expect_err("no refresh yet");
    assert!(matches!(
        err,
        AccessError::InvalidUsage {
            code: ErrorCode::InvalidOperation,
            ..
        }
    ));

    provider.submit(item_refresh(5)).expect("refresh");
    provider
        .submit(Message::Update(UpdateMsg {
            stream_id: 5,
            domain: DomainType::MarketPrice,
            key: MsgKey::default(),
            payload: Payload::None,
        }))
        .expect("update on open stream");

    // Closing the stream drops the bookkeeping.
    provider
        .submit(Message::Status(StatusMsg {
            stream_id: 5,
            domain: DomainType::MarketPrice,
            key: MsgKey::default(),
            state: Some(State::closed(ommlink_rdm::StatusCode::None, "done")),
        }))
        .expect("status");
    let err = provider
        .submit(Message::Update(UpdateMsg {
            stream_id: 5,
            domain: DomainType::MarketPrice,
            key: MsgKey::default(),
            payload: Payload::None,
        }))
        .expect_err("stream closed");
    assert!(matches!(err, AccessError::InvalidUsage { .. }));

    // Refresh, update, status reached the wire; the rejected ones did not.
    for expected in ["Refresh", "Update", "Status"] {
        let (_, msg) = peer.next_submit().await.expect("published");
        assert_eq!(msg.class_name(), expected);
    }
    assert!(peer.try_next_submit().is_none());
}

#[tokio::test]
async fn test_request_submits_are_rejected() {
    let (provider, mut peer, _) = connected_provider(api_control_config()).await;
    peer.next_submit().await.expect("directory image");

    let err = provider
        .submit(Message::Request(ommlink_rdm::RequestMsg {
            domain: DomainType::MarketPrice,
            ..ommlink_rdm::RequestMsg::default()
        }))
        .expect_err("providers do not request");
    assert!(matches!(
        err,
        AccessError::InvalidUsage {
            code: ErrorCode::InvalidArgument,
            ..
        }
    ));
}

// ── Login stream ────────────────────────────────────────────────────

#[tokio::test]
async fn test_login_registration_replays_and_receives_generics() {
    let (provider, mut peer, channel_id) = connected_provider(api_control_config()).await;
    peer.next_submit().await.expect("directory image");

    let client = Arc::new(Recording::default());
    let handle = provider
        .register_client(
            &ommlink_rdm::RequestMsg {
                domain: DomainType::Login,
                streaming: true,
                ..ommlink_rdm::RequestMsg::default()
            },
            client.clone(),
            None,
        )
        .expect("register");
    assert_ne!(handle, 0);
    // The connect-time login refresh is replayed on registration.
    assert_eq!(client.refreshes.lock().unwrap().len(), 1);

    peer.send_msg(
        channel_id,
        Message::Generic(GenericMsg {
            stream_id: LOGIN_STREAM_ID,
            domain: DomainType::Login,
            complete: true,
            ..GenericMsg::default()
        }),
    );
    wait_for(|| !client.generics.lock().unwrap().is_empty()).await;

    // Non-login registrations have no meaning on a provider.
    let err = provider
        .register_client(
            &ommlink_rdm::RequestMsg {
                domain: DomainType::MarketPrice,
                ..ommlink_rdm::RequestMsg::default()
            },
            client,
            None,
        )
        .expect_err("not a login registration");
    assert!(matches!(
        err,
        AccessError::InvalidUsage {
            code: ErrorCode::InvalidOperation,
            ..
        }
    ));
}

#[tokio::test]
async fn test_channel_recovery_republishes_directory() {
    let (provider, mut peer, channel_id) = connected_provider(api_control_config()).await;
    peer.next_submit().await.expect("initial directory image");

    let client = Arc::new(Recording::default());
    provider
        .register_client(
            &ommlink_rdm::RequestMsg {
                domain: DomainType::Login,
                streaming: true,
                ..ommlink_rdm::RequestMsg::default()
            },
            client.clone(),
            None,
        )
        .expect("register");
    client.refreshes.lock().unwrap().clear();

    peer.fail_channel(channel_id, "link lost", true);
    wait_for(|| !client.statuses.lock().unwrap().is_empty()).await;
    let state = client.statuses.lock().unwrap()[0]
        .state
        .clone()
        .expect("state");
    assert_eq!(state.stream_state, StreamState::Open);

    // Recovery: login is replayed, and once re-granted the directory
    // image goes out again.
    peer.recover_channel(channel_id);
    let (_, msg) = peer.next_submit().await.expect("login replay");
    let Message::Request(request) = msg else {
        panic!("expected a login request");
    };
    let refresh = LoginRefresh {
        name: request.key.name.clone().unwrap_or_default(),
        ..LoginRefresh::default()
    };
    peer.send_msg(channel_id, refresh.to_message());

    let (_, msg) = peer.next_submit().await.expect("republished directory");
    assert_eq!(msg.domain(), DomainType::Source);
    assert_eq!(msg.class_name(), "Refresh");
}
