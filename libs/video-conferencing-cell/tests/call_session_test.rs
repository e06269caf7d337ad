use std::sync::{Arc, Mutex};
use std::time::Duration;
use assert_matches::assert_matches;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use wiremock::{MockServer, Mock, ResponseTemplate};
use wiremock::matchers::{header, method, path};

use shared_api::{ApiClient, MemoryTokenStorage, SessionStore};
use shared_models::auth::{Role, User};
use shared_models::error::ApiError;
use shared_models::notification::NotificationLevel;
use shared_utils::notifier::{drain, NotificationReceiver};
use shared_utils::test_utils::{MockApiResponses, TestConfig, TestUser};
use shared_utils::Notifier;
use video_conferencing_cell::models::{
    CallError, CallPhase, ConnectionStatus, FailureReason, MediaError, SignalingError,
};
use video_conferencing_cell::services::{
    CallSessionController, CallSettings, LocalTrack, MediaConstraints, PeerLayer, RoomService, SignalingChannel,
    SignalingConnector, SignalingEvent, SignalingLink, VirtualMediaAcquirer,
};

// ==============================================================================
// TEST DOUBLES
// ==============================================================================

/// Records every command a channel receives, shared across all channels a
/// connector opens.
type CommandLog = Arc<Mutex<Vec<String>>>;

struct ScriptedChannel {
    log: CommandLog,
    closed: bool,
}

impl SignalingChannel for ScriptedChannel {
    fn announce_join(&mut self, room_id: &str, user_id: &str, user_name: &str) -> Result<(), SignalingError> {
        if self.closed {
            return Err(SignalingError::Closed);
        }
        self.log
            .lock()
            .unwrap()
            .push(format!("join:{}:{}:{}", room_id, user_id, user_name));
        Ok(())
    }

    fn announce_leave(&mut self, room_id: &str, user_id: &str) -> Result<(), SignalingError> {
        if self.closed {
            return Err(SignalingError::Closed);
        }
        self.log.lock().unwrap().push(format!("leave:{}:{}", room_id, user_id));
        Ok(())
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.log.lock().unwrap().push("close".to_string());
        }
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

#[derive(Clone, Copy)]
enum Script {
    Manual,
    AutoConnect,
    FailToConnect,
}

#[derive(Clone)]
struct ScriptedConnector {
    script: Script,
    opens: Arc<Mutex<Vec<(String, String)>>>,
    log: CommandLog,
    events: Arc<Mutex<Option<mpsc::UnboundedSender<SignalingEvent>>>>,
}

impl ScriptedConnector {
    fn new(script: Script) -> Self {
        Self {
            script,
            opens: Arc::new(Mutex::new(Vec::new())),
            log: Arc::new(Mutex::new(Vec::new())),
            events: Arc::new(Mutex::new(None)),
        }
    }

    fn emit(&self, event: SignalingEvent) {
        let events = self.events.lock().unwrap();
        events.as_ref().expect("channel not opened").send(event).unwrap();
    }

    fn opens(&self) -> Vec<(String, String)> {
        self.opens.lock().unwrap().clone()
    }

    fn commands(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

impl SignalingConnector for ScriptedConnector {
    fn open(&self, endpoint: &str, auth_token: &str) -> Result<SignalingLink, SignalingError> {
        self.opens
            .lock()
            .unwrap()
            .push((endpoint.to_string(), auth_token.to_string()));

        let (sender, receiver) = mpsc::unbounded_channel();
        match self.script {
            Script::Manual => {}
            Script::AutoConnect => sender.send(SignalingEvent::Connected).unwrap(),
            Script::FailToConnect => sender
                .send(SignalingEvent::ConnectionFailed("handshake rejected".to_string()))
                .unwrap(),
        }
        *self.events.lock().unwrap() = Some(sender);

        Ok(SignalingLink {
            channel: Box::new(ScriptedChannel {
                log: self.log.clone(),
                closed: false,
            }),
            events: receiver,
        })
    }
}

#[derive(Default)]
struct RecordingPeerLayer {
    signals: Mutex<Vec<(String, Value)>>,
    closes: Mutex<usize>,
}

impl PeerLayer for RecordingPeerLayer {
    fn handle_signal(&self, from: &str, payload: &Value) {
        self.signals.lock().unwrap().push((from.to_string(), payload.clone()));
    }

    fn close(&self) {
        *self.closes.lock().unwrap() += 1;
    }
}

// ==============================================================================
// HARNESS
// ==============================================================================

struct Harness {
    mock_server: MockServer,
    notifications: NotificationReceiver,
    media: VirtualMediaAcquirer,
    connector: ScriptedConnector,
    settings: CallSettings,
    api: Arc<ApiClient>,
}

impl Harness {
    async fn new(script: Script) -> Self {
        Self::with_media(script, VirtualMediaAcquirer::new()).await
    }

    async fn with_media(script: Script, media: VirtualMediaAcquirer) -> Self {
        let mock_server = MockServer::start().await;
        let config = TestConfig::with_mock_server(&mock_server.uri()).to_app_config();
        let session = Arc::new(SessionStore::load(Arc::new(MemoryTokenStorage::with_token(
            "session-token",
        ))));
        let notifier = Notifier::new();
        let notifications = notifier.subscribe();
        let api = Arc::new(ApiClient::new(&config, session, notifier.clone()));

        let settings = CallSettings {
            signaling_endpoint: "ws://signaling.test/ws".to_string(),
            media_timeout: Duration::from_secs(2),
            connect_timeout: Duration::from_secs(2),
            constraints: MediaConstraints::default(),
        };

        Self {
            mock_server,
            notifications,
            media,
            connector: ScriptedConnector::new(script),
            settings,
            api,
        }
    }

    async fn mount_room(&self, room_id: &str) {
        Mock::given(method("GET"))
            .and(path(format!("/api/video/room/{}", room_id)))
            .and(header("authorization", "Bearer session-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(MockApiResponses::room_response(room_id)))
            .mount(&self.mock_server)
            .await;
    }

    fn controller(&self) -> CallSessionController {
        CallSessionController::new(
            RoomService::new(self.api.clone()),
            Arc::new(self.media.clone()),
            Arc::new(self.connector.clone()),
            self.settings.clone(),
        )
    }

    fn notifications(&mut self) -> Vec<(NotificationLevel, String)> {
        drain(&mut self.notifications)
            .into_iter()
            .map(|notification| (notification.level, notification.message))
            .collect()
    }

    fn all_tracks_stopped(&self) -> bool {
        let tracks = self.media.issued_tracks();
        !tracks.is_empty() && tracks.iter().all(|track| track.is_stopped())
    }
}

fn ana() -> User {
    TestUser::professional("ana@clinic.test")
        .with_id("7")
        .with_name("Ana")
        .to_user()
}

fn patient() -> User {
    TestUser::patient("joao@clinic.test")
        .with_id("12")
        .with_name("João")
        .to_user()
}

async fn connected_controller(harness: &Harness, room_id: &str, user: &User) -> CallSessionController {
    harness.mount_room(room_id).await;
    let mut controller = harness.controller();
    controller.enter_room(room_id, user).await.unwrap();
    assert!(controller.process_next_event().await);
    assert_eq!(controller.phase(), CallPhase::Connected);
    controller
}

// ==============================================================================
// LIFECYCLE
// ==============================================================================

#[tokio::test]
async fn test_professional_call_from_entry_to_end() {
    let mut harness = Harness::new(Script::Manual).await;
    harness.mount_room("r42").await;

    Mock::given(method("POST"))
        .and(path("/api/video/room/r42/end"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .expect(1)
        .mount(&harness.mock_server)
        .await;

    let mut controller = harness.controller();
    controller.enter_room("r42", &ana()).await.unwrap();

    let snapshot = controller.snapshot();
    assert_eq!(snapshot.phase, CallPhase::Connecting);
    assert_eq!(snapshot.connection_status, ConnectionStatus::Connecting);
    assert!(snapshot.call_active);
    assert_eq!(snapshot.room.as_ref().map(|room| room.id.as_str()), Some("r42"));
    assert_eq!(
        harness.connector.opens(),
        vec![("ws://signaling.test/ws".to_string(), "session-token".to_string())]
    );

    harness.connector.emit(SignalingEvent::Connected);
    assert!(controller.process_next_event().await);
    assert_eq!(harness.connector.commands(), vec!["join:r42:7:Ana".to_string()]);

    harness.connector.emit(SignalingEvent::ParticipantJoined("3".to_string()));
    assert!(controller.process_next_event().await);

    let snapshot = controller.snapshot();
    assert_eq!(snapshot.phase, CallPhase::Connected);
    assert_eq!(snapshot.connection_status, ConnectionStatus::Connected);
    assert_eq!(snapshot.participants.iter().cloned().collect::<Vec<_>>(), vec!["3".to_string()]);
    assert!(snapshot.call_active);
    assert_eq!(snapshot.participant_count(), 2);

    controller.end_call(Role::Professional).await.unwrap();

    let snapshot = controller.snapshot();
    assert_eq!(snapshot.phase, CallPhase::Ended);
    assert_eq!(snapshot.connection_status, ConnectionStatus::Disconnected);
    assert!(!snapshot.call_active);
    assert!(!controller.holds_media());
    assert!(harness.all_tracks_stopped());
    assert_eq!(
        harness.connector.commands(),
        vec![
            "join:r42:7:Ana".to_string(),
            "leave:r42:7".to_string(),
            "close".to_string(),
        ]
    );

    let notifications = harness.notifications();
    assert!(notifications.contains(&(NotificationLevel::Info, "3 joined the room".to_string())));
    assert!(notifications.contains(&(
        NotificationLevel::Success,
        "Consultation finished successfully".to_string()
    )));
}

#[tokio::test]
async fn test_patient_end_does_not_touch_backend() {
    let mut harness = Harness::new(Script::AutoConnect).await;

    Mock::given(method("POST"))
        .and(path("/api/video/room/room-1/end"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&harness.mock_server)
        .await;

    let mut controller = connected_controller(&harness, "room-1", &patient()).await;
    controller.end_call(Role::Patient).await.unwrap();

    assert_eq!(controller.phase(), CallPhase::Ended);
    assert!(harness.all_tracks_stopped());
    assert_eq!(
        harness.notifications().last(),
        Some(&(NotificationLevel::Info, "You left the consultation.".to_string()))
    );
}

#[tokio::test]
async fn test_failed_end_notice_still_tears_down() {
    let mut harness = Harness::new(Script::AutoConnect).await;

    Mock::given(method("POST"))
        .and(path("/api/video/room/r42/end"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({"message": "Falha ao finalizar"})))
        .expect(1)
        .mount(&harness.mock_server)
        .await;

    let mut controller = connected_controller(&harness, "r42", &ana()).await;
    let result = controller.end_call(Role::Professional).await;

    assert_matches!(result, Err(CallError::Api(ApiError::Server { status: 500, .. })));
    assert_eq!(controller.phase(), CallPhase::Ended);
    assert!(harness.all_tracks_stopped());

    let errors: Vec<_> = harness
        .notifications()
        .into_iter()
        .filter(|(level, _)| *level == NotificationLevel::Error)
        .collect();
    assert_eq!(errors, vec![(NotificationLevel::Error, "Falha ao finalizar".to_string())]);

    // A second end is a quiet no-op.
    controller.end_call(Role::Professional).await.unwrap();
    assert!(harness.notifications().is_empty());
}

#[tokio::test]
async fn test_enter_room_twice_is_rejected() {
    let harness = Harness::new(Script::AutoConnect).await;
    let mut controller = connected_controller(&harness, "r42", &ana()).await;

    let result = controller.enter_room("r42", &ana()).await;
    assert_matches!(result, Err(CallError::InvalidState { phase: CallPhase::Connected, .. }));
    assert_eq!(harness.connector.opens().len(), 1);
}

// ==============================================================================
// FAILURES
// ==============================================================================

#[tokio::test]
async fn test_room_not_found_fails_with_single_notification() {
    let mut harness = Harness::new(Script::AutoConnect).await;

    Mock::given(method("GET"))
        .and(path("/api/video/room/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_json(MockApiResponses::error_response("Sala não encontrada")))
        .mount(&harness.mock_server)
        .await;

    let mut controller = harness.controller();
    let result = controller.enter_room("missing", &ana()).await;

    assert_matches!(result, Err(CallError::Api(ApiError::NotFound(message))) if message == "Sala não encontrada");
    let snapshot = controller.snapshot();
    assert_eq!(snapshot.phase, CallPhase::Failed);
    assert_eq!(snapshot.failure, Some(FailureReason::RoomNotFound));
    assert_eq!(harness.media.acquisitions(), 0);
    assert!(harness.connector.opens().is_empty());
    assert_eq!(
        harness.notifications(),
        vec![(NotificationLevel::Error, "Sala não encontrada".to_string())]
    );
}

#[tokio::test]
async fn test_unauthorized_room_fetch_clears_session() {
    let mut harness = Harness::new(Script::AutoConnect).await;

    Mock::given(method("GET"))
        .and(path("/api/video/room/r42"))
        .respond_with(ResponseTemplate::new(401).set_body_json(MockApiResponses::error_response("Token expirado")))
        .expect(1)
        .mount(&harness.mock_server)
        .await;

    let mut controller = harness.controller();
    let result = controller.enter_room("r42", &ana()).await;

    assert_matches!(result, Err(CallError::Api(ApiError::Unauthorized(_))));
    let snapshot = controller.snapshot();
    assert_eq!(snapshot.phase, CallPhase::Failed);
    assert_eq!(snapshot.failure, Some(FailureReason::Unauthorized));
    assert!(!snapshot.call_active);
    assert!(harness.api.session().token().is_none());
    assert_eq!(harness.media.acquisitions(), 0);
    assert!(harness.connector.opens().is_empty());
    assert_eq!(
        harness.notifications(),
        vec![(NotificationLevel::Error, "Token expirado".to_string())]
    );
}

#[tokio::test]
async fn test_unauthorized_end_notice_clears_session_and_tears_down() {
    let mut harness = Harness::new(Script::AutoConnect).await;

    Mock::given(method("POST"))
        .and(path("/api/video/room/r42/end"))
        .respond_with(ResponseTemplate::new(401).set_body_json(MockApiResponses::error_response("Token expirado")))
        .expect(1)
        .mount(&harness.mock_server)
        .await;

    let mut controller = connected_controller(&harness, "r42", &ana()).await;
    harness.notifications();

    let result = controller.end_call(Role::Professional).await;

    assert_matches!(result, Err(CallError::Api(ApiError::Unauthorized(_))));
    assert_eq!(controller.phase(), CallPhase::Ended);
    assert!(harness.all_tracks_stopped());
    assert!(harness.api.session().token().is_none());
    assert_eq!(
        harness.connector.commands(),
        vec![
            "join:r42:7:Ana".to_string(),
            "leave:r42:7".to_string(),
            "close".to_string(),
        ]
    );
    assert_eq!(
        harness.notifications(),
        vec![(NotificationLevel::Error, "Token expirado".to_string())]
    );
}

#[tokio::test]
async fn test_unrepresentable_connect_timeout_waits_without_deadline() {
    let mut harness = Harness::new(Script::Manual).await;
    harness.settings.connect_timeout = Duration::from_secs(u64::MAX);
    harness.mount_room("r42").await;

    let mut controller = harness.controller();
    controller.enter_room("r42", &ana()).await.unwrap();
    assert_eq!(controller.phase(), CallPhase::Connecting);

    harness.connector.emit(SignalingEvent::Connected);
    assert!(controller.process_next_event().await);
    assert_eq!(controller.phase(), CallPhase::Connected);
    assert!(harness.notifications().is_empty());
}

#[tokio::test]
async fn test_media_permission_denied_never_opens_signaling() {
    let mut harness =
        Harness::with_media(Script::AutoConnect, VirtualMediaAcquirer::failing(MediaError::PermissionDenied)).await;
    harness.mount_room("r42").await;

    let mut controller = harness.controller();
    let result = controller.enter_room("r42", &ana()).await;

    assert_matches!(result, Err(CallError::Media(MediaError::PermissionDenied)));
    let snapshot = controller.snapshot();
    assert_eq!(snapshot.phase, CallPhase::Failed);
    assert_eq!(snapshot.failure, Some(FailureReason::MediaPermissionDenied));
    assert!(!snapshot.call_active);
    assert!(!controller.holds_media());
    assert!(harness.connector.opens().is_empty());

    let notifications = harness.notifications();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].0, NotificationLevel::Error);
}

#[tokio::test]
async fn test_missing_device_is_distinguishable() {
    let media = VirtualMediaAcquirer::new().with_devices(MediaConstraints { audio: true, video: false });
    let harness = Harness::with_media(Script::AutoConnect, media).await;
    harness.mount_room("r42").await;

    let mut controller = harness.controller();
    let result = controller.enter_room("r42", &patient()).await;

    assert_matches!(result, Err(CallError::Media(MediaError::DeviceUnavailable)));
    assert_eq!(controller.snapshot().failure, Some(FailureReason::MediaDeviceUnavailable));
}

#[tokio::test]
async fn test_media_timeout() {
    let media = VirtualMediaAcquirer::new().with_delay(Duration::from_millis(500));
    let mut harness = Harness::with_media(Script::AutoConnect, media).await;
    harness.settings.media_timeout = Duration::from_millis(50);
    harness.mount_room("r42").await;

    let mut controller = harness.controller();
    let result = controller.enter_room("r42", &patient()).await;

    assert_matches!(result, Err(CallError::Media(MediaError::Timeout)));
    assert_eq!(controller.snapshot().failure, Some(FailureReason::MediaTimeout));
    assert!(harness.connector.opens().is_empty());
}

#[tokio::test]
async fn test_signaling_failure_releases_media() {
    let mut harness = Harness::new(Script::FailToConnect).await;
    harness.mount_room("room-1").await;

    let mut controller = harness.controller();
    controller.enter_room("room-1", &patient()).await.unwrap();
    assert!(controller.holds_media());

    assert!(!controller.process_next_event().await);

    let snapshot = controller.snapshot();
    assert_eq!(snapshot.phase, CallPhase::Failed);
    assert_eq!(
        snapshot.failure,
        Some(FailureReason::SignalingFailed("handshake rejected".to_string()))
    );
    assert!(!snapshot.call_active);
    assert!(!controller.holds_media());
    assert!(harness.all_tracks_stopped());
    // Never connected, so nothing to leave.
    assert_eq!(harness.connector.commands(), vec!["close".to_string()]);
    assert_eq!(harness.notifications().len(), 1);
}

#[tokio::test]
async fn test_signaling_connect_timeout() {
    let mut harness = Harness::new(Script::Manual).await;
    harness.settings.connect_timeout = Duration::from_millis(50);
    harness.mount_room("r42").await;

    let mut controller = harness.controller();
    controller.enter_room("r42", &ana()).await.unwrap();

    assert!(!controller.process_next_event().await);
    assert_eq!(controller.snapshot().failure, Some(FailureReason::SignalingTimeout));
    assert!(harness.all_tracks_stopped());
}

#[tokio::test]
async fn test_connection_lost_while_connected() {
    let mut harness = Harness::new(Script::AutoConnect).await;
    let mut controller = connected_controller(&harness, "r42", &ana()).await;
    harness.notifications();

    harness
        .connector
        .emit(SignalingEvent::ConnectionFailed("connection closed by server".to_string()));
    assert!(!controller.process_next_event().await);

    let snapshot = controller.snapshot();
    assert_eq!(snapshot.phase, CallPhase::Failed);
    assert_matches!(snapshot.failure, Some(FailureReason::SignalingLost(_)));
    assert!(harness.all_tracks_stopped());
    assert_eq!(harness.notifications().len(), 1);
}

// ==============================================================================
// IN-CALL BEHAVIOUR
// ==============================================================================

#[tokio::test]
async fn test_duplicate_joins_are_idempotent() {
    let mut harness = Harness::new(Script::AutoConnect).await;
    let mut controller = connected_controller(&harness, "r42", &ana()).await;
    harness.notifications();

    for id in ["3", "3", "5", "7"] {
        harness.connector.emit(SignalingEvent::ParticipantJoined(id.to_string()));
        controller.process_next_event().await;
    }

    let participants: Vec<_> = controller.snapshot().participants.into_iter().collect();
    // "7" is the local user.
    assert_eq!(participants, vec!["3".to_string(), "5".to_string()]);
    assert_eq!(harness.notifications().len(), 2);

    harness.connector.emit(SignalingEvent::ParticipantLeft("3".to_string()));
    harness.connector.emit(SignalingEvent::ParticipantLeft("3".to_string()));
    controller.process_next_event().await;
    controller.process_next_event().await;

    let participants: Vec<_> = controller.snapshot().participants.into_iter().collect();
    assert_eq!(participants, vec!["5".to_string()]);
    assert_eq!(
        harness.notifications(),
        vec![(NotificationLevel::Info, "3 left the room".to_string())]
    );
}

#[tokio::test]
async fn test_double_toggle_restores_state_without_signaling() {
    let harness = Harness::new(Script::AutoConnect).await;
    let mut controller = connected_controller(&harness, "r42", &ana()).await;
    let commands_before = harness.connector.commands();
    let status_before = controller.snapshot().connection_status;

    assert_eq!(controller.toggle_video(), Some(false));
    assert!(!controller.snapshot().local_video_enabled);
    assert_eq!(controller.toggle_video(), Some(true));
    assert!(controller.snapshot().local_video_enabled);

    assert_eq!(controller.toggle_audio(), Some(false));
    assert!(!controller.snapshot().local_audio_enabled);
    assert!(controller.snapshot().local_video_enabled);

    assert_eq!(harness.connector.commands(), commands_before);
    assert_eq!(controller.snapshot().connection_status, status_before);
}

#[tokio::test]
async fn test_toggle_without_stream_is_noop() {
    let harness = Harness::new(Script::AutoConnect).await;
    let mut controller = harness.controller();

    assert_eq!(controller.toggle_video(), None);
    assert_eq!(controller.toggle_audio(), None);
    assert!(controller.snapshot().local_video_enabled);
}

#[tokio::test]
async fn test_signals_are_handed_to_peer_layer() {
    let harness = Harness::new(Script::AutoConnect).await;
    harness.mount_room("r42").await;
    let peer = Arc::new(RecordingPeerLayer::default());

    let mut controller = harness.controller().with_peer_layer(peer.clone());
    controller.enter_room("r42", &ana()).await.unwrap();
    controller.process_next_event().await;

    harness.connector.emit(SignalingEvent::Signal {
        from: "3".to_string(),
        payload: json!({"from": "3", "signal": {"type": "offer"}}),
    });
    controller.process_next_event().await;

    assert_eq!(
        peer.signals.lock().unwrap().clone(),
        vec![("3".to_string(), json!({"from": "3", "signal": {"type": "offer"}}))]
    );

    controller.teardown();
    controller.teardown();
    assert_eq!(*peer.closes.lock().unwrap(), 1);
}

#[tokio::test]
async fn test_teardown_twice_sends_one_leave() {
    let harness = Harness::new(Script::AutoConnect).await;
    let mut controller = connected_controller(&harness, "r42", &ana()).await;

    controller.teardown();
    controller.teardown();
    drop(controller);

    let leaves = harness
        .connector
        .commands()
        .into_iter()
        .filter(|command| command.starts_with("leave"))
        .count();
    assert_eq!(leaves, 1);
    assert!(harness.all_tracks_stopped());
}

#[tokio::test]
async fn test_end_before_entry_is_invalid() {
    let harness = Harness::new(Script::AutoConnect).await;
    let mut controller = harness.controller();

    let result = controller.end_call(Role::Patient).await;
    assert_matches!(result, Err(CallError::InvalidState { phase: CallPhase::Idle, .. }));
}

#[tokio::test]
async fn test_missing_session_fails_entry() {
    let mut harness = Harness::new(Script::AutoConnect).await;
    harness.api.session().clear();

    let mut controller = harness.controller();
    let result = controller.enter_room("r42", &ana()).await;

    assert_matches!(result, Err(CallError::NotAuthenticated));
    assert_eq!(controller.snapshot().failure, Some(FailureReason::Unauthorized));
    assert_eq!(harness.notifications().len(), 1);
}

// ==============================================================================
// BACKGROUND TASK
// ==============================================================================

#[tokio::test]
async fn test_spawned_call_runs_to_end() {
    let harness = Harness::new(Script::AutoConnect).await;
    harness.mount_room("r42").await;

    let call = harness.controller().spawn("r42", patient());
    let connected = call.wait_for(|snapshot| snapshot.phase == CallPhase::Connected).await;
    assert!(connected.call_active);

    call.toggle_audio();
    let muted = call.wait_for(|snapshot| !snapshot.local_audio_enabled).await;
    assert_eq!(muted.connection_status, ConnectionStatus::Connected);

    harness.connector.emit(SignalingEvent::ParticipantJoined("7".to_string()));
    let joined = call.wait_for(|snapshot| !snapshot.participants.is_empty()).await;
    assert!(joined.participants.contains("7"));

    call.end_call(Role::Patient).await.unwrap();
    assert_eq!(call.snapshot().phase, CallPhase::Ended);

    // Ending again is a no-op.
    call.end_call(Role::Patient).await.unwrap();
    call.finished().await;
    assert!(harness.all_tracks_stopped());
}

#[tokio::test]
async fn test_dropping_handle_tears_down() {
    let harness = Harness::new(Script::AutoConnect).await;
    harness.mount_room("r42").await;

    let call = harness.controller().spawn("r42", ana());
    let mut snapshots = call.subscribe();
    call.wait_for(|snapshot| snapshot.phase == CallPhase::Connected).await;

    drop(call);

    let ended = snapshots
        .wait_for(|snapshot| snapshot.phase == CallPhase::Ended)
        .await
        .map(|snapshot| snapshot.clone());
    match ended {
        Ok(snapshot) => assert!(!snapshot.call_active),
        // The task may finish before the receiver observes the last value.
        Err(_) => assert_eq!(snapshots.borrow().phase, CallPhase::Ended),
    }

    tokio::time::timeout(Duration::from_secs(2), async {
        while !harness.all_tracks_stopped() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    assert!(harness.connector.commands().contains(&"leave:r42:7".to_string()));
}

#[tokio::test]
async fn test_leave_while_media_pending() {
    let media = VirtualMediaAcquirer::new().with_delay(Duration::from_millis(500));
    let harness = Harness::with_media(Script::AutoConnect, media).await;
    harness.mount_room("r42").await;

    let call = harness.controller().spawn("r42", patient());
    call.wait_for(|snapshot| snapshot.phase == CallPhase::AwaitingMedia).await;

    call.leave();
    let snapshot = call.wait_for(|snapshot| snapshot.phase.is_terminal()).await;

    assert_eq!(snapshot.phase, CallPhase::Ended);
    assert!(!snapshot.call_active);
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert!(harness.connector.opens().is_empty());
    assert!(harness.media.issued_tracks().is_empty());
}

#[tokio::test]
async fn test_waiting_for_events_is_cancel_safe() {
    let harness = Harness::new(Script::AutoConnect).await;
    let mut controller = connected_controller(&harness, "r42", &ana()).await;

    {
        let mut waiting = tokio_test::task::spawn(controller.process_next_event());
        tokio_test::assert_pending!(waiting.poll());
    }

    harness.connector.emit(SignalingEvent::ParticipantJoined("3".to_string()));
    assert!(controller.process_next_event().await);
    assert!(controller.snapshot().participants.contains("3"));
}
