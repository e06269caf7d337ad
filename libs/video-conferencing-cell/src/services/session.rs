// libs/video-conferencing-cell/src/services/session.rs
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use shared_config::AppConfig;
use shared_models::auth::{Role, User};
use shared_utils::Notifier;

use crate::models::{
    CallError, CallPhase, CallSnapshot, ConnectionStatus, FailureReason, MediaError, SignalingError,
};
use crate::services::media::{MediaAcquirer, MediaConstraints, MediaHandle, TrackKind};
use crate::services::peer::{LoggingPeerLayer, PeerLayer};
use crate::services::room::RoomService;
use crate::services::signaling::{SignalingChannel, SignalingConnector, SignalingEvent};
use crate::services::websocket::signaling_endpoint;

#[derive(Debug, Clone)]
pub struct CallSettings {
    pub signaling_endpoint: String,
    pub media_timeout: Duration,
    pub connect_timeout: Duration,
    pub constraints: MediaConstraints,
}

impl CallSettings {
    pub fn from_config(config: &AppConfig) -> Result<Self, SignalingError> {
        Ok(Self {
            signaling_endpoint: signaling_endpoint(config)?,
            media_timeout: config.media_timeout(),
            connect_timeout: config.signaling_connect_timeout(),
            constraints: MediaConstraints::default(),
        })
    }
}

/// State machine for one visit to a call room.
///
/// The controller exclusively owns the local media stream, the signaling
/// channel and the peer layer for the visit. All of them are released by
/// `teardown`, which also runs on drop. State is published through a watch
/// channel so the view only ever reads it.
pub struct CallSessionController {
    rooms: RoomService,
    media: Arc<dyn MediaAcquirer>,
    signaling: Arc<dyn SignalingConnector>,
    peer: Arc<dyn PeerLayer>,
    notifier: Notifier,
    settings: CallSettings,
    state: watch::Sender<CallSnapshot>,
    room_id: Option<String>,
    user: Option<User>,
    stream: Option<MediaHandle>,
    channel: Option<Box<dyn SignalingChannel>>,
    events: Option<mpsc::UnboundedReceiver<SignalingEvent>>,
    peer_attached: bool,
    cancel: CancellationToken,
    connect_deadline: Option<Instant>,
}

impl CallSessionController {
    pub fn new(
        rooms: RoomService,
        media: Arc<dyn MediaAcquirer>,
        signaling: Arc<dyn SignalingConnector>,
        settings: CallSettings,
    ) -> Self {
        let notifier = rooms.api().notifier().clone();
        Self {
            rooms,
            media,
            signaling,
            peer: Arc::new(LoggingPeerLayer::new()),
            notifier,
            settings,
            state: watch::Sender::new(CallSnapshot::default()),
            room_id: None,
            user: None,
            stream: None,
            channel: None,
            events: None,
            peer_attached: false,
            cancel: CancellationToken::new(),
            connect_deadline: None,
        }
    }

    pub fn with_peer_layer(mut self, peer: Arc<dyn PeerLayer>) -> Self {
        self.peer = peer;
        self
    }

    pub fn snapshot(&self) -> CallSnapshot {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<CallSnapshot> {
        self.state.subscribe()
    }

    pub fn phase(&self) -> CallPhase {
        self.state.borrow().phase
    }

    pub fn holds_media(&self) -> bool {
        self.stream.is_some()
    }

    pub fn has_event_source(&self) -> bool {
        self.events.is_some()
    }

    // ==========================================================================
    // ENTRY
    // ==========================================================================

    /// Fetches the room, acquires local media and opens signaling.
    ///
    /// Returns once the signaling connect is underway; `Connected` arrives as
    /// an event. Every failure leaves the call in `Failed` with one
    /// notification to the user.
    pub async fn enter_room(&mut self, room_id: &str, user: &User) -> Result<(), CallError> {
        let phase = self.phase();
        if phase != CallPhase::Idle {
            return Err(CallError::InvalidState { phase, operation: "enter the room" });
        }

        info!("Entering room {} as {} ({})", room_id, user.id, user.role);
        self.room_id = Some(room_id.to_string());
        self.user = Some(user.clone());
        self.set_phase(CallPhase::Loading);

        let token = match self.rooms.api().session().token() {
            Some(token) => token,
            None => {
                self.fail(FailureReason::Unauthorized, true);
                return Err(CallError::NotAuthenticated);
            }
        };

        let fetched = self.rooms.fetch_room(room_id).await;
        self.ensure_active()?;
        let room = match fetched {
            Ok(room) => room,
            Err(e) => {
                // ApiClient has already told the user.
                self.fail(FailureReason::from_api(&e), false);
                return Err(e.into());
            }
        };

        self.state.send_modify(|state| {
            state.room = Some(room);
            state.phase = CallPhase::AwaitingMedia;
        });

        let acquired = tokio::time::timeout(
            self.settings.media_timeout,
            self.media.acquire(&self.settings.constraints),
        )
        .await;
        self.ensure_active()?;
        let stream = match acquired {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                self.fail(FailureReason::from_media(&e), true);
                return Err(e.into());
            }
            Err(_) => {
                self.fail(FailureReason::MediaTimeout, true);
                return Err(MediaError::Timeout.into());
            }
        };

        let video = stream.track_enabled(TrackKind::Video).unwrap_or(false);
        let audio = stream.track_enabled(TrackKind::Audio).unwrap_or(false);
        self.stream = Some(stream);
        self.state.send_modify(|state| {
            state.local_video_enabled = video;
            state.local_audio_enabled = audio;
            state.call_active = true;
            state.phase = CallPhase::Connecting;
            state.connection_status = ConnectionStatus::Connecting;
        });

        match self.signaling.open(&self.settings.signaling_endpoint, &token) {
            Ok(link) => {
                self.channel = Some(link.channel);
                self.events = Some(link.events);
                // A timeout too large to represent means no deadline.
                self.connect_deadline = Instant::now().checked_add(self.settings.connect_timeout);
                Ok(())
            }
            Err(e) => {
                self.fail(FailureReason::SignalingFailed(e.to_string()), true);
                Err(e.into())
            }
        }
    }

    fn ensure_active(&mut self) -> Result<(), CallError> {
        if self.cancel.is_cancelled() {
            self.teardown();
            return Err(CallError::Cancelled);
        }
        Ok(())
    }

    // ==========================================================================
    // SIGNALING EVENTS
    // ==========================================================================

    /// Waits for and applies the next signaling event.
    ///
    /// Returns false once no further events can arrive. While connecting the
    /// wait is bounded by the connect timeout. Cancel-safe.
    pub async fn process_next_event(&mut self) -> bool {
        let received = {
            let Some(events) = self.events.as_mut() else {
                return false;
            };
            match self.connect_deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, events.recv()).await.ok(),
                None => Some(events.recv().await),
            }
        };

        match received {
            Some(Some(event)) => {
                self.handle_event(event);
                self.events.is_some()
            }
            Some(None) => {
                self.events = None;
                if matches!(self.phase(), CallPhase::Connecting | CallPhase::Connected) {
                    self.handle_event(SignalingEvent::ConnectionFailed(
                        "signaling channel closed".to_string(),
                    ));
                }
                false
            }
            None => {
                self.fail(FailureReason::SignalingTimeout, true);
                false
            }
        }
    }

    pub fn handle_event(&mut self, event: SignalingEvent) {
        let phase = self.phase();
        match event {
            SignalingEvent::Connected => {
                if phase != CallPhase::Connecting {
                    debug!("Ignoring connected event while {}", phase);
                    return;
                }
                self.connect_deadline = None;

                let announced = match (self.channel.as_mut(), &self.room_id, &self.user) {
                    (Some(channel), Some(room_id), Some(user)) => {
                        channel.announce_join(room_id, &user.id, user.display_name())
                    }
                    _ => Err(SignalingError::Closed),
                };
                if let Err(e) = announced {
                    self.fail(FailureReason::SignalingFailed(e.to_string()), true);
                    return;
                }

                self.peer_attached = true;
                self.state.send_modify(|state| {
                    state.phase = CallPhase::Connected;
                    state.connection_status = ConnectionStatus::Connected;
                });
                info!("Call connected");
            }
            SignalingEvent::ConnectionFailed(reason) => match phase {
                CallPhase::Connecting => self.fail(FailureReason::SignalingFailed(reason), true),
                CallPhase::Connected => self.fail(FailureReason::SignalingLost(reason), true),
                _ => debug!("Ignoring signaling failure while {}: {}", phase, reason),
            },
            SignalingEvent::ParticipantJoined(id) => {
                if phase != CallPhase::Connected || self.is_self(&id) {
                    return;
                }
                let inserted = self.state.send_if_modified(|state| state.participants.insert(id.clone()));
                if inserted {
                    self.notifier.info(format!("{} joined the room", id));
                }
            }
            SignalingEvent::ParticipantLeft(id) => {
                if phase != CallPhase::Connected {
                    return;
                }
                let removed = self.state.send_if_modified(|state| state.participants.remove(&id));
                if removed {
                    self.notifier.info(format!("{} left the room", id));
                }
            }
            SignalingEvent::Signal { from, payload } => {
                if self.peer_attached {
                    self.peer.handle_signal(&from, &payload);
                } else {
                    debug!("Dropping video signal from {} before the call is connected", from);
                }
            }
        }
    }

    fn is_self(&self, id: &str) -> bool {
        self.user.as_ref().map_or(false, |user| user.id == id)
    }

    // ==========================================================================
    // USER COMMANDS
    // ==========================================================================

    /// Flips the local video track. `None` when no stream is held.
    pub fn toggle_video(&mut self) -> Option<bool> {
        self.toggle(TrackKind::Video)
    }

    pub fn toggle_audio(&mut self) -> Option<bool> {
        self.toggle(TrackKind::Audio)
    }

    fn toggle(&mut self, kind: TrackKind) -> Option<bool> {
        let stream = self.stream.as_ref()?;
        let enabled = {
            let state = self.state.borrow();
            match kind {
                TrackKind::Video => !state.local_video_enabled,
                TrackKind::Audio => !state.local_audio_enabled,
            }
        };
        stream.set_track_enabled(kind, enabled);
        self.state.send_modify(|state| match kind {
            TrackKind::Video => state.local_video_enabled = enabled,
            TrackKind::Audio => state.local_audio_enabled = enabled,
        });
        Some(enabled)
    }

    /// Ends the visit. Professionals also close the room on the backend;
    /// teardown happens whatever that request returns. Ending an ended call
    /// is a no-op.
    pub async fn end_call(&mut self, role: Role) -> Result<(), CallError> {
        let phase = self.phase();
        match phase {
            CallPhase::Connected | CallPhase::Connecting => {
                self.set_phase(CallPhase::Ending);

                let mut outcome = Ok(());
                match role {
                    Role::Professional => {
                        let room_id = self.room_id.clone().unwrap_or_default();
                        match self.rooms.end_room(&room_id).await {
                            Ok(()) => self.notifier.success("Consultation finished successfully"),
                            Err(e) => {
                                warn!("Failed to end room {}: {}", room_id, e);
                                outcome = Err(e.into());
                            }
                        }
                    }
                    Role::Patient => self.notifier.info("You left the consultation."),
                }

                self.teardown();
                self.set_phase(CallPhase::Ended);
                outcome
            }
            CallPhase::Ending | CallPhase::Ended => Ok(()),
            CallPhase::Failed => {
                self.teardown();
                Ok(())
            }
            CallPhase::Loading | CallPhase::AwaitingMedia => {
                self.teardown();
                self.set_phase(CallPhase::Ended);
                Ok(())
            }
            CallPhase::Idle => Err(CallError::InvalidState { phase, operation: "end the call" }),
        }
    }

    /// Navigation away from the call: tear down without any backend call.
    pub fn leave(&mut self) {
        self.teardown();
        let phase = self.phase();
        if phase != CallPhase::Idle && !phase.is_terminal() {
            self.set_phase(CallPhase::Ended);
        }
    }

    // ==========================================================================
    // TEARDOWN
    // ==========================================================================

    /// Releases media, the peer layer and signaling. Safe to call any number
    /// of times; the leave announcement is only sent by the first call.
    pub fn teardown(&mut self) {
        self.cancel.cancel();
        self.connect_deadline = None;

        if let Some(mut stream) = self.stream.take() {
            stream.release();
        }

        if self.peer_attached {
            self.peer.close();
            self.peer_attached = false;
        }

        let was_connected = self.state.borrow().connection_status == ConnectionStatus::Connected;
        if let Some(mut channel) = self.channel.take() {
            if was_connected && !channel.is_closed() {
                if let (Some(room_id), Some(user)) = (&self.room_id, &self.user) {
                    if let Err(e) = channel.announce_leave(room_id, &user.id) {
                        debug!("Leave announcement not sent: {}", e);
                    }
                }
            }
            channel.close();
        }
        self.events = None;

        self.state.send_if_modified(|state| {
            let changed = state.call_active
                || state.connection_status != ConnectionStatus::Disconnected
                || !state.participants.is_empty();
            state.call_active = false;
            state.connection_status = ConnectionStatus::Disconnected;
            state.participants.clear();
            changed
        });
    }

    fn fail(&mut self, reason: FailureReason, notify: bool) {
        warn!("Call failed: {:?}", reason);
        if notify {
            self.notifier.error(reason.user_message());
        }
        self.teardown();
        self.state.send_modify(|state| {
            state.phase = CallPhase::Failed;
            state.failure = Some(reason);
        });
    }

    fn set_phase(&mut self, phase: CallPhase) {
        debug!("Call phase -> {}", phase);
        self.state.send_if_modified(|state| {
            let changed = state.phase != phase;
            state.phase = phase;
            changed
        });
    }

    // ==========================================================================
    // BACKGROUND TASK
    // ==========================================================================

    /// Runs the visit on its own task. Dropping the returned handle tears the
    /// call down.
    pub fn spawn(self, room_id: impl Into<String>, user: User) -> CallHandle {
        let (commands, receiver) = mpsc::unbounded_channel();
        let snapshots = self.subscribe();
        let cancel = self.cancel.clone();
        let task = tokio::spawn(self.run(room_id.into(), user, receiver));

        CallHandle {
            commands,
            snapshots,
            cancel,
            task: Some(task),
        }
    }

    async fn run(mut self, room_id: String, user: User, mut commands: mpsc::UnboundedReceiver<CallCommand>) {
        let cancel = self.cancel.clone();

        let interrupted = {
            let entry = self.enter_room(&room_id, &user);
            tokio::pin!(entry);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break None,
                    result = &mut entry => {
                        if let Err(e) = result {
                            debug!("Room entry stopped: {}", e);
                        }
                        break None;
                    }
                    command = commands.recv() => match command {
                        Some(CallCommand::ToggleVideo) | Some(CallCommand::ToggleAudio) => {
                            debug!("No local media yet, ignoring toggle");
                        }
                        Some(command) => break Some(command),
                        None => break None,
                    },
                }
            }
        };

        if let Some(command) = interrupted {
            self.handle_command(command).await;
        }

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                _ = self.process_next_event(), if self.has_event_source() => {}
            }
        }

        self.leave();
        debug!("Call task for room {} finished", room_id);
    }

    async fn handle_command(&mut self, command: CallCommand) {
        match command {
            CallCommand::ToggleVideo => {
                self.toggle_video();
            }
            CallCommand::ToggleAudio => {
                self.toggle_audio();
            }
            CallCommand::EndCall { role, reply } => {
                let result = self.end_call(role).await;
                let _ = reply.send(result);
            }
            CallCommand::Leave => self.leave(),
        }
    }
}

impl Drop for CallSessionController {
    fn drop(&mut self) {
        self.teardown();
    }
}

enum CallCommand {
    ToggleVideo,
    ToggleAudio,
    EndCall {
        role: Role,
        reply: oneshot::Sender<Result<(), CallError>>,
    },
    Leave,
}

/// The view's grip on a running call.
pub struct CallHandle {
    commands: mpsc::UnboundedSender<CallCommand>,
    snapshots: watch::Receiver<CallSnapshot>,
    cancel: CancellationToken,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl CallHandle {
    pub fn snapshot(&self) -> CallSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<CallSnapshot> {
        self.snapshots.clone()
    }

    /// Resolves with the first snapshot matching `predicate`, or the last one
    /// published if the call task is gone.
    pub async fn wait_for<F>(&self, predicate: F) -> CallSnapshot
    where
        F: FnMut(&CallSnapshot) -> bool,
    {
        let mut receiver = self.snapshots.clone();
        let result = receiver.wait_for(predicate).await.map(|snapshot| snapshot.clone());
        match result {
            Ok(snapshot) => snapshot,
            Err(_) => receiver.borrow().clone(),
        }
    }

    pub fn toggle_video(&self) {
        let _ = self.commands.send(CallCommand::ToggleVideo);
    }

    pub fn toggle_audio(&self) {
        let _ = self.commands.send(CallCommand::ToggleAudio);
    }

    /// Ends the call for `role`. Once the call task is gone this is a no-op.
    pub async fn end_call(&self, role: Role) -> Result<(), CallError> {
        let (reply, response) = oneshot::channel();
        if self.commands.send(CallCommand::EndCall { role, reply }).is_err() {
            return Ok(());
        }
        response.await.unwrap_or(Ok(()))
    }

    pub fn leave(&self) {
        let _ = self.commands.send(CallCommand::Leave);
    }

    /// Waits for the call task to finish.
    pub async fn finished(mut self) {
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("Call task ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for CallHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
