// libs/video-conferencing-cell/src/models.rs
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

use shared_models::error::ApiError;
use shared_models::room::Room;

// ==============================================================================
// CALL STATE
// ==============================================================================

/// Lifecycle of one visit to a call room.
///
/// `Failed` is terminal and only reachable before the call is connected;
/// a connected call that loses signaling also lands there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallPhase {
    Idle,
    Loading,
    AwaitingMedia,
    Connecting,
    Connected,
    Ending,
    Ended,
    Failed,
}

impl CallPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CallPhase::Ended | CallPhase::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CallPhase::Idle => "idle",
            CallPhase::Loading => "loading",
            CallPhase::AwaitingMedia => "awaiting_media",
            CallPhase::Connecting => "connecting",
            CallPhase::Connected => "connected",
            CallPhase::Ending => "ending",
            CallPhase::Ended => "ended",
            CallPhase::Failed => "failed",
        }
    }
}

impl fmt::Display for CallPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Disconnected,
}

/// Why a call ended up in `CallPhase::Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    RoomNotFound,
    Unauthorized,
    RoomUnavailable(String),
    MediaPermissionDenied,
    MediaDeviceUnavailable,
    MediaTimeout,
    MediaUnknown(String),
    SignalingFailed(String),
    SignalingTimeout,
    SignalingLost(String),
}

impl FailureReason {
    pub fn from_api(error: &ApiError) -> Self {
        match error {
            ApiError::NotFound(_) => FailureReason::RoomNotFound,
            ApiError::Unauthorized(_) => FailureReason::Unauthorized,
            other => FailureReason::RoomUnavailable(other.user_message().to_string()),
        }
    }

    pub fn from_media(error: &MediaError) -> Self {
        match error {
            MediaError::PermissionDenied => FailureReason::MediaPermissionDenied,
            MediaError::DeviceUnavailable => FailureReason::MediaDeviceUnavailable,
            MediaError::Timeout => FailureReason::MediaTimeout,
            MediaError::Unknown(message) => FailureReason::MediaUnknown(message.clone()),
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            FailureReason::RoomNotFound => "Room not found".to_string(),
            FailureReason::Unauthorized => "You are not allowed to join this room".to_string(),
            FailureReason::RoomUnavailable(message) => message.clone(),
            FailureReason::MediaPermissionDenied => {
                "Camera and microphone access was denied".to_string()
            }
            FailureReason::MediaDeviceUnavailable => {
                "No camera or microphone was found".to_string()
            }
            FailureReason::MediaTimeout => {
                "Timed out waiting for camera and microphone".to_string()
            }
            FailureReason::MediaUnknown(message) => {
                format!("Could not access camera and microphone: {}", message)
            }
            FailureReason::SignalingFailed(message) => {
                format!("Could not connect to the call server: {}", message)
            }
            FailureReason::SignalingTimeout => "Timed out connecting to the call server".to_string(),
            FailureReason::SignalingLost(message) => {
                format!("Connection to the call server was lost: {}", message)
            }
        }
    }
}

/// Everything the view layer renders about a call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallSnapshot {
    pub phase: CallPhase,
    pub connection_status: ConnectionStatus,
    pub participants: BTreeSet<String>,
    pub local_video_enabled: bool,
    pub local_audio_enabled: bool,
    /// Only true while a local media stream is held.
    pub call_active: bool,
    pub room: Option<Room>,
    pub failure: Option<FailureReason>,
}

impl CallSnapshot {
    /// Remote participants plus the local user.
    pub fn participant_count(&self) -> usize {
        self.participants.len() + 1
    }
}

impl Default for CallSnapshot {
    fn default() -> Self {
        Self {
            phase: CallPhase::Idle,
            connection_status: ConnectionStatus::Disconnected,
            participants: BTreeSet::new(),
            local_video_enabled: true,
            local_audio_enabled: true,
            call_active: false,
            room: None,
            failure: None,
        }
    }
}

// ==============================================================================
// ERROR HANDLING
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MediaError {
    #[error("Media permission denied")]
    PermissionDenied,

    #[error("Media device unavailable")]
    DeviceUnavailable,

    #[error("Timed out acquiring media")]
    Timeout,

    #[error("Media error: {0}")]
    Unknown(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignalingError {
    #[error("Signaling connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Signaling channel is closed")]
    Closed,

    #[error("Invalid signaling endpoint: {0}")]
    InvalidEndpoint(String),
}

#[derive(Debug, thiserror::Error)]
pub enum CallError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error(transparent)]
    Signaling(#[from] SignalingError),

    #[error("Cannot {operation} while the call is {phase}")]
    InvalidState { phase: CallPhase, operation: &'static str },

    #[error("No active session")]
    NotAuthenticated,

    #[error("Call was cancelled")]
    Cancelled,
}
