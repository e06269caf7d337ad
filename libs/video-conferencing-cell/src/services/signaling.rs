// libs/video-conferencing-cell/src/services/signaling.rs
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use shared_models::ids::value_to_id;

use crate::models::SignalingError;

/// Events delivered by a signaling channel, in the order the server sent them.
#[derive(Debug, Clone, PartialEq)]
pub enum SignalingEvent {
    Connected,
    ConnectionFailed(String),
    ParticipantJoined(String),
    ParticipantLeft(String),
    Signal { from: String, payload: Value },
}

/// Outbound half of an open signaling connection.
///
/// Commands are queued without waiting on the network. After `close`
/// every announcement fails with `SignalingError::Closed`.
pub trait SignalingChannel: Send {
    fn announce_join(&mut self, room_id: &str, user_id: &str, user_name: &str) -> Result<(), SignalingError>;
    fn announce_leave(&mut self, room_id: &str, user_id: &str) -> Result<(), SignalingError>;
    /// Closing twice is a no-op.
    fn close(&mut self);
    fn is_closed(&self) -> bool;
}

pub struct SignalingLink {
    pub channel: Box<dyn SignalingChannel>,
    pub events: mpsc::UnboundedReceiver<SignalingEvent>,
}

/// Opens signaling connections. `open` returns at once; the outcome of
/// the connect arrives as `Connected` or `ConnectionFailed` on the link.
pub trait SignalingConnector: Send + Sync {
    fn open(&self, endpoint: &str, auth_token: &str) -> Result<SignalingLink, SignalingError>;
}

// ==============================================================================
// WIRE FORMAT
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientCommand {
    JoinRoom {
        room_id: String,
        user_id: String,
        user_name: String,
    },
    LeaveRoom {
        room_id: String,
        user_id: String,
    },
}

impl ClientCommand {
    pub fn to_text(&self) -> Result<String, SignalingError> {
        serde_json::to_string(self).map_err(|e| SignalingError::ConnectionFailed(e.to_string()))
    }
}

/// Parses one inbound text frame. Unknown or malformed frames yield `None`.
pub fn parse_event(text: &str) -> Option<SignalingEvent> {
    let frame: Value = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!("Dropping malformed signaling frame: {}", e);
            return None;
        }
    };

    let event = frame.get("event").and_then(Value::as_str).unwrap_or_default();
    let data = frame.get("data").cloned().unwrap_or(Value::Null);

    match event {
        "user_joined" => data
            .get("user_id")
            .and_then(value_to_id)
            .map(SignalingEvent::ParticipantJoined),
        "user_left" => data
            .get("user_id")
            .and_then(value_to_id)
            .map(SignalingEvent::ParticipantLeft),
        "video_signal" => {
            let from = data
                .get("from")
                .or_else(|| data.get("user_id"))
                .and_then(value_to_id);
            match from {
                Some(from) => Some(SignalingEvent::Signal { from, payload: data }),
                None => {
                    warn!("Dropping video_signal without a sender");
                    None
                }
            }
        }
        other => {
            debug!("Ignoring signaling event '{}'", other);
            None
        }
    }
}
