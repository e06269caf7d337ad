// libs/video-conferencing-cell/src/lib.rs
//! # Video Conferencing Cell
//!
//! Client side of a consultation call: room lookup, local media, signaling
//! presence and deterministic teardown.
//!
//! ## Architecture
//!
//! ```text
//! +-----------------------------------------------------+
//! |                   Video Cell                        |
//! +-----------------------------------------------------+
//! |  models.rs      |  Call state, failures, errors     |
//! |  services/      |                                   |
//! |    session.rs   |  Call session state machine       |
//! |    room.rs      |  Room REST endpoints              |
//! |    media.rs     |  Local media tracks               |
//! |    signaling.rs |  Signaling contract + wire format |
//! |    websocket.rs |  WebSocket signaling transport    |
//! |    peer.rs      |  Peer media layer (logging only)  |
//! +-----------------------------------------------------+
//! ```
//!
//! ## Endpoints used
//!
//! - `GET /video/room/{id}` - Room metadata, fetched on entry
//! - `POST /video/room/{id}/end` - Sent when a professional ends the call
//! - WebSocket signaling, `SIGNALING_URL` or derived from `API_BASE_URL`
//!
//! ## Signaling wire format
//!
//! Plain WebSocket text frames of the form `{"event": ..., "data": ...}`,
//! authenticated with an `Authorization: Bearer` header on the handshake.
//! This is not the Socket.IO protocol: the client will not interoperate with
//! a Socket.IO server, which expects its own framing and an `auth: {token}`
//! handshake payload.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use shared_api::{ApiClient, FileTokenStorage, SessionStore};
//! use shared_config::AppConfig;
//! use shared_models::auth::Role;
//! use shared_utils::Notifier;
//! use video_conferencing_cell::services::{
//!     CallSessionController, CallSettings, RoomService, VirtualMediaAcquirer, WsSignalingConnector,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::from_env();
//! let session = Arc::new(SessionStore::load(Arc::new(FileTokenStorage::new(&config.token_path))));
//! let api = Arc::new(ApiClient::new(&config, session.clone(), Notifier::new()));
//! let user = session.user().ok_or("not logged in")?;
//!
//! let controller = CallSessionController::new(
//!     RoomService::new(api),
//!     Arc::new(VirtualMediaAcquirer::new()),
//!     Arc::new(WsSignalingConnector::new()),
//!     CallSettings::from_config(&config)?,
//! );
//! let call = controller.spawn("r42", user);
//! call.toggle_audio();
//! call.end_call(Role::Patient).await?;
//! # Ok(())
//! # }
//! ```

pub mod models;
pub mod services;

// Re-export commonly used types
pub use models::{
    CallError, CallPhase, CallSnapshot, ConnectionStatus, FailureReason, MediaError, SignalingError,
};

pub use services::{
    CallHandle, CallSessionController, CallSettings, RoomService, VirtualMediaAcquirer,
    WsSignalingConnector,
};
