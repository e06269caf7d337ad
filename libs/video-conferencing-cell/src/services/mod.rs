// libs/video-conferencing-cell/src/services/mod.rs

pub mod media;
pub mod peer;
pub mod room;
pub mod session;
pub mod signaling;
pub mod websocket;

pub use media::{LocalTrack, MediaAcquirer, MediaConstraints, MediaHandle, TrackKind, VirtualMediaAcquirer};
pub use peer::{LoggingPeerLayer, PeerLayer};
pub use room::RoomService;
pub use session::{CallHandle, CallSessionController, CallSettings};
pub use signaling::{SignalingChannel, SignalingConnector, SignalingEvent, SignalingLink};
pub use websocket::{derive_signaling_url, signaling_endpoint, WsSignalingConnector};
