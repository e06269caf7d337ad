// libs/video-conferencing-cell/src/services/peer.rs
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

/// Media transport between participants.
///
/// The controller hands over every `video_signal` payload without waiting
/// on it. Nothing here negotiates a real connection.
pub trait PeerLayer: Send + Sync {
    fn handle_signal(&self, from: &str, payload: &Value);
    /// Releases whatever the layer holds. Closing twice is a no-op.
    fn close(&self);
}

#[derive(Default)]
pub struct LoggingPeerLayer {
    closed: AtomicBool,
}

impl LoggingPeerLayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl PeerLayer for LoggingPeerLayer {
    fn handle_signal(&self, from: &str, payload: &Value) {
        info!("Video signal from {}: {}", from, payload);
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!("Peer layer closed");
        }
    }
}
