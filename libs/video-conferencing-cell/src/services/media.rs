// libs/video-conferencing-cell/src/services/media.rs
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::MediaError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Audio,
    Video,
}

/// A single local capture track.
pub trait LocalTrack: Send + Sync {
    fn kind(&self) -> TrackKind;
    fn id(&self) -> &str;
    fn set_enabled(&self, enabled: bool);
    fn is_enabled(&self) -> bool;
    /// Stops capture. Stopping twice is a no-op.
    fn stop(&self);
    fn is_stopped(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaConstraints {
    pub audio: bool,
    pub video: bool,
}

impl Default for MediaConstraints {
    fn default() -> Self {
        Self { audio: true, video: true }
    }
}

/// Owns the local tracks of one call. Released exactly once, either
/// explicitly or on drop.
pub struct MediaHandle {
    tracks: Vec<Arc<dyn LocalTrack>>,
    released: bool,
}

impl MediaHandle {
    pub fn new(tracks: Vec<Arc<dyn LocalTrack>>) -> Self {
        Self { tracks, released: false }
    }

    pub fn tracks(&self) -> &[Arc<dyn LocalTrack>] {
        &self.tracks
    }

    /// Returns false when the handle holds no track of that kind.
    pub fn set_track_enabled(&self, kind: TrackKind, enabled: bool) -> bool {
        let mut found = false;
        for track in self.tracks.iter().filter(|track| track.kind() == kind) {
            track.set_enabled(enabled);
            found = true;
        }
        found
    }

    pub fn track_enabled(&self, kind: TrackKind) -> Option<bool> {
        self.tracks
            .iter()
            .find(|track| track.kind() == kind)
            .map(|track| track.is_enabled())
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    pub fn release(&mut self) {
        if self.released {
            return;
        }
        for track in &self.tracks {
            track.stop();
        }
        self.released = true;
        debug!("Released {} local tracks", self.tracks.len());
    }
}

impl Drop for MediaHandle {
    fn drop(&mut self) {
        self.release();
    }
}

#[async_trait]
pub trait MediaAcquirer: Send + Sync {
    async fn acquire(&self, constraints: &MediaConstraints) -> Result<MediaHandle, MediaError>;
}

// ==============================================================================
// SOFTWARE TRACKS
// ==============================================================================

pub struct VirtualTrack {
    id: String,
    kind: TrackKind,
    enabled: AtomicBool,
    stopped: AtomicBool,
}

impl VirtualTrack {
    pub fn new(kind: TrackKind) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            enabled: AtomicBool::new(true),
            stopped: AtomicBool::new(false),
        }
    }
}

impl LocalTrack for VirtualTrack {
    fn kind(&self) -> TrackKind {
        self.kind
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// Media source backed by software tracks, for headless runs.
///
/// A device list decides which kinds are available; a requested kind that is
/// missing fails with `DeviceUnavailable`.
#[derive(Clone)]
pub struct VirtualMediaAcquirer {
    devices: MediaConstraints,
    failure: Option<MediaError>,
    delay: Option<Duration>,
    issued: Arc<Mutex<Vec<Arc<VirtualTrack>>>>,
    acquisitions: Arc<AtomicUsize>,
}

impl VirtualMediaAcquirer {
    pub fn new() -> Self {
        Self {
            devices: MediaConstraints::default(),
            failure: None,
            delay: None,
            issued: Arc::new(Mutex::new(Vec::new())),
            acquisitions: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing(error: MediaError) -> Self {
        Self {
            failure: Some(error),
            ..Self::new()
        }
    }

    pub fn with_devices(mut self, devices: MediaConstraints) -> Self {
        self.devices = devices;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Every track handed out so far, including stopped ones.
    pub fn issued_tracks(&self) -> Vec<Arc<VirtualTrack>> {
        match self.issued.lock() {
            Ok(issued) => issued.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn acquisitions(&self) -> usize {
        self.acquisitions.load(Ordering::SeqCst)
    }
}

impl Default for VirtualMediaAcquirer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaAcquirer for VirtualMediaAcquirer {
    async fn acquire(&self, constraints: &MediaConstraints) -> Result<MediaHandle, MediaError> {
        self.acquisitions.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = &self.failure {
            return Err(error.clone());
        }
        if (constraints.audio && !self.devices.audio) || (constraints.video && !self.devices.video) {
            return Err(MediaError::DeviceUnavailable);
        }

        let mut kinds = Vec::new();
        if constraints.audio {
            kinds.push(TrackKind::Audio);
        }
        if constraints.video {
            kinds.push(TrackKind::Video);
        }

        let tracks: Vec<Arc<VirtualTrack>> = kinds
            .into_iter()
            .map(|kind| Arc::new(VirtualTrack::new(kind)))
            .collect();

        match self.issued.lock() {
            Ok(mut issued) => issued.extend(tracks.iter().cloned()),
            Err(poisoned) => poisoned.into_inner().extend(tracks.iter().cloned()),
        }

        info!("Acquired {} virtual media tracks", tracks.len());
        Ok(MediaHandle::new(
            tracks
                .into_iter()
                .map(|track| track as Arc<dyn LocalTrack>)
                .collect(),
        ))
    }
}
