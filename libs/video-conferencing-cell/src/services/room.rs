// libs/video-conferencing-cell/src/services/room.rs
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

use shared_api::ApiClient;
use shared_models::error::ApiError;
use shared_models::room::Room;

/// Room endpoints of the REST API.
pub struct RoomService {
    api: Arc<ApiClient>,
}

impl RoomService {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }

    pub fn api(&self) -> &Arc<ApiClient> {
        &self.api
    }

    pub async fn fetch_room(&self, room_id: &str) -> Result<Room, ApiError> {
        debug!("Fetching room {}", room_id);
        let mut room: Room = self.api.get(&format!("/video/room/{}", room_id)).await?;
        if room.id.is_empty() {
            room.id = room_id.to_string();
        }
        Ok(room)
    }

    /// Tells the backend the consultation is over.
    pub async fn end_room(&self, room_id: &str) -> Result<(), ApiError> {
        info!("Ending room {}", room_id);
        let _: Value = self
            .api
            .post(&format!("/video/room/{}/end", room_id), None)
            .await?;
        Ok(())
    }
}
