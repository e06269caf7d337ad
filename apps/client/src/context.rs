use std::env;
use std::sync::Arc;
use anyhow::{anyhow, Result};
use tracing::{info, warn};

use auth_cell::AuthService;
use shared_api::{ApiClient, FileTokenStorage, SessionStore};
use shared_config::AppConfig;
use shared_models::auth::User;
use shared_utils::Notifier;
use video_conferencing_cell::services::{
    CallHandle, CallSessionController, CallSettings, RoomService, VirtualMediaAcquirer,
    WsSignalingConnector,
};

/// Process-wide collaborators, built once at startup.
pub struct ClientContext {
    pub notifier: Notifier,
    pub api: Arc<ApiClient>,
    pub auth: AuthService,
    pub signaling: Arc<WsSignalingConnector>,
}

impl ClientContext {
    pub fn new(config: &AppConfig) -> Self {
        let storage = Arc::new(FileTokenStorage::new(&config.token_path));
        let session = Arc::new(SessionStore::load(storage));
        let notifier = Notifier::new();
        let api = Arc::new(ApiClient::new(config, session, notifier.clone()));
        let auth = AuthService::new(api.clone());

        let signaling = Arc::new(WsSignalingConnector::new());

        Self { notifier, api, auth, signaling }
    }

    /// Restores the persisted session, or logs in with `TELECARE_EMAIL` and
    /// `TELECARE_PASSWORD`.
    pub async fn authenticate(&self) -> Result<User> {
        match self.auth.bootstrap().await {
            Ok(Some(user)) => {
                info!("Restored session for {}", user.display_name());
                return Ok(user);
            }
            Ok(None) => {}
            Err(e) => warn!("Stored session rejected: {}", e),
        }

        match (env::var("TELECARE_EMAIL"), env::var("TELECARE_PASSWORD")) {
            (Ok(email), Ok(password)) => Ok(self.auth.login(&email, &password).await?),
            _ => Err(anyhow!(
                "no stored session; set TELECARE_EMAIL and TELECARE_PASSWORD to log in"
            )),
        }
    }

    pub fn start_call(&self, config: &AppConfig, room_id: &str, user: User) -> Result<CallHandle> {
        let controller = CallSessionController::new(
            RoomService::new(self.api.clone()),
            Arc::new(VirtualMediaAcquirer::new()),
            self.signaling.clone(),
            CallSettings::from_config(config)?,
        );
        Ok(controller.spawn(room_id, user))
    }
}
