use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use shared_models::auth::{Session, User};
use shared_utils::jwt;

use crate::storage::TokenStorage;

/// What the rest of the application sees of the session at any instant.
/// A token can exist without a user while `/auth/me` is still pending.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSnapshot {
    pub token: Option<String>,
    pub user: Option<User>,
}

impl SessionSnapshot {
    pub fn session(&self) -> Option<Session> {
        match (&self.token, &self.user) {
            (Some(token), Some(user)) => Some(Session {
                token: token.clone(),
                user: user.clone(),
            }),
            _ => None,
        }
    }
}

/// Owner of the auth token and current user.
///
/// Created once at startup from persisted storage and shared explicitly
/// (`Arc<SessionStore>`) with whoever needs it. Changes are published on a
/// watch channel so a forced logout can be observed.
pub struct SessionStore {
    state: watch::Sender<SessionSnapshot>,
    storage: Arc<dyn TokenStorage>,
}

impl SessionStore {
    pub fn load(storage: Arc<dyn TokenStorage>) -> Self {
        let token = match storage.load() {
            Ok(Some(token)) if jwt::is_expired(&token) => {
                info!("Discarding expired persisted token");
                if let Err(e) = storage.clear() {
                    warn!("Failed to clear expired token: {}", e);
                }
                None
            }
            Ok(token) => token,
            Err(e) => {
                warn!("Failed to read persisted token: {}", e);
                None
            }
        };

        debug!("Session store initialised (token present: {})", token.is_some());
        let (state, _) = watch::channel(SessionSnapshot { token, user: None });
        Self { state, storage }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.state.subscribe()
    }

    pub fn token(&self) -> Option<String> {
        self.state.borrow().token.clone()
    }

    pub fn user(&self) -> Option<User> {
        self.state.borrow().user.clone()
    }

    pub fn session(&self) -> Option<Session> {
        self.state.borrow().session()
    }

    pub fn is_authenticated(&self) -> bool {
        let state = self.state.borrow();
        state.token.is_some() && state.user.is_some()
    }

    /// Stores a freshly issued token together with its user.
    ///
    /// A persistence failure only costs the next restart its session, so it
    /// is logged and the in-memory session is kept.
    pub fn establish(&self, token: String, user: User) {
        if let Err(e) = self.storage.save(&token) {
            warn!("Failed to persist token: {}", e);
        }
        info!("Session established for user {}", user.id);
        self.state.send_replace(SessionSnapshot {
            token: Some(token),
            user: Some(user),
        });
    }

    pub fn set_user(&self, user: User) {
        self.state.send_modify(|state| state.user = Some(user));
    }

    pub fn clear(&self) {
        if let Err(e) = self.storage.clear() {
            warn!("Failed to clear persisted token: {}", e);
        }
        let previous = self.state.send_replace(SessionSnapshot::default());
        if previous.token.is_some() {
            info!("Session cleared");
        }
    }
}
