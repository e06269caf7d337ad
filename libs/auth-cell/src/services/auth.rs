use std::sync::Arc;
use tracing::{debug, info, warn};

use shared_api::ApiClient;
use shared_models::auth::{AuthResponse, LoginRequest, MeResponse, RegisterRequest, User};
use shared_models::error::ApiError;

pub struct AuthService {
    api: Arc<ApiClient>,
}

impl AuthService {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }

    pub fn current_user(&self) -> Option<User> {
        self.api.session().user()
    }

    /// Restores the session persisted by a previous run.
    ///
    /// Returns `Ok(None)` when there is nothing to restore. Any failure to
    /// confirm the token with `/auth/me` drops it.
    pub async fn bootstrap(&self) -> Result<Option<User>, ApiError> {
        let session = self.api.session();
        if session.token().is_none() {
            debug!("No persisted token, starting anonymous");
            return Ok(None);
        }

        match self.api.get::<MeResponse>("/auth/me").await {
            Ok(me) => {
                info!("Restored session for user {}", me.user.id);
                session.set_user(me.user.clone());
                Ok(Some(me.user))
            }
            Err(e) => {
                warn!("Could not restore session: {}", e);
                session.clear();
                Err(e)
            }
        }
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<User, ApiError> {
        let email = email.trim();
        if email.is_empty() || password.is_empty() {
            let message = "Email and password are required".to_string();
            self.api.notifier().error(message.clone());
            return Err(ApiError::Validation { message, fields: vec![] });
        }

        let request = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        let body = self.api.encode_body(&request)?;

        let response: AuthResponse = self.api.post("/auth/login", Some(body)).await?;
        self.api
            .session()
            .establish(response.access_token, response.user.clone());
        self.api.notifier().success("Login successful!");

        Ok(response.user)
    }

    pub async fn register(&self, request: RegisterRequest) -> Result<User, ApiError> {
        debug!("Registering new {} account for {}", request.user_type, request.email);
        let body = self.api.encode_body(&request)?;

        let response: AuthResponse = self.api.post("/auth/register", Some(body)).await?;
        self.api
            .session()
            .establish(response.access_token, response.user.clone());
        self.api.notifier().success("Registration successful!");

        Ok(response.user)
    }

    pub fn logout(&self) {
        self.api.session().clear();
        self.api.notifier().info("You have been logged out.");
    }
}
