use std::sync::Arc;
use std::path::PathBuf;
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use base64::{Engine as _, engine::general_purpose};
use serde_json::json;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::{Role, User};

pub struct TestConfig {
    pub api_base_url: String,
    pub token_path: PathBuf,
    pub media_timeout_secs: u64,
    pub signaling_connect_timeout_secs: u64,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:5001/api".to_string(),
            token_path: std::env::temp_dir().join(format!("telecare-test-{}", Uuid::new_v4())),
            media_timeout_secs: 5,
            signaling_connect_timeout_secs: 5,
        }
    }
}

impl TestConfig {
    /// Points the API base at a mock server, keeping the `/api` prefix.
    pub fn with_mock_server(uri: &str) -> Self {
        Self {
            api_base_url: format!("{}/api", uri.trim_end_matches('/')),
            ..Self::default()
        }
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            api_base_url: self.api_base_url.clone(),
            signaling_url: None,
            token_path: self.token_path.clone(),
            request_timeout_secs: 5,
            media_timeout_secs: self.media_timeout_secs,
            signaling_connect_timeout_secs: self.signaling_connect_timeout_secs,
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

pub struct TestUser {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
}

impl Default for TestUser {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: "Test User".to_string(),
            email: "test@example.com".to_string(),
            role: Role::Patient,
        }
    }
}

impl TestUser {
    pub fn new(email: &str, role: Role) -> Self {
        Self {
            email: email.to_string(),
            role,
            ..Self::default()
        }
    }

    pub fn professional(email: &str) -> Self {
        Self::new(email, Role::Professional)
    }

    pub fn patient(email: &str) -> Self {
        Self::new(email, Role::Patient)
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = id.to_string();
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn to_user(&self) -> User {
        User {
            id: self.id.clone(),
            name: self.name.clone(),
            email: Some(self.email.clone()),
            role: self.role,
            profile: Default::default(),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "id": self.id,
            "name": self.name,
            "email": self.email,
            "user_type": self.role.as_str()
        })
    }
}

pub struct JwtTestUtils;

impl JwtTestUtils {
    pub fn create_test_token(user: &TestUser, secret: &str, exp_hours: Option<i64>) -> String {
        let now = Utc::now();
        let exp = now + Duration::hours(exp_hours.unwrap_or(24));

        let header = json!({
            "alg": "HS256",
            "typ": "JWT"
        });

        let payload = json!({
            "sub": user.id,
            "email": user.email,
            "role": user.role.as_str(),
            "iat": now.timestamp(),
            "exp": exp.timestamp()
        });

        let header_encoded = general_purpose::URL_SAFE_NO_PAD.encode(header.to_string());
        let payload_encoded = general_purpose::URL_SAFE_NO_PAD.encode(payload.to_string());

        let signing_input = format!("{}.{}", header_encoded, payload_encoded);

        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(signing_input.as_bytes());
        let signature = mac.finalize().into_bytes();
        let signature_encoded = general_purpose::URL_SAFE_NO_PAD.encode(signature);

        format!("{}.{}", signing_input, signature_encoded)
    }

    pub fn create_expired_token(user: &TestUser, secret: &str) -> String {
        Self::create_test_token(user, secret, Some(-1))
    }

    pub fn create_malformed_token() -> String {
        "invalid.token.format".to_string()
    }
}

pub struct MockApiResponses;

impl MockApiResponses {
    pub fn auth_response(user: &TestUser, token: &str) -> serde_json::Value {
        json!({
            "access_token": token,
            "user": user.to_json()
        })
    }

    pub fn me_response(user: &TestUser) -> serde_json::Value {
        json!({ "user": user.to_json() })
    }

    pub fn room_response(room_id: &str) -> serde_json::Value {
        json!({
            "id": room_id,
            "appointment": {
                "id": 12,
                "professional_name": "Dra. Ana Souza",
                "patient_name": "João Lima",
                "appointment_date": "2024-12-25T10:00:00"
            }
        })
    }

    pub fn professional_response(id: i64) -> serde_json::Value {
        json!({
            "id": id,
            "name": "Dra. Ana Souza",
            "specialty": "Psicologia",
            "price": 150.0,
            "rating": 4.8
        })
    }

    pub fn appointment_response(id: i64, status: &str) -> serde_json::Value {
        json!({
            "id": id,
            "professional_id": 3,
            "appointment_date": "2024-12-25T10:00:00",
            "status": status,
            "room_id": format!("room-{}", id)
        })
    }

    pub fn error_response(message: &str) -> serde_json::Value {
        json!({ "message": message })
    }

    pub fn validation_error(fields: &[(&str, &str)]) -> serde_json::Value {
        let errors: serde_json::Map<String, serde_json::Value> = fields
            .iter()
            .map(|(field, message)| (field.to_string(), json!(message)))
            .collect();
        json!({ "errors": errors })
    }
}
