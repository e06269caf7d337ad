use std::sync::Arc;
use reqwest::{
    Client, Method, StatusCode,
    header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION},
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::{debug, error, warn};

use shared_config::AppConfig;
use shared_models::error::ApiError;
use shared_utils::Notifier;

use crate::session::SessionStore;

const UNAUTHORIZED_MESSAGE: &str = "Session expired or unauthorized. Please log in again.";
const VALIDATION_MESSAGE: &str = "Validation error.";
const UNEXPECTED_MESSAGE: &str = "An unexpected error occurred.";
const CONNECTIVITY_MESSAGE: &str = "Could not connect to the server. Check your connection.";
const DECODE_MESSAGE: &str = "Unexpected response from the server";
const ENCODE_MESSAGE: &str = "Could not prepare the request";

/// Outbound HTTP for every cell.
///
/// Attaches the bearer token, and converts each failed call into exactly one
/// notification plus a classified [`ApiError`]. A `401` also clears the session.
pub struct ApiClient {
    client: Client,
    base_url: String,
    session: Arc<SessionStore>,
    notifier: Notifier,
}

impl ApiClient {
    pub fn new(config: &AppConfig, session: Arc<SessionStore>, notifier: Notifier) -> Self {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .unwrap_or_else(|e| {
                warn!("Failed to build HTTP client with timeout, using defaults: {}", e);
                Client::new()
            });

        Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            session,
            notifier,
        }
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    fn get_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        if let Some(token) = self.session.token() {
            match HeaderValue::from_str(&format!("Bearer {}", token)) {
                Ok(value) => {
                    headers.insert(AUTHORIZATION, value);
                }
                Err(_) => warn!("Stored token is not a valid header value; sending request without it"),
            }
        }

        headers
    }

    pub async fn request<T>(
        &self,
        method: Method,
        path: &str,
        query: Option<&[(&str, String)]>,
        body: Option<Value>,
    ) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!("{} {}", method, url);

        let mut req = self.client.request(method, &url).headers(self.get_headers());

        if let Some(params) = query {
            req = req.query(params);
        }

        if let Some(body_data) = body {
            req = req.json(&body_data);
        }

        let response = match req.send().await {
            Ok(response) => response,
            Err(e) => {
                error!("Request to {} failed: {}", url, e);
                self.notifier.error(CONNECTIVITY_MESSAGE);
                return Err(ApiError::Connectivity(e.to_string()));
            }
        };

        let status = response.status();
        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => {
                error!("Failed to read response from {}: {}", url, e);
                self.notifier.error(CONNECTIVITY_MESSAGE);
                return Err(ApiError::Connectivity(e.to_string()));
            }
        };

        if !status.is_success() {
            error!("API error ({}): {}", status, text);
            return Err(self.handle_error_status(status, &text));
        }

        let payload = if text.trim().is_empty() { "null" } else { text.as_str() };
        serde_json::from_str::<T>(payload).map_err(|e| {
            error!("Failed to decode response from {}: {}", url, e);
            self.notifier.error(format!("{}: {}", DECODE_MESSAGE, e));
            ApiError::Decode(e.to_string())
        })
    }

    /// Serializes a request body. Failures are reported like any other API error.
    pub fn encode_body<T: Serialize>(&self, body: &T) -> Result<Value, ApiError> {
        serde_json::to_value(body).map_err(|e| {
            error!("Failed to encode request body: {}", e);
            self.notifier.error(format!("{}: {}", ENCODE_MESSAGE, e));
            ApiError::Decode(e.to_string())
        })
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.request(Method::GET, path, None, None).await
    }

    pub async fn get_with_query<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ApiError> {
        self.request(Method::GET, path, Some(query), None).await
    }

    pub async fn post<T: DeserializeOwned>(&self, path: &str, body: Option<Value>) -> Result<T, ApiError> {
        self.request(Method::POST, path, None, body).await
    }

    pub async fn put<T: DeserializeOwned>(&self, path: &str, body: Option<Value>) -> Result<T, ApiError> {
        self.request(Method::PUT, path, None, body).await
    }

    fn handle_error_status(&self, status: StatusCode, text: &str) -> ApiError {
        let body: Value = serde_json::from_str(text).unwrap_or(Value::Null);
        let message = server_message(&body);

        match status {
            StatusCode::UNAUTHORIZED => {
                let message = message.unwrap_or_else(|| UNAUTHORIZED_MESSAGE.to_string());
                self.notifier.error(message.clone());
                self.session.clear();
                ApiError::Unauthorized(message)
            }
            StatusCode::UNPROCESSABLE_ENTITY => {
                let fields = validation_messages(&body);
                let message = match (fields.as_slice(), message) {
                    ([only], _) => only.clone(),
                    (_, Some(message)) => message,
                    _ => VALIDATION_MESSAGE.to_string(),
                };
                self.notifier.error_with_details(message.clone(), fields.clone());
                ApiError::Validation { message, fields }
            }
            StatusCode::NOT_FOUND => {
                let message = message.unwrap_or_else(|| UNEXPECTED_MESSAGE.to_string());
                self.notifier.error(message.clone());
                ApiError::NotFound(message)
            }
            _ => {
                let message = message.unwrap_or_else(|| UNEXPECTED_MESSAGE.to_string());
                self.notifier.error(message.clone());
                ApiError::Server {
                    status: status.as_u16(),
                    message,
                }
            }
        }
    }
}

/// Human readable message of an error body: `message`, else `error`.
pub fn server_message(body: &Value) -> Option<String> {
    ["message", "error"]
        .iter()
        .filter_map(|key| body.get(*key))
        .find_map(|value| match value {
            Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            Value::Object(inner) => inner
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string),
            _ => None,
        })
}

/// Every field message of a `422` body. `errors` may be an object of strings
/// or string arrays, an array, or a plain string.
pub fn validation_messages(body: &Value) -> Vec<String> {
    fn collect(value: &Value, out: &mut Vec<String>) {
        match value {
            Value::String(s) => out.push(s.clone()),
            Value::Array(items) => items.iter().for_each(|item| collect(item, out)),
            Value::Object(map) => map.values().for_each(|item| collect(item, out)),
            _ => {}
        }
    }

    let mut messages = Vec::new();
    if let Some(errors) = body.get("errors") {
        collect(errors, &mut messages);
    }
    messages
}
