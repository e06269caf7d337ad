use std::sync::Arc;
use serde_json::{json, Value};
use tracing::info;

use shared_api::ApiClient;
use shared_models::error::ApiError;

use crate::models::ProcessPaymentRequest;

pub struct PaymentService {
    api: Arc<ApiClient>,
}

impl PaymentService {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }

    /// Available payment methods, unwrapped from `payment_methods`.
    pub async fn methods(&self) -> Result<Vec<Value>, ApiError> {
        let response: Value = self.api.get("/payments/methods").await?;
        let methods = match response {
            Value::Array(items) => items,
            Value::Object(mut map) => match map.remove("payment_methods") {
                Some(Value::Array(items)) => items,
                _ => Vec::new(),
            },
            _ => Vec::new(),
        };
        Ok(methods)
    }

    pub async fn generate_pix(&self, payment_id: &str) -> Result<Value, ApiError> {
        let pix: Value = self
            .api
            .post("/payments/pix/generate", Some(json!({ "payment_id": payment_id })))
            .await?;
        self.api.notifier().success("PIX code generated successfully!");
        Ok(pix)
    }

    pub async fn process(&self, payment_id: &str, request: &ProcessPaymentRequest) -> Result<Value, ApiError> {
        info!("Processing payment {} with {:?}", payment_id, request.payment_method);
        let body = self.api.encode_body(request)?;
        let processed: Value = self
            .api
            .post(&format!("/payments/{}/process", payment_id), Some(body))
            .await?;
        self.api.notifier().success("Payment processed successfully!");
        Ok(processed)
    }
}
