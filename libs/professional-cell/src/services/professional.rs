use std::sync::Arc;
use chrono::NaiveDate;
use serde_json::Value;
use tracing::debug;

use shared_api::ApiClient;
use shared_models::error::ApiError;

use crate::models::ProfessionalFilters;

/// Professional discovery. Records are passed through as raw JSON.
pub struct ProfessionalService {
    api: Arc<ApiClient>,
}

impl ProfessionalService {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }

    pub async fn list(&self, filters: &ProfessionalFilters) -> Result<Vec<Value>, ApiError> {
        let path = if filters.has_search() {
            "/professionals/search"
        } else {
            "/professionals"
        };
        debug!("Listing professionals via {}", path);

        let response: Value = self.api.get_with_query(path, &filters.to_query()).await?;
        Ok(unwrap_list(response, "professionals"))
    }

    pub async fn get(&self, professional_id: &str) -> Result<Value, ApiError> {
        self.api
            .get(&format!("/professionals/{}", professional_id))
            .await
    }

    pub async fn availability(&self, professional_id: &str, date: NaiveDate) -> Result<Value, ApiError> {
        let query = [("date", date.format("%Y-%m-%d").to_string())];
        self.api
            .get_with_query(&format!("/professionals/{}/availability", professional_id), &query)
            .await
    }

    pub async fn specialties(&self) -> Result<Value, ApiError> {
        self.api.get("/professionals/specialties").await
    }
}

/// Accepts both a bare array and an object wrapping the array under `key`.
pub(crate) fn unwrap_list(response: Value, key: &str) -> Vec<Value> {
    match response {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove(key) {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}
