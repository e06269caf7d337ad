use std::sync::Arc;
use serde_json::{json, Value};
use tracing::{debug, info};

use shared_api::ApiClient;
use shared_models::error::ApiError;

use crate::models::{AppointmentFilter, AppointmentStatus, NewAppointment};

/// Appointment endpoints. Appointment records stay opaque JSON.
pub struct AppointmentService {
    api: Arc<ApiClient>,
}

impl AppointmentService {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }

    pub async fn list(&self, filter: &AppointmentFilter) -> Result<Value, ApiError> {
        debug!("Listing appointments with {:?}", filter);
        self.api.get_with_query("/appointments", &filter.to_query()).await
    }

    pub async fn create(&self, appointment: &NewAppointment) -> Result<Value, ApiError> {
        let body = self.api.encode_body(appointment)?;
        let created: Value = self.api.post("/appointments", Some(body)).await?;

        // The booking endpoint may answer 200 with `success: false`.
        if created.get("success").and_then(Value::as_bool) == Some(false) {
            let message = created
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("Could not book the appointment.")
                .to_string();
            self.api.notifier().error(message.clone());
            return Err(ApiError::Validation { message, fields: Vec::new() });
        }

        info!("Appointment booked with professional {}", appointment.professional_id);
        self.api.notifier().success("Appointment booked successfully!");
        Ok(created)
    }

    pub async fn update_status(&self, appointment_id: &str, status: AppointmentStatus) -> Result<Value, ApiError> {
        let updated = self
            .api
            .put(
                &format!("/appointments/{}/status", appointment_id),
                Some(json!({ "status": status })),
            )
            .await?;
        self.api.notifier().success("Status updated successfully!");
        Ok(updated)
    }

    pub async fn stats(&self) -> Result<Value, ApiError> {
        self.api.get("/appointments/stats").await
    }

    pub async fn upcoming(&self) -> Result<Value, ApiError> {
        self.api.get("/appointments/upcoming").await
    }

    pub async fn get(&self, appointment_id: &str) -> Result<Value, ApiError> {
        self.api.get(&format!("/appointments/{}", appointment_id)).await
    }
}
