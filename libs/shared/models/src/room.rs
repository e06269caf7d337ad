use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Metadata of a call room as returned by `GET /video/room/:id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    #[serde(default, deserialize_with = "crate::ids::deserialize_or_default")]
    pub id: String,
    #[serde(default)]
    pub appointment: Option<RoomAppointment>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomAppointment {
    #[serde(default)]
    pub professional_name: Option<String>,
    #[serde(default)]
    pub patient_name: Option<String>,
    #[serde(default)]
    pub appointment_date: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
];

impl Room {
    /// Header line for the call view.
    pub fn title(&self) -> Option<&str> {
        let appointment = self.appointment.as_ref()?;
        appointment
            .professional_name
            .as_deref()
            .or(appointment.patient_name.as_deref())
    }
}

impl RoomAppointment {
    /// Scheduled time. Offsets are folded into UTC; naive timestamps are taken as-is.
    pub fn scheduled_at(&self) -> Option<NaiveDateTime> {
        let raw = self.appointment_date.as_deref()?.trim();
        if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
            return Some(parsed.naive_utc());
        }
        NAIVE_FORMATS
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
    }
}
