pub mod models;
pub mod services;

pub use models::{AppointmentFilter, AppointmentStatus, NewAppointment};
pub use services::AppointmentService;
