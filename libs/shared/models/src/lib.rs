pub mod auth;
pub mod error;
pub mod ids;
pub mod notification;
pub mod room;

pub use auth::{Role, Session, User};
pub use error::ApiError;
pub use notification::{Notification, NotificationLevel};
pub use room::{Room, RoomAppointment};
