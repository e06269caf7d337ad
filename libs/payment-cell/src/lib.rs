pub mod models;
pub mod services;

pub use models::{CardData, PaymentMethodKind, ProcessPaymentRequest};
pub use services::PaymentService;
