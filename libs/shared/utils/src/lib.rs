pub mod jwt;
pub mod notifier;
pub mod test_utils;

pub use notifier::Notifier;
