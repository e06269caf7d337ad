//! # Auth Cell
//!
//! Session bootstrap, login, registration and logout against the `/auth`
//! endpoints. The resulting token and user live in the shared
//! [`shared_api::SessionStore`].

pub mod services;

pub use services::AuthService;
