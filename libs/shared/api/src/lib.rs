//! REST transport and session state shared by every cell.

pub mod client;
pub mod session;
pub mod storage;

pub use client::ApiClient;
pub use session::{SessionSnapshot, SessionStore};
pub use storage::{FileTokenStorage, MemoryTokenStorage, StorageError, TokenStorage};
