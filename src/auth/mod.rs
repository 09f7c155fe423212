// Authentication module
// Manages token lifecycle and session storage

mod manager;
mod refresh;
pub mod storage;
mod types;

pub use manager::TokenManager;
pub use storage::{KeyValueStore, KeyringStore, MemoryStore, SqliteStore, StorageError};
pub use types::{StoredSession, TokenSet};
