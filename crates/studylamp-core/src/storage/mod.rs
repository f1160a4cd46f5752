mod config;
pub mod database;
pub mod file;
pub mod kv;
pub mod session_store;

pub use config::{Config, StoreBackend, StoreConfig, TimerConfig, VisibilityConfig};
pub use database::SqliteStore;
pub use file::FileStore;
pub use kv::{MemoryStore, PersistentStore};
pub use session_store::{SessionStore, SESSION_SLOT_KEY};

use std::path::PathBuf;

use crate::error::StoreError;

/// Returns `~/.config/studylamp[-dev]/` based on STUDYLAMP_ENV.
///
/// Set STUDYLAMP_ENV=dev to use development data directory.
///
/// # Errors
/// Returns an error if creating the data directory fails.
pub fn data_dir() -> Result<PathBuf, StoreError> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("STUDYLAMP_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("studylamp-dev")
    } else {
        base_dir.join("studylamp")
    };

    std::fs::create_dir_all(&dir).map_err(|source| StoreError::Io {
        path: dir.clone(),
        source,
    })?;
    Ok(dir)
}

/// Open the backend named by `config` under [`data_dir`].
///
/// # Errors
/// Returns an error if the data directory or the backend cannot be opened.
pub fn open_backend(config: &StoreConfig) -> Result<Box<dyn PersistentStore>, StoreError> {
    Ok(match config.backend {
        StoreBackend::Sqlite => Box::new(SqliteStore::open(data_dir()?.join("studylamp.db"))?),
        StoreBackend::File => Box::new(FileStore::open(data_dir()?.join("sessions"))?),
        StoreBackend::Memory => Box::new(MemoryStore::new()),
    })
}
