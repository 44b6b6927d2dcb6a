//! Persistence backend selection.

use std::sync::Arc;

use alog_auth::middleware::AuthStorage;
use alog_core::{
    DynLogStorage, DynOAuthStateStorage, DynRefreshTokenStorage, DynSessionStorage, DynUserStorage,
};
use alog_db_memory::MemoryStore;
use alog_db_postgres::{PostgresError, PostgresStore};

use crate::config::{StorageBackend, StorageConfig};

/// Trait-object handles to the configured backend.
#[derive(Clone)]
pub struct StorageHandles {
    pub users: DynUserStorage,
    pub logs: DynLogStorage,
    pub oauth_states: DynOAuthStateStorage,
    pub sessions: DynSessionStorage,
    pub refresh_tokens: DynRefreshTokenStorage,
    postgres: Option<PostgresStore>,
}

impl StorageHandles {
    pub fn memory() -> Self {
        Self::from_memory(Arc::new(MemoryStore::new()))
    }

    pub fn from_memory(store: Arc<MemoryStore>) -> Self {
        Self {
            users: store.clone(),
            logs: store.clone(),
            oauth_states: store.clone(),
            sessions: store.clone(),
            refresh_tokens: store,
            postgres: None,
        }
    }

    pub fn from_postgres(store: PostgresStore) -> Self {
        let shared = Arc::new(store.clone());
        Self {
            users: shared.clone(),
            logs: shared.clone(),
            oauth_states: shared.clone(),
            sessions: shared.clone(),
            refresh_tokens: shared,
            postgres: Some(store),
        }
    }

    /// Opens the configured backend. The postgres backend connects and runs
    /// migrations before returning.
    pub async fn connect(config: &StorageConfig) -> Result<Self, PostgresError> {
        match config.backend {
            StorageBackend::Memory => {
                tracing::warn!("using in-memory storage; data is lost on restart");
                Ok(Self::memory())
            }
            StorageBackend::Postgres => {
                let store = PostgresStore::connect(&config.postgres).await?;
                tracing::info!(
                    pool_size = config.postgres.pool_size,
                    "postgres storage connected"
                );
                Ok(Self::from_postgres(store))
            }
        }
    }

    pub fn auth(&self) -> AuthStorage {
        AuthStorage {
            users: self.users.clone(),
            oauth_states: self.oauth_states.clone(),
            sessions: self.sessions.clone(),
            refresh_tokens: self.refresh_tokens.clone(),
        }
    }

    /// Closes pooled connections, if any.
    pub async fn close(&self) {
        if let Some(store) = &self.postgres {
            store.close().await;
        }
    }
}
