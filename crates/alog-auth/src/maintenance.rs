//! Periodic purge of expired authentication records.

use std::time::Duration;

use alog_core::{DynOAuthStateStorage, DynRefreshTokenStorage, DynSessionStorage};
use time::OffsetDateTime;
use tokio::task::JoinHandle;

use crate::error::AuthResult;
use crate::middleware::AuthStorage;

/// Counts of records removed by one sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepStats {
    pub oauth_states: u64,
    pub sessions: u64,
    pub refresh_tokens: u64,
}

/// Deletes expired OAuth states, sessions and refresh tokens.
#[derive(Clone)]
pub struct ExpiredRecordSweeper {
    oauth_states: DynOAuthStateStorage,
    sessions: DynSessionStorage,
    refresh_tokens: DynRefreshTokenStorage,
}

impl ExpiredRecordSweeper {
    #[must_use]
    pub fn new(storage: &AuthStorage) -> Self {
        Self {
            oauth_states: storage.oauth_states.clone(),
            sessions: storage.sessions.clone(),
            refresh_tokens: storage.refresh_tokens.clone(),
        }
    }

    /// Runs one sweep.
    ///
    /// # Errors
    ///
    /// Returns the first storage error encountered.
    pub async fn sweep(&self) -> AuthResult<SweepStats> {
        let now = OffsetDateTime::now_utc();
        Ok(SweepStats {
            oauth_states: self.oauth_states.delete_expired(now).await?,
            sessions: self.sessions.delete_expired(now).await?,
            refresh_tokens: self.refresh_tokens.delete_expired(now).await?,
        })
    }

    /// Sweeps every `interval` until the returned task is aborted.
    pub fn spawn(self, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match self.sweep().await {
                    Ok(stats) => tracing::debug!(
                        oauth_states = stats.oauth_states,
                        sessions = stats.sessions,
                        refresh_tokens = stats.refresh_tokens,
                        "expired auth records purged"
                    ),
                    Err(e) => tracing::warn!(error = %e, "expired auth record purge failed"),
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alog_core::{
        OAuthState, OAuthStateStorage, RefreshToken, RefreshTokenStorage, Session, SessionStorage,
    };
    use alog_db_memory::MemoryStore;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_sweep_removes_only_expired() {
        let store = Arc::new(MemoryStore::new());
        let now = OffsetDateTime::now_utc();
        let past = now - time::Duration::minutes(1);
        let future = now + time::Duration::minutes(10);

        for (key, expires_at) in [("old", past), ("new", future)] {
            OAuthStateStorage::create(
                store.as_ref(),
                &OAuthState {
                    state: key.into(),
                    code_verifier: "v".into(),
                    redirect_uri: "https://app.example".into(),
                    is_signup: false,
                    expires_at,
                    created_at: now,
                },
            )
            .await
            .unwrap();
            SessionStorage::create(
                store.as_ref(),
                &Session {
                    session_token: key.into(),
                    user_id: 1,
                    expires_at,
                    created_at: now,
                },
            )
            .await
            .unwrap();
            RefreshTokenStorage::create(
                store.as_ref(),
                &RefreshToken {
                    token: key.into(),
                    user_id: 1,
                    issued_at: now,
                    expires_at,
                },
            )
            .await
            .unwrap();
        }

        let sweeper = ExpiredRecordSweeper::new(&AuthStorage {
            users: store.clone(),
            oauth_states: store.clone(),
            sessions: store.clone(),
            refresh_tokens: store.clone(),
        });
        let stats = sweeper.sweep().await.unwrap();
        assert_eq!(
            stats,
            SweepStats {
                oauth_states: 1,
                sessions: 1,
                refresh_tokens: 1
            }
        );
        assert_eq!(store.oauth_state_count(), 1);
        assert_eq!(store.refresh_token_count(), 1);
    }
}
