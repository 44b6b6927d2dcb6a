//! Opaque server-side sessions.
//!
//! The session token is 32 random bytes, base64url encoded. Expired sessions
//! are deleted when they are looked up.

use alog_core::{DynSessionStorage, Session, UserId};
use time::{Duration, OffsetDateTime};

use crate::error::{AuthError, AuthResult};
use crate::random::random_urlsafe;

pub struct SessionService {
    storage: DynSessionStorage,
    lifetime: Duration,
}

impl SessionService {
    #[must_use]
    pub fn new(storage: DynSessionStorage, lifetime: Duration) -> Self {
        Self { storage, lifetime }
    }

    /// Creates a session for `user_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be stored.
    pub async fn create_session(&self, user_id: UserId) -> AuthResult<Session> {
        let now = OffsetDateTime::now_utc();
        let session = Session {
            session_token: random_urlsafe(32),
            user_id,
            expires_at: now + self.lifetime,
            created_at: now,
        };
        self.storage.create(&session).await?;
        tracing::debug!(user_id, "session created");
        Ok(session)
    }

    /// Looks up a live session.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Unauthorized` if the session does not exist or has
    /// expired. An expired session is deleted.
    pub async fn find_by_token(&self, token: &str) -> AuthResult<Session> {
        let session = self
            .storage
            .find_by_token(token)
            .await?
            .ok_or_else(|| AuthError::unauthorized("invalid session"))?;

        if session.is_expired() {
            self.storage.delete(token).await?;
            return Err(AuthError::unauthorized("invalid session"));
        }
        Ok(session)
    }

    /// Deletes a session.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Unauthorized` if the session did not exist.
    pub async fn delete(&self, token: &str) -> AuthResult<()> {
        if self.storage.delete(token).await? {
            Ok(())
        } else {
            Err(AuthError::unauthorized("invalid session"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alog_core::SessionStorage;
    use alog_db_memory::MemoryStore;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_create_and_find() {
        let store = Arc::new(MemoryStore::new());
        let service = SessionService::new(store.clone(), Duration::days(20));

        let session = service.create_session(3).await.unwrap();
        assert_eq!(session.session_token.len(), 43);

        let found = service.find_by_token(&session.session_token).await.unwrap();
        assert_eq!(found.user_id, 3);
    }

    #[tokio::test]
    async fn test_expired_session_deleted_on_lookup() {
        let store = Arc::new(MemoryStore::new());
        let service = SessionService::new(store.clone(), Duration::seconds(-1));
        let session = service.create_session(3).await.unwrap();

        let err = service.find_by_token(&session.session_token).await.unwrap_err();
        assert!(err.is_unauthorized());
        assert!(
            SessionStorage::find_by_token(store.as_ref(), &session.session_token)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_delete() {
        let store = Arc::new(MemoryStore::new());
        let service = SessionService::new(store.clone(), Duration::days(1));
        let session = service.create_session(3).await.unwrap();

        service.delete(&session.session_token).await.unwrap();
        assert!(service.find_by_token(&session.session_token).await.is_err());
        assert!(service.delete(&session.session_token).await.is_err());
    }
}
