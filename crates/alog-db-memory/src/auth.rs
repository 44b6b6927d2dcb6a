use alog_core::{
    OAuthState, OAuthStateStorage, RefreshToken, RefreshTokenStorage, Session, SessionStorage,
    StorageError, StorageResult, UserId,
};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use time::OffsetDateTime;

use crate::store::MemoryStore;

#[async_trait]
impl OAuthStateStorage for MemoryStore {
    async fn create(&self, state: &OAuthState) -> StorageResult<()> {
        match self.oauth_states.entry(state.state.clone()) {
            Entry::Occupied(_) => Err(StorageError::conflict("oauth_state", "<redacted>")),
            Entry::Vacant(slot) => {
                slot.insert(state.clone());
                Ok(())
            }
        }
    }

    async fn take(&self, state: &str) -> StorageResult<Option<OAuthState>> {
        Ok(self.oauth_states.remove(state).map(|(_, s)| s))
    }

    async fn delete_expired(&self, now: OffsetDateTime) -> StorageResult<u64> {
        let before = self.oauth_states.len();
        self.oauth_states.retain(|_, s| !s.is_expired_at(now));
        Ok((before - self.oauth_states.len()) as u64)
    }
}

#[async_trait]
impl SessionStorage for MemoryStore {
    async fn create(&self, session: &Session) -> StorageResult<()> {
        match self.sessions.entry(session.session_token.clone()) {
            Entry::Occupied(_) => Err(StorageError::conflict("session", "<redacted>")),
            Entry::Vacant(slot) => {
                slot.insert(session.clone());
                Ok(())
            }
        }
    }

    async fn find_by_token(&self, token: &str) -> StorageResult<Option<Session>> {
        Ok(self.sessions.get(token).map(|s| s.clone()))
    }

    async fn delete(&self, token: &str) -> StorageResult<bool> {
        Ok(self.sessions.remove(token).is_some())
    }

    async fn delete_by_user(&self, user_id: UserId) -> StorageResult<u64> {
        let before = self.sessions.len();
        self.sessions.retain(|_, s| s.user_id != user_id);
        Ok((before - self.sessions.len()) as u64)
    }

    async fn delete_expired(&self, now: OffsetDateTime) -> StorageResult<u64> {
        let before = self.sessions.len();
        self.sessions.retain(|_, s| s.expires_at > now);
        Ok((before - self.sessions.len()) as u64)
    }
}

#[async_trait]
impl RefreshTokenStorage for MemoryStore {
    async fn create(&self, token: &RefreshToken) -> StorageResult<()> {
        match self.refresh_tokens.entry(token.token.clone()) {
            Entry::Occupied(_) => Err(StorageError::conflict("refresh_token", "<redacted>")),
            Entry::Vacant(slot) => {
                slot.insert(token.clone());
                Ok(())
            }
        }
    }

    async fn take(&self, token: &str) -> StorageResult<Option<RefreshToken>> {
        Ok(self.refresh_tokens.remove(token).map(|(_, t)| t))
    }

    async fn delete_by_user(&self, user_id: UserId) -> StorageResult<u64> {
        let before = self.refresh_tokens.len();
        self.refresh_tokens.retain(|_, t| t.user_id != user_id);
        Ok((before - self.refresh_tokens.len()) as u64)
    }

    async fn delete_expired(&self, now: OffsetDateTime) -> StorageResult<u64> {
        let before = self.refresh_tokens.len();
        self.refresh_tokens.retain(|_, t| t.expires_at > now);
        Ok((before - self.refresh_tokens.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use time::Duration;

    fn refresh(token: &str, expires_in: Duration) -> RefreshToken {
        let now = OffsetDateTime::now_utc();
        RefreshToken {
            token: token.into(),
            user_id: 1,
            issued_at: now,
            expires_at: now + expires_in,
        }
    }

    #[tokio::test]
    async fn test_take_is_single_use() {
        let store = MemoryStore::new();
        RefreshTokenStorage::create(&store, &refresh("t1", Duration::days(20)))
            .await
            .unwrap();

        assert!(RefreshTokenStorage::take(&store, "t1").await.unwrap().is_some());
        assert!(RefreshTokenStorage::take(&store, "t1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_take_yields_one_winner() {
        let store = Arc::new(MemoryStore::new());
        RefreshTokenStorage::create(store.as_ref(), &refresh("t1", Duration::days(20)))
            .await
            .unwrap();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { RefreshTokenStorage::take(store.as_ref(), "t1").await })
            })
            .collect();

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap().is_some() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_delete_expired_keeps_live_records() {
        let store = MemoryStore::new();
        RefreshTokenStorage::create(&store, &refresh("live", Duration::days(1)))
            .await
            .unwrap();
        RefreshTokenStorage::create(&store, &refresh("dead", Duration::seconds(-5)))
            .await
            .unwrap();

        let deleted = RefreshTokenStorage::delete_expired(&store, OffsetDateTime::now_utc())
            .await
            .unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(store.refresh_token_count(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_refresh_token_conflicts() {
        let store = MemoryStore::new();
        let token = refresh("dup", Duration::days(1));
        RefreshTokenStorage::create(&store, &token).await.unwrap();
        let err = RefreshTokenStorage::create(&store, &token).await.unwrap_err();
        assert!(err.is_conflict());
    }
}
