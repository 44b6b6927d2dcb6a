//! Persistence gateway traits.
//!
//! Every backend implements all five traits. Services hold them as
//! `Arc<dyn Trait>` so a backend can be chosen at startup.
//!
//! # Atomicity
//!
//! - [`LogStorage::create`] and [`LogStorage::update`] write the log row and
//!   its topic/author association rows in one transaction.
//! - [`OAuthStateStorage::take`] and [`RefreshTokenStorage::take`] are
//!   read-and-invalidate: of two concurrent calls with the same key, at most
//!   one observes the record.

use std::sync::Arc;

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::StorageResult;
use crate::types::{
    Log, LogId, LogPatch, NewLog, NewUser, OAuthState, Page, RefreshToken, Session, User, UserId,
};

/// User records.
#[async_trait]
pub trait UserStorage: Send + Sync {
    /// Finds a user by id.
    async fn find_by_id(&self, id: UserId) -> StorageResult<Option<User>>;

    /// Creates a user with unapproved profile defaults.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Conflict`](crate::StorageError::Conflict) if a
    /// user with the same id exists.
    async fn create(&self, user: NewUser) -> StorageResult<User>;

    /// Lists users ordered by join time, newest first.
    async fn list(&self, limit: u32, offset: u32) -> StorageResult<Page<User>>;

    /// Case-insensitive substring search over name and affiliation.
    async fn search(&self, query: &str, limit: u32, offset: u32) -> StorageResult<Page<User>>;
}

/// Log records with topic and author associations.
#[async_trait]
pub trait LogStorage: Send + Sync {
    /// Finds a log by id, with authors hydrated.
    async fn find_by_id(&self, id: LogId) -> StorageResult<Option<Log>>;

    /// Lists logs ordered by creation time, newest first, with authors
    /// hydrated.
    async fn list(&self, limit: u32, offset: u32) -> StorageResult<Page<Log>>;

    /// Case-insensitive substring search over title and content.
    async fn search(&self, query: &str, limit: u32, offset: u32) -> StorageResult<Page<Log>>;

    /// Creates a log together with its associations. All-or-nothing.
    async fn create(&self, log: NewLog) -> StorageResult<Log>;

    /// Applies a partial update together with any association changes.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`](crate::StorageError::NotFound) if
    /// the log does not exist.
    async fn update(&self, id: LogId, patch: LogPatch) -> StorageResult<Log>;

    /// Stores pre-rendered HTML. A missing log is not an error; the render
    /// may race a delete.
    async fn set_rendered(&self, id: LogId, html: &str) -> StorageResult<()>;

    /// Deletes a log and its comments.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`](crate::StorageError::NotFound) if
    /// the log does not exist.
    async fn delete(&self, id: LogId) -> StorageResult<()>;
}

/// Pending authorization flows.
#[async_trait]
pub trait OAuthStateStorage: Send + Sync {
    /// Stores a new flow record.
    async fn create(&self, state: &OAuthState) -> StorageResult<()>;

    /// Removes and returns the record for `state`, expired or not.
    ///
    /// Must be atomic. The caller checks expiry on the returned record.
    async fn take(&self, state: &str) -> StorageResult<Option<OAuthState>>;

    /// Deletes records that expired before `now`. Returns the number deleted.
    async fn delete_expired(&self, now: OffsetDateTime) -> StorageResult<u64>;
}

/// Opaque server-side sessions.
#[async_trait]
pub trait SessionStorage: Send + Sync {
    async fn create(&self, session: &Session) -> StorageResult<()>;

    /// Finds a session by token, expired or not.
    async fn find_by_token(&self, token: &str) -> StorageResult<Option<Session>>;

    /// Deletes a session. Returns `true` if it existed.
    async fn delete(&self, token: &str) -> StorageResult<bool>;

    /// Deletes every session belonging to `user_id`.
    async fn delete_by_user(&self, user_id: UserId) -> StorageResult<u64>;

    async fn delete_expired(&self, now: OffsetDateTime) -> StorageResult<u64>;
}

/// Single-use refresh tokens.
#[async_trait]
pub trait RefreshTokenStorage: Send + Sync {
    /// Stores a new token.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Conflict`](crate::StorageError::Conflict) on a
    /// duplicate token value.
    async fn create(&self, token: &RefreshToken) -> StorageResult<()>;

    /// Removes and returns the token record, expired or not.
    ///
    /// Must be atomic: this is what makes rotation single-use.
    async fn take(&self, token: &str) -> StorageResult<Option<RefreshToken>>;

    /// Deletes every token belonging to `user_id`.
    async fn delete_by_user(&self, user_id: UserId) -> StorageResult<u64>;

    async fn delete_expired(&self, now: OffsetDateTime) -> StorageResult<u64>;
}

pub type DynUserStorage = Arc<dyn UserStorage>;
pub type DynLogStorage = Arc<dyn LogStorage>;
pub type DynOAuthStateStorage = Arc<dyn OAuthStateStorage>;
pub type DynSessionStorage = Arc<dyn SessionStorage>;
pub type DynRefreshTokenStorage = Arc<dyn RefreshTokenStorage>;
