//! # alog-core
//!
//! Domain entities and the persistence gateway for the alog backend.
//!
//! This crate holds no storage implementation. Backends live in
//! `alog-db-memory` and `alog-db-postgres`, and every service in the
//! workspace talks to them through the traits in [`storage`].
//!
//! Relations between records are plain identifiers (`UserId`, `LogId`).
//! Hydrated relation fields such as [`Log::authors`] are optional views
//! filled in by the backend and are never written back.

mod error;
pub mod storage;
pub mod types;
pub mod url;

pub use error::StorageError;
pub use storage::{
    DynLogStorage, DynOAuthStateStorage, DynRefreshTokenStorage, DynSessionStorage,
    DynUserStorage, LogStorage, OAuthStateStorage, RefreshTokenStorage, SessionStorage,
    UserStorage,
};
pub use types::{
    Author, Comment, Log, LogId, LogPatch, NewLog, NewUser, OAuthState, Page, RefreshToken,
    Session, Topic, User, UserId,
};
pub use url::{LogUrlBuilder, log_slug};

/// Type alias for a storage result.
pub type StorageResult<T> = Result<T, StorageError>;
