//! In-memory persistence gateway for alog.
//!
//! [`MemoryStore`] implements every storage trait from `alog-core` on top of
//! `dashmap` maps. Single-use records are removed with `DashMap::remove`,
//! which gives the read-and-invalidate semantics the auth flows rely on.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use alog_db_memory::MemoryStore;
//! use alog_core::DynLogStorage;
//!
//! let store = Arc::new(MemoryStore::new());
//! let logs: DynLogStorage = store.clone();
//! ```

mod auth;
mod content;
mod store;

pub use store::MemoryStore;
