//! # alog-db-postgres
//!
//! PostgreSQL implementation of the alog persistence gateway.
//!
//! Built on `sqlx-core` and `sqlx-postgres` directly. The schema ships as
//! embedded migrations applied at startup (see [`migrations`]).
//!
//! ```ignore
//! let store = PostgresStore::connect(&PostgresConfig::new("postgres://localhost/alog")).await?;
//! let logs: DynLogStorage = Arc::new(store.clone());
//! ```

mod auth;
pub mod config;
mod content;
pub mod error;
pub mod migrations;
pub mod pool;
mod store;

pub use config::PostgresConfig;
pub use error::{PostgresError, Result};
pub use store::PostgresStore;

/// PostgreSQL connection pool.
pub type PgPool = sqlx_postgres::PgPool;
