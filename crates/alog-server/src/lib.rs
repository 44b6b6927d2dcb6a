//! HTTP server for the alog backend.
//!
//! Wires storage, authentication, the log service and the feed regenerator
//! into one axum router. See [`server::ServerBuilder`].

pub mod config;
pub mod error;
pub mod handlers;
pub mod logs;
pub mod observability;
pub mod server;
pub mod storage;

pub use config::AppConfig;
pub use error::{ApiError, ApiResult};
pub use server::{AlogServer, AppState, ServerBuilder, build_app};
pub use storage::StorageHandles;
