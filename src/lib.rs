//! ari community backend
//!
//! Re-exports modules for integration testing and external use.

pub mod api;
pub mod blob;
pub mod config;
pub mod db;
pub mod domain;
pub mod handlers;
pub mod idempotency;
pub mod store;

mod error;

pub use config::Config;
pub use domain::OperationContext;
pub use error::AppError;
