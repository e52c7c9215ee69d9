//! MySQL configuration and connection pooling for the clinical records services.
//!
//! This crate provides pool management using sqlx and maps driver errors onto
//! the shared [`error::DatabaseError`] taxonomy.

mod config;
mod errors;
mod pool;

pub use config::DbConfig;
pub use errors::classify;
pub use pool::{close_pool, create_lazy_pool, create_pool, DbPool};

// Re-export sqlx for convenience
pub use sqlx;
