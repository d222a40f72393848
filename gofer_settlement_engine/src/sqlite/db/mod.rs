//! Low-level SQLite interactions.
//!
//! All access goes through simple functions (rather than stateful structs) that accept a `&mut SqliteConnection`.
//! Callers obtain a connection from the pool, or open a transaction and pass `&mut tx`, so any group of these calls
//! can be made atomic without changing the functions themselves.
use sqlx::{sqlite::SqlitePoolOptions, Error as SqlxError, SqlitePool};

pub mod business_orders;
pub mod fulfilment;
pub mod idempotency;
pub mod payment_orders;
pub mod wallets;
pub mod withdrawals;

pub async fn new_pool(url: &str, max_connections: u32) -> Result<SqlitePool, SqlxError> {
    let pool = SqlitePoolOptions::new().max_connections(max_connections).connect(url).await?;
    Ok(pool)
}
