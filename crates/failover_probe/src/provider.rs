//! Seam between the loops and whatever hands out database connections.
//!
//! Providers own reconnection and failover. The loops only acquire, use, and
//! drop; dropping a connection releases it, so release happens on every exit
//! path including early returns through `?`.

use async_trait::async_trait;

use crate::error::ProbeError;
use crate::work::SqlValue;

/// Source of connections. May block, retry, or fail over internally.
#[async_trait]
pub trait ConnectionProvider: Send + Sync {
    type Connection: Connection;

    /// Errors returned here are classified as connectivity failures.
    async fn acquire(&self) -> Result<Self::Connection, ProbeError>;
}

/// A connection exclusively owned by one round or iteration.
#[async_trait]
pub trait Connection: Send {
    /// Opens an explicit transaction; auto-commit is off until commit/rollback.
    async fn begin(&mut self) -> Result<(), ProbeError>;

    /// Executes a statement and returns the number of rows affected.
    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64, ProbeError>;

    /// Runs a query and reads every row without keeping any of them.
    /// Returns the number of rows drained.
    async fn drain_query(&mut self, sql: &str) -> Result<u64, ProbeError>;

    async fn commit(&mut self) -> Result<(), ProbeError>;

    async fn rollback(&mut self) -> Result<(), ProbeError>;
}
