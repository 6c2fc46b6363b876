//! PostgreSQL provider backed by a `deadpool-postgres` pool.
//!
//! Failover lives in the driver: a multi-host connection string such as
//! `host=pg-a,pg-b target_session_attrs=read-write` makes every new physical
//! connection land on the current primary, and the pool replaces connections
//! that broke during a switchover when they are next checked out.

use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Object, Pool, RecyclingMethod, Runtime};
use futures_util::{pin_mut, TryStreamExt};
use tokio_postgres::types::ToSql;
use tokio_postgres::NoTls;
use tracing::debug;

use crate::config::ConnectionConfig;
use crate::error::ProbeError;
use crate::provider::{Connection, ConnectionProvider};
use crate::work::SqlValue;

/// Runs on every checkout; clears a transaction left open by an abandoned round.
const RECYCLE_SQL: &str = "ROLLBACK";

/// Connection pool over one connection string; hands out [`PgConnection`]s.
pub struct PgProvider {
    pool: Pool,
}

impl PgProvider {
    /// Builds the pool. No connection is opened until the first `acquire`.
    pub fn new(config: &ConnectionConfig) -> Result<Self, ProbeError> {
        let mut pg_config: tokio_postgres::Config = config
            .url
            .parse()
            .map_err(|err| ProbeError::config(format!("connection.url: {err}")))?;
        if let Some(user) = &config.user {
            pg_config.user(user.as_str());
        }
        if let Some(password) = &config.password {
            pg_config.password(password.as_str());
        }
        pg_config.connect_timeout(config.connect_timeout);

        let manager = Manager::from_config(
            pg_config,
            NoTls,
            ManagerConfig {
                recycling_method: RecyclingMethod::Custom(RECYCLE_SQL.to_string()),
            },
        );
        let pool = Pool::builder(manager)
            .max_size(config.pool_size)
            .runtime(Runtime::Tokio1)
            .wait_timeout(config.acquire_timeout)
            .build()
            .map_err(|err| ProbeError::config(format!("build connection pool: {err}")))?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl ConnectionProvider for PgProvider {
    type Connection = PgConnection;

    async fn acquire(&self) -> Result<PgConnection, ProbeError> {
        let client = self
            .pool
            .get()
            .await
            .map_err(|err| ProbeError::Connect(error_chain(&err)))?;
        let status = self.pool.status();
        debug!(size = status.size, available = status.available, "acquired connection");
        Ok(PgConnection {
            client,
            in_transaction: false,
        })
    }
}

/// Pooled client; returns to the pool on drop.
pub struct PgConnection {
    client: Object,
    in_transaction: bool,
}

#[async_trait]
impl Connection for PgConnection {
    async fn begin(&mut self) -> Result<(), ProbeError> {
        self.client
            .batch_execute("BEGIN")
            .await
            .map_err(execution_error)?;
        self.in_transaction = true;
        Ok(())
    }

    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64, ProbeError> {
        let values: Vec<&(dyn ToSql + Sync)> = params.iter().map(as_sql).collect();
        self.client
            .execute(sql, &values)
            .await
            .map_err(execution_error)
    }

    async fn drain_query(&mut self, sql: &str) -> Result<u64, ProbeError> {
        let stream = self
            .client
            .query_raw(sql, std::iter::empty::<i64>())
            .await
            .map_err(execution_error)?;
        pin_mut!(stream);
        let mut rows = 0u64;
        while stream.try_next().await.map_err(execution_error)?.is_some() {
            rows += 1;
        }
        Ok(rows)
    }

    async fn commit(&mut self) -> Result<(), ProbeError> {
        let result = self.client.batch_execute("COMMIT").await;
        self.in_transaction = false;
        result.map_err(commit_error)
    }

    async fn rollback(&mut self) -> Result<(), ProbeError> {
        if !self.in_transaction {
            return Ok(());
        }
        self.in_transaction = false;
        self.client
            .batch_execute("ROLLBACK")
            .await
            .map_err(execution_error)
    }
}

fn as_sql(value: &SqlValue) -> &(dyn ToSql + Sync) {
    match value {
        SqlValue::Int(value) => value,
        SqlValue::Text(value) => value,
    }
}

fn execution_error(err: tokio_postgres::Error) -> ProbeError {
    match err.as_db_error() {
        Some(db) => ProbeError::Execute(format!("{} ({})", db.message(), db.code().code())),
        None => ProbeError::Execute(error_chain(&err)),
    }
}

/// A server-side error means the server answered and the transaction is gone.
/// Anything else (closed socket, I/O) leaves the outcome unknown.
fn commit_error(err: tokio_postgres::Error) -> ProbeError {
    if err.as_db_error().is_some() {
        execution_error(err)
    } else {
        ProbeError::CommitAmbiguous(error_chain(&err))
    }
}

/// Joins an error with its `source()` chain. The driver's own message is
/// often generic ("error serializing parameter 0"); the cause says why.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}
