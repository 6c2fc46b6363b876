//! Multi-query benchmark harness.

use std::path::Path;
use std::time::Instant;

use anyhow::Context;
use serde::Serialize;
use tracing::debug;

use crate::config::BenchConfig;
use crate::provider::{Connection, ConnectionProvider};
use crate::report::{render_summary_table, Reporter, SummaryRow};
use crate::stats::{ExecutionRecord, StatsBook};

/// Runs every configured query for `execs` rounds and collects per-query stats.
pub struct BenchHarness {
    config: BenchConfig,
}

impl BenchHarness {
    pub fn new(config: BenchConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BenchConfig {
        &self.config
    }

    /// Runs every configured round and returns the accumulated stats.
    ///
    /// A round whose connection cannot be acquired is counted in
    /// `connect_failures` and leaves every per-query counter untouched.
    pub async fn run<P>(&self, provider: &P, reporter: &mut dyn Reporter) -> BenchReport
    where
        P: ConnectionProvider,
    {
        let execs = self.config.execs;
        let mut book = StatsBook::new(&self.config.queries);
        let mut connect_failures = 0u32;

        for round in 1..=execs {
            reporter.progress(&format!("\n=== Execution {round} of {execs} ==="));
            match provider.acquire().await {
                Ok(mut conn) => {
                    self.run_round(&mut conn, &mut book, reporter).await;
                    // `conn` drops here, before the pause.
                }
                Err(err) => {
                    connect_failures += 1;
                    reporter.failure(&format!("DB connection failed: {err}"));
                }
            }

            if round < execs && !self.config.sleep.is_zero() {
                debug!(round, sleep = ?self.config.sleep, "pausing between rounds");
                tokio::time::sleep(self.config.sleep).await;
            }
        }

        BenchReport {
            execs,
            sleep_ms: self.config.sleep.as_millis() as u64,
            connect_failures,
            stats: book,
        }
    }

    /// Runs each query once, in configuration order, on one connection.
    async fn run_round<C>(&self, conn: &mut C, book: &mut StatsBook, reporter: &mut dyn Reporter)
    where
        C: Connection,
    {
        for (index, (name, sql)) in self.config.queries.iter().enumerate() {
            reporter.progress(&format!("Running: {name} → {sql}"));
            let started = Instant::now();
            match conn.drain_query(sql).await {
                Ok(rows) => {
                    let elapsed = started.elapsed();
                    book.record(index, &ExecutionRecord::success(elapsed));
                    debug!(query = name, rows, elapsed_ms = elapsed.as_millis() as u64, "query ok");
                    reporter.progress(&format!("Success ({} ms)", elapsed.as_millis()));
                }
                Err(err) => {
                    book.record(index, &ExecutionRecord::failure(started.elapsed(), err.to_string()));
                    reporter.failure(&format!("Failed: {err}"));
                }
            }
        }
    }
}

/// Outcome of a full benchmark run.
#[derive(Debug, Clone)]
pub struct BenchReport {
    pub execs: u32,
    pub sleep_ms: u64,
    /// Rounds that could not get a connection at all.
    pub connect_failures: u32,
    pub stats: StatsBook,
}

/// JSON form of [`BenchReport`].
#[derive(Debug, Clone, Serialize)]
pub struct SummaryDocument {
    pub execs: u32,
    pub sleep_ms: u64,
    pub connect_failures: u32,
    pub queries: Vec<QuerySummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuerySummary {
    pub name: String,
    pub sql: String,
    pub success: u64,
    pub failure: u64,
    /// Success-only mean; 0 when nothing succeeded.
    pub avg_ms: u64,
}

impl BenchReport {
    pub fn summary_rows(&self) -> impl Iterator<Item = SummaryRow<'_>> {
        self.stats.iter().map(|entry| SummaryRow {
            name: &entry.name,
            sql: &entry.sql,
            success: entry.stats.success_count,
            failure: entry.stats.failure_count,
            avg_ms: entry.stats.average_millis(),
        })
    }

    pub fn render_summary(&self) -> String {
        render_summary_table(self.summary_rows())
    }

    pub fn to_document(&self) -> SummaryDocument {
        SummaryDocument {
            execs: self.execs,
            sleep_ms: self.sleep_ms,
            connect_failures: self.connect_failures,
            queries: self
                .summary_rows()
                .map(|row| QuerySummary {
                    name: row.name.to_string(),
                    sql: row.sql.to_string(),
                    success: row.success,
                    failure: row.failure,
                    avg_ms: row.avg_ms,
                })
                .collect(),
        }
    }
}

/// Serialize and write the summary JSON, creating parent directories.
pub fn write_summary_json(path: &Path, report: &BenchReport) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create dir {}", parent.display()))?;
    }
    let data = serde_json::to_vec_pretty(&report.to_document()).context("serialize summary")?;
    std::fs::write(path, data).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}
