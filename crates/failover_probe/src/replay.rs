//! Replay-safe upsert loop.
//!
//! Each iteration acquires a connection, upserts one row keyed by a fixed id
//! inside an explicit transaction, and commits. Any failure is reported and
//! the next iteration simply runs the same statement again. This is only sound
//! because the unit is `Deterministic`: if a commit succeeded on the server but
//! its acknowledgement was lost, running it again overwrites the same row.

use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::classify::{replay_decision, ReplayDecision};
use crate::error::{FailureKind, ProbeError};
use crate::provider::{Connection, ConnectionProvider};
use crate::report::Reporter;
use crate::work::{SqlValue, UpsertTarget, WorkUnit};

/// Counts of what happened while the loop ran.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReplayTally {
    pub iterations: u64,
    pub successes: u64,
    pub connect_failures: u64,
    pub execution_failures: u64,
    pub ambiguous_commits: u64,
}

impl ReplayTally {
    fn record_failure(&mut self, kind: FailureKind) {
        match kind {
            FailureKind::Connectivity => self.connect_failures += 1,
            FailureKind::CommitAmbiguous => self.ambiguous_commits += 1,
            FailureKind::Execution | FailureKind::Configuration => self.execution_failures += 1,
        }
    }

    pub fn failures(&self) -> u64 {
        self.connect_failures + self.execution_failures + self.ambiguous_commits
    }
}

/// A committed upsert.
#[derive(Debug, Clone)]
struct Upserted {
    rows: u64,
    params: Vec<SqlValue>,
}

/// Runs one replay-safe [`WorkUnit`] over and over, `interval` apart.
#[derive(Debug)]
pub struct ReplayRunner {
    unit: WorkUnit,
    interval: Duration,
}

impl ReplayRunner {
    /// Refuses any unit that is not safe to re-run after an unknown outcome.
    pub fn new(unit: WorkUnit, interval: Duration) -> Result<Self, ProbeError> {
        if !unit.class().is_replay_safe() {
            return Err(ProbeError::NotReplaySafe(unit.class()));
        }
        Ok(Self { unit, interval })
    }

    pub fn unit(&self) -> &WorkUnit {
        &self.unit
    }

    /// Repeats the unit until `shutdown` becomes `true`.
    ///
    /// The signal is observed before each iteration and while waiting between
    /// iterations; an in-flight execute or commit always runs to completion.
    /// Per-iteration failures are reported and never end the loop.
    pub async fn run<P>(
        &self,
        provider: &P,
        reporter: &mut dyn Reporter,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<ReplayTally, ProbeError>
    where
        P: ConnectionProvider,
    {
        let mut tally = ReplayTally::default();
        let mut signal_open = true;
        loop {
            if *shutdown.borrow() {
                break;
            }
            tally.iterations += 1;
            let iteration = tally.iterations;
            debug!(iteration, key = self.unit.key(), "replay iteration");

            match self.run_once(provider).await {
                Ok(done) => {
                    tally.successes += 1;
                    reporter.progress(&format!(
                        "Upserted {} rows={}",
                        describe_params(self.unit.key(), &done.params),
                        done.rows
                    ));
                }
                Err(err) => {
                    let kind = err.kind();
                    tally.record_failure(kind);
                    reporter.failure(&format!("Iteration {iteration} failed ({kind}): {err}"));
                    if replay_decision(self.unit.class(), kind) == ReplayDecision::Abort {
                        return Err(err);
                    }
                }
            }

            let deadline = tokio::time::Instant::now() + self.interval;
            while signal_open {
                tokio::select! {
                    changed = shutdown.changed() => match changed {
                        Ok(()) if *shutdown.borrow_and_update() => break,
                        // A `false` update is not a cancellation; keep waiting.
                        Ok(()) => {}
                        // Sender gone: nothing can cancel us any more.
                        Err(_) => signal_open = false,
                    },
                    _ = tokio::time::sleep_until(deadline) => break,
                }
            }
            if !signal_open {
                tokio::time::sleep_until(deadline).await;
            }
        }
        info!(
            iterations = tally.iterations,
            successes = tally.successes,
            failures = tally.failures(),
            "replay loop stopped"
        );
        Ok(tally)
    }

    /// One acquire/begin/execute/commit cycle. The connection is dropped, and
    /// so released, on every return path.
    async fn run_once<P>(&self, provider: &P) -> Result<Upserted, ProbeError>
    where
        P: ConnectionProvider,
    {
        let mut conn = provider.acquire().await?;
        conn.begin().await?;
        let params = self.unit.bind(Utc::now());
        match execute_and_commit(&mut conn, self.unit.sql(), &params).await {
            Ok(rows) => Ok(Upserted { rows, params }),
            Err(err) => {
                if let Err(rollback_err) = conn.rollback().await {
                    warn!(error = %rollback_err, "rollback after failed iteration");
                }
                Err(err)
            }
        }
    }
}

async fn execute_and_commit<C: Connection>(
    conn: &mut C,
    sql: &str,
    params: &[SqlValue],
) -> Result<u64, ProbeError> {
    let rows = conn.execute(sql, params).await?;
    conn.commit().await?;
    Ok(rows)
}

fn describe_params(key: i64, params: &[SqlValue]) -> String {
    match params.get(1) {
        Some(note) => format!("id={key} note={note}"),
        None => format!("id={key}"),
    }
}

/// Creates the upsert table if it does not exist yet. Runs once at startup.
pub async fn prepare_target<P>(provider: &P, target: &UpsertTarget) -> Result<(), ProbeError>
where
    P: ConnectionProvider,
{
    let mut conn = provider.acquire().await?;
    conn.execute(&target.create_table_sql(), &[]).await?;
    info!(table = target.table(), "upsert table ready");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::OperationClass;

    #[test]
    fn refuses_units_that_are_not_replay_safe() {
        for class in [OperationClass::NonDeterministic, OperationClass::ExternalEffect] {
            let unit = WorkUnit::new(
                1,
                "INSERT INTO orders (order_id, created_at) VALUES (nextval('orders_seq'), now())",
                Vec::new(),
                class,
            );
            let err = ReplayRunner::new(unit, Duration::from_secs(1)).unwrap_err();
            assert_eq!(err.kind(), FailureKind::Configuration);
        }
    }

    #[test]
    fn tally_splits_failures_by_kind() {
        let mut tally = ReplayTally::default();
        tally.record_failure(FailureKind::Connectivity);
        tally.record_failure(FailureKind::CommitAmbiguous);
        tally.record_failure(FailureKind::Execution);
        assert_eq!(tally.connect_failures, 1);
        assert_eq!(tally.ambiguous_commits, 1);
        assert_eq!(tally.execution_failures, 1);
        assert_eq!(tally.failures(), 3);
    }

    #[test]
    fn progress_line_names_key_and_note() {
        let params = vec![SqlValue::Int(1003), SqlValue::Text("RS-TAC x".into())];
        assert_eq!(describe_params(1003, &params), "id=1003 note=RS-TAC x");
    }
}
