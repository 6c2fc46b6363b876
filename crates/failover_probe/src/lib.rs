//! Client-side probes for database failover.
//!
//! Two loops share this crate:
//! - [`ReplayRunner`] keeps upserting one row keyed by a fixed id, once per
//!   interval, and survives every per-iteration failure. Run it while a
//!   switchover happens and watch whether writes keep landing.
//! - [`BenchHarness`] runs a configured list of read queries for a number of
//!   rounds and reports per-query success, failure, and mean latency.
//!
//! Connection handling, reconnection, and failover are delegated to a
//! [`ConnectionProvider`]; [`PgProvider`] is the PostgreSQL implementation.

pub mod bench;
pub mod classify;
pub mod config;
pub mod error;
pub mod pg;
pub mod provider;
pub mod replay;
pub mod report;
pub mod stats;
pub mod work;

pub use bench::{write_summary_json, BenchHarness, BenchReport};
pub use classify::{replay_decision, OperationClass, ReplayDecision};
pub use config::{BenchConfig, ConnectionConfig, QuerySet, ReplayConfig};
pub use error::{FailureKind, FailureScope, ProbeError};
pub use pg::PgProvider;
pub use provider::{Connection, ConnectionProvider};
pub use replay::{prepare_target, ReplayRunner, ReplayTally};
pub use report::{truncate_display, CaptureReporter, ConsoleReporter, Reporter};
pub use stats::{ExecutionOutcome, ExecutionRecord, QueryStats, StatsBook};
pub use work::{ParamSpec, SqlValue, UpsertTarget, WorkUnit};

/// Installs the `tracing` subscriber used by both binaries.
///
/// Logs go to stderr so stdout carries only progress lines and the summary.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("failover_probe=info,warn")),
        )
        .init();
}
