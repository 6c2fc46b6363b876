//! Upserts one row keyed by a fixed id on every interval until Ctrl-C.
//!
//! Start it, then perform a switchover on the database side: the loop reports
//! the failed iterations and resumes writing once the driver reconnects.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use failover_probe::{
    init_tracing, prepare_target, ConsoleReporter, PgProvider, ReplayConfig, ReplayRunner,
    WorkUnit,
};
use tokio::sync::watch;
use tracing::{info, warn};

/// CLI options for the replay loop.
#[derive(Parser, Debug)]
#[command(name = "replay-upsert")]
#[command(about = "Replay-safe upsert loop for switchover testing", long_about = None)]
struct Args {
    /// Path to the TOML configuration (`[connection]`, `[replay]`).
    config: PathBuf,

    /// Override `replay.interval`, e.g. `500ms`.
    #[arg(long)]
    interval: Option<humantime::Duration>,

    /// Override `replay.id`, the fixed key of the upserted row.
    #[arg(long)]
    id: Option<i64>,

    /// Create the target table before starting the loop.
    #[arg(long, default_value_t = false)]
    create_table: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = Args::parse();

    let mut config = ReplayConfig::load(&args.config)
        .with_context(|| format!("load {}", args.config.display()))?;
    if let Some(interval) = args.interval {
        config.interval = Duration::from(interval);
    }
    if let Some(id) = args.id {
        config.id = id;
    }
    config.create_table |= args.create_table;
    config.connection.apply_env();

    let provider = PgProvider::new(&config.connection).context("create connection pool")?;
    if config.create_table {
        prepare_target(&provider, &config.target)
            .await
            .with_context(|| format!("create table {}", config.target.table()))?;
    }

    let unit = WorkUnit::upsert(&config.target, config.id, config.note_prefix.clone());
    let runner = ReplayRunner::new(unit, config.interval)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("interrupt received, stopping after the current iteration");
                let _ = shutdown_tx.send(true);
            }
            // Dropping the sender leaves the loop running until the process is killed.
            Err(err) => warn!(error = %err, "listen for ctrl-c"),
        }
    });

    println!(
        "Running… upsert id={} every {}. Perform a switchover now.",
        config.id,
        humantime::format_duration(config.interval)
    );
    let mut reporter = ConsoleReporter;
    let tally = runner.run(&provider, &mut reporter, shutdown_rx).await?;
    println!(
        "Stopped after {} iterations: {} ok, {} connect failures, {} execution failures, {} ambiguous commits",
        tally.iterations,
        tally.successes,
        tally.connect_failures,
        tally.execution_failures,
        tally.ambiguous_commits
    );
    Ok(())
}
