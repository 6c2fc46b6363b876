//! Runs a configured list of read queries for a number of rounds and prints a
//! per-query success/failure/latency summary.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use failover_probe::{
    init_tracing, write_summary_json, BenchConfig, BenchHarness, ConsoleReporter, PgProvider,
};
use tracing::info;

/// CLI options for the query benchmark.
#[derive(Parser, Debug)]
#[command(name = "query-bench")]
#[command(about = "Benchmark named read queries across repeated rounds", long_about = None)]
struct Args {
    /// Path to the TOML configuration (`[connection]`, `[bench]`, `[queries]`).
    config: PathBuf,

    /// Override `bench.execs` (number of rounds).
    #[arg(long)]
    execs: Option<u32>,

    /// Override `bench.sleep` (pause between rounds), e.g. `2s`.
    #[arg(long)]
    sleep: Option<humantime::Duration>,

    /// Also write the summary as JSON to this path.
    #[arg(long)]
    json_out: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = Args::parse();

    let mut config = BenchConfig::load(&args.config)
        .with_context(|| format!("load {}", args.config.display()))?;
    if let Some(execs) = args.execs {
        anyhow::ensure!(execs > 0, "--execs must be > 0");
        config.execs = execs;
    }
    if let Some(sleep) = args.sleep {
        config.sleep = Duration::from(sleep);
    }
    config.connection.apply_env();
    info!(
        queries = config.queries.len(),
        execs = config.execs,
        sleep = ?config.sleep,
        "starting benchmark"
    );

    let provider = PgProvider::new(&config.connection).context("create connection pool")?;
    let harness = BenchHarness::new(config);
    let mut reporter = ConsoleReporter;
    let report = harness.run(&provider, &mut reporter).await;

    println!();
    println!("{}", report.render_summary());
    if report.connect_failures > 0 {
        eprintln!(
            "{} of {} rounds could not connect",
            report.connect_failures, report.execs
        );
    }
    if let Some(path) = args.json_out {
        write_summary_json(&path, &report).context("write summary json")?;
        eprintln!("wrote summary: {}", path.display());
    }
    Ok(())
}
