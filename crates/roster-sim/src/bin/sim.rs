#![forbid(unsafe_code)]

use std::env;
use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::Parser;
use roster_core::config::RosterConfig;
use roster_sim::faults::FaultConfig;
use roster_sim::{CampaignConfig, replay_seed, run_campaign};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "roster-sim: seeded race simulation for the roster sync layer",
    long_about = None
)]
struct Cli {
    /// First seed to run.
    #[arg(long, default_value_t = 0)]
    start_seed: u64,

    /// Number of seeds to run.
    #[arg(short, long, default_value_t = 100)]
    seeds: u64,

    /// Replay a single seed and print its full report.
    #[arg(long, conflicts_with_all = ["start_seed", "seeds"])]
    replay: Option<u64>,

    #[arg(long, default_value_t = 40)]
    employees: u64,

    /// Rows per page; defaults to `fetch.default_page_size` from config.
    #[arg(long)]
    page_size: Option<u32>,

    /// Upper bound of simulated backend latency.
    #[arg(long, default_value_t = 250)]
    max_latency_ms: u64,

    #[arg(long, default_value_t = 5)]
    fetch_failure_percent: u8,

    #[arg(long, default_value_t = 10)]
    mutation_failure_percent: u8,

    /// Force the mutation call with this zero-based index to fail.
    #[arg(long)]
    fail_mutation_at: Option<usize>,

    /// Pause between tag removals and the add of a replace; defaults to
    /// `bulk.settle_delay_ms` from config.
    #[arg(long)]
    settle_delay_ms: Option<u64>,

    /// Directory searched for `roster.toml`.
    #[arg(long)]
    config_dir: Option<PathBuf>,

    /// Emit the campaign report as JSON.
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn campaign(&self, core: &RosterConfig) -> CampaignConfig {
        CampaignConfig {
            seed_range: self.start_seed..self.start_seed.saturating_add(self.seeds),
            employee_count: self.employees,
            page_size: self.page_size.unwrap_or(core.fetch.default_page_size),
            settle_delay_ms: self.settle_delay_ms.unwrap_or(core.bulk.settle_delay_ms),
            faults: FaultConfig {
                max_latency_ms: self.max_latency_ms,
                fetch_failure_percent: self.fetch_failure_percent,
                mutation_failure_percent: self.mutation_failure_percent,
                fail_mutation_at: self.fail_mutation_at,
                ..FaultConfig::default()
            },
            ..CampaignConfig::default()
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("ROSTER_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() {
            "roster=debug,info"
        } else {
            "roster=info,warn"
        })
    });

    let format = env::var("ROSTER_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());
    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => registry.with(fmt::layer().json().with_ansi(false)).init(),
        _ => registry.with(fmt::layer().compact()).init(),
    }
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let core = RosterConfig::load(cli.config_dir.as_deref())?;
    let config = cli.campaign(&core);

    if let Some(seed) = cli.replay {
        let report = replay_seed(seed, &config)?;
        println!(
            "seed {seed}: passed={} fetches={} pool_calls={} mutations={} faults={}",
            report.oracle.passed,
            report.fetches,
            report.pool_calls,
            report.mutations,
            report.faults_injected
        );
        println!("bulk: {}", report.bulk_summary);
        for violation in &report.oracle.violations {
            println!("  {violation:?}");
        }
        if !report.oracle.passed {
            bail!("seed {seed} violated {} invariant(s)", report.oracle.violations.len());
        }
        return Ok(());
    }

    let report = run_campaign(&config)?;
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "campaign complete: seeds={} passed={} faulted={} partial_bulk={}",
            report.seeds_run, report.seeds_passed, report.faulted_seeds, report.partial_bulk_seeds
        );
        for failure in &report.failures {
            println!("seed {}:", failure.seed);
            for violation in &failure.violations {
                println!("  {violation}");
            }
        }
    }

    if let Some(seed) = report.first_failure {
        bail!(
            "{} of {} seeds failed; replay with --replay {seed}",
            report.failures.len(),
            report.seeds_run
        );
    }
    Ok(())
}
