//! keel-agents: outbound campaign runner
//!
//! # Usage
//!
//! ```bash
//! # Run the scheduler against seed data until Ctrl-C
//! keel-agents run --seed demos/seed.json
//!
//! # One tick, then exit
//! keel-agents run --seed demos/seed.json --once
//!
//! # Ask the Overlord about one lead
//! keel-agents decide --seed demos/seed.json --lead l-1 --campaign c-1
//! ```
//!
//! Providers without credentials (`MAILGUN_*`, `TWILIO_*`, `OPENROUTER_API_KEY`)
//! run in simulation mode.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use keel_agents::config::OutreachConfig;
use keel_agents::repository::InMemoryRepository;
use keel_agents::seed::SeedData;
use keel_agents::OutreachRuntime;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Optional TOML file with router / scheduler tuning (env overrides it)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Enroll seeded leads and run the campaign scheduler
    Run {
        /// JSON seed file with leads, campaigns and enrollments
        #[arg(long)]
        seed: PathBuf,

        /// Run a single tick and exit
        #[arg(long, default_value_t = false)]
        once: bool,
    },
    /// Run the Overlord decision for one lead
    Decide {
        /// JSON seed file with leads and campaigns
        #[arg(long)]
        seed: PathBuf,

        #[arg(long)]
        lead: String,

        #[arg(long)]
        campaign: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    let config = OutreachConfig::load(args.config.as_deref())?;

    match args.command {
        Command::Run { seed, once } => run(config, &seed, once).await,
        Command::Decide {
            seed,
            lead,
            campaign,
        } => decide(config, &seed, &lead, campaign.as_deref()).await,
    }
}

fn load_repo(seed: &SeedData) -> Arc<InMemoryRepository> {
    let repo = Arc::new(InMemoryRepository::new());
    seed.populate(&repo);
    repo
}

async fn run(config: OutreachConfig, seed_path: &std::path::Path, once: bool) -> Result<()> {
    let seed = SeedData::load(seed_path)?;
    let repo = load_repo(&seed);
    let runtime = OutreachRuntime::build(&config, repo).context("Failed to build runtime")?;

    let enrolled = seed.enroll(&runtime.scheduler, Utc::now()).await?;
    info!(enrolled, "Outreach runner starting");

    if once {
        let report = runtime.scheduler.tick().await;
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl-C received, shutting down");
                signal_cancel.cancel();
            }
            Err(e) => warn!("Failed to listen for Ctrl-C: {e}"),
        }
    });

    runtime.scheduler.run(cancel).await;

    for snapshot in runtime.breakers.snapshots() {
        info!(
            service = %snapshot.service,
            state = %snapshot.state,
            failures = snapshot.failure_count,
            "Breaker state at shutdown"
        );
    }
    Ok(())
}

async fn decide(
    config: OutreachConfig,
    seed_path: &std::path::Path,
    lead_id: &str,
    campaign_id: Option<&str>,
) -> Result<()> {
    let seed = SeedData::load(seed_path)?;
    let repo = load_repo(&seed);
    let runtime = OutreachRuntime::build(&config, repo).context("Failed to build runtime")?;

    let decision = runtime
        .overlord
        .decide(lead_id, campaign_id)
        .await
        .with_context(|| format!("Overlord decision failed for lead {lead_id}"))?;
    println!("{}", serde_json::to_string_pretty(&decision)?);
    Ok(())
}
