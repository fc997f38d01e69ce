//! pun-network: deliver puns for a batch of misbehaviors
//!
//! Loads the network configuration, connects to the Punster API (or the
//! mock backend), awards any immunity tokens given on the command line,
//! then delivers each misbehavior in turn and prints the reports.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};

use pun_network::{DeliveryOutcome, NetworkConfig, PunNetwork, SystemClock};
use punster_agent::{
    Misbehavior, MockBackend, PunCreationService, PunEvaluationService, Severity,
};

#[derive(Parser)]
#[command(name = "pun-network")]
#[command(about = "Deliver corrective puns through the Pun Distribution Network")]
struct Cli {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Punster API base URL (overrides config file)
    #[arg(long, env = "PUNSTER_API_URL")]
    api_url: Option<String>,

    /// Punster API bearer token (overrides config file)
    #[arg(long, env = "PUNSTER_API_TOKEN", hide_env_values = true)]
    api_token: Option<String>,

    /// Use the built-in mock backend instead of the Punster API
    #[arg(long)]
    mock: bool,

    /// Award an immunity token before delivering, as NAME=REASON
    #[arg(long = "award", value_name = "NAME=REASON", value_parser = parse_award)]
    awards: Vec<(String, String)>,

    /// JSON file with an array of misbehaviors
    #[arg(long)]
    misbehaviors: Option<PathBuf>,
}

fn parse_award(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, reason)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), reason.trim().to_string()))
        }
        _ => Err(format!("expected NAME=REASON, got '{}'", raw)),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load config before logging so the configured level applies
    let mut config = match &cli.config {
        Some(path) => NetworkConfig::from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => NetworkConfig::default(),
    };
    config.apply_env();
    if let Some(url) = cli.api_url.clone() {
        config.punster.api_url = Some(url);
    }
    if let Some(token) = cli.api_token.clone() {
        config.punster.api_token = Some(token);
    }

    let level = config.general.log_level.clone();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(format!(
                    "pun_network={level},punster_agent={level}"
                ))
            }),
        )
        .init();

    info!("Starting pun-network");

    let (misbehaviors, awards) = match &cli.misbehaviors {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("reading misbehaviors from {}", path.display()))?;
            let misbehaviors: Vec<Misbehavior> =
                serde_json::from_str(&json).context("parsing misbehaviors")?;
            (misbehaviors, cli.awards.clone())
        }
        None if cli.awards.is_empty() => (sample_misbehaviors(), sample_awards()),
        None => (sample_misbehaviors(), cli.awards.clone()),
    };

    let http_backend = if cli.mock { None } else { config.http_backend()? };

    match (http_backend, cli.mock) {
        (Some(backend), _) => {
            info!(api_url = %backend.base_url(), "Using Punster API");
            run(&config, Arc::new(backend), &awards, &misbehaviors).await
        }
        (None, false) => {
            warn!("No Punster API URL configured, using mock backend");
            run(&config, Arc::new(MockBackend::new()), &awards, &misbehaviors).await
        }
        (None, true) => {
            info!("Using mock backend");
            run(&config, Arc::new(MockBackend::new()), &awards, &misbehaviors).await
        }
    }
}

async fn run<B>(
    config: &NetworkConfig,
    backend: Arc<B>,
    awards: &[(String, String)],
    misbehaviors: &[Misbehavior],
) -> anyhow::Result<()>
where
    B: PunCreationService + PunEvaluationService + 'static,
{
    let network = PunNetwork::start(config, backend, Arc::new(SystemClock))?;

    for (name, reason) in awards {
        network.award_token(name, reason);
    }

    let mut failures = 0usize;
    for misbehavior in misbehaviors {
        info!(
            child_name = %misbehavior.child_name,
            category = %misbehavior.category,
            severity = %misbehavior.severity,
            "Delivering pun"
        );

        match network.deliver(misbehavior).await {
            Ok(DeliveryOutcome::Delivered { rendered, .. }) => println!("{}", rendered),
            Ok(DeliveryOutcome::Immune {
                child_name,
                remaining_tokens,
            }) => {
                warn!(
                    child_name = %child_name,
                    remaining_tokens,
                    "{} is immune to puns, skipping delivery",
                    child_name
                );
            }
            Err(e) => {
                failures += 1;
                error!(child_name = %misbehavior.child_name, error = %e, stage = %e.stage(), "Delivery failed");
            }
        }
    }

    network.shutdown();
    info!(
        completed = misbehaviors.len() - failures,
        failed = failures,
        "pun-network finished"
    );

    Ok(())
}

fn severity(value: u8) -> Severity {
    Severity::new(value).unwrap_or(Severity::MIN)
}

fn sample_misbehaviors() -> Vec<Misbehavior> {
    vec![
        Misbehavior::new(
            "Michael Arnaldi",
            "DoesNotAppreciateNeovim",
            "Michael refuses to acknowledge the superiority of Neovim over all other editors",
            severity(5),
        ),
        Misbehavior::new(
            "Sebastian Lorenz",
            "TooMuchTimeSpentOnEffectCronModule",
            "Sebastian spent the entire sprint polishing the Cron module instead of shipping",
            severity(2),
        ),
        Misbehavior::new(
            "Johannes Schickling",
            "GratuitousUseOfRedArrows",
            "Johannes annotated every slide in the deck with bright red arrows",
            severity(3),
        ),
    ]
}

fn sample_awards() -> Vec<(String, String)> {
    vec![(
        "Sebastian Lorenz".to_string(),
        "Cron is actually a pretty cool module".to_string(),
    )]
}
