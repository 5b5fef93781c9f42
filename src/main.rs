use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use owo_colors::OwoColorize;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing_subscriber::EnvFilter;

use pokerpilot::budget::{BudgetConfig, BudgetManager};
use pokerpilot::cache::{CacheConfig, CacheStore, MemoryBackend};
use pokerpilot::provider::DeepSimProvider;
use pokerpilot::situation::Situation;
use pokerpilot::{DecisionRouter, RouterConfig};

#[derive(Debug, Parser)]
#[command(
    name = "pokerpilot",
    version,
    about = "Tiered decision cache and router for hold'em agents",
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Per-decision deadline in milliseconds
    #[arg(long, default_value_t = 3000)]
    deadline_ms: u64,

    /// Expensive-tier budget per window, in cost units
    #[arg(long, default_value_t = 10_000)]
    budget: u64,

    /// Disable ANSI colors in output
    #[arg(long = "no-color", default_value_t = false)]
    no_color: bool,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Decide a situation read from a JSON file ("-" for stdin)
    Decide {
        /// Path to the situation JSON
        path: PathBuf,
    },
    /// Generate a random situation and route it
    Sample {
        /// RNG seed (random if omitted)
        #[arg(long)]
        seed: Option<u64>,
        /// Number of situations to route
        #[arg(long, default_value_t = 1)]
        count: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = color_eyre::install();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let deadline = Duration::from_millis(cli.deadline_ms);

    let cache = Arc::new(CacheStore::new(
        CacheConfig::default(),
        Some(Arc::new(MemoryBackend::new())),
    ));
    let budget = Arc::new(BudgetManager::new(BudgetConfig {
        limit: cli.budget,
        ..BudgetConfig::default()
    }));
    let router = DecisionRouter::new(
        RouterConfig::default(),
        cache.clone(),
        budget.clone(),
        Arc::new(DeepSimProvider::default()),
    );

    match &cli.command {
        Commands::Decide { path } => {
            let raw = if path.as_os_str() == "-" {
                std::io::read_to_string(std::io::stdin()).context("reading stdin")?
            } else {
                std::fs::read_to_string(path)
                    .with_context(|| format!("reading {}", path.display()))?
            };
            let situation: Situation =
                serde_json::from_str(&raw).context("parsing situation JSON")?;
            route_and_print(&router, &situation, deadline, cli.no_color).await?;
        }
        Commands::Sample { seed, count } => {
            let seed = seed.unwrap_or_else(rand::random);
            let mut rng = StdRng::seed_from_u64(seed);
            for _ in 0..*count {
                let situation = Situation::sample(&mut rng);
                route_and_print(&router, &situation, deadline, cli.no_color).await?;
            }
        }
    }

    let stats = cache.stats();
    let spend = budget.snapshot();
    if cli.no_color {
        println!(
            "Summary: fast_hits={}, shared_hits={}, similar_hits={}, misses={}, spent={}/{}",
            stats.fast_hits,
            stats.shared_hits,
            stats.similar_hits,
            stats.misses,
            spend.spent,
            spend.spent + spend.remaining
        );
    } else {
        println!(
            "{} fast {} shared {} similar {} misses {} spent {}/{}",
            "Summary".bold().magenta(),
            stats.fast_hits,
            stats.shared_hits,
            stats.similar_hits,
            stats.misses,
            spend.spent,
            spend.spent + spend.remaining
        );
    }

    Ok(())
}

async fn route_and_print(
    router: &DecisionRouter,
    situation: &Situation,
    deadline: Duration,
    no_color: bool,
) -> Result<()> {
    let routed = router.decide(situation, deadline).await?;
    let amount = routed
        .decision
        .amount
        .map(|a| format!(" {a:.1}"))
        .unwrap_or_default();

    if no_color {
        println!(
            "Decision: {:?}{} | confidence {:.2} | source {:?} | {}ms | {}",
            routed.decision.action,
            amount,
            routed.decision.confidence,
            routed.source,
            routed.decision.latency_ms,
            routed.fingerprint,
        );
    } else {
        println!(
            "{} {:?}{} {} {:.2} {} {:?} {} {}ms {}",
            "Decision".bold().cyan(),
            routed.decision.action.bold().green(),
            amount,
            "confidence".bold().white(),
            routed.decision.confidence,
            "source".bold().white(),
            routed.source,
            "latency".bold().white(),
            routed.decision.latency_ms,
            routed.fingerprint.to_string().dimmed(),
        );
    }
    Ok(())
}
