// quota-guard - Main Entry Point
//
// Command-line access to the quota store:
// - Inspect per-customer and per-tracker quota status
// - Plan request timing against remaining quota
// - Sweep expired quota windows
// - Adjust quota limits
// - Serve Prometheus metrics

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use quota_guard::config::{Config, StoreBackend};
use quota_guard::logging::LogLevel;
use quota_guard::metrics_server;
use quota_guard::rate_limit::overview::{OverviewBuilder, DEFAULT_NEAR_LIMIT_THRESHOLD};
use quota_guard::rate_limit::{
    JsonFileQuotaStore, MemoryQuotaStore, QuotaStore, RateLimitingService, Strategy, TrackerKey,
};

/// quota-guard: per-customer API quota tracking for platform integrations
#[derive(Parser, Debug)]
#[command(name = "quota-guard")]
#[command(version)]
#[command(about = "Per-customer API quota tracking and rate limiting", long_about = None)]
struct Args {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to a TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Path to the JSON quota store (overrides configuration)
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Identifies one tracker
#[derive(clap::Args, Debug)]
struct TrackerArgs {
    /// Platform name (e.g. google_ads)
    #[arg(long)]
    platform: String,

    /// Platform endpoint (e.g. campaigns)
    #[arg(long)]
    endpoint: String,

    /// Customer identifier
    #[arg(long)]
    customer: String,

    /// Pacing strategy (aggressive, balanced, conservative)
    #[arg(long)]
    strategy: Option<Strategy>,
}

impl TrackerArgs {
    fn key(&self) -> TrackerKey {
        TrackerKey::new(&self.platform, &self.endpoint, &self.customer)
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show quota status for a customer, or for one tracker
    Status {
        /// Customer identifier
        #[arg(long)]
        customer: String,

        /// Restrict to one platform (requires --endpoint)
        #[arg(long, requires = "endpoint")]
        platform: Option<String>,

        /// Restrict to one endpoint (requires --platform)
        #[arg(long, requires = "platform")]
        endpoint: Option<String>,

        /// Usage percentage that counts as near the limit
        #[arg(long, default_value_t = DEFAULT_NEAR_LIMIT_THRESHOLD)]
        threshold: f64,
    },
    /// List platform/endpoint pairs above a usage threshold
    NearLimit {
        /// Customer identifier
        #[arg(long)]
        customer: String,

        /// Usage percentage threshold
        #[arg(long, default_value_t = DEFAULT_NEAR_LIMIT_THRESHOLD)]
        threshold: f64,
    },
    /// Recommend batch size and timing for a number of requests
    Plan {
        #[command(flatten)]
        tracker: TrackerArgs,

        /// Number of requests to plan for
        #[arg(long)]
        count: u64,
    },
    /// Reset every quota window that has expired
    ResetExpired,
    /// Change the quota limit of a tracker
    SetLimit {
        #[command(flatten)]
        tracker: TrackerArgs,

        /// New quota limit
        #[arg(long)]
        limit: u64,

        /// New window length in seconds
        #[arg(long)]
        interval_secs: Option<u64>,
    },
    /// Serve Prometheus metrics and quota overviews over HTTP
    ServeMetrics {
        /// Port to listen on (defaults to configuration)
        #[arg(long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };
    if args.verbose {
        config.logging.level = LogLevel::Debug;
    }
    if let Some(path) = &args.store {
        config.store.backend = StoreBackend::File;
        config.store.path = path.clone();
    }

    config.logging.init()?;

    let store = open_store(&config).await?;

    match args.command {
        Commands::Status {
            customer,
            platform,
            endpoint,
            threshold,
        } => match (platform, endpoint) {
            (Some(platform), Some(endpoint)) => {
                let key = TrackerKey::new(platform, endpoint, customer);
                let service =
                    RateLimitingService::new(store.clone(), &config.rate_limit, key).await?;
                print_json(&service.status().await?)?;
            }
            _ => {
                let overview = OverviewBuilder::new(store.as_ref())
                    .threshold(threshold)
                    .build(&customer)
                    .await?;
                print_json(&overview)?;
            }
        },
        Commands::NearLimit {
            customer,
            threshold,
        } => {
            let near =
                RateLimitingService::platforms_near_limit(store.as_ref(), &customer, threshold)
                    .await?;
            print_json(&near)?;
        }
        Commands::Plan { tracker, count } => {
            let service = build_service(store.clone(), &config, &tracker).await?;
            print_json(&service.optimize_request_timing(count).await?)?;
        }
        Commands::ResetExpired => {
            let count = RateLimitingService::reset_expired_quotas(store.as_ref()).await?;
            info!("Reset {} expired quota windows", count);
            print_json(&serde_json::json!({ "reset": count }))?;
        }
        Commands::SetLimit {
            tracker,
            limit,
            interval_secs,
        } => {
            let service = build_service(store.clone(), &config, &tracker).await?;
            let updated = service.set_quota_limit(limit, interval_secs).await?;
            print_json(&updated)?;
        }
        Commands::ServeMetrics { port } => {
            let port = port.unwrap_or(config.metrics.port);
            metrics_server::start_metrics_server(port, store).await?;
        }
    }

    Ok(())
}

async fn open_store(config: &Config) -> Result<Arc<dyn QuotaStore>> {
    match config.store.backend {
        StoreBackend::Memory => Ok(Arc::new(MemoryQuotaStore::new())),
        StoreBackend::File => {
            let store = JsonFileQuotaStore::open(&config.store.path)
                .await
                .with_context(|| {
                    format!("Failed to open quota store at {:?}", config.store.path)
                })?;
            Ok(Arc::new(store))
        }
    }
}

async fn build_service(
    store: Arc<dyn QuotaStore>,
    config: &Config,
    tracker: &TrackerArgs,
) -> Result<RateLimitingService> {
    let strategy = tracker
        .strategy
        .unwrap_or(config.rate_limit.default_strategy);
    let service =
        RateLimitingService::with_strategy(store, &config.rate_limit, tracker.key(), strategy)
            .await?;
    Ok(service)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
