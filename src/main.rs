//! Command-line entry point for the estimating engine.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use hardscape::budget::Expense;
use hardscape::config::EngineConfig;
use hardscape::db::{CatalogSeed, MemoryStore, PgStore};
use hardscape::error::ConfigError;
use hardscape::{Category, Coordinates, DeliveryEstimator, Engine, EstimateRequest, PriceQuery, TaxResolver};

#[derive(Parser, Debug)]
#[command(name = "hardscape", version, about = "Landscape estimating and pricing engine")]
struct Cli {
    /// JSON catalog to run against instead of Postgres
    #[arg(long, global = true, env = "HARDSCAPE_CATALOG")]
    catalog: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Price an estimate request (JSON file)
    Estimate {
        /// Path to the estimate request
        request: PathBuf,

        /// Finalize the estimate and capture its budget baseline
        #[arg(long)]
        finalize: bool,
    },

    /// Finalize an estimate and capture its budget baseline
    Finalize {
        #[arg(long)]
        estimate: Uuid,
    },

    /// Budget versus actual for a project
    Report {
        #[arg(long)]
        project: Uuid,
    },

    /// Contract value and gross profit for a project
    Profit {
        #[arg(long)]
        project: Uuid,
    },

    /// Record an actual expense
    Expense {
        #[arg(long)]
        project: Uuid,
        #[arg(long)]
        category: Category,
        #[arg(long)]
        vendor: String,
        #[arg(long)]
        amount: Decimal,
        /// Expense date (YYYY-MM-DD), defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Resolve the unit price of a material
    Price {
        material: String,
        #[arg(long)]
        zip: Option<String>,
    },

    /// Compute sales tax on a subtotal
    Tax {
        #[arg(long)]
        subtotal: Decimal,
        #[arg(long)]
        zip: Option<String>,
        #[arg(long)]
        state: Option<String>,
    },

    /// Quote a delivery between two points ("lat,lng")
    Delivery {
        #[arg(long, allow_hyphen_values = true)]
        from: Coordinates,
        #[arg(long, allow_hyphen_values = true)]
        to: Coordinates,
        /// Average speed in mph
        #[arg(long)]
        speed: Option<f64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Before parsing so `.env` can supply HARDSCAPE_CATALOG.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing();

    let config = EngineConfig::from_env()?;

    match cli.command {
        Command::Tax {
            subtotal,
            zip,
            state,
        } => {
            let resolver = TaxResolver::from_config(&config.tax);
            let result = resolver
                .compute_tax(subtotal, zip.as_deref(), state.as_deref())
                .await;
            print_json(&result)
        }

        Command::Delivery { from, to, speed } => {
            let quote = DeliveryEstimator::new(config.delivery).estimate(from, to, speed);
            print_json(&quote)
        }

        command => {
            if cli.catalog.is_some() && needs_persistence(&command) {
                anyhow::bail!(
                    "A catalog file keeps no state between runs; set DATABASE_URL for this \
                     command, or use `estimate --finalize` with --catalog"
                );
            }
            let engine = open_engine(cli.catalog.as_deref(), &config).await?;
            run(&engine, command).await
        }
    }
}

async fn run(engine: &Engine, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Estimate { request, finalize } => {
            let raw = std::fs::read_to_string(&request)?;
            let request: EstimateRequest = serde_json::from_str(&raw)?;

            let estimate = engine.estimates.build(&request).await?;
            if finalize {
                engine.budget.finalize(estimate.id).await?;
            }
            print_json(&estimate)
        }

        Command::Finalize { estimate } => print_json(&engine.budget.finalize(estimate).await?),

        Command::Report { project } => print_json(&engine.budget.get_report(project).await?),

        Command::Profit { project } => print_json(&engine.budget.profit_summary(project).await?),

        Command::Expense {
            project,
            category,
            vendor,
            amount,
            date,
        } => {
            let expense = Expense {
                id: Uuid::new_v4(),
                project_id: project,
                category,
                vendor,
                amount,
                date: date.unwrap_or_else(|| chrono::Utc::now().date_naive()),
            };
            engine.budget.record_expense(&expense).await?;
            print_json(&expense)
        }

        Command::Price { material, zip } => {
            let mut query = PriceQuery::new(material);
            query.zip = zip;
            match engine.prices.resolve(&query).await? {
                Some(price) => print_json(&price),
                None => anyhow::bail!("No price found for '{}'", query.material_slug),
            }
        }

        Command::Tax { .. } | Command::Delivery { .. } => Ok(()),
    }
}

/// Commands that read or write state left by an earlier run.
fn needs_persistence(command: &Command) -> bool {
    matches!(
        command,
        Command::Finalize { .. }
            | Command::Report { .. }
            | Command::Profit { .. }
            | Command::Expense { .. }
    )
}

async fn open_engine(catalog: Option<&Path>, config: &EngineConfig) -> anyhow::Result<Engine> {
    if let Some(path) = catalog {
        let store = MemoryStore::from_seed(CatalogSeed::from_file(path)?);
        tracing::info!("Using catalog file {}", path.display());
        return Ok(Engine::new(Arc::new(store), config));
    }

    let Some(database) = &config.database else {
        return Err(ConfigError::MissingRequired {
            key: "DATABASE_URL (or --catalog)".to_string(),
        }
        .into());
    };

    let store = PgStore::new(database).await?;
    Ok(Engine::new(Arc::new(store), config))
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("hardscape=info"));

    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
