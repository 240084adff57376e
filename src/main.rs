use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing_subscriber::EnvFilter;

mod db;
mod error;
mod metrics;
mod models;
mod report;
mod rfm;
mod source;

use models::ScopedOrders;

#[derive(Parser)]
#[command(name = "rfm-dashboard")]
#[command(about = "Order analytics and RFM customer ranking for an e-commerce extract", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Replace the stored order items with the rows of a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Rank the best customers by recency, frequency and monetary value
    Rank {
        /// Read orders from this CSV instead of Postgres
        #[arg(long)]
        csv: Option<PathBuf>,
        /// Restrict to customers in these states (repeatable)
        #[arg(long = "state")]
        states: Vec<String>,
        #[arg(long, default_value_t = rfm::DEFAULT_LIMIT, value_parser = parse_limit)]
        limit: usize,
        #[arg(long, value_enum, default_value_t = RankFormat::Text)]
        format: RankFormat,
    },
    /// Write the full dashboard report
    Report {
        /// Read orders from this CSV instead of Postgres
        #[arg(long)]
        csv: Option<PathBuf>,
        /// Restrict to customers in these states (repeatable)
        #[arg(long = "state")]
        states: Vec<String>,
        #[arg(long, default_value_t = rfm::DEFAULT_LIMIT, value_parser = parse_limit)]
        limit: usize,
        #[arg(long, value_enum, default_value_t = ReportFormat::Markdown)]
        format: ReportFormat,
        #[arg(long, default_value = "dashboard.md")]
        out: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum RankFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, ValueEnum)]
enum ReportFormat {
    Markdown,
    Json,
}

fn parse_limit(value: &str) -> Result<usize, String> {
    let limit: usize = value
        .parse()
        .map_err(|_| format!("`{value}` is not a whole number"))?;
    if limit == 0 {
        return Err("limit must be at least 1".to_string());
    }
    Ok(limit)
}

async fn connect() -> anyhow::Result<PgPool> {
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set when no --csv file is given")?;

    PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")
}

async fn load_scoped(csv: Option<PathBuf>, states: &[String]) -> anyhow::Result<ScopedOrders> {
    match csv {
        Some(path) => {
            let records = source::load_csv(&path)?;
            Ok(source::scope_records(&records, states))
        }
        None => {
            let pool = connect().await?;
            db::fetch_scoped(&pool, states).await
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::InitDb => {
            let pool = connect().await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Import { csv } => {
            let pool = connect().await?;
            let inserted = db::import_csv(&pool, &csv).await?;
            println!("Stored {inserted} order items from {}.", csv.display());
        }
        Commands::Rank {
            csv,
            states,
            limit,
            format,
        } => {
            let scoped = load_scoped(csv, &states).await?;
            let ranks = report::best_customers(&scoped, limit)?;

            match format {
                RankFormat::Json => println!("{}", serde_json::to_string_pretty(&ranks)?),
                RankFormat::Text if ranks.is_empty() => {
                    println!("No customers found for {}.", report::scope_label(&states));
                }
                RankFormat::Text => {
                    println!("Best customers for {}:", report::scope_label(&states));
                    for rank in &ranks {
                        println!(
                            "- {} last purchase {} ({} days ago), {} items, {:.2} spent",
                            rank.customer_id,
                            rank.last_purchase,
                            rank.recency,
                            rank.frequency,
                            rank.monetary
                        );
                    }
                }
            }
        }
        Commands::Report {
            csv,
            states,
            limit,
            format,
            out,
        } => {
            let scoped = load_scoped(csv, &states).await?;
            let dashboard = report::build_dashboard(report::scope_label(&states), &scoped, limit)?;
            let rendered = match format {
                ReportFormat::Markdown => report::render_markdown(&dashboard),
                ReportFormat::Json => serde_json::to_string_pretty(&dashboard)?,
            };
            std::fs::write(&out, rendered)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
