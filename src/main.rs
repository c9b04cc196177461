//! # Upsell Advisor CLI (`advisor`)
//!
//! ## Usage
//!
//! ```bash
//! advisor --config ./config/advisor.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `advisor serve` | Start the HTTP server |
//! | `advisor analyze --user-id <id>` | Run one analysis and print the JSON result |
//! | `advisor status` | Show store and completion provider configuration |
//!
//! ## Examples
//!
//! ```bash
//! # Analyze a store's last week of activity
//! advisor analyze --user-id 7f1c... --days 7
//!
//! # Analyze an exported record set without touching Supabase
//! advisor analyze --user-id demo --data ./demo/records.json --analysis-type rules
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use upsell_advisor::analyze::{run_analysis, AnalyzeRequest};
use upsell_advisor::config;
use upsell_advisor::context::AppContext;
use upsell_advisor::{logging, server, status};
use upsell_advisor_core::models::RecordSet;

const DEFAULT_CONFIG_PATH: &str = "./config/advisor.toml";

/// Upsell Advisor CLI: LLM-generated upsell rules, campaigns, and insights
/// for e-commerce stores.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/advisor.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "advisor",
    about = "Upsell Advisor: LLM-generated upsell rules, campaigns, and insights",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/advisor.toml`; built-in defaults apply when
    /// that file does not exist.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server.
    ///
    /// Binds to `[server].bind`, or `0.0.0.0:$PORT` when `PORT` is set.
    Serve,

    /// Run one analysis and print the JSON response.
    Analyze {
        /// Store owner id.
        #[arg(long)]
        user_id: String,

        /// `full` (default), `insights`, `rules`, or `campaigns`.
        #[arg(long)]
        analysis_type: Option<String>,

        /// Only consider orders and cart events from the last N days.
        #[arg(long)]
        days: Option<i64>,

        /// Read records from a JSON file instead of the store.
        #[arg(long)]
        data: Option<PathBuf>,
    },

    /// Show collaborator configuration and availability.
    Status,
}

fn read_records(path: &Path) -> anyhow::Result<RecordSet> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read data file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse data file: {}", path.display()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    // A missing .env is normal outside local development.
    let _ = dotenvy::dotenv();

    let cfg = config::load_config(&cli.config, Path::new(DEFAULT_CONFIG_PATH))?;
    logging::init(&cfg.logging)?;

    match cli.command {
        Commands::Serve => {
            server::run_server(cfg).await?;
        }
        Commands::Analyze {
            user_id,
            analysis_type,
            days,
            data,
        } => {
            let data = data.as_deref().map(read_records).transpose()?;
            let ctx = AppContext::from_config(cfg)?;
            let request = AnalyzeRequest {
                user_id,
                analysis_type,
                time_range_days: days,
                data,
            };
            let response = run_analysis(&ctx, request).await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Commands::Status => {
            status::print_status(&cfg)?;
        }
    }

    Ok(())
}
