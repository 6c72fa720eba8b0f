//! refsync CLI: download, inspect and query reconciled reference data.
//!
//! Commands:
//! - `download` fetch tickers, actions and prices, reconcile, write the Parquet store
//! - `status` report what the store holds
//! - `actions` print the reconciled action records of one ticker

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use refsync_core::data::{HttpTransport, LogProgress};
use refsync_core::domain::PriceTable;
use refsync_core::{download_all, ParquetStore, RefsyncConfig, Source};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "refsync",
    about = "refsync: reference-data ingestion and corporate-action reconciliation"
)]
struct Cli {
    /// Debug logging (overridden by RUST_LOG).
    #[arg(long, short, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download every table, reconcile actions and write the store.
    Download {
        /// Path to a TOML config file. Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Price tables to fetch (equities, funds). Defaults to the config's list.
        #[arg(long = "table")]
        tables: Vec<PriceTable>,

        /// Store directory. Overrides `store.dir`.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Report the contents of a store.
    Status {
        /// Store directory. Defaults to ./data.
        #[arg(long, default_value = "data")]
        out: PathBuf,
    },
    /// Print the reconciled action records of one ticker.
    Actions {
        /// Ticker symbol.
        ticker: String,

        /// Store directory. Defaults to ./data.
        #[arg(long, default_value = "data")]
        out: PathBuf,

        /// Emit JSON instead of a table.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Download {
            config,
            tables,
            out,
        } => run_download(config.as_deref(), tables, out),
        Commands::Status { out } => run_status(&out),
        Commands::Actions { ticker, out, json } => run_actions(&out, &ticker, json),
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run_download(
    config_path: Option<&Path>,
    tables: Vec<PriceTable>,
    out: Option<PathBuf>,
) -> Result<()> {
    let mut config = match config_path {
        Some(path) => RefsyncConfig::from_file(path)?,
        None => {
            let config = RefsyncConfig::default();
            config.validate()?;
            config
        }
    };
    if let Some(dir) = out {
        config.store.dir = dir;
    }
    let tables = if tables.is_empty() {
        config.store.tables.clone()
    } else {
        tables
    };

    let transport = HttpTransport::new(&config.api)?;
    let source = Source::new(&transport, &config).with_progress(Arc::new(LogProgress));
    let store = ParquetStore::new(&config.store.dir);

    let started = std::time::Instant::now();
    let dataset = download_all(&source, &tables, &store)
        .with_context(|| format!("download into {} failed", config.store.dir.display()))?;

    println!("{}", dataset.summary());
    println!(
        "Wrote {} in {:.1}s",
        store.dir().display(),
        started.elapsed().as_secs_f64()
    );
    Ok(())
}

fn run_status(dir: &Path) -> Result<()> {
    if !dir.exists() {
        println!("Store directory does not exist: {}", dir.display());
        return Ok(());
    }

    let store = ParquetStore::new(dir);
    let meta = store.meta()?;

    println!("Store:        {}", dir.display());
    println!("Written at:   {}", meta.written_at.format("%Y-%m-%d %H:%M:%S"));
    println!("Tickers:      {}", meta.tickers);
    println!("Prices:       {}", meta.prices);
    println!("Actions:      {}", meta.actions);
    println!("Actions hash: {}", meta.actions_hash);
    println!();
    println!("{:<18} {:>10}", "File", "Size");
    println!("{}", "-".repeat(29));
    for file in ["tickers.parquet", "prices.parquet", "actions.parquet", "meta.json"] {
        let size = std::fs::metadata(dir.join(file)).map(|m| m.len()).ok();
        let size = size.map_or_else(|| "(missing)".to_string(), format_size);
        println!("{file:<18} {size:>10}");
    }

    Ok(())
}

fn run_actions(dir: &Path, ticker: &str, json: bool) -> Result<()> {
    let store = ParquetStore::new(dir);
    let actions = store.load_actions()?;
    let Some(records) = actions.get(ticker) else {
        bail!("no action records for '{ticker}' in {}", dir.display());
    };

    if json {
        println!("{}", serde_json::to_string_pretty(records)?);
        return Ok(());
    }

    println!(
        "{:<12} {:>14} {:>14} {:>8}",
        "Date", "Dividend", "Split", "Active"
    );
    println!("{}", "-".repeat(51));
    for r in records {
        println!(
            "{:<12} {:>14.6} {:>14.6} {:>8}",
            r.date.to_string(),
            r.dividend_factor,
            r.split_factor,
            if r.active { "yes" } else { "no" }
        );
    }
    Ok(())
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
