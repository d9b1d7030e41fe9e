//! Retouch - cache maintenance tool
//!
//! Inspects and maintains the artifact cache and saved edits used by the
//! editing engine.

use anyhow::Result;
use clap::{Parser, Subcommand};
use retouch::{
    config::{RetouchConfig, StorageConfig},
    store::{format_bytes, ArtifactStore, IndexFile, INDEX_VERSION},
};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "retouch")]
#[command(author = "Retouch Team")]
#[command(version)]
#[command(about = "Artifact cache and edit history maintenance")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "RETOUCH_CONFIG")]
    config: Option<PathBuf>,

    /// Data root holding `cache/` and `saved/` (overrides the config file)
    #[arg(short, long)]
    root: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show cache usage
    Stats,

    /// List saved edits
    Saved,

    /// Delete every cached file (saved edits are kept)
    ClearCache,

    /// Check directories and index health
    Doctor,

    /// Show configuration
    Config {
        /// Show default configuration
        #[arg(long)]
        default: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("retouch={}", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let mut config = match &cli.config {
        Some(path) => RetouchConfig::from_file(path)?,
        None => RetouchConfig::default(),
    };
    if let Some(root) = &cli.root {
        let limits = config.storage.clone();
        config.storage = StorageConfig {
            max_cache_bytes: limits.max_cache_bytes,
            max_age_secs: limits.max_age_secs,
            eviction_target_ratio: limits.eviction_target_ratio,
            expiry_basis: limits.expiry_basis,
            ..StorageConfig::rooted_at(root)
        };
    }
    config.validate()?;

    match cli.command {
        Commands::Stats => show_stats(config).await?,
        Commands::Saved => list_saved(config).await?,
        Commands::ClearCache => clear_cache(config).await?,
        Commands::Doctor => run_doctor(config).await?,
        Commands::Config { default } => {
            show_config(if default { None } else { Some(&config) })?;
        }
    }

    Ok(())
}

async fn show_stats(config: RetouchConfig) -> Result<()> {
    let store = ArtifactStore::open(config.storage).await?;
    let stats = store.stats().await;

    println!("Cache directory: {}", store.config().cache_dir.display());
    println!("Entries:         {}", stats.entry_count);
    println!(
        "Size:            {} of {} ({:.1}%)",
        format_bytes(stats.total_size_bytes),
        format_bytes(stats.max_size_bytes),
        stats.usage_percent()
    );
    println!(
        "Eviction target: {}",
        format_bytes(store.config().eviction_target_bytes())
    );
    Ok(())
}

async fn list_saved(config: RetouchConfig) -> Result<()> {
    let store = ArtifactStore::open(config.storage).await?;
    let saved = store.list_saved_edits().await;
    if saved.is_empty() {
        println!("No saved edits in {}", store.config().saved_dir.display());
        return Ok(());
    }
    for path in saved {
        let size = tokio::fs::metadata(&path).await.map(|m| m.len()).unwrap_or(0);
        println!("{:>10}  {}", format_bytes(size), path.display());
    }
    Ok(())
}

async fn clear_cache(config: RetouchConfig) -> Result<()> {
    let store = ArtifactStore::open(config.storage).await?;
    let before = store.stats().await;
    store.clear_cache().await?;
    println!(
        "Removed {} cached files ({})",
        before.entry_count,
        format_bytes(before.total_size_bytes)
    );
    Ok(())
}

async fn run_doctor(config: RetouchConfig) -> Result<()> {
    println!("Retouch Doctor");
    println!();

    let storage = &config.storage;
    for (label, dir) in [("Cache", &storage.cache_dir), ("Saved", &storage.saved_dir)] {
        if dir.is_dir() {
            println!("  ✓ {} directory: {}", label, dir.display());
        } else {
            println!("  ℹ {} directory missing (created on first use): {}", label, dir.display());
        }
    }

    let index_path = storage.cache_dir.join(retouch::store::INDEX_FILE_NAME);
    match std::fs::read_to_string(&index_path) {
        Ok(data) => match serde_json::from_str::<IndexFile>(&data) {
            Ok(file) if file.version > INDEX_VERSION => {
                println!("  ✗ Index version {} is newer than supported {}", file.version, INDEX_VERSION);
            }
            Ok(file) => {
                let sum = file
                    .entries
                    .values()
                    .try_fold(0u64, |acc, e| acc.checked_add(e.size_bytes));
                println!("  ✓ Index readable: {} entries, version {}", file.entries.len(), file.version);
                match sum {
                    None => println!("  ✗ Entry sizes overflow (will be reset on next start)"),
                    Some(sum) if sum != file.total_size => {
                        println!("  ✗ Recorded total {} differs from entries {}", file.total_size, sum);
                    }
                    Some(_) => {}
                }
            }
            Err(e) => println!("  ✗ Index corrupt (will be reset on next start): {}", e),
        },
        Err(_) => println!("  ℹ No index file yet: {}", index_path.display()),
    }

    println!();
    println!("Doctor check complete!");
    Ok(())
}

fn show_config(config: Option<&RetouchConfig>) -> Result<()> {
    let config = config.cloned().unwrap_or_default();
    let toml = toml::to_string_pretty(&config)?;
    println!("{}", toml);
    Ok(())
}
