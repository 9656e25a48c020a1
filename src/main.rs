use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use properties_sync::cache::PropertiesCache;
use properties_sync::config::Config;
use properties_sync::entry::Entry;
use properties_sync::extractor;
use properties_sync::remote::{CodePlatformClient, InMemoryStore, RemoteStore};
use properties_sync::submit::Submitter;
use properties_sync::sync::DocumentSync;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Parser)]
#[command(
    name = "properties-sync",
    about = "Extract i18n entries from source text and sync them to remote properties files"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the entries found in a source or JSON file
    Extract {
        file: PathBuf,
        /// Treat the file as a JSON map even if it does not look like one
        #[arg(long)]
        json: bool,
    },
    /// Extract entries from a file and submit them as one batch
    Submit {
        file: PathBuf,
        /// JSON map of key to secondary-locale value
        #[arg(long)]
        secondary_json: Option<PathBuf>,
        /// Merge against the remote documents but print instead of committing
        #[arg(long)]
        dry_run: bool,
    },
    /// Show the cached values of a key in the primary and secondary locales
    Lookup { key: String },
    /// List quoted namespaced keys with their positions
    Keys { file: PathBuf },
    /// Check configuration without touching the network
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (ignored when not present)
    let _ = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("properties_sync=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        Command::Extract { file, json } => {
            let text = read(&file)?;
            let entries = if json {
                extractor::extract_from_json(&text)
            } else {
                extractor::extract_auto(&text)
            };
            if entries.is_empty() {
                println!("No i18n entries found in {}", file.display());
            }
            for entry in entries {
                println!("{}", entry.to_properties_line());
            }
        }
        Command::Submit {
            file,
            secondary_json,
            dry_run,
        } => submit(&config, &file, secondary_json.as_deref(), dry_run).await?,
        Command::Lookup { key } => lookup(&config, &key).await?,
        Command::Keys { file } => {
            let text = read(&file)?;
            for reference in extractor::find_key_references(&text) {
                println!(
                    "{}:{}:{}\t{}",
                    file.display(),
                    reference.line + 1,
                    reference.column + 1,
                    reference.key
                );
            }
        }
        Command::Validate => {
            config.validate()?;
            println!("Configuration OK: {}", config.primary_location());
        }
    }

    Ok(())
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

/// Extracted entries, one per key (last occurrence wins), secondary values attached
fn collect_entries(text: &str, secondary: &HashMap<String, String>) -> Vec<Entry> {
    let mut order: Vec<String> = Vec::new();
    let mut by_key: HashMap<String, Entry> = HashMap::new();

    for entry in extractor::extract_auto(text) {
        if !by_key.contains_key(entry.key()) {
            order.push(entry.key().to_string());
        }
        let entry = match secondary.get(entry.key()) {
            Some(value) => entry.with_secondary_value(value.as_str()),
            None => entry,
        };
        by_key.insert(entry.key().to_string(), entry);
    }

    order
        .into_iter()
        .filter_map(|key| by_key.remove(&key))
        .collect()
}

async fn submit(
    config: &Config,
    file: &Path,
    secondary_json: Option<&Path>,
    dry_run: bool,
) -> Result<()> {
    let secondary: HashMap<String, String> = match secondary_json {
        Some(path) => extractor::extract_from_json(&read(path)?)
            .into_iter()
            .map(|e| (e.key().to_string(), e.value().to_string()))
            .collect(),
        None => HashMap::new(),
    };

    let entries = collect_entries(&read(file)?, &secondary);
    info!("Extracted {} entries from {}", entries.len(), file.display());

    let client: Arc<dyn RemoteStore> = Arc::new(CodePlatformClient::new(config)?);
    let primary = config.primary_location();

    let store: Arc<dyn RemoteStore> = if dry_run {
        Arc::new(seed_dry_run_store(config, client.as_ref()).await?)
    } else {
        client
    };

    let sync = DocumentSync::new(Arc::clone(&store), config.locales.clone());
    let submitter =
        Submitter::new(sync, primary.clone()).with_commit_template(config.commit_template.clone());
    let report = submitter.submit_batch(&entries).await?;

    println!("{}", report.message());
    for invalidation in &report.invalidations {
        println!("  {}: {:?}", invalidation.locale, invalidation.outcome);
    }

    if dry_run {
        if let Some(content) = store.get_file(&primary).await? {
            println!("--- {} (not committed) ---\n{}", primary.path, content);
        }
    }

    Ok(())
}

/// Copy the current primary and secondary documents into memory
async fn seed_dry_run_store(config: &Config, client: &dyn RemoteStore) -> Result<InMemoryStore> {
    let store = InMemoryStore::new();
    let primary = config.primary_location();

    let mut locations = vec![primary.clone()];
    locations.extend(
        config
            .locales
            .secondary_paths(&primary.path)
            .filter_map(|(_, path)| path.map(|p| primary.with_path(&p))),
    );

    for location in locations {
        if let Some(content) = client.get_file(&location).await? {
            store.insert(&location, &content);
        }
    }

    Ok(store)
}

async fn lookup(config: &Config, key: &str) -> Result<()> {
    let client: Arc<dyn RemoteStore> = Arc::new(CodePlatformClient::new(config)?);
    let cache = PropertiesCache::with_system_clock(
        client,
        config.locales.clone(),
        config.primary_location(),
        config.cache_ttl,
    );

    cache.refresh_and_wait().await;
    let (primary, secondary) = cache.lookup(key).await;

    println!(
        "{} [{}]: {}",
        key,
        config.locales.primary_code,
        primary.as_deref().unwrap_or("<missing>")
    );
    println!(
        "{} [{}]: {}",
        key,
        config.locales.secondary_value_code,
        secondary.as_deref().unwrap_or("<missing>")
    );

    Ok(())
}
