//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! Schema Registry operator binary
//!
//! Runs registry operations directly against the configured storage
//! backend. Documents are read and printed as JSON; logs go to stderr.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use form_schema_registry::{
    config::{LogFormat, MonitoringConfig},
    utils::{format_bytes, format_millis, format_timestamp, truncate_string},
    RegistryStats, SchemaDocument, SchemaRegistry, SchemaRegistryConfig, StorageFilter,
    SCHEMA_REGISTRY_NAME, SCHEMA_REGISTRY_VERSION,
};

const ENV_PREFIX: &str = "SCHEMA_REGISTRY";
const REDACTED: &str = "<redacted>";

#[derive(Parser)]
#[command(name = "form-schema-registry")]
#[command(about = "Form schema registry operator tool")]
#[command(version = SCHEMA_REGISTRY_VERSION)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a new schema
    Register {
        /// Schema document file (JSON)
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Replace the current document of an existing schema
    Update {
        /// Schema document file (JSON)
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Print the current document of a schema
    Get {
        /// Schema ID
        #[arg(short, long)]
        id: String,
    },

    /// Delete a schema and its history
    Delete {
        /// Schema ID
        #[arg(short, long)]
        id: String,
    },

    /// List schemas
    List {
        /// Number of ids to skip
        #[arg(long, default_value_t = 0)]
        offset: usize,

        /// Maximum number of schemas
        #[arg(long)]
        limit: Option<usize>,

        /// Only ids starting with this prefix
        #[arg(long)]
        prefix: Option<String>,

        /// Print ids only instead of full documents
        #[arg(long)]
        ids_only: bool,
    },

    /// List archived version tags of a schema
    Versions {
        /// Schema ID
        #[arg(short, long)]
        id: String,
    },

    /// Print an archived version of a schema
    Version {
        /// Schema ID
        #[arg(short, long)]
        id: String,

        /// Version tag
        #[arg(short, long)]
        tag: String,
    },

    /// Print storage metadata of a schema
    Metadata {
        /// Schema ID
        #[arg(short, long)]
        id: String,
    },

    /// Check storage and cache health
    Health,

    /// Print registry statistics
    Stats {
        /// Print JSON instead of a summary
        #[arg(long)]
        json: bool,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Generate example configuration file
    Generate {
        /// Output file path, stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Configuration format (toml, json)
        #[arg(long, default_value = "toml")]
        format: String,
    },

    /// Validate configuration file
    Validate {
        /// Configuration file path
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Show effective configuration
    Show,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let command = match cli.command {
        Commands::Config { command } => {
            init_tracing(&MonitoringConfig::default());
            return run_config_command(command, cli.config.as_deref());
        }
        command => command,
    };

    let config = load_config(cli.config.as_deref())?;
    init_tracing(&config.monitoring);

    info!(
        name = SCHEMA_REGISTRY_NAME,
        version = SCHEMA_REGISTRY_VERSION,
        backend = %config.storage.backend,
        "Starting schema registry"
    );

    let registry = SchemaRegistry::new(config)
        .await
        .context("failed to initialize schema registry")?;

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling operation");
            interrupt.cancel();
        }
    });

    let outcome = run_command(&registry, command, &cancel).await;

    if let Err(e) = registry.shutdown().await {
        warn!(error = %e, "Schema registry shutdown failed");
    }
    outcome
}

fn init_tracing(monitoring: &MonitoringConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&monitoring.log_level));
    let registry = tracing_subscriber::registry().with(filter);

    match monitoring.log_format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init(),
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}

fn load_config(path: Option<&Path>) -> Result<SchemaRegistryConfig> {
    let config = match path {
        Some(path) => {
            let path = path.to_path_buf();
            SchemaRegistryConfig::from_sources(Some(&path), ENV_PREFIX)
                .with_context(|| format!("failed to load configuration from {}", path.display()))?
        }
        None => SchemaRegistryConfig::load_with_defaults()
            .context("failed to load default configuration")?,
    };

    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {}", e))?;
    Ok(config)
}

async fn run_command(
    registry: &SchemaRegistry,
    command: Commands,
    cancel: &CancellationToken,
) -> Result<()> {
    match command {
        Commands::Register { file } => {
            let document = read_document(&file)?;
            registry
                .register(&document, cancel)
                .await
                .with_context(|| format!("failed to register schema {}", document.id))?;
            println!("Registered schema {} ({})", document.id, document.version);
        }

        Commands::Update { file } => {
            let document = read_document(&file)?;
            registry
                .update(&document, cancel)
                .await
                .with_context(|| format!("failed to update schema {}", document.id))?;
            println!("Updated schema {} ({})", document.id, document.version);
        }

        Commands::Get { id } => {
            let document = registry
                .get(&id, cancel)
                .await
                .with_context(|| format!("failed to get schema {}", id))?;
            print_json(&document)?;
        }

        Commands::Delete { id } => {
            registry
                .delete(&id, cancel)
                .await
                .with_context(|| format!("failed to delete schema {}", id))?;
            println!("Deleted schema {}", id);
        }

        Commands::List {
            offset,
            limit,
            prefix,
            ids_only,
        } => {
            let filter = StorageFilter {
                offset,
                limit,
                prefix,
            };
            if ids_only {
                print_json(&registry.list_ids(Some(&filter), cancel).await?)?;
            } else {
                print_json(&registry.list(Some(&filter), cancel).await?)?;
            }
        }

        Commands::Versions { id } => {
            let versions = registry
                .list_versions(&id, cancel)
                .await
                .with_context(|| format!("failed to list versions of {}", id))?;
            print_json(&versions)?;
        }

        Commands::Version { id, tag } => {
            let document = registry
                .get_version(&id, &tag, cancel)
                .await
                .with_context(|| format!("failed to get version {} of {}", tag, id))?;
            print_json(&document)?;
        }

        Commands::Metadata { id } => {
            let metadata = registry
                .get_metadata(&id, cancel)
                .await
                .with_context(|| format!("failed to get metadata of {}", id))?;
            print_json(&metadata)?;
        }

        Commands::Health => {
            registry
                .health(cancel)
                .await
                .context("schema registry is unhealthy")?;
            let state = registry.state().await;
            println!(
                "healthy (checked at {})",
                format_timestamp(state.last_health_check)
            );
        }

        Commands::Stats { json } => {
            let stats = registry.stats(cancel).await?;
            if json {
                print_json(&stats)?;
            } else {
                print_stats(&stats);
            }
        }

        Commands::Config { .. } => anyhow::bail!("config commands run without a registry"),
    }

    Ok(())
}

fn run_config_command(command: ConfigCommands, global_config: Option<&Path>) -> Result<()> {
    match command {
        ConfigCommands::Generate { output, format } => {
            let content = match format.as_str() {
                "toml" => SchemaRegistryConfig::generate_example(),
                "json" => serde_json::to_string_pretty(&SchemaRegistryConfig::default())?,
                other => anyhow::bail!("unsupported configuration format: {}", other),
            };

            match output {
                Some(path) => {
                    std::fs::write(&path, content)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    info!("Example configuration written to {}", path.display());
                }
                None => println!("{}", content),
            }
        }

        ConfigCommands::Validate { config } => {
            let loaded = SchemaRegistryConfig::from_file(&config)
                .with_context(|| format!("failed to load {}", config.display()))?;
            loaded
                .validate()
                .map_err(|e| anyhow::anyhow!("{}: {}", config.display(), e))?;
            println!("Configuration {} is valid", config.display());
        }

        ConfigCommands::Show => {
            let mut config = load_config(global_config)?;
            redact(&mut config);
            print_json(&config)?;
        }
    }

    Ok(())
}

fn redact(config: &mut SchemaRegistryConfig) {
    if config.features.encryption_key.is_some() {
        config.features.encryption_key = Some(REDACTED.to_string());
    }
    if let Some(secret) = config.storage.backend_settings.get_mut("secret_access_key") {
        *secret = REDACTED.to_string();
    }
}

fn read_document(path: &Path) -> Result<SchemaDocument> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a valid schema document", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_stats(stats: &RegistryStats) {
    println!("Backend:        {}", stats.backend);
    println!("Schemas:        {}", stats.total_schemas);
    println!("Versions:       {}", stats.total_versions);
    println!("Total size:     {}", format_bytes(stats.total_size_bytes));
    println!(
        "Average size:   {}",
        format_bytes(stats.avg_schema_size_bytes())
    );
    println!(
        "Collected at:   {}",
        format_timestamp(Some(stats.collected_at))
    );

    if let Some(cache) = &stats.cache {
        println!(
            "Cache:          {} entries, {} hits, {} misses, {} evictions, {} expired",
            cache.entries, cache.hits, cache.misses, cache.evictions, cache.expired
        );
    }

    if stats.metrics.operations.is_empty() {
        return;
    }

    println!();
    println!(
        "{:<24} {:>8} {:>8} {:>12} {:>12}",
        "OPERATION", "COUNT", "ERRORS", "MEAN", "MAX"
    );
    for (name, op) in &stats.metrics.operations {
        println!(
            "{:<24} {:>8} {:>8} {:>12} {:>12}",
            truncate_string(name, 24),
            op.count,
            op.errors,
            format_millis(op.mean_ms),
            format_millis(op.max_ms)
        );
    }
}
