use agg_core::config::StorageBackendKind;
use agg_core::{ArticleFilter, ArticleStorage, Config, HumanDuration, Page};
use agg_scrapers::cli::{ScraperArgs, ScraperCommands};
use agg_scrapers::logging::init_logging;
use agg_scrapers::{Pipeline, Shutdown};
use agg_web::{create_app, AppState};
use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about = "News aggregator ingestion pipeline", long_about = None)]
struct Cli {
    /// YAML configuration file
    #[arg(long, env = "AGG_CONFIG")]
    config: Option<PathBuf>,
    /// Storage backend: memory or sqlite
    #[arg(long, env = "AGG_STORAGE")]
    storage: Option<StorageBackendKind>,
    /// SQLite database path
    #[arg(long, env = "AGG_DB_PATH")]
    db_path: Option<PathBuf>,
    /// Default log filter when RUST_LOG is unset
    #[arg(long, env = "AGG_LOG", default_value = "info")]
    log_level: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Serve the HTTP API and run the periodic scheduler
    Serve {
        #[arg(long, env = "AGG_BIND")]
        bind: Option<String>,
        /// Time between scheduled runs (e.g. 10m, 1h)
        #[arg(long, env = "AGG_INTERVAL")]
        interval: Option<HumanDuration>,
        /// Only serve the API; runs happen through POST /scrape
        #[arg(long)]
        no_schedule: bool,
    },
    /// Run one scrape and print the run record
    Scrape {
        /// Only scrape this source id
        source: Option<String>,
    },
    /// List configured sources
    Sources,
    /// Print the health report; exits non-zero when degraded
    Health,
    /// List the latest stored articles
    Articles {
        #[arg(long)]
        source: Option<String>,
        #[arg(long, default_value_t = 10)]
        limit: u32,
    },
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::from_yaml_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(backend) = cli.storage {
        config.storage.backend = backend;
    }
    if let Some(path) = &cli.db_path {
        config.storage.path = path.clone();
    }
    if let Commands::Serve { bind, interval, .. } = &cli.command {
        if let Some(bind) = bind {
            config.server.bind = bind.clone();
        }
        if let Some(interval) = interval {
            config.pipeline.interval = interval.0;
        }
    }
    config.validate()?;
    Ok(config)
}

async fn check_storage_with_retry(
    storage: &Arc<dyn ArticleStorage>,
    max_retries: u32,
    timeout: Duration,
) -> Result<()> {
    let mut last_error = None;
    for attempt in 1..=max_retries {
        match tokio::time::timeout(timeout, storage.ping()).await {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(e)) => last_error = Some(anyhow::Error::from(e)),
            Err(_) => last_error = Some(anyhow::anyhow!("storage ping timed out after {:?}", timeout)),
        }
        if attempt < max_retries {
            info!("Storage check failed, retrying {}/{}...", attempt, max_retries);
            tokio::time::sleep(Duration::from_secs(2)).await;
        }
    }
    Err(last_error.unwrap_or_else(|| anyhow::anyhow!("storage check failed after all retries")))
}

async fn shutdown_signal(shutdown: Shutdown) {
    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            if let Err(e) = res {
                warn!("Failed to listen for Ctrl-C: {}", e);
                return;
            }
            info!("🛑 Shutdown requested, cancelling in-flight run");
            shutdown.cancel();
        }
        _ = shutdown.cancelled() => {}
    }
}

async fn serve(pipeline: Pipeline, no_schedule: bool) -> Result<()> {
    let bind = pipeline.config.server.bind.clone();
    let app = create_app(AppState::from_pipeline(&pipeline)).await;

    if !no_schedule {
        pipeline.start();
    }

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("binding {}", bind))?;
    info!("🌐 Listening on http://{}", bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(pipeline.shutdown.clone()))
        .await?;

    pipeline.shutdown();
    info!("👋 Bye");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let config = load_config(&cli)?;
    let storage = agg_storage::create_storage(&config.storage).await?;

    info!("💾 Checking storage connection...");
    check_storage_with_retry(&storage, 3, config.health.check_timeout).await?;
    let cache = agg_storage::create_cache(&config.storage);

    match cli.command {
        Commands::Serve { no_schedule, .. } => {
            let pipeline = Pipeline::new(config, storage, cache)?;
            serve(pipeline, no_schedule).await?;
        }
        Commands::Scrape { source } => {
            info!(
                "🦗 Scraping articles from {}",
                source.as_deref().unwrap_or("all sources")
            );
            let args = ScraperArgs {
                command: ScraperCommands::Run { source },
            };
            agg_scrapers::handle_command(args, config, storage, cache).await?;
        }
        Commands::Sources => {
            let args = ScraperArgs {
                command: ScraperCommands::List,
            };
            agg_scrapers::handle_command(args, config, storage, cache).await?;
        }
        Commands::Health => {
            let pipeline = Pipeline::new(config, storage, cache)?;
            let report = pipeline.health.check().await;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.status.is_healthy() {
                bail!("degraded: {}", report.status.reasons().join("; "));
            }
        }
        Commands::Articles { source, limit } => {
            let filter = ArticleFilter {
                source,
                ..Default::default()
            };
            let page = storage.query(&filter, Page::new(1, limit)).await?;
            println!("Showing {} of {} articles", page.items.len(), page.total);
            for article in page.items {
                println!(
                    "  #{:<5} [{}] {} - {}",
                    article.id, article.source, article.title, article.url
                );
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_flags_override_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "pipeline:\n  interval: 30m\nstorage:\n  backend: sqlite\n  path: /tmp/from-file.db\nserver:\n  bind: \"0.0.0.0:9000\""
        )
        .unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let cli = Cli::try_parse_from([
            "agg",
            "--config",
            path.as_str(),
            "--storage",
            "memory",
            "serve",
            "--interval",
            "5m",
        ])
        .unwrap();
        let config = load_config(&cli).unwrap();
        assert_eq!(config.storage.backend, StorageBackendKind::Memory);
        assert_eq!(config.storage.path, PathBuf::from("/tmp/from-file.db"));
        assert_eq!(config.pipeline.interval, Duration::from_secs(300));
        assert_eq!(config.server.bind, "0.0.0.0:9000");
    }

    #[test]
    fn test_bad_flags_are_rejected() {
        assert!(Cli::try_parse_from(["agg", "--storage", "postgres", "sources"]).is_err());
        assert!(Cli::try_parse_from(["agg", "serve", "--interval", "soon"]).is_err());
    }

    #[tokio::test]
    async fn test_storage_check_on_memory_backend() {
        let storage: Arc<dyn ArticleStorage> = Arc::new(agg_storage::MemoryStorage::new());
        check_storage_with_retry(&storage, 1, Duration::from_secs(1))
            .await
            .unwrap();
    }
}
