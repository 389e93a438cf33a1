use agg_core::{ArticleCache, ArticleStorage, Config, Error, Result, RunRecord, SourceOutcome};
use clap::{Args, Subcommand};
use std::sync::Arc;
use crate::pipeline::Pipeline;
use crate::scheduler::TriggerOutcome;

#[derive(Args, Debug)]
pub struct ScraperArgs {
    #[command(subcommand)]
    pub command: ScraperCommands,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ScraperCommands {
    /// Run one scrape over the configured sources and print the run record
    Run {
        /// Only scrape this source id
        source: Option<String>,
    },
    /// List configured sources with their node labels
    List,
}

pub async fn handle_command(
    args: ScraperArgs,
    mut config: Config,
    storage: Arc<dyn ArticleStorage>,
    cache: Option<Arc<dyn ArticleCache>>,
) -> Result<()> {
    match args.command {
        ScraperCommands::Run { source } => {
            select_source(&mut config, source.as_deref())?;
            let pipeline = Pipeline::new(config, storage, cache)?;
            match pipeline.scheduler.trigger().await {
                TriggerOutcome::Completed(record) => {
                    for outcome in &record.sources {
                        println!("{}", outcome_line(outcome));
                    }
                    println!("{}", serde_json::to_string_pretty(&record)?);
                    print_totals(&record);
                }
                TriggerOutcome::AlreadyRunning => println!("⏳ A run is already in progress"),
            }
        }
        ScraperCommands::List => {
            let pipeline = Pipeline::new(config, storage, cache)?;
            println!("Configured sources:");
            for source in pipeline.orchestrator.sources() {
                let meta = source.scraper.source_metadata();
                println!(
                    "  {} {:<16} {:<10} {} ({} {})",
                    meta.emoji,
                    source.id(),
                    pipeline.orchestrator.assigner().assign(source.id()),
                    meta.name,
                    meta.region.emoji,
                    meta.region.name,
                );
            }
        }
    }
    Ok(())
}

/// Narrow `config.sources` to a single id.
pub fn select_source(config: &mut Config, source: Option<&str>) -> Result<()> {
    let Some(id) = source else {
        return Ok(());
    };
    config.sources.retain(|s| s.id == id);
    if config.sources.is_empty() {
        return Err(Error::Config(format!("Scraper not found: {}", id)));
    }
    Ok(())
}

fn outcome_line(outcome: &SourceOutcome) -> String {
    if outcome.succeeded {
        format!(
            "✅ {} [{}] found {} inserted {} skipped {}",
            outcome.source,
            outcome.node,
            outcome.items_found,
            outcome.items_inserted,
            outcome.items_skipped
        )
    } else {
        let reason = outcome
            .error
            .as_ref()
            .map(|e| e.message.as_str())
            .unwrap_or("not attempted");
        format!("❌ {} [{}] {}", outcome.source, outcome.node, reason)
    }
}

fn print_totals(record: &RunRecord) {
    println!(
        "📊 found {} inserted {} skipped {} failed sources {}",
        record.items_found(),
        record.items_inserted(),
        record.items_skipped(),
        record.failed_sources().len()
    );
}
