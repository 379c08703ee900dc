//! CLI for discovering works on the wiki and keeping a dataset up to date.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tropes_crawler::{
    Crawler, CrawlerConfig, DiscoveryLimit, FetcherExt, HtmlExtractor, HtmlParser, HttpFetcher,
    JsonFileSink, PageLoader, PageRegistry, RegistrySnapshot, WikiConfig,
};

#[derive(Parser)]
#[command(name = "tropes")]
#[command(about = "Discover and track works on a trope wiki")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover works in a namespace and append them to the dataset
    Discover {
        /// Wiki namespace to list, e.g. Film or VideoGame
        #[arg(long)]
        category: String,

        /// Maximum candidates to process; negative means all
        #[arg(long, default_value_t = -1, allow_hyphen_values = true)]
        limit: i64,

        /// Dataset file
        #[arg(long, default_value = "works.json")]
        output: PathBuf,

        /// Registry snapshot, read if present and rewritten afterwards
        #[arg(long, default_value = "registry.json")]
        registry: PathBuf,
    },

    /// Re-check known pages and update works that changed
    Update {
        /// Registry snapshot from an earlier run
        #[arg(long)]
        registry: PathBuf,

        /// Dataset file
        #[arg(long, default_value = "works.json")]
        output: PathBuf,
    },
}

#[derive(Serialize)]
struct Summary {
    command: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    session_id: Option<String>,
    candidates: usize,
    written: usize,
    unchanged: usize,
    failed: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tropes_crawler=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let wiki = WikiConfig::from_env();
    let config = CrawlerConfig::from_env().context("Failed to load crawler configuration")?;
    tracing::info!(host = %wiki.host, concurrency = config.concurrency, rps = config.requests_per_second, "Configuration loaded");

    let fetcher = HttpFetcher::from_config(&config)
        .context("Failed to build HTTP client")?
        .rate_limited(config.requests_per_second);
    let loader = PageLoader::new(wiki.clone(), fetcher, HtmlParser::new());

    let summary = match cli.command {
        Commands::Discover {
            category,
            limit,
            output,
            registry,
        } => {
            let pages = match load_snapshot(&registry).await? {
                Some(snapshot) => PageRegistry::restore(loader, snapshot)
                    .context("Registry snapshot does not match the wiki layout")?,
                None => PageRegistry::new(loader),
            };
            let crawler = Crawler::new(Arc::new(pages), HtmlExtractor::new(wiki), config);
            let sink = JsonFileSink::open(&output)
                .await
                .with_context(|| format!("Failed to open dataset {}", output.display()))?;

            let report = crawler
                .harvest(DiscoveryLimit::from_signed(limit), &category, &sink)
                .await
                .with_context(|| format!("Discovery failed for {}", category))?;

            for failure in &report.failures {
                tracing::warn!(url = %failure.url, error = %failure.error, "Candidate skipped");
            }
            for failure in &report.subpage_failures {
                tracing::warn!(url = %failure.url, error = %failure.error, "Sub-page not fetched, its tropes are missing");
            }
            save_snapshot(&registry, &crawler.registry().snapshot().await).await?;

            Summary {
                command: "discover",
                session_id: Some(report.session_id.to_string()),
                candidates: report.candidates,
                written: report.appended,
                unchanged: report.already_stored,
                failed: report.failures.len() + report.extraction_failures.len(),
            }
        }

        Commands::Update { registry, output } => {
            let snapshot = load_snapshot(&registry)
                .await?
                .with_context(|| format!("No registry snapshot at {}", registry.display()))?;
            let pages = PageRegistry::restore(loader, snapshot)
                .context("Registry snapshot does not match the wiki layout")?;
            let crawler = Crawler::new(Arc::new(pages), HtmlExtractor::new(wiki), config);
            let sink = JsonFileSink::open(&output)
                .await
                .with_context(|| format!("Failed to open dataset {}", output.display()))?;

            let known = crawler.registry().primaries().await;
            let delta = crawler
                .detect_updates(&known)
                .await
                .context("Update detection failed")?;
            let written = crawler
                .apply_delta(&delta, &sink)
                .await
                .context("Failed to write updated works")?;
            save_snapshot(&registry, &crawler.registry().snapshot().await).await?;

            Summary {
                command: "update",
                session_id: None,
                candidates: known.len(),
                written,
                unchanged: delta.unchanged,
                failed: delta.failures.len() + delta.extraction_failures.len(),
            }
        }
    };

    println!("{}", serde_json::to_string(&summary)?);
    Ok(())
}

async fn load_snapshot(path: &Path) -> Result<Option<RegistrySnapshot>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => {
            let snapshot = serde_json::from_slice(&bytes)
                .with_context(|| format!("Invalid registry snapshot {}", path.display()))?;
            Ok(Some(snapshot))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
    }
}

async fn save_snapshot(path: &Path, snapshot: &RegistrySnapshot) -> Result<()> {
    let json = serde_json::to_vec_pretty(snapshot)?;
    tokio::fs::write(path, json)
        .await
        .with_context(|| format!("Failed to write registry snapshot {}", path.display()))?;
    tracing::info!(path = %path.display(), entries = snapshot.entries.len(), "Registry snapshot saved");
    Ok(())
}
