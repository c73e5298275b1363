// =============================================================================
// Social Arb — Main Entry Point
// =============================================================================
//
// One invocation is one pipeline run (the job is meant to be scheduled, e.g.
// daily).  The process exits non-zero when the run fails, naming the artifact
// that could not be written.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod analysis;
mod classifier;
mod endpoint_pool;
mod error;
mod feed;
mod market_intel;
mod persistence;
mod pipeline;
mod producers;
mod risk;
mod runtime_config;
mod types;

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::analysis::{AliasTable, EntityResolver, LexiconScorer, SentimentScorer};
use crate::market_intel::{GoogleNews, GoogleTrendsInterest, NitterSearch, YahooFinance};
use crate::pipeline::{PipelineContext, RunOrchestrator};
use crate::producers::{
    InstagramProducer, RedditProducer, SignalProducer, TikTokProducer, TrendsProducer,
    WeatherProducer,
};
use crate::runtime_config::RuntimeConfig;

const DEFAULT_CONFIG_PATH: &str = "config.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║        Social Arb — Signal Fusion Run                    ║");
    info!("╚══════════════════════════════════════════════════════════╝");

    let config_path = PathBuf::from(
        std::env::var("SOCIAL_ARB_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into()),
    );
    let config = if config_path.exists() {
        RuntimeConfig::load(&config_path).unwrap_or_else(|e| {
            warn!(error = %format!("{e:#}"), "Failed to load config, using defaults");
            RuntimeConfig::default()
        })
    } else {
        warn!(path = %config_path.display(), "No config file, writing defaults");
        let config = RuntimeConfig::default();
        if let Err(e) = config.save(&config_path) {
            warn!(error = %format!("{e:#}"), "Failed to write default config");
        }
        config
    };

    // ── 2. Shared collaborators ──────────────────────────────────────────
    let timeout = config.request_timeout();
    let resolver: Arc<dyn EntityResolver> = Arc::new(AliasTable::load(&config.alias_paths)?);
    let scorer: Arc<dyn SentimentScorer> = Arc::new(LexiconScorer::new());

    // ── 3. Producers (feature-flagged) ───────────────────────────────────
    let mut producers: Vec<Arc<dyn SignalProducer>> = Vec::new();
    if config.enable_weather {
        producers.push(Arc::new(WeatherProducer::new(
            timeout,
            config.weather_locations.clone(),
            config.hail_tickers.clone(),
        )?));
    }
    if config.enable_trends {
        producers.push(Arc::new(TrendsProducer::new(timeout, resolver.clone())?));
    }
    if config.enable_instagram {
        producers.push(Arc::new(InstagramProducer::new(
            timeout,
            config.instagram_usernames.clone(),
            config.instagram_limit,
            resolver.clone(),
            scorer.clone(),
        )?));
    }
    if config.enable_tiktok {
        producers.push(Arc::new(TikTokProducer::new(
            timeout,
            config.rsshub_url.clone(),
            config.tiktok_tags.clone(),
            config.tiktok_limit,
            resolver.clone(),
            scorer.clone(),
        )?));
    }
    if config.enable_reddit {
        let mut reddit = RedditProducer::new(
            timeout,
            config.subreddits.clone(),
            config.reddit_limit,
            resolver.clone(),
            scorer.clone(),
        )?
        .with_fetch_budget(config.fetch_concurrency, config.producer_deadline());
        if config.enable_crowd_verification {
            reddit = reddit.with_crowd_verification(config.crowd_comment_limit);
        }
        producers.push(Arc::new(reddit));
    }

    let names: Vec<&str> = producers.iter().map(|p| p.name()).collect();
    info!(producers = ?names, "Producers configured");

    // ── 4. Market intelligence ───────────────────────────────────────────
    let yahoo = Arc::new(YahooFinance::new(timeout)?);
    let ctx = PipelineContext {
        producers,
        scorer,
        cashtag_search: Some(Arc::new(NitterSearch::new(timeout)?)),
        consensus: yahoo.clone(),
        news: Arc::new(GoogleNews::new(timeout)?),
        market_data: Some(yahoo),
        search_interest: Some(Arc::new(GoogleTrendsInterest::new(timeout)?)),
        config,
    };

    // ── 5. Shutdown signal ───────────────────────────────────────────────
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Shutdown signal received — stopping before persistence");
            let _ = shutdown_tx.send(true);
        }
    });

    // ── 6. Run ───────────────────────────────────────────────────────────
    let orchestrator = RunOrchestrator::new(ctx, shutdown_rx);
    match orchestrator.run().await {
        Ok(report) => {
            for signal in report.signals.iter().take(10) {
                info!(
                    ticker = %signal.ticker,
                    strength = signal.signal_strength,
                    velocity = signal.velocity,
                    sentiment = signal.avg_sentiment,
                    blind_spot = signal.blind_spot,
                    rating = %signal.analyst_rating,
                    shares = signal.est_position_shares,
                    "signal"
                );
            }
            info!(
                run_id = %report.run_id,
                started_at = %report.started_at,
                finished_at = ?report.finished_at,
                stage = %report.stage,
                "Run finished"
            );
            Ok(())
        }
        Err(e) => {
            match e.artifact() {
                Some(artifact) => error!(artifact = %artifact, error = %e.report(), "Run failed to persist"),
                None => error!(error = %e.report(), "Run aborted"),
            }
            std::process::exit(1);
        }
    }
}
