// =============================================================================
// Run Orchestrator — one pipeline execution, start to finish
// =============================================================================
//
//   COLLECT → AGGREGATE → VERIFY → CLASSIFY_AND_SIZE → PERSIST → DONE
//
// COLLECT         every producer runs in its own task under a timeout; each
//                 batch is folded locally and merged by this owner only
// AGGREGATE       merge local folds, read the previous history snapshot
// VERIFY          cross-verify tickers over the threshold (fresh endpoint
//                 pool per run), then the optional price / search overlay
// CLASSIFY_AND_SIZE
//                 count ≥ 1 filter, velocity, consensus + news per ticker,
//                 asymmetry rating, sizing for blind spots only
// PERSIST         ledger, dashboard feed, then history snapshot (atomic)
//
// Only persistence faults, a held run lock, or a stop request end a run
// early.  A stop request before PERSIST drops every partial result; the
// artifacts on disk are left exactly as they were.
// =============================================================================

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::aggregator::Aggregator;
use super::cross_verifier::CrossVerifier;
use super::velocity;
use crate::analysis::SentimentScorer;
use crate::classifier::classify;
use crate::endpoint_pool::EndpointPool;
use crate::error::RunError;
use crate::market_intel::{
    CashtagSearch, ConsensusProvider, MarketDataProvider, NewsVolumeProvider, PriceContext,
    SearchInterestProvider,
};
use crate::persistence::{LedgerStore, RunLock};
use crate::producers::SignalProducer;
use crate::risk::PositionSizer;
use crate::runtime_config::RuntimeConfig;
use crate::types::{
    Aggregate, AggregateMap, FinalSignal, HistoryEntry, HistorySnapshot, RunStage,
};

/// Everything a run needs, built once by the caller and owned by the run.
pub struct PipelineContext {
    pub config: RuntimeConfig,
    pub producers: Vec<Arc<dyn SignalProducer>>,
    pub scorer: Arc<dyn SentimentScorer>,
    /// Secondary source for cross-verification; `None` skips VERIFY's first half.
    pub cashtag_search: Option<Arc<dyn CashtagSearch>>,
    pub consensus: Arc<dyn ConsensusProvider>,
    pub news: Arc<dyn NewsVolumeProvider>,
    pub market_data: Option<Arc<dyn MarketDataProvider>>,
    pub search_interest: Option<Arc<dyn SearchInterestProvider>>,
}

/// Summary of one run, logged at the end.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub stage: RunStage,
    pub records_collected: usize,
    pub producers_failed: usize,
    pub tickers: usize,
    pub verified: usize,
    pub signals: Vec<FinalSignal>,
}

impl RunReport {
    fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            stage: RunStage::Collect,
            records_collected: 0,
            producers_failed: 0,
            tickers: 0,
            verified: 0,
            signals: Vec::new(),
        }
    }
}

/// Per-ticker lookups gathered during CLASSIFY_AND_SIZE.
#[derive(Debug, Clone, Copy, Default)]
struct TickerFacts {
    consensus: Option<f64>,
    /// `None` when the news provider failed.
    news_volume: Option<u64>,
}

pub struct RunOrchestrator {
    ctx: PipelineContext,
    store: LedgerStore,
    sizer: PositionSizer,
    shutdown: watch::Receiver<bool>,
}

impl RunOrchestrator {
    pub fn new(ctx: PipelineContext, shutdown: watch::Receiver<bool>) -> Self {
        let store = LedgerStore::from_config(&ctx.config);
        let sizer = PositionSizer::new(ctx.config.risk.risk_budget, ctx.config.risk.target_risk_fraction);
        Self {
            ctx,
            store,
            sizer,
            shutdown,
        }
    }

    /// Execute one run. Holds the run lock for its whole duration.
    pub async fn run(&self) -> Result<RunReport, RunError> {
        let mut report = RunReport::new();
        info!(run_id = %report.run_id, "pipeline run started");

        let result = match RunLock::acquire(self.ctx.config.lock_path()) {
            Ok(_lock) => self.execute(&mut report).await,
            Err(e) => Err(e),
        };

        report.finished_at = Some(Utc::now());
        match result {
            Ok(()) => {
                report.stage = RunStage::Done;
                info!(
                    run_id = %report.run_id,
                    records = report.records_collected,
                    producers_failed = report.producers_failed,
                    tickers = report.tickers,
                    verified = report.verified,
                    signals = report.signals.len(),
                    "pipeline run complete"
                );
                Ok(report)
            }
            Err(e) => {
                error!(
                    run_id = %report.run_id,
                    stage = %RunStage::Failed,
                    failed_in = %report.stage,
                    artifact = ?e.artifact(),
                    error = %e.report(),
                    "pipeline run failed"
                );
                Err(e)
            }
        }
    }

    async fn execute(&self, report: &mut RunReport) -> Result<(), RunError> {
        // ── COLLECT ─────────────────────────────────────────────────────────
        report.stage = RunStage::Collect;
        let locals = self.cancellable(self.collect(report)).await?;

        // ── AGGREGATE ───────────────────────────────────────────────────────
        report.stage = RunStage::Aggregate;
        let mut aggregates = AggregateMap::new();
        for local in locals {
            Aggregator::merge(&mut aggregates, local);
        }
        let history = self.store.load_history();
        report.tickers = aggregates.len();
        info!(tickers = aggregates.len(), previous = history.len(), "aggregation complete");

        // ── VERIFY ──────────────────────────────────────────────────────────
        report.stage = RunStage::Verify;
        let (aggregates, verified, prices) = self
            .cancellable(self.verify_and_overlay(aggregates))
            .await?;
        report.verified = verified;

        // ── CLASSIFY_AND_SIZE ───────────────────────────────────────────────
        report.stage = RunStage::ClassifyAndSize;
        let signals = self
            .cancellable(self.classify_and_size(&aggregates, &history, &prices))
            .await?;

        // ── PERSIST ─────────────────────────────────────────────────────────
        if *self.shutdown.borrow() {
            return Err(RunError::Cancelled);
        }
        report.stage = RunStage::Persist;
        let snapshot = snapshot_of(&aggregates);
        self.store.persist(&snapshot, &signals)?;

        report.signals = signals;
        Ok(())
    }

    /// Race `fut` against the shutdown signal.
    async fn cancellable<F: Future>(&self, fut: F) -> Result<F::Output, RunError> {
        let mut shutdown = self.shutdown.clone();
        tokio::select! {
            biased;
            _ = wait_for_shutdown(&mut shutdown) => {
                warn!("stop requested, abandoning in-flight work");
                Err(RunError::Cancelled)
            }
            out = fut => Ok(out),
        }
    }

    // -------------------------------------------------------------------------
    // COLLECT
    // -------------------------------------------------------------------------

    async fn collect(&self, report: &mut RunReport) -> Vec<AggregateMap> {
        let timeout = self.ctx.config.producer_timeout();
        let mut tasks = JoinSet::new();

        for producer in &self.ctx.producers {
            let producer = Arc::clone(producer);
            tasks.spawn(async move {
                let name = producer.name().to_string();
                match tokio::time::timeout(timeout, producer.produce()).await {
                    Ok(records) => (name, Some(records)),
                    Err(_) => {
                        warn!(producer = %name, timeout_s = timeout.as_secs(), "producer timed out");
                        (name, None)
                    }
                }
            });
        }

        let mut locals = Vec::with_capacity(self.ctx.producers.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((name, Some(records))) => {
                    debug!(producer = %name, records = records.len(), "producer batch folded");
                    report.records_collected += records.len();
                    locals.push(Aggregator::ingest(&records));
                }
                Ok((_, None)) => report.producers_failed += 1,
                Err(e) => {
                    warn!(error = %e, "producer task aborted");
                    report.producers_failed += 1;
                }
            }
        }

        info!(
            producers = self.ctx.producers.len(),
            records = report.records_collected,
            "collection complete"
        );
        locals
    }

    // -------------------------------------------------------------------------
    // VERIFY
    // -------------------------------------------------------------------------

    async fn verify_and_overlay(
        &self,
        mut aggregates: AggregateMap,
    ) -> (AggregateMap, usize, BTreeMap<String, PriceContext>) {
        let config = &self.ctx.config;
        let mut verified = 0;

        let pool = Arc::new(EndpointPool::new("nitter", config.nitter_instances.clone()));
        match (&self.ctx.cashtag_search, config.enable_cross_verification) {
            (Some(_), true) if pool.is_empty() => {
                warn!("cross-verification enabled but no endpoints configured, skipping");
            }
            (Some(search), true) => {
                info!(pool = pool.name(), endpoints = pool.len(), "cross-verification pool ready");
                let verifier = CrossVerifier::new(
                    pool,
                    Arc::clone(search),
                    Arc::clone(&self.ctx.scorer),
                    config.request_timeout(),
                    config.verification_concurrency,
                );
                verified = verifier
                    .verify(&mut aggregates, config.verification_threshold)
                    .await;
            }
            _ => info!("cross-verification skipped"),
        }

        let prices = if config.enable_market_overlay {
            self.market_overlay(&mut aggregates).await
        } else {
            info!("market overlay skipped");
            BTreeMap::new()
        };

        (aggregates, verified, prices)
    }

    /// Live price and search interest for every ticker with signal.
    async fn market_overlay(&self, aggregates: &mut AggregateMap) -> BTreeMap<String, PriceContext> {
        let timeout = self.ctx.config.request_timeout();
        let tickers = active_tickers(aggregates);

        let results: Vec<_> = stream::iter(tickers)
            .map(|ticker| async move {
                let price = match &self.ctx.market_data {
                    Some(provider) => {
                        match tokio::time::timeout(timeout, provider.price_context(&ticker)).await {
                            Ok(Ok(ctx)) => Some(ctx),
                            Ok(Err(e)) => {
                                warn!(ticker = %ticker, error = %e, "price lookup failed");
                                None
                            }
                            Err(_) => {
                                warn!(ticker = %ticker, "price lookup timed out");
                                None
                            }
                        }
                    }
                    None => None,
                };
                let interest = match &self.ctx.search_interest {
                    Some(provider) => {
                        match tokio::time::timeout(timeout, provider.sentiment_index(&ticker)).await {
                            Ok(Ok(interest)) => interest,
                            Ok(Err(e)) => {
                                warn!(ticker = %ticker, error = %e, "search interest lookup failed");
                                None
                            }
                            Err(_) => {
                                warn!(ticker = %ticker, "search interest lookup timed out");
                                None
                            }
                        }
                    }
                    None => None,
                };
                (ticker, price, interest)
            })
            .buffer_unordered(self.ctx.config.verification_concurrency.max(1))
            .collect()
            .await;

        let mut prices = BTreeMap::new();
        for (ticker, price, interest) in results {
            let Some(agg) = aggregates.get_mut(&ticker) else {
                continue;
            };
            if let Some(interest) = interest {
                agg.trend_sentiment = Some(interest.sentiment_ratio);
                agg.bullish_vol = Some(interest.bullish_volume);
                agg.bearish_vol = Some(interest.bearish_volume);
            }
            if let Some(ctx) = price {
                agg.current_price = ctx.price;
                prices.insert(ticker, ctx);
            }
        }
        info!(priced = prices.len(), "market overlay complete");
        prices
    }

    // -------------------------------------------------------------------------
    // CLASSIFY_AND_SIZE
    // -------------------------------------------------------------------------

    async fn classify_and_size(
        &self,
        aggregates: &AggregateMap,
        history: &HistorySnapshot,
        prices: &BTreeMap<String, PriceContext>,
    ) -> Vec<FinalSignal> {
        let config = &self.ctx.config;
        let timeout = config.request_timeout();
        let lookback = config.news_lookback_hours;
        let velocities = velocity::compute(aggregates, history);

        let facts: BTreeMap<String, TickerFacts> = stream::iter(active_tickers(aggregates))
            .map(|ticker| async move {
                let consensus = match tokio::time::timeout(timeout, self.ctx.consensus.consensus(&ticker)).await {
                    Ok(Ok(score)) => score,
                    Ok(Err(e)) => {
                        warn!(ticker = %ticker, error = %e, "consensus lookup failed");
                        None
                    }
                    Err(_) => {
                        warn!(ticker = %ticker, "consensus lookup timed out");
                        None
                    }
                };
                let news_volume = match tokio::time::timeout(timeout, self.ctx.news.volume(&ticker, lookback)).await {
                    Ok(Ok(volume)) => Some(volume),
                    Ok(Err(e)) => {
                        warn!(ticker = %ticker, error = %e, "news volume lookup failed");
                        None
                    }
                    Err(_) => {
                        warn!(ticker = %ticker, "news volume lookup timed out");
                        None
                    }
                };
                (ticker, TickerFacts { consensus, news_volume })
            })
            .buffer_unordered(config.verification_concurrency.max(1))
            .collect()
            .await;

        let mut signals: Vec<FinalSignal> = aggregates
            .iter()
            .filter(|(_, agg)| agg.count >= 1)
            .map(|(ticker, agg)| {
                let velocity = velocities.get(ticker).copied().unwrap_or(agg.count as i64);
                let facts = facts.get(ticker).copied().unwrap_or_default();
                let volatility = prices.get(ticker).and_then(|p| p.volatility);
                self.build_signal(ticker, agg, velocity, facts, volatility)
            })
            .collect();

        rank(&mut signals);
        info!(
            signals = signals.len(),
            blind_spots = signals.iter().filter(|s| s.blind_spot).count(),
            "classification complete"
        );
        signals
    }

    fn build_signal(
        &self,
        ticker: &str,
        agg: &Aggregate,
        velocity: i64,
        facts: TickerFacts,
        volatility: Option<f64>,
    ) -> FinalSignal {
        let risk = &self.ctx.config.risk;
        let avg_sentiment = agg.avg_sentiment().unwrap_or(0.0);
        let blind_spot = facts
            .news_volume
            .is_some_and(|volume| volume <= self.ctx.config.blind_spot_threshold);

        let est_position_shares = if blind_spot {
            let price = agg.current_price.unwrap_or(risk.reference_price);
            let vol = volatility.unwrap_or(risk.default_volatility);
            self.sizer.size(vol, velocity, price)
        } else {
            0
        };

        FinalSignal {
            ticker: ticker.to_string(),
            signal_strength: agg.count,
            velocity,
            avg_sentiment,
            blind_spot,
            analyst_rating: classify(avg_sentiment, facts.consensus),
            est_position_shares,
            sources: agg.unique_sources(),
            current_price: agg.current_price.unwrap_or(0.0),
            trend_sentiment: agg.trend_sentiment.unwrap_or(0.0),
            bullish_search_vol: agg.bullish_vol.unwrap_or(0),
            bearish_search_vol: agg.bearish_vol.unwrap_or(0),
        }
    }
}

/// Resolves once the shutdown flag is set. A dropped sender never cancels.
pub async fn wait_for_shutdown(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Tickers that reach the classifier: count ≥ 1.
fn active_tickers(aggregates: &AggregateMap) -> Vec<String> {
    aggregates
        .iter()
        .filter(|(_, agg)| agg.count >= 1)
        .map(|(ticker, _)| ticker.clone())
        .collect()
}

/// Strongest first, then fastest, then alphabetical.
fn rank(signals: &mut [FinalSignal]) {
    signals.sort_by(|a, b| {
        b.signal_strength
            .cmp(&a.signal_strength)
            .then(b.velocity.cmp(&a.velocity))
            .then_with(|| a.ticker.cmp(&b.ticker))
    });
}

/// Full replacement snapshot: every ticker seen this run.
fn snapshot_of(aggregates: &AggregateMap) -> HistorySnapshot {
    aggregates
        .iter()
        .map(|(ticker, agg)| (ticker.clone(), HistoryEntry { count: agg.count }))
        .collect()
}
