// =============================================================================
// Cross-Verifier — corroborates active tickers against a secondary source
// =============================================================================
//
// Only tickers whose count already cleared the threshold are queried.  Each
// query walks up to MAX_ATTEMPTS distinct pool endpoints; a failing or timed
// out endpoint is evicted and the next one tried.  When every attempt fails
// the ticker is left untouched: corroboration failure never lowers
// confidence, it only fails to raise it.
//
// Queries run concurrently (bounded) and each returns an owned result; the
// aggregate is mutated afterwards by a single owner.
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::analysis::SentimentScorer;
use crate::endpoint_pool::EndpointPool;
use crate::market_intel::{CashtagSearch, ExternalPost};
use crate::types::AggregateMap;

/// Source tag appended to a ticker's sources on successful corroboration.
pub const VERIFICATION_SOURCE: &str = "Twitter/Nitter";

/// Distinct endpoints tried per logical query.
pub const MAX_ATTEMPTS: usize = 3;

/// Outcome of corroborating one ticker.
#[derive(Debug, Clone, PartialEq)]
pub struct Corroboration {
    pub ticker: String,
    /// Per-item compound scores, one per corroborating post.
    pub scores: Vec<f64>,
}

pub struct CrossVerifier {
    pool: Arc<EndpointPool>,
    search: Arc<dyn CashtagSearch>,
    scorer: Arc<dyn SentimentScorer>,
    request_timeout: Duration,
    concurrency: usize,
}

impl CrossVerifier {
    pub fn new(
        pool: Arc<EndpointPool>,
        search: Arc<dyn CashtagSearch>,
        scorer: Arc<dyn SentimentScorer>,
        request_timeout: Duration,
        concurrency: usize,
    ) -> Self {
        Self {
            pool,
            search,
            scorer,
            request_timeout,
            concurrency: concurrency.max(1),
        }
    }

    /// Query the secondary source for `ticker`, failing over across pool
    /// members. Never errors: exhaustion yields an empty result.
    pub async fn query(&self, ticker: &str) -> Vec<ExternalPost> {
        let mut tried: Vec<String> = Vec::with_capacity(MAX_ATTEMPTS);

        while tried.len() < MAX_ATTEMPTS {
            let next = if tried.is_empty() {
                self.pool.acquire()
            } else {
                self.pool.acquire_excluding(&tried)
            };
            let Some(endpoint) = next else {
                break;
            };

            match tokio::time::timeout(self.request_timeout, self.search.search(&endpoint, ticker))
                .await
            {
                Ok(Ok(posts)) => return posts,
                Ok(Err(e)) => {
                    warn!(ticker, endpoint = %endpoint, error = %e, "verification endpoint failed");
                    self.pool.report_failure(&endpoint);
                }
                Err(_) => {
                    warn!(
                        ticker,
                        endpoint = %endpoint,
                        timeout_ms = self.request_timeout.as_millis() as u64,
                        "verification endpoint timed out"
                    );
                    self.pool.report_failure(&endpoint);
                }
            }
            tried.push(endpoint);
        }

        warn!(
            ticker,
            attempts = tried.len(),
            pool = self.pool.name(),
            "verification exhausted, no corroboration"
        );
        self.pool.reset_if_empty();
        Vec::new()
    }

    /// Tickers eligible for corroboration.
    pub fn candidates(aggregates: &AggregateMap, threshold: u64) -> Vec<String> {
        aggregates
            .iter()
            .filter(|(_, agg)| agg.count >= threshold)
            .map(|(ticker, _)| ticker.clone())
            .collect()
    }

    /// Query every candidate concurrently; return only non-empty results.
    pub async fn gather(&self, tickers: Vec<String>) -> Vec<Corroboration> {
        stream::iter(tickers)
            .map(|ticker| async move {
                let posts = self.query(&ticker).await;
                let scores: Vec<f64> = posts.iter().map(|p| self.scorer.score(&p.content)).collect();
                Corroboration { ticker, scores }
            })
            .buffer_unordered(self.concurrency)
            .filter(|c| std::future::ready(!c.scores.is_empty()))
            .collect()
            .await
    }

    /// Fold gathered corroborations into the aggregate.
    pub fn apply(aggregates: &mut AggregateMap, results: Vec<Corroboration>) -> usize {
        let mut applied = 0;
        for result in results {
            if result.scores.is_empty() {
                continue;
            }
            let Some(agg) = aggregates.get_mut(&result.ticker) else {
                continue;
            };
            agg.sources.push(VERIFICATION_SOURCE.to_string());
            agg.count += result.scores.len() as u64;
            for score in &result.scores {
                agg.sentiment_sum.add(*score);
            }
            debug!(
                ticker = %result.ticker,
                added = result.scores.len(),
                count = agg.count,
                "ticker corroborated"
            );
            applied += 1;
        }
        applied
    }

    /// Corroborate every ticker with `count >= threshold`, in place.
    /// Returns the number of tickers that gained evidence.
    pub async fn verify(&self, aggregates: &mut AggregateMap, threshold: u64) -> usize {
        let candidates = Self::candidates(aggregates, threshold);
        info!(candidates = candidates.len(), threshold, "cross-verification started");
        let results = self.gather(candidates).await;
        let applied = Self::apply(aggregates, results);
        info!(
            applied,
            healthy = self.pool.healthy_count(),
            pool = self.pool.name(),
            "cross-verification complete"
        );
        applied
    }
}
