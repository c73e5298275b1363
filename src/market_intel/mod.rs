// =============================================================================
// Market Intelligence Module
// =============================================================================
//
// Per-ticker collaborators queried after aggregation:
//
//   1. Cashtag search   — secondary social source used for cross-verification
//                         (Nitter mirrors, one endpoint per call)
//   2. Consensus        — analyst recommendation mean, 1 = strong buy, 5 = sell
//   3. News volume      — recent mainstream articles, drives the blind-spot flag
//   4. Market data      — live price and daily-return volatility
//   5. Search interest  — bullish vs bearish search volume
//
// Every call returns `anyhow::Result`; the orchestrator bounds each one with a
// timeout and degrades to "no data" on failure.

pub mod news;
pub mod nitter;
pub mod search_interest;
pub mod yahoo;

pub use news::GoogleNews;
pub use nitter::NitterSearch;
pub use search_interest::GoogleTrendsInterest;
pub use yahoo::YahooFinance;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A post returned by a secondary social source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalPost {
    pub content: String,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    pub timestamp: String,
}

/// Price snapshot used by the sizer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceContext {
    pub price: Option<f64>,
    /// Standard deviation of daily returns over the lookback window.
    pub volatility: Option<f64>,
}

/// Relative search volume for bullish vs bearish phrasing of a ticker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchInterest {
    pub bullish_volume: u64,
    pub bearish_volume: u64,
    /// bullish / (bearish + 1)
    pub sentiment_ratio: f64,
}

impl SearchInterest {
    pub fn new(bullish_volume: u64, bearish_volume: u64) -> Self {
        Self {
            bullish_volume,
            bearish_volume,
            sentiment_ratio: bullish_volume as f64 / (bearish_volume as f64 + 1.0),
        }
    }
}

/// Searches one endpoint of a mirrored source for `$TICKER` posts.
///
/// An `Err` means the endpoint itself misbehaved and should be evicted; an
/// empty `Ok` is a healthy endpoint with nothing to report.
#[async_trait]
pub trait CashtagSearch: Send + Sync {
    async fn search(&self, endpoint: &str, ticker: &str) -> Result<Vec<ExternalPost>>;
}

#[async_trait]
pub trait ConsensusProvider: Send + Sync {
    /// `None` when the ticker has no analyst coverage.
    async fn consensus(&self, ticker: &str) -> Result<Option<f64>>;
}

#[async_trait]
pub trait NewsVolumeProvider: Send + Sync {
    async fn volume(&self, ticker: &str, lookback_hours: u64) -> Result<u64>;
}

#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    async fn price_context(&self, ticker: &str) -> Result<PriceContext>;
}

#[async_trait]
pub trait SearchInterestProvider: Send + Sync {
    async fn sentiment_index(&self, ticker: &str) -> Result<Option<SearchInterest>>;
}
