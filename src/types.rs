// =============================================================================
// Shared types used across the Social Arb pipeline
// =============================================================================

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// One piece of evidence that a ticker is drawing attention.
///
/// Produced by a signal producer, consumed exactly once by the aggregator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalRecord {
    pub ticker: String,
    pub source: String,
    pub raw_text: String,
    /// Compound polarity in [-1.0, +1.0].
    pub sentiment_score: f64,
    /// ISO 8601 timestamp as reported by the source.
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

impl SignalRecord {
    pub fn new(
        ticker: impl Into<String>,
        source: impl Into<String>,
        raw_text: impl Into<String>,
        sentiment_score: f64,
        timestamp: impl Into<String>,
    ) -> Self {
        Self {
            ticker: ticker.into(),
            source: source.into(),
            raw_text: raw_text.into(),
            sentiment_score,
            timestamp: timestamp.into(),
            link: None,
        }
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }
}

/// Sentiment accumulator kept in fixed-point nano-units.
///
/// Integer addition is associative, so the sum is identical for any order of
/// records or partial folds. Serialised as a plain float.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "f64", into = "f64")]
pub struct SentimentSum(i64);

impl SentimentSum {
    const SCALE: f64 = 1e9;

    pub fn add(&mut self, score: f64) {
        self.0 = self.0.saturating_add(Self::units(score));
    }

    pub fn merge(&mut self, other: SentimentSum) {
        self.0 = self.0.saturating_add(other.0);
    }

    pub fn value(self) -> f64 {
        self.0 as f64 / Self::SCALE
    }

    fn units(score: f64) -> i64 {
        (score * Self::SCALE).round() as i64
    }
}

impl From<f64> for SentimentSum {
    fn from(value: f64) -> Self {
        Self(Self::units(value))
    }
}

impl From<SentimentSum> for f64 {
    fn from(sum: SentimentSum) -> Self {
        sum.value()
    }
}

/// Per-ticker running statistics for one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Aggregate {
    pub count: u64,
    pub sentiment_sum: SentimentSum,
    /// Duplicates allowed until the final signal is built.
    pub sources: Vec<String>,
    #[serde(default)]
    pub trend_sentiment: Option<f64>,
    #[serde(default)]
    pub bullish_vol: Option<u64>,
    #[serde(default)]
    pub bearish_vol: Option<u64>,
    #[serde(default)]
    pub current_price: Option<f64>,
}

impl Aggregate {
    /// Mean sentiment, or `None` when nothing was counted.
    pub fn avg_sentiment(&self) -> Option<f64> {
        if self.count == 0 {
            None
        } else {
            Some(self.sentiment_sum.value() / self.count as f64)
        }
    }

    /// Distinct sources, ordered.
    pub fn unique_sources(&self) -> BTreeSet<String> {
        self.sources.iter().cloned().collect()
    }
}

/// Ticker-keyed aggregates. Ordered so that every stage iterates
/// deterministically.
pub type AggregateMap = BTreeMap<String, Aggregate>;

/// What the previous run remembered about a ticker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(default)]
    pub count: u64,
}

/// Full snapshot written at the end of a run and read at the start of the next.
pub type HistorySnapshot = BTreeMap<String, HistoryEntry>;

/// Divergence between crowd sentiment and analyst consensus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AsymmetryRating {
    #[serde(rename = "Unknown")]
    Unknown,
    #[serde(rename = "CONTRARIAN BULL")]
    ContrarianBull,
    #[serde(rename = "CONSENSUS BULL")]
    ConsensusBull,
    #[serde(rename = "CONTRARIAN BEAR")]
    ContrarianBear,
    #[serde(rename = "Neutral")]
    Neutral,
}

impl std::fmt::Display for AsymmetryRating {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown => write!(f, "Unknown"),
            Self::ContrarianBull => write!(f, "CONTRARIAN BULL"),
            Self::ConsensusBull => write!(f, "CONSENSUS BULL"),
            Self::ContrarianBear => write!(f, "CONTRARIAN BEAR"),
            Self::Neutral => write!(f, "Neutral"),
        }
    }
}

/// Ranked recommendation for one ticker, written once per run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalSignal {
    pub ticker: String,
    pub signal_strength: u64,
    pub velocity: i64,
    pub avg_sentiment: f64,
    pub blind_spot: bool,
    pub analyst_rating: AsymmetryRating,
    pub est_position_shares: u64,
    pub sources: BTreeSet<String>,
    /// 0.0 when no live price was available.
    #[serde(default)]
    pub current_price: f64,
    /// 0.0 means no search-interest data.
    #[serde(default)]
    pub trend_sentiment: f64,
    #[serde(default)]
    pub bullish_search_vol: u64,
    #[serde(default)]
    pub bearish_search_vol: u64,
}

/// Stages of a single pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStage {
    Collect,
    Aggregate,
    Verify,
    ClassifyAndSize,
    Persist,
    Done,
    Failed,
}

impl std::fmt::Display for RunStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Collect => write!(f, "COLLECT"),
            Self::Aggregate => write!(f, "AGGREGATE"),
            Self::Verify => write!(f, "VERIFY"),
            Self::ClassifyAndSize => write!(f, "CLASSIFY_AND_SIZE"),
            Self::Persist => write!(f, "PERSIST"),
            Self::Done => write!(f, "DONE"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn avg_sentiment_is_none_for_empty_aggregate() {
        let agg = Aggregate::default();
        assert_eq!(agg.avg_sentiment(), None);
    }

    #[test]
    fn sentiment_sum_is_exact_in_any_order() {
        let scores = [0.1, 0.2, 0.3, -0.4767, 0.6249, 0.0772];
        let mut forward = SentimentSum::default();
        scores.iter().for_each(|s| forward.add(*s));
        let mut reversed = SentimentSum::default();
        scores.iter().rev().for_each(|s| reversed.add(*s));
        assert_eq!(forward, reversed);
        assert_eq!(forward.value(), 0.8254);
    }

    #[test]
    fn sentiment_sum_serialises_as_float() {
        let mut sum = SentimentSum::default();
        sum.add(0.25);
        sum.add(-0.5);
        assert_eq!(serde_json::to_string(&sum).unwrap(), "-0.25");
        let back: SentimentSum = serde_json::from_str("1.2").unwrap();
        assert_eq!(back.value(), 1.2);
    }

    #[test]
    fn rating_serialises_with_dashboard_labels() {
        let json = serde_json::to_string(&AsymmetryRating::ContrarianBull).unwrap();
        assert_eq!(json, "\"CONTRARIAN BULL\"");
        assert_eq!(AsymmetryRating::ContrarianBear.to_string(), "CONTRARIAN BEAR");
    }

    #[test]
    fn history_entry_tolerates_extra_and_missing_fields() {
        let snap: HistorySnapshot = serde_json::from_str(
            r#"{ "AAPL": { "count": 4, "sentiment_sum": 1.2, "sources": [] }, "TSLA": {} }"#,
        )
        .unwrap();
        assert_eq!(snap["AAPL"].count, 4);
        assert_eq!(snap["TSLA"].count, 0);
    }
}
