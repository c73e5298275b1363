// =============================================================================
// Signal Producers — upstream adapters that emit SignalRecords
// =============================================================================
//
// Every producer implements `fetch`, which is free to fail.  The pipeline only
// ever calls `produce`, which catches that failure, logs it and returns an
// empty batch: a dead upstream reduces coverage, it never aborts a run.
//
//   weather    — hail forecasts in roofing markets        (Weather/Hail)
//   trends     — Google daily trending searches           (GoogleTrends)
//   reddit     — newest posts across a subreddit universe (Reddit: <sub>)
//   tiktok     — RSSHub hashtag feeds                     (item link)
//   instagram  — public profile timelines                 (item link)
// =============================================================================

pub mod instagram;
pub mod reddit;
pub mod tiktok;
pub mod trends;
pub mod weather;

pub use instagram::InstagramProducer;
pub use reddit::RedditProducer;
pub use tiktok::TikTokProducer;
pub use trends::TrendsProducer;
pub use weather::WeatherProducer;

use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use tracing::{info, warn};

use crate::analysis::{EntityResolver, SentimentScorer};
use crate::types::SignalRecord;

/// Posts whose compound score sits inside (-0.05, 0.05) carry no opinion and
/// are dropped by the caption-based producers.
pub const MIN_ABS_SENTIMENT: f64 = 0.05;

#[async_trait]
pub trait SignalProducer: Send + Sync {
    fn name(&self) -> &str;

    /// Fetch and convert; errors are allowed here.
    async fn fetch(&self) -> Result<Vec<SignalRecord>>;

    /// Fail-open wrapper around [`fetch`](Self::fetch).
    async fn produce(&self) -> Vec<SignalRecord> {
        match self.fetch().await {
            Ok(records) => {
                info!(producer = self.name(), records = records.len(), "producer finished");
                records
            }
            Err(e) => {
                warn!(producer = self.name(), error = %format!("{e:#}"), "producer failed, contributing nothing");
                Vec::new()
            }
        }
    }
}

/// One record per resolved ticker, scored once, kept only when opinionated.
pub fn opinionated_records(
    text: &str,
    source: &str,
    timestamp: &str,
    link: Option<&str>,
    resolver: &dyn EntityResolver,
    scorer: &dyn SentimentScorer,
) -> Vec<SignalRecord> {
    let tickers = resolver.resolve(text);
    if tickers.is_empty() {
        return Vec::new();
    }
    let score = scorer.score(text);
    if score.abs() <= MIN_ABS_SENTIMENT {
        return Vec::new();
    }
    tickers
        .into_iter()
        .map(|ticker| {
            let record = SignalRecord::new(ticker, source, text, score, timestamp);
            match link {
                Some(link) => record.with_link(link),
                None => record,
            }
        })
        .collect()
}

/// Run `task` over `items` with at most `concurrency` in flight and keep what
/// finished within `deadline`. Tasks still running at the deadline are dropped.
pub async fn gather_within<T, R, F, Fut>(
    items: Vec<T>,
    concurrency: usize,
    deadline: Duration,
    task: F,
) -> Vec<R>
where
    F: FnMut(T) -> Fut,
    Fut: Future<Output = R>,
{
    stream::iter(items)
        .map(task)
        .buffer_unordered(concurrency.max(1))
        .take_until(tokio::time::sleep(deadline))
        .collect()
        .await
}


#[cfg(test)]
mod tests {
    use super::test_support::{ConstScorer, FixedResolver};
    use super::*;
    use anyhow::anyhow;

    struct Failing;

    #[async_trait]
    impl SignalProducer for Failing {
        fn name(&self) -> &str {
            "failing"
        }
        async fn fetch(&self) -> Result<Vec<SignalRecord>> {
            Err(anyhow!("upstream 503"))
        }
    }

    #[tokio::test]
    async fn produce_swallows_fetch_errors() {
        assert!(Failing.produce().await.is_empty());
    }

    #[tokio::test]
    async fn gather_keeps_finished_tasks_at_the_deadline() {
        let started = std::time::Instant::now();
        let mut done = gather_within(vec![1u64, 2, 3, 4], 4, Duration::from_millis(200), |n| async move {
            if n % 2 == 0 {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            n
        })
        .await;
        done.sort_unstable();

        assert_eq!(done, vec![1, 3]);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn gather_runs_tasks_concurrently() {
        let started = std::time::Instant::now();
        let done = gather_within(vec![(); 8], 8, Duration::from_secs(5), |_| async {
            tokio::time::sleep(Duration::from_millis(100)).await;
        })
        .await;

        assert_eq!(done.len(), 8);
        assert!(started.elapsed() < Duration::from_millis(600));
    }

    #[test]
    fn neutral_text_is_dropped() {
        let resolver = FixedResolver(vec!["TSLA"]);
        let records = opinionated_records(
            "TSLA today",
            "TikTok/finance",
            "2024-01-01T00:00:00Z",
            None,
            &resolver,
            &ConstScorer(0.05),
        );
        assert!(records.is_empty());
    }

    #[test]
    fn one_record_per_resolved_ticker() {
        let resolver = FixedResolver(vec!["TSLA", "NVDA"]);
        let records = opinionated_records(
            "TSLA and NVDA to the moon",
            "https://tiktok.com/v/1",
            "2024-01-01T00:00:00Z",
            Some("https://tiktok.com/v/1"),
            &resolver,
            &ConstScorer(-0.4),
        );
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].ticker, "NVDA");
        assert!(records.iter().all(|r| (r.sentiment_score + 0.4).abs() < f64::EPSILON));
        assert_eq!(records[1].link.as_deref(), Some("https://tiktok.com/v/1"));
    }
}
