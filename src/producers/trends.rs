// =============================================================================
// Trends Producer — Google daily trending searches
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use feed_rs::model::Feed;

use super::SignalProducer;
use crate::analysis::EntityResolver;
use crate::feed::{self, entry_body, entry_timestamp, entry_title};
use crate::types::SignalRecord;

const TRENDS_RSS_URL: &str = "https://trends.google.com/trending/rss";
/// A trending search implies interest, not opinion.
const TREND_SENTIMENT: f64 = 0.1;
pub const SOURCE: &str = "GoogleTrends";

pub struct TrendsProducer {
    client: reqwest::Client,
    resolver: Arc<dyn EntityResolver>,
}

impl TrendsProducer {
    pub fn new(timeout: Duration, resolver: Arc<dyn EntityResolver>) -> Result<Self> {
        Ok(Self {
            client: feed::http_client(timeout)?,
            resolver,
        })
    }
}

#[async_trait]
impl SignalProducer for TrendsProducer {
    fn name(&self) -> &str {
        "google-trends"
    }

    async fn fetch(&self) -> Result<Vec<SignalRecord>> {
        let feed = feed::fetch_feed(&self.client, TRENDS_RSS_URL, &[("geo", "US")]).await?;
        Ok(records_from_feed(&feed, self.resolver.as_ref()))
    }
}

pub fn records_from_feed(feed: &Feed, resolver: &dyn EntityResolver) -> Vec<SignalRecord> {
    let mut records = Vec::new();
    for entry in &feed.entries {
        let query = entry_title(entry);
        let text = format!("{} {}", query, entry_body(entry));
        let timestamp = entry_timestamp(entry);
        for ticker in resolver.resolve(&text) {
            records.push(SignalRecord::new(
                ticker,
                SOURCE,
                query.as_str(),
                TREND_SENTIMENT,
                timestamp.as_str(),
            ));
        }
    }
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::producers::test_support::FixedResolver;

    #[test]
    fn trending_entities_become_records() {
        let rss = r#"<?xml version="1.0"?><rss version="2.0"><channel><title>t</title>
  <item><title>nvidia earnings</title><description>NVDA beats</description><guid>1</guid></item>
  <item><title>super bowl</title><description>halftime</description><guid>2</guid></item>
</channel></rss>"#;
        let feed = feed_rs::parser::parse(rss.as_bytes()).unwrap();
        let records = records_from_feed(&feed, &FixedResolver(vec!["NVDA"]));
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].ticker, "NVDA");
        assert_eq!(records[0].raw_text, "nvidia earnings");
        assert_eq!(records[0].source, SOURCE);
        assert!((records[0].sentiment_score - 0.1).abs() < f64::EPSILON);
    }
}
