// =============================================================================
// Google News volume — counts recent articles for the blind-spot check
// =============================================================================
//
// Items whose publish date cannot be read are counted as recent.
// =============================================================================

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use feed_rs::model::Entry;
use tracing::debug;

use super::NewsVolumeProvider;
use crate::feed::{self, entry_published};

const NEWS_RSS_URL: &str = "https://news.google.com/rss/search";

pub struct GoogleNews {
    client: reqwest::Client,
    base_url: String,
}

impl GoogleNews {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: feed::http_client(timeout)?,
            base_url: NEWS_RSS_URL.to_string(),
        })
    }
}

#[async_trait]
impl NewsVolumeProvider for GoogleNews {
    async fn volume(&self, ticker: &str, lookback_hours: u64) -> Result<u64> {
        let params = [("q", ticker), ("hl", "en-US"), ("gl", "US"), ("ceid", "US:en")];
        let feed = feed::fetch_feed(&self.client, &self.base_url, &params).await?;

        let cutoff = Utc::now() - chrono::Duration::hours(lookback_hours as i64);
        let volume = count_recent(&feed.entries, cutoff);
        debug!(ticker, volume, lookback_hours, "news volume counted");
        Ok(volume)
    }
}

/// Entries published after `cutoff`, undated entries included.
pub fn count_recent(entries: &[Entry], cutoff: DateTime<Utc>) -> u64 {
    entries
        .iter()
        .filter(|e| entry_published(e).map_or(true, |published| published > cutoff))
        .count() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn counts_recent_and_undated_items() {
        let rss = r#"<?xml version="1.0"?><rss version="2.0"><channel><title>n</title>
  <item><title>old</title><guid>1</guid><pubDate>Mon, 01 Jan 2024 10:00:00 GMT</pubDate></item>
  <item><title>new</title><guid>2</guid><pubDate>Tue, 24 Dec 2024 22:00:00 GMT</pubDate></item>
  <item><title>undated</title><guid>3</guid></item>
</channel></rss>"#;
        let feed = feed_rs::parser::parse(rss.as_bytes()).unwrap();
        let cutoff = Utc.with_ymd_and_hms(2024, 12, 23, 0, 0, 0).unwrap();
        assert_eq!(count_recent(&feed.entries, cutoff), 2);
    }

    #[test]
    fn empty_feed_has_zero_volume() {
        assert_eq!(count_recent(&[], Utc::now()), 0);
    }
}
