// =============================================================================
// Nitter Search — cashtag search over a single Nitter mirror's RSS
// =============================================================================
//
// Nitter mirrors come and go.  A mirror that answers with a non-2xx status or
// a body that does not parse as a feed is reported as an error so that the
// caller can evict it; a well-formed empty feed is a valid "no results".
// Nitter puts the tweet text in the item title.
// =============================================================================

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use feed_rs::model::Feed;
use tracing::debug;

use super::{CashtagSearch, ExternalPost};
use crate::feed::{self, entry_author, entry_link, entry_timestamp, entry_title};

pub struct NitterSearch {
    client: reqwest::Client,
}

impl NitterSearch {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: feed::http_client(timeout)?,
        })
    }
}

#[async_trait]
impl CashtagSearch for NitterSearch {
    async fn search(&self, endpoint: &str, ticker: &str) -> Result<Vec<ExternalPost>> {
        let url = format!("{}/search/rss", endpoint.trim_end_matches('/'));
        let query = format!("${ticker}");
        let params = [("f", "tweets"), ("q", query.as_str())];
        let feed = feed::fetch_feed(&self.client, &url, &params).await?;
        let posts = posts_from_feed(&feed);
        debug!(endpoint, ticker, posts = posts.len(), "nitter search complete");
        Ok(posts)
    }
}

pub fn posts_from_feed(feed: &Feed) -> Vec<ExternalPost> {
    feed.entries
        .iter()
        .map(|entry| ExternalPost {
            content: entry_title(entry),
            link: entry_link(entry),
            author: entry_author(entry),
            timestamp: entry_timestamp(entry),
        })
        .filter(|post| !post.content.is_empty())
        .collect()
}
