// =============================================================================
// TikTok Producer — hashtag feeds through an RSSHub instance
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use feed_rs::model::Feed;
use tracing::warn;

use super::{opinionated_records, SignalProducer};
use crate::analysis::{EntityResolver, SentimentScorer};
use crate::feed::{self, entry_body, entry_link, entry_timestamp};
use crate::types::SignalRecord;

pub struct TikTokProducer {
    client: reqwest::Client,
    rsshub_url: String,
    tags: Vec<String>,
    limit: usize,
    resolver: Arc<dyn EntityResolver>,
    scorer: Arc<dyn SentimentScorer>,
}

impl TikTokProducer {
    pub fn new(
        timeout: Duration,
        rsshub_url: impl Into<String>,
        tags: Vec<String>,
        limit: usize,
        resolver: Arc<dyn EntityResolver>,
        scorer: Arc<dyn SentimentScorer>,
    ) -> Result<Self> {
        Ok(Self {
            client: feed::http_client(timeout)?,
            rsshub_url: rsshub_url.into().trim_end_matches('/').to_string(),
            tags,
            limit,
            resolver,
            scorer,
        })
    }
}

#[async_trait]
impl SignalProducer for TikTokProducer {
    fn name(&self) -> &str {
        "tiktok"
    }

    async fn fetch(&self) -> Result<Vec<SignalRecord>> {
        let mut records = Vec::new();
        for tag in &self.tags {
            let url = format!("{}/tiktok/tag/{}", self.rsshub_url, tag);
            match feed::fetch_feed(&self.client, &url, &[]).await {
                Ok(feed) => records.extend(records_from_feed(
                    &feed,
                    tag,
                    self.limit,
                    self.resolver.as_ref(),
                    self.scorer.as_ref(),
                )),
                Err(e) => warn!(tag = %tag, error = %e, "tiktok tag fetch failed"),
            }
        }
        Ok(records)
    }
}

/// Caption-based records for the first `limit` videos of a tag feed.
/// The video link is the source; `TikTok/<tag>` when the item has none.
pub fn records_from_feed(
    feed: &Feed,
    tag: &str,
    limit: usize,
    resolver: &dyn EntityResolver,
    scorer: &dyn SentimentScorer,
) -> Vec<SignalRecord> {
    feed.entries
        .iter()
        .take(limit)
        .flat_map(|entry| {
            let caption = entry_body(entry);
            let link = entry_link(entry);
            let source = link.clone().unwrap_or_else(|| format!("TikTok/{tag}"));
            opinionated_records(
                &caption,
                &source,
                &entry_timestamp(entry),
                link.as_deref(),
                resolver,
                scorer,
            )
        })
        .collect()
}
