// =============================================================================
// Instagram Producer — captions from public profile timelines
// =============================================================================
//
// Uses the public `web_profile_info` endpoint, which answers with the latest
// timeline edges for a username when called with the web app id header.
// Private or missing accounts simply yield nothing.
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde_json::Value;
use tracing::warn;

use super::{opinionated_records, SignalProducer};
use crate::analysis::{EntityResolver, SentimentScorer};
use crate::feed;
use crate::types::SignalRecord;

const PROFILE_INFO_URL: &str = "https://i.instagram.com/api/v1/users/web_profile_info/";
const WEB_APP_ID: &str = "936619743392459";

#[derive(Debug, Clone, PartialEq)]
pub struct InstagramPost {
    pub username: String,
    pub caption: String,
    pub shortcode: Option<String>,
    pub timestamp: String,
}

impl InstagramPost {
    pub fn permalink(&self) -> Option<String> {
        self.shortcode
            .as_ref()
            .map(|code| format!("https://www.instagram.com/p/{code}/"))
    }
}

pub struct InstagramProducer {
    client: reqwest::Client,
    usernames: Vec<String>,
    limit: usize,
    resolver: Arc<dyn EntityResolver>,
    scorer: Arc<dyn SentimentScorer>,
}

impl InstagramProducer {
    pub fn new(
        timeout: Duration,
        usernames: Vec<String>,
        limit: usize,
        resolver: Arc<dyn EntityResolver>,
        scorer: Arc<dyn SentimentScorer>,
    ) -> Result<Self> {
        Ok(Self {
            client: feed::http_client(timeout)?,
            usernames,
            limit,
            resolver,
            scorer,
        })
    }

    async fn fetch_profile(&self, username: &str) -> Result<Vec<InstagramPost>> {
        let resp = self
            .client
            .get(PROFILE_INFO_URL)
            .query(&[("username", username)])
            .header("x-ig-app-id", WEB_APP_ID)
            .header("Accept", "application/json")
            .send()
            .await
            .with_context(|| format!("GET instagram profile {username}"))?;

        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("instagram profile {} returned {}", username, status);
        }
        let body: Value = resp
            .json()
            .await
            .with_context(|| format!("failed to parse instagram profile {username}"))?;
        Ok(parse_timeline(&body, username, self.limit))
    }
}

#[async_trait]
impl SignalProducer for InstagramProducer {
    fn name(&self) -> &str {
        "instagram"
    }

    async fn fetch(&self) -> Result<Vec<SignalRecord>> {
        let mut records = Vec::new();
        for username in &self.usernames {
            let posts = match self.fetch_profile(username).await {
                Ok(posts) => posts,
                Err(e) => {
                    warn!(username = %username, error = %e, "instagram profile fetch failed");
                    continue;
                }
            };
            for post in &posts {
                records.extend(post_records(post, self.resolver.as_ref(), self.scorer.as_ref()));
            }
        }
        Ok(records)
    }
}

/// `data.user.edge_owner_to_timeline_media.edges[].node`, first `limit`.
pub fn parse_timeline(body: &Value, username: &str, limit: usize) -> Vec<InstagramPost> {
    let Some(edges) = body
        .pointer("/data/user/edge_owner_to_timeline_media/edges")
        .and_then(Value::as_array)
    else {
        return Vec::new();
    };

    edges
        .iter()
        .take(limit)
        .filter_map(|edge| edge.get("node"))
        .map(|node| {
            let caption = node
                .pointer("/edge_media_to_caption/edges/0/node/text")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let timestamp = node
                .get("taken_at_timestamp")
                .and_then(Value::as_i64)
                .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
                .unwrap_or_else(Utc::now)
                .to_rfc3339();
            InstagramPost {
                username: username.to_string(),
                caption,
                shortcode: node.get("shortcode").and_then(Value::as_str).map(str::to_string),
                timestamp,
            }
        })
        .collect()
}

/// The permalink is the source; `Instagram/<user>` when there is none.
pub fn post_records(
    post: &InstagramPost,
    resolver: &dyn EntityResolver,
    scorer: &dyn SentimentScorer,
) -> Vec<SignalRecord> {
    let link = post.permalink();
    let source = link
        .clone()
        .unwrap_or_else(|| format!("Instagram/{}", post.username));
    opinionated_records(
        &post.caption,
        &source,
        &post.timestamp,
        link.as_deref(),
        resolver,
        scorer,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::producers::test_support::{ConstScorer, FixedResolver};
    use serde_json::json;

    fn profile() -> Value {
        json!({ "data": { "user": { "edge_owner_to_timeline_media": { "edges": [
            { "node": {
                "shortcode": "C1",
                "taken_at_timestamp": 1704067200,
                "edge_media_to_caption": { "edges": [ { "node": { "text": "Bought more AAPL" } } ] }
            } },
            { "node": { "edge_media_to_caption": { "edges": [] } } },
            { "node": { "shortcode": "C3" } }
        ] } } } })
    }

    #[test]
    fn timeline_is_parsed_up_to_limit() {
        let posts = parse_timeline(&profile(), "trader", 2);
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].caption, "Bought more AAPL");
        assert_eq!(posts[0].timestamp, "2024-01-01T00:00:00+00:00");
        assert_eq!(posts[0].permalink().as_deref(), Some("https://www.instagram.com/p/C1/"));
        assert_eq!(posts[1].caption, "");
        assert_eq!(posts[1].shortcode, None);
    }

    #[test]
    fn missing_user_is_empty() {
        assert!(parse_timeline(&json!({ "data": { "user": null } }), "ghost", 5).is_empty());
    }

    #[test]
    fn caption_records_use_permalink_or_profile_source() {
        let posts = parse_timeline(&profile(), "trader", 5);
        let resolver = FixedResolver(vec!["AAPL"]);
        let records = post_records(&posts[0], &resolver, &ConstScorer(0.7));
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].source, "https://www.instagram.com/p/C1/");

        let bare = InstagramPost {
            username: "trader".into(),
            caption: "AAPL dip".into(),
            shortcode: None,
            timestamp: "2024-01-01T00:00:00Z".into(),
        };
        let records = post_records(&bare, &resolver, &ConstScorer(-0.2));
        assert_eq!(records[0].source, "Instagram/trader");
        assert_eq!(records[0].link, None);
    }
}
