// =============================================================================
// Reddit Producer — newest posts across the subreddit universe
// =============================================================================
//
// Public JSON listings (`/r/<sub>/new.json`), no auth.  Each post is resolved
// on `title + selftext` and scored once; every resolved ticker gets a record.
//
// Crowd verification (optional): for posts that resolved to at least one
// ticker, the top comments are fetched and their mean score is averaged with
// the post's own score.  It costs one extra request per matching post, so it
// is off by default.
//
// Subreddits and comment threads are fetched concurrently.  At the deadline
// the producer returns whatever subreddits finished; comment threads still
// pending by then leave their post with its own score.
// =============================================================================

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde::Deserialize;
use futures_util::stream::{self, StreamExt};
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::{gather_within, SignalProducer};
use crate::analysis::{EntityResolver, SentimentScorer};
use crate::feed;
use crate::types::SignalRecord;

const REDDIT_BASE_URL: &str = "https://www.reddit.com";
const DEFAULT_CONCURRENCY: usize = 4;
const DEFAULT_DEADLINE: Duration = Duration::from_secs(50);

/// The fields of a listing child the pipeline uses.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RedditPost {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub subreddit: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub selftext: String,
    #[serde(default)]
    pub permalink: String,
    #[serde(default)]
    pub created_utc: f64,
}

impl RedditPost {
    pub fn text(&self) -> String {
        format!("{} {}", self.title, self.selftext)
    }

    pub fn link(&self) -> String {
        format!("https://reddit.com{}", self.permalink)
    }

    pub fn timestamp(&self) -> String {
        Utc.timestamp_opt(self.created_utc as i64, 0)
            .single()
            .unwrap_or_else(Utc::now)
            .to_rfc3339()
    }
}

pub struct RedditProducer {
    client: reqwest::Client,
    base_url: String,
    subreddits: Vec<String>,
    limit: usize,
    crowd_comment_limit: Option<usize>,
    concurrency: usize,
    deadline: Duration,
    resolver: Arc<dyn EntityResolver>,
    scorer: Arc<dyn SentimentScorer>,
}

/// A post that resolved to at least one ticker, with its current score.
type Matched = (RedditPost, BTreeSet<String>, f64);

impl RedditProducer {
    pub fn new(
        timeout: Duration,
        subreddits: Vec<String>,
        limit: usize,
        resolver: Arc<dyn EntityResolver>,
        scorer: Arc<dyn SentimentScorer>,
    ) -> Result<Self> {
        Ok(Self {
            client: feed::http_client(timeout)?,
            base_url: REDDIT_BASE_URL.to_string(),
            subreddits,
            limit,
            crowd_comment_limit: None,
            concurrency: DEFAULT_CONCURRENCY,
            deadline: DEFAULT_DEADLINE,
            resolver,
            scorer,
        })
    }

    /// Enable crowd verification with up to `limit` comments per post.
    pub fn with_crowd_verification(mut self, limit: usize) -> Self {
        self.crowd_comment_limit = Some(limit.max(1));
        self
    }

    /// Requests in flight at once, and how long `fetch` waits before
    /// returning the subreddits that finished.
    pub fn with_fetch_budget(mut self, concurrency: usize, deadline: Duration) -> Self {
        self.concurrency = concurrency.max(1);
        self.deadline = deadline;
        self
    }

    async fn get_json(&self, url: &str, limit: usize) -> Result<Value> {
        let limit = limit.to_string();
        let resp = self
            .client
            .get(url)
            .query(&[("limit", limit.as_str())])
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;

        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("reddit {} returned {}", url, status);
        }
        resp.json()
            .await
            .with_context(|| format!("failed to parse reddit response from {url}"))
    }

    async fn fetch_subreddit(&self, subreddit: &str) -> Result<Vec<RedditPost>> {
        let url = format!("{}/r/{}/new.json", self.base_url, subreddit);
        let body = self.get_json(&url, self.limit).await?;
        Ok(parse_listing(&body))
    }

    async fn fetch_comments(&self, post: &RedditPost, limit: usize) -> Result<Vec<String>> {
        let url = format!("{}{}.json", self.base_url, post.permalink.trim_end_matches('/'));
        let body = self.get_json(&url, limit).await?;
        let mut comments = parse_comments(&body);
        comments.truncate(limit);
        Ok(comments)
    }

    async fn subreddit_records(&self, subreddit: &str, crowd_cutoff: Instant) -> Vec<SignalRecord> {
        let posts = match self.fetch_subreddit(subreddit).await {
            Ok(posts) => posts,
            Err(e) => {
                warn!(subreddit = %subreddit, error = %e, "subreddit fetch failed");
                return Vec::new();
            }
        };

        let matched: Vec<Matched> = posts
            .into_iter()
            .filter_map(|post| {
                let text = post.text();
                let tickers = self.resolver.resolve(&text);
                if tickers.is_empty() {
                    return None;
                }
                let score = self.scorer.score(&text);
                Some((post, tickers, score))
            })
            .collect();

        let scored = match self.crowd_comment_limit {
            Some(limit) => self.crowd_verify(matched, limit, crowd_cutoff).await,
            None => matched,
        };

        scored
            .into_iter()
            .flat_map(|(post, tickers, score)| {
                let sub = if post.subreddit.is_empty() {
                    subreddit
                } else {
                    post.subreddit.as_str()
                };
                post_records(&post, sub, tickers, score)
            })
            .collect()
    }

    async fn crowd_verify(&self, matched: Vec<Matched>, limit: usize, cutoff: Instant) -> Vec<Matched> {
        stream::iter(matched)
            .map(|(post, tickers, score)| async move {
                let score = match tokio::time::timeout_at(cutoff, self.crowd_score(&post, score, limit)).await {
                    Ok(blended) => blended,
                    Err(_) => {
                        debug!(post = %post.id, "comment deadline reached, keeping post score");
                        score
                    }
                };
                (post, tickers, score)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await
    }

    async fn crowd_score(&self, post: &RedditPost, post_score: f64, limit: usize) -> f64 {
        match self.fetch_comments(post, limit).await {
            Ok(comments) => {
                let scores: Vec<f64> = comments.iter().map(|c| self.scorer.score(c)).collect();
                debug!(post = %post.id, comments = scores.len(), "crowd comments scored");
                blend_with_crowd(post_score, &scores)
            }
            Err(e) => {
                warn!(post = %post.id, error = %e, "comment fetch failed, keeping post score");
                post_score
            }
        }
    }
}

#[async_trait]
impl SignalProducer for RedditProducer {
    fn name(&self) -> &str {
        "reddit"
    }

    async fn fetch(&self) -> Result<Vec<SignalRecord>> {
        let started = Instant::now();
        let crowd_cutoff = started + self.deadline.mul_f64(0.75);
        let batches = gather_within(
            self.subreddits.clone(),
            self.concurrency,
            self.deadline,
            |subreddit| async move { self.subreddit_records(&subreddit, crowd_cutoff).await },
        )
        .await;

        if batches.len() < self.subreddits.len() {
            warn!(
                finished = batches.len(),
                total = self.subreddits.len(),
                "reddit deadline reached, keeping finished subreddits"
            );
        }
        Ok(batches.into_iter().flatten().collect())
    }
}

/// `data.children[].data` of a listing.
pub fn parse_listing(body: &Value) -> Vec<RedditPost> {
    body.pointer("/data/children")
        .and_then(Value::as_array)
        .map(|children| {
            children
                .iter()
                .filter_map(|child| child.get("data"))
                .filter_map(|data| serde_json::from_value(data.clone()).ok())
                .collect()
        })
        .unwrap_or_default()
}

/// A post's JSON is `[post_listing, comment_listing]`; returns comment bodies.
pub fn parse_comments(body: &Value) -> Vec<String> {
    body.get(1)
        .and_then(|listing| listing.pointer("/data/children"))
        .and_then(Value::as_array)
        .map(|children| {
            children
                .iter()
                .filter_map(|child| child.pointer("/data/body").and_then(Value::as_str))
                .filter(|b| !b.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Average of the post score and the comment mean; the post score alone when
/// there are no comments.
pub fn blend_with_crowd(post_score: f64, comment_scores: &[f64]) -> f64 {
    if comment_scores.is_empty() {
        return post_score;
    }
    let mean = comment_scores.iter().sum::<f64>() / comment_scores.len() as f64;
    (post_score + mean) / 2.0
}

pub fn post_records(
    post: &RedditPost,
    subreddit: &str,
    tickers: impl IntoIterator<Item = String>,
    score: f64,
) -> Vec<SignalRecord> {
    let source = format!("Reddit: {subreddit}");
    let timestamp = post.timestamp();
    let link = post.link();
    tickers
        .into_iter()
        .map(|ticker| {
            SignalRecord::new(ticker, source.as_str(), post.title.as_str(), score, timestamp.as_str())
                .with_link(link.as_str())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::producers::test_support::{ConstScorer, FixedResolver};
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Local HTTP stub: requests whose line contains `stall` never get an
    /// answer; everything else gets a one-post TSLA listing.
    async fn stub_reddit(stall: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut sock, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 4096];
                    let n = sock.read(&mut buf).await.unwrap_or(0);
                    let request = String::from_utf8_lossy(&buf[..n]).to_string();
                    let request_line = request.lines().next().unwrap_or_default().to_string();
                    if request_line.contains(stall) {
                        tokio::time::sleep(Duration::from_secs(30)).await;
                        return;
                    }
                    let body = json!({ "data": { "children": [ { "data": {
                        "id": "abc", "title": "TSLA calls", "selftext": "",
                        "permalink": "/r/x/comments/abc/tsla/", "created_utc": 1704067200.0
                    } } ] } })
                    .to_string();
                    let resp = format!(
                        "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                        body.len(),
                        body
                    );
                    let _ = sock.write_all(resp.as_bytes()).await;
                });
            }
        });
        format!("http://{addr}")
    }

    fn producer(base_url: String, subreddits: &[&str], deadline: Duration) -> RedditProducer {
        let mut producer = RedditProducer::new(
            Duration::from_secs(10),
            subreddits.iter().map(|s| s.to_string()).collect(),
            5,
            Arc::new(FixedResolver(vec!["TSLA"])),
            Arc::new(ConstScorer(0.4)),
        )
        .unwrap()
        .with_fetch_budget(4, deadline);
        producer.client = reqwest::Client::builder().no_proxy().build().unwrap();
        producer.base_url = base_url;
        producer
    }

    #[tokio::test]
    async fn stalled_subreddit_does_not_discard_finished_ones() {
        let base = stub_reddit("/r/stalled/").await;
        let reddit = producer(base, &["stocks", "stalled", "investing"], Duration::from_millis(500));

        let started = std::time::Instant::now();
        let records = reddit.fetch().await.unwrap();

        assert!(started.elapsed() < Duration::from_secs(5));
        let sources: BTreeSet<&str> = records.iter().map(|r| r.source.as_str()).collect();
        assert_eq!(sources, BTreeSet::from(["Reddit: investing", "Reddit: stocks"]));
        assert!(records.iter().all(|r| r.ticker == "TSLA"));
    }

    #[tokio::test]
    async fn stalled_comment_threads_keep_the_post_score() {
        let base = stub_reddit("/comments/").await;
        let reddit = producer(base, &["stocks"], Duration::from_millis(600)).with_crowd_verification(5);

        let records = reddit.fetch().await.unwrap();

        assert_eq!(records.len(), 1);
        assert!((records[0].sentiment_score - 0.4).abs() < f64::EPSILON);
    }

    #[test]
    fn listing_children_are_parsed() {
        let body = json!({ "data": { "children": [
            { "kind": "t3", "data": {
                "id": "abc", "subreddit": "stocks", "title": "TSLA calls",
                "selftext": "going up", "permalink": "/r/stocks/comments/abc/x/",
                "created_utc": 1704067200.0
            } },
            { "kind": "t3", "data": { "id": "def", "title": "no body" } }
        ] } });
        let posts = parse_listing(&body);
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].text(), "TSLA calls going up");
        assert_eq!(posts[0].link(), "https://reddit.com/r/stocks/comments/abc/x/");
        assert_eq!(posts[0].timestamp(), "2024-01-01T00:00:00+00:00");
        assert_eq!(posts[1].selftext, "");
    }

    #[test]
    fn broken_listing_is_empty() {
        assert!(parse_listing(&json!({ "error": 429 })).is_empty());
    }

    #[test]
    fn comment_bodies_come_from_the_second_listing() {
        let body = json!([
            { "data": { "children": [ { "data": { "title": "post" } } ] } },
            { "data": { "children": [
                { "data": { "body": "great company" } },
                { "data": { "body": "" } },
                { "kind": "more", "data": {} }
            ] } }
        ]);
        assert_eq!(parse_comments(&body), vec!["great company".to_string()]);
        assert!(parse_comments(&json!({})).is_empty());
    }

    #[test]
    fn crowd_blend_averages_post_and_comment_mean() {
        assert!((blend_with_crowd(0.8, &[0.2, 0.0]) - 0.45).abs() < 1e-12);
        assert!((blend_with_crowd(0.8, &[]) - 0.8).abs() < f64::EPSILON);
    }

    #[test]
    fn records_carry_subreddit_source_and_permalink() {
        let post = RedditPost {
            id: "abc".into(),
            subreddit: "wallstreetbets".into(),
            title: "GME squeeze".into(),
            permalink: "/r/wallstreetbets/comments/abc/".into(),
            ..Default::default()
        };
        let records = post_records(&post, "wallstreetbets", vec!["GME".to_string()], 0.3);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].source, "Reddit: wallstreetbets");
        assert_eq!(records[0].raw_text, "GME squeeze");
        assert_eq!(
            records[0].link.as_deref(),
            Some("https://reddit.com/r/wallstreetbets/comments/abc/")
        );
    }
}
