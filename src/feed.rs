// =============================================================================
// Feed helpers — shared HTTP client and RSS/Atom fetching
// =============================================================================

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use feed_rs::model::{Entry, Feed};
use tracing::debug;

/// Browser-like user agent; several upstreams reject default client strings.
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// HTTP client with a hard per-request timeout. Every outbound call in the
/// pipeline goes through a client built here.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .context("failed to build reqwest client")
}

/// GET `url` (with optional query pairs) and parse the body as RSS/Atom.
pub async fn fetch_feed(
    client: &reqwest::Client,
    url: &str,
    query: &[(&str, &str)],
) -> Result<Feed> {
    let resp = client
        .get(url)
        .query(query)
        .send()
        .await
        .with_context(|| format!("GET feed {url}"))?;

    let status = resp.status();
    if !status.is_success() {
        anyhow::bail!("feed {} returned {}", url, status);
    }

    let body = resp
        .bytes()
        .await
        .with_context(|| format!("failed to read feed body from {url}"))?;

    let feed = feed_rs::parser::parse(&body[..])
        .with_context(|| format!("failed to parse feed from {url}"))?;

    debug!(url, entries = feed.entries.len(), "feed fetched");
    Ok(feed)
}

pub fn entry_title(entry: &Entry) -> String {
    entry
        .title
        .as_ref()
        .map(|t| strip_html_tags(&t.content))
        .unwrap_or_default()
}

/// Body text: content, falling back to summary, HTML stripped.
pub fn entry_body(entry: &Entry) -> String {
    let raw = entry
        .content
        .as_ref()
        .and_then(|c| c.body.clone())
        .or_else(|| entry.summary.as_ref().map(|s| s.content.clone()))
        .unwrap_or_default();
    strip_html_tags(&raw)
}

pub fn entry_link(entry: &Entry) -> Option<String> {
    entry.links.first().map(|l| l.href.clone())
}

pub fn entry_author(entry: &Entry) -> Option<String> {
    entry.authors.first().map(|a| a.name.clone())
}

pub fn entry_published(entry: &Entry) -> Option<DateTime<Utc>> {
    entry.published.or(entry.updated)
}

/// Published time as RFC 3339, falling back to now.
pub fn entry_timestamp(entry: &Entry) -> String {
    entry_published(entry)
        .unwrap_or_else(Utc::now)
        .to_rfc3339()
}

/// Strip HTML tags and decode the common entities.
pub fn strip_html_tags(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut in_tag = false;
    let mut in_entity = false;
    let mut entity_buf = String::new();

    for c in input.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            '&' if !in_tag => {
                in_entity = true;
                entity_buf.clear();
            }
            ';' if in_entity => {
                in_entity = false;
                match entity_buf.as_str() {
                    "amp" => result.push('&'),
                    "lt" => result.push('<'),
                    "gt" => result.push('>'),
                    "quot" => result.push('"'),
                    "apos" | "#39" => result.push('\''),
                    "nbsp" => result.push(' '),
                    _ if entity_buf.starts_with('#') => {
                        if let Some(ch) = entity_buf[1..].parse::<u32>().ok().and_then(char::from_u32)
                        {
                            result.push(ch);
                        }
                    }
                    _ => {
                        result.push('&');
                        result.push_str(&entity_buf);
                        result.push(';');
                    }
                }
                entity_buf.clear();
            }
            _ if in_entity => entity_buf.push(c),
            _ if !in_tag => result.push(c),
            _ => {}
        }
    }

    result.split_whitespace().collect::<Vec<_>>().join(" ")
}
