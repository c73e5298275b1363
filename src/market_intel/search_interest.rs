// =============================================================================
// Google Trends search interest — "buy T" vs "sell T"
// =============================================================================
//
// Both phrases are requested in one comparison so that their volumes are on
// the same relative scale (separately queried series are each normalised to
// 0..100 and cannot be compared).  The unofficial API takes two calls:
//
//   explore               -> TIMESERIES widget { token, request }
//   widgetdata/multiline  -> timelineData[].value[0..2]
//
// Responses carry an anti-JSON-hijacking prefix that must be stripped.
// =============================================================================

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use super::{SearchInterest, SearchInterestProvider};
use crate::feed;

const TRENDS_API_URL: &str = "https://trends.google.com/trends/api";
const TIMEFRAME: &str = "today 3-m";

pub struct GoogleTrendsInterest {
    client: reqwest::Client,
    base_url: String,
}

impl GoogleTrendsInterest {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: feed::http_client(timeout)?,
            base_url: TRENDS_API_URL.to_string(),
        })
    }

    async fn get_prefixed_json(&self, path: &str, query: &[(&str, &str)]) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .with_context(|| format!("GET trends {path}"))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .with_context(|| format!("failed to read trends {path} body"))?;

        if !status.is_success() {
            anyhow::bail!("trends {} returned {}", path, status);
        }

        serde_json::from_str(strip_json_prefix(&text))
            .with_context(|| format!("failed to parse trends {path} body"))
    }
}

#[async_trait]
impl SearchInterestProvider for GoogleTrendsInterest {
    async fn sentiment_index(&self, ticker: &str) -> Result<Option<SearchInterest>> {
        let bullish = format!("buy {ticker}");
        let bearish = format!("sell {ticker}");

        let explore_req = json!({
            "comparisonItem": [
                { "keyword": bullish, "geo": "US", "time": TIMEFRAME },
                { "keyword": bearish, "geo": "US", "time": TIMEFRAME },
            ],
            "category": 0,
            "property": "",
        })
        .to_string();

        let explore = self
            .get_prefixed_json("/explore", &[("hl", "en-US"), ("tz", "360"), ("req", explore_req.as_str())])
            .await?;

        let Some((token, request)) = timeseries_widget(&explore) else {
            debug!(ticker, "no TIMESERIES widget in explore response");
            return Ok(None);
        };

        let request = request.to_string();
        let multiline = self
            .get_prefixed_json(
                "/widgetdata/multiline",
                &[("hl", "en-US"), ("tz", "360"), ("req", request.as_str()), ("token", token.as_str())],
            )
            .await?;

        let interest = sum_timeline(&multiline).map(|(bull, bear)| SearchInterest::new(bull, bear));
        debug!(ticker, ?interest, "search interest fetched");
        Ok(interest)
    }
}

/// Drop everything before the first `{` (e.g. `)]}'` or `)]}',`).
pub fn strip_json_prefix(text: &str) -> &str {
    text.find('{').map_or(text, |idx| &text[idx..])
}

/// Token and request of the TIMESERIES widget.
pub fn timeseries_widget(explore: &Value) -> Option<(String, Value)> {
    explore
        .get("widgets")?
        .as_array()?
        .iter()
        .find(|w| w.get("id").and_then(Value::as_str) == Some("TIMESERIES"))
        .and_then(|w| {
            let token = w.get("token")?.as_str()?.to_string();
            let request = w.get("request")?.clone();
            Some((token, request))
        })
}

/// Summed (bullish, bearish) interest across the timeline.
pub fn sum_timeline(multiline: &Value) -> Option<(u64, u64)> {
    let points = multiline.pointer("/default/timelineData")?.as_array()?;
    if points.is_empty() {
        return None;
    }
    let mut bull = 0u64;
    let mut bear = 0u64;
    for point in points {
        let Some(values) = point.get("value").and_then(Value::as_array) else {
            continue;
        };
        bull += values.first().and_then(Value::as_u64).unwrap_or(0);
        bear += values.get(1).and_then(Value::as_u64).unwrap_or(0);
    }
    Some((bull, bear))
}
