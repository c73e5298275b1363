// =============================================================================
// Yahoo Finance — analyst consensus and price history
// =============================================================================
//
// Two public JSON endpoints:
//   quoteSummary (financialData)  -> recommendationMean (1 = strong buy, 5 = sell)
//   chart (1mo of daily bars)     -> live price + daily-return volatility
// =============================================================================

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::{ConsensusProvider, MarketDataProvider, PriceContext};
use crate::feed;
use crate::risk::daily_return_volatility;

const YAHOO_BASE_URL: &str = "https://query1.finance.yahoo.com";

pub struct YahooFinance {
    client: reqwest::Client,
    base_url: String,
}

impl YahooFinance {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: feed::http_client(timeout)?,
            base_url: YAHOO_BASE_URL.to_string(),
        })
    }

    async fn get_json(&self, path: &str, query: &[(&str, &str)]) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .with_context(|| format!("GET {path}"))?;

        let status = resp.status();
        let body: Value = resp
            .json()
            .await
            .with_context(|| format!("failed to parse {path} response body"))?;

        if !status.is_success() {
            anyhow::bail!("Yahoo {} returned {}: {}", path, status, body);
        }
        Ok(body)
    }
}

#[async_trait]
impl ConsensusProvider for YahooFinance {
    async fn consensus(&self, ticker: &str) -> Result<Option<f64>> {
        let path = format!("/v10/finance/quoteSummary/{ticker}");
        let body = self.get_json(&path, &[("modules", "financialData")]).await?;
        let mean = parse_recommendation_mean(&body);
        debug!(ticker, ?mean, "analyst consensus fetched");
        Ok(mean)
    }
}

#[async_trait]
impl MarketDataProvider for YahooFinance {
    async fn price_context(&self, ticker: &str) -> Result<PriceContext> {
        let path = format!("/v8/finance/chart/{ticker}");
        let body = self
            .get_json(&path, &[("range", "1mo"), ("interval", "1d")])
            .await?;
        let ctx = parse_chart(&body);
        debug!(ticker, price = ?ctx.price, volatility = ?ctx.volatility, "price context fetched");
        Ok(ctx)
    }
}

/// `quoteSummary.result[0].financialData.recommendationMean.raw`
pub fn parse_recommendation_mean(body: &Value) -> Option<f64> {
    let fd = body
        .get("quoteSummary")?
        .get("result")?
        .get(0)?
        .get("financialData")?;
    let mean = fd.get("recommendationMean")?;
    mean.get("raw")
        .and_then(Value::as_f64)
        .or_else(|| mean.as_f64())
        .filter(|m| m.is_finite() && *m > 0.0)
}

/// Live price (falling back to the last close) and daily-return volatility.
pub fn parse_chart(body: &Value) -> PriceContext {
    let Some(result) = body.pointer("/chart/result/0") else {
        return PriceContext::default();
    };

    let closes: Vec<f64> = result
        .pointer("/indicators/quote/0/close")
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(Value::as_f64).collect())
        .unwrap_or_default();

    let price = result
        .pointer("/meta/regularMarketPrice")
        .and_then(Value::as_f64)
        .or_else(|| closes.last().copied())
        .filter(|p| *p > 0.0);

    PriceContext {
        price,
        volatility: daily_return_volatility(&closes),
    }
}
