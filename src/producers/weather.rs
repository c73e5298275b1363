// =============================================================================
// Weather Producer — hail in roofing markets
// =============================================================================
//
// Open-Meteo daily forecast per location.  A WMO code 96 or 99 (thunderstorm
// with hail) today or tomorrow emits one record per roofing ticker.
// =============================================================================

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tracing::{info, warn};

use super::SignalProducer;
use crate::feed;
use crate::runtime_config::WeatherLocation;
use crate::types::SignalRecord;

const OPEN_METEO_URL: &str = "https://api.open-meteo.com/v1/forecast";
const HAIL_CODES: [i64; 2] = [96, 99];
const HAIL_SENTIMENT: f64 = 0.5;
pub const SOURCE: &str = "Weather/Hail";

pub struct WeatherProducer {
    client: reqwest::Client,
    locations: Vec<WeatherLocation>,
    tickers: Vec<String>,
}

impl WeatherProducer {
    pub fn new(
        timeout: Duration,
        locations: Vec<WeatherLocation>,
        tickers: Vec<String>,
    ) -> Result<Self> {
        Ok(Self {
            client: feed::http_client(timeout)?,
            locations,
            tickers,
        })
    }

    async fn forecast(&self, location: &WeatherLocation) -> Result<Value> {
        let lat = location.lat.to_string();
        let lon = location.lon.to_string();
        let resp = self
            .client
            .get(OPEN_METEO_URL)
            .query(&[
                ("latitude", lat.as_str()),
                ("longitude", lon.as_str()),
                ("daily", "weathercode"),
                ("timezone", "auto"),
            ])
            .send()
            .await
            .with_context(|| format!("GET forecast for {}", location.name))?;

        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("forecast for {} returned {}", location.name, status);
        }
        resp.json()
            .await
            .with_context(|| format!("failed to parse forecast for {}", location.name))
    }
}

#[async_trait]
impl SignalProducer for WeatherProducer {
    fn name(&self) -> &str {
        "weather"
    }

    async fn fetch(&self) -> Result<Vec<SignalRecord>> {
        let mut records = Vec::new();
        for location in &self.locations {
            let body = match self.forecast(location).await {
                Ok(body) => body,
                Err(e) => {
                    warn!(location = %location.name, error = %e, "weather fetch failed");
                    continue;
                }
            };
            let events = hail_days(&body);
            for _ in 0..events {
                info!(location = %location.name, "hail forecast detected");
                records.extend(hail_records(&location.name, &self.tickers));
            }
        }
        Ok(records)
    }
}

/// Hail days among today and tomorrow.
pub fn hail_days(forecast: &Value) -> usize {
    forecast
        .pointer("/daily/weathercode")
        .and_then(Value::as_array)
        .map(|codes| {
            codes
                .iter()
                .take(2)
                .filter_map(Value::as_i64)
                .filter(|c| HAIL_CODES.contains(c))
                .count()
        })
        .unwrap_or(0)
}

pub fn hail_records(location: &str, tickers: &[String]) -> Vec<SignalRecord> {
    let timestamp = Utc::now().to_rfc3339();
    let text = format!("Hail Storm in {location}");
    tickers
        .iter()
        .map(|t| SignalRecord::new(t.as_str(), SOURCE, text.as_str(), HAIL_SENTIMENT, timestamp.as_str()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn only_today_and_tomorrow_count() {
        let body = json!({ "daily": { "weathercode": [3, 96, 99, 99] } });
        assert_eq!(hail_days(&body), 1);
        let body = json!({ "daily": { "weathercode": [99, 96] } });
        assert_eq!(hail_days(&body), 2);
    }

    #[test]
    fn malformed_forecast_is_no_hail() {
        assert_eq!(hail_days(&json!({})), 0);
        assert_eq!(hail_days(&json!({ "daily": { "weathercode": "x" } })), 0);
    }

    #[test]
    fn hail_emits_one_record_per_ticker() {
        let tickers = vec!["OC".to_string(), "BECN".to_string(), "ROCK".to_string()];
        let records = hail_records("Dallas_TX", &tickers);
        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| r.source == SOURCE));
        assert!(records.iter().all(|r| (r.sentiment_score - 0.5).abs() < f64::EPSILON));
        assert_eq!(records[0].raw_text, "Hail Storm in Dallas_TX");
    }
}
