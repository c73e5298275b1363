// =============================================================================
// Runtime Configuration — pipeline settings with atomic save
// =============================================================================
//
// Every tunable of a pipeline run lives here: artifact paths, the risk
// budget, collaborator endpoints and the feature flags that switch optional
// stages on or off.  The file is read once at start-up; the orchestrator gets
// an owned copy for the lifetime of one run.
//
// All fields carry `#[serde(default)]` so that adding new fields never breaks
// loading an older config file.
//
// =============================================================================

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_true() -> bool {
    true
}

fn default_history_path() -> PathBuf {
    PathBuf::from("data/history.json")
}

fn default_ledger_path() -> PathBuf {
    PathBuf::from("data/current_signals.json")
}

fn default_dashboard_path() -> PathBuf {
    PathBuf::from("web/data.json")
}

fn default_alias_paths() -> Vec<PathBuf> {
    vec![
        PathBuf::from("data/sp500.json"),
        PathBuf::from("data/companies.json"),
    ]
}

fn default_risk_budget() -> f64 {
    10_000.0
}

fn default_target_risk_fraction() -> f64 {
    0.02
}

fn default_reference_price() -> f64 {
    100.0
}

fn default_volatility() -> f64 {
    0.05
}

fn default_verification_threshold() -> u64 {
    1
}

fn default_blind_spot_threshold() -> u64 {
    10
}

fn default_news_lookback_hours() -> u64 {
    48
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_producer_timeout_secs() -> u64 {
    60
}

fn default_verification_concurrency() -> usize {
    4
}

fn default_fetch_concurrency() -> usize {
    4
}

fn default_nitter_instances() -> Vec<String> {
    vec![
        "https://nitter.net".to_string(),
        "https://nitter.cz".to_string(),
        "https://nitter.privacydev.net".to_string(),
        "https://nitter.projectsegfau.lt".to_string(),
        "https://nitter.eu".to_string(),
    ]
}

fn default_subreddits() -> Vec<String> {
    [
        "wallstreetbets",
        "stocks",
        "investing",
        "options",
        "pennystocks",
        "stockmarket",
        "thetagang",
        "dividends",
        "SPACs",
        "smallstreetbets",
        "Daytrading",
        "SwingTrading",
        "ValueInvesting",
        "SecurityAnalysis",
        "shortsqueeze",
        "RobinHood",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_reddit_limit() -> usize {
    50
}

fn default_crowd_comment_limit() -> usize {
    5
}

fn default_instagram_usernames() -> Vec<String> {
    vec![
        "financeinfluencer1".to_string(),
        "financeinfluencer2".to_string(),
    ]
}

fn default_tiktok_tags() -> Vec<String> {
    vec!["finance".to_string(), "stockmarket".to_string()]
}

fn default_social_limit() -> usize {
    5
}

fn default_rsshub_url() -> String {
    "https://rsshub.app".to_string()
}

fn default_weather_locations() -> Vec<WeatherLocation> {
    vec![
        WeatherLocation::new("Dallas_TX", 32.7767, -96.7970),
        WeatherLocation::new("Denver_CO", 39.7392, -104.9903),
        WeatherLocation::new("Minneapolis_MN", 44.9778, -93.2650),
    ]
}

fn default_hail_tickers() -> Vec<String> {
    vec!["OC".to_string(), "BECN".to_string(), "ROCK".to_string()]
}

// =============================================================================
// WeatherLocation
// =============================================================================

/// A city watched for hail events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherLocation {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
}

impl WeatherLocation {
    pub fn new(name: impl Into<String>, lat: f64, lon: f64) -> Self {
        Self {
            name: name.into(),
            lat,
            lon,
        }
    }
}

// =============================================================================
// RiskParams
// =============================================================================

/// Inputs to the volatility-targeting position sizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskParams {
    /// Capital bucket the sizer allocates from.
    #[serde(default = "default_risk_budget")]
    pub risk_budget: f64,

    /// Fraction of the bucket put at risk per trade (0.02 = 2 %).
    #[serde(default = "default_target_risk_fraction")]
    pub target_risk_fraction: f64,

    /// Price used for sizing when no live quote is known. With the market
    /// overlay on, live quotes take precedence, so share counts differ from a
    /// run that always sizes at this price; turn the overlay off to size every
    /// ticker at the reference price.
    #[serde(default = "default_reference_price")]
    pub reference_price: f64,

    /// Volatility assumed when no price history is available.
    #[serde(default = "default_volatility")]
    pub default_volatility: f64,
}

impl Default for RiskParams {
    fn default() -> Self {
        Self {
            risk_budget: default_risk_budget(),
            target_risk_fraction: default_target_risk_fraction(),
            reference_price: default_reference_price(),
            default_volatility: default_volatility(),
        }
    }
}

// =============================================================================
// RuntimeConfig
// =============================================================================

/// Top-level configuration for a pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    // --- Artifacts -----------------------------------------------------------

    /// Previous-run snapshot used for velocity.
    #[serde(default = "default_history_path")]
    pub history_path: PathBuf,

    /// Final signal list.
    #[serde(default = "default_ledger_path")]
    pub ledger_path: PathBuf,

    /// `{metadata, signals}` document consumed by the web dashboard.
    #[serde(default = "default_dashboard_path")]
    pub dashboard_path: PathBuf,

    /// Alias tables, first existing file wins.
    #[serde(default = "default_alias_paths")]
    pub alias_paths: Vec<PathBuf>,

    // --- Risk ----------------------------------------------------------------

    #[serde(default)]
    pub risk: RiskParams,

    // --- Stage thresholds -----------------------------------------------------

    /// Minimum count before a ticker is cross-verified.
    #[serde(default = "default_verification_threshold")]
    pub verification_threshold: u64,

    /// News volume at or below this marks a blind spot.
    #[serde(default = "default_blind_spot_threshold")]
    pub blind_spot_threshold: u64,

    #[serde(default = "default_news_lookback_hours")]
    pub news_lookback_hours: u64,

    // --- Timeouts & concurrency ----------------------------------------------

    /// Per HTTP request.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Upper bound on one producer's whole `produce()` call. Never less than
    /// two request timeouts.
    #[serde(default = "default_producer_timeout_secs")]
    pub producer_timeout_secs: u64,

    /// Concurrent requests inside a multi-feed producer (subreddits, comments).
    #[serde(default = "default_fetch_concurrency")]
    pub fetch_concurrency: usize,

    /// Concurrent per-ticker queries during verification and enrichment.
    #[serde(default = "default_verification_concurrency")]
    pub verification_concurrency: usize,

    // --- Sources -------------------------------------------------------------

    #[serde(default = "default_nitter_instances")]
    pub nitter_instances: Vec<String>,

    #[serde(default = "default_subreddits")]
    pub subreddits: Vec<String>,

    #[serde(default = "default_reddit_limit")]
    pub reddit_limit: usize,

    #[serde(default = "default_crowd_comment_limit")]
    pub crowd_comment_limit: usize,

    #[serde(default = "default_instagram_usernames")]
    pub instagram_usernames: Vec<String>,

    #[serde(default = "default_social_limit")]
    pub instagram_limit: usize,

    #[serde(default = "default_tiktok_tags")]
    pub tiktok_tags: Vec<String>,

    #[serde(default = "default_social_limit")]
    pub tiktok_limit: usize,

    #[serde(default = "default_rsshub_url")]
    pub rsshub_url: String,

    #[serde(default = "default_weather_locations")]
    pub weather_locations: Vec<WeatherLocation>,

    /// Tickers tagged when hail is forecast (roofing suppliers).
    #[serde(default = "default_hail_tickers")]
    pub hail_tickers: Vec<String>,

    // --- Feature flags -------------------------------------------------------

    #[serde(default = "default_true")]
    pub enable_weather: bool,

    #[serde(default = "default_true")]
    pub enable_trends: bool,

    #[serde(default = "default_true")]
    pub enable_reddit: bool,

    #[serde(default = "default_true")]
    pub enable_instagram: bool,

    #[serde(default = "default_true")]
    pub enable_tiktok: bool,

    /// Secondary cashtag search over the Nitter pool.
    #[serde(default = "default_true")]
    pub enable_cross_verification: bool,

    /// Blend top-comment sentiment into Reddit posts. Off by default: it
    /// multiplies Reddit request volume.
    #[serde(default)]
    pub enable_crowd_verification: bool,

    /// Live price, volatility and search-interest overlay.
    #[serde(default = "default_true")]
    pub enable_market_overlay: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            history_path: default_history_path(),
            ledger_path: default_ledger_path(),
            dashboard_path: default_dashboard_path(),
            alias_paths: default_alias_paths(),
            risk: RiskParams::default(),
            verification_threshold: default_verification_threshold(),
            blind_spot_threshold: default_blind_spot_threshold(),
            news_lookback_hours: default_news_lookback_hours(),
            request_timeout_secs: default_request_timeout_secs(),
            producer_timeout_secs: default_producer_timeout_secs(),
            fetch_concurrency: default_fetch_concurrency(),
            verification_concurrency: default_verification_concurrency(),
            nitter_instances: default_nitter_instances(),
            subreddits: default_subreddits(),
            reddit_limit: default_reddit_limit(),
            crowd_comment_limit: default_crowd_comment_limit(),
            instagram_usernames: default_instagram_usernames(),
            instagram_limit: default_social_limit(),
            tiktok_tags: default_tiktok_tags(),
            tiktok_limit: default_social_limit(),
            rsshub_url: default_rsshub_url(),
            weather_locations: default_weather_locations(),
            hail_tickers: default_hail_tickers(),
            enable_weather: true,
            enable_trends: true,
            enable_reddit: true,
            enable_instagram: true,
            enable_tiktok: true,
            enable_cross_verification: true,
            enable_crowd_verification: false,
            enable_market_overlay: true,
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read runtime config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse runtime config from {}", path.display()))?;

        info!(
            path = %path.display(),
            subreddits = config.subreddits.len(),
            cross_verification = config.enable_cross_verification,
            "runtime config loaded"
        );

        Ok(config)
    }

    /// Persist the configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise runtime config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "runtime config saved (atomic)");
        Ok(())
    }

    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn producer_timeout(&self) -> std::time::Duration {
        let floor = self.request_timeout() * 2;
        std::time::Duration::from_secs(self.producer_timeout_secs).max(floor)
    }

    /// Point at which a multi-feed producer stops waiting and returns what it
    /// has, one request timeout ahead of the hard producer timeout.
    pub fn producer_deadline(&self) -> std::time::Duration {
        self.producer_timeout() - self.request_timeout()
    }

    /// Run lock lives next to the history snapshot.
    pub fn lock_path(&self) -> PathBuf {
        self.history_path.with_extension("lock")
    }
}
