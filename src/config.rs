//! Sampler configuration: file + `DEPTH_SAMPLER__*` environment layered over
//! defaults, validated before any sampling starts.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::{info, warn};

use crate::ingest::retry::RetryPolicy;
use crate::pairs::PairMap;
use crate::persist::tier_label;
use crate::venue::{Venue, DEFAULT_TIERS};

pub const ENV_PREFIX: &str = "DEPTH_SAMPLER";

// Projected usage at or above this share of a venue's budget is logged
pub const BUDGET_WARN_PCT: f64 = 80.0;
// ...and at or above this it is rejected unless overridden
pub const BUDGET_REJECT_PCT: f64 = 100.0;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("unknown ticker in config: {0} (add it to the pair map first)")]
    UnknownTicker(String),
    #[error("no venues configured")]
    NoVenues,
    #[error("sample_offsets_sec has {offsets} entries but samples_per_minute is {samples}")]
    OffsetCount { offsets: usize, samples: usize },
    #[error("sample offset {0}s is outside the minute")]
    OffsetRange(u32),
    #[error("at least one notional tier is required")]
    EmptyTiers,
    #[error("notional tier {0} must be a positive finite amount")]
    InvalidTier(f64),
    #[error("notional tiers {0} and {1} share the column label {2}")]
    DuplicateTierLabel(f64, f64, String),
    #[error("retry_max_attempts must be at least 1")]
    ZeroAttempts,
    #[error(
        "{venue}: projected {weight_per_min:.0}w/min exceeds budget {budget_per_min:.0}w/min ({usage_pct:.1}%); \
         reduce tickers or set allow_over_budget_override=true"
    )]
    OverBudget { venue: Venue, weight_per_min: f64, budget_per_min: f64, usage_pct: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum StorageKind {
    Sqlite,
    Csv,
    Postgres,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    pub pairs: Vec<String>,
    pub venues: Vec<Venue>,
    pub samples_per_minute: usize,
    pub sample_offsets_sec: Vec<u32>,
    pub run_duration_minutes: u64,
    pub fetch_timeout_ms: u64,
    pub stream_timeout_ms: u64,
    pub retry_max_attempts: u32,
    pub retry_backoff_ms: u64,
    pub depth_limit_by_venue: BTreeMap<Venue, usize>,
    pub tiers: Vec<f64>,
    pub rate_limit_guardrails_enabled: bool,
    pub allow_over_budget_override: bool,
    pub enable_lighter_ws_fallback: bool,
    pub enable_hyperliquid_adaptive_sigfigs: bool,
    pub stale_slack_ms: u64,
    pub log_level: String,
    pub log_json: bool,
    pub metrics_port: u16,
    pub storage: StorageKind,
    pub sqlite_path: PathBuf,
    pub csv_dir: PathBuf,
    pub database_url: Option<String>,
    pub error_log_dir: PathBuf,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            pairs: PairMap::builtin().canonical_tickers(),
            venues: Venue::ALL.to_vec(),
            samples_per_minute: 4,
            sample_offsets_sec: vec![0, 15, 30, 45],
            run_duration_minutes: 15,
            fetch_timeout_ms: 10_000,
            stream_timeout_ms: 8_000,
            retry_max_attempts: 2,
            retry_backoff_ms: 500,
            depth_limit_by_venue: BTreeMap::new(),
            tiers: DEFAULT_TIERS.to_vec(),
            rate_limit_guardrails_enabled: true,
            allow_over_budget_override: false,
            enable_lighter_ws_fallback: true,
            enable_hyperliquid_adaptive_sigfigs: true,
            stale_slack_ms: 1_000,
            log_level: "info".to_string(),
            log_json: false,
            metrics_port: 9000,
            storage: StorageKind::Sqlite,
            sqlite_path: PathBuf::from("data/depth.sqlite"),
            csv_dir: PathBuf::from("data"),
            database_url: None,
            error_log_dir: PathBuf::from("data/logs"),
        }
    }
}

/// Projected request weight for one venue against its budget, per minute.
#[derive(Debug, Clone, PartialEq)]
pub struct BudgetUsage {
    pub venue: Venue,
    pub weight_per_min: f64,
    pub budget_per_min: f64,
    pub usage_pct: f64,
}

impl SamplingConfig {
    /// Load from an optional file plus environment, then validate against `pairs`.
    pub fn load(path: Option<&Path>, pairs: &PairMap) -> Result<Self, ConfigError> {
        let cfg = Self::from_sources(path)?;
        cfg.validate(pairs)?;
        Ok(cfg)
    }

    /// Layered load without validation, for callers that adjust fields first.
    pub fn from_sources(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("pairs")
                .with_list_parse_key("venues")
                .with_list_parse_key("sample_offsets_sec")
                .with_list_parse_key("tiers"),
        );

        let mut cfg: SamplingConfig = builder.build()?.try_deserialize()?;
        if cfg.database_url.is_none() {
            cfg.database_url = std::env::var("DATABASE_URL").ok();
        }
        Ok(cfg)
    }

    pub fn validate(&self, pairs: &PairMap) -> Result<(), ConfigError> {
        if let Some(unknown) = self.pairs.iter().find(|t| !pairs.contains(t)) {
            return Err(ConfigError::UnknownTicker(unknown.clone()));
        }
        if self.venues.is_empty() {
            return Err(ConfigError::NoVenues);
        }
        if self.sample_offsets_sec.len() != self.samples_per_minute {
            return Err(ConfigError::OffsetCount {
                offsets: self.sample_offsets_sec.len(),
                samples: self.samples_per_minute,
            });
        }
        if let Some(&bad) = self.sample_offsets_sec.iter().find(|&&o| o >= 60) {
            return Err(ConfigError::OffsetRange(bad));
        }
        if self.tiers.is_empty() {
            return Err(ConfigError::EmptyTiers);
        }
        if let Some(&bad) = self.tiers.iter().find(|t| !t.is_finite() || **t <= 0.0) {
            return Err(ConfigError::InvalidTier(bad));
        }
        for (i, &a) in self.tiers.iter().enumerate() {
            if let Some(&b) = self.tiers[i + 1..].iter().find(|&&b| tier_label(a) == tier_label(b)) {
                return Err(ConfigError::DuplicateTierLabel(a, b, tier_label(a)));
            }
        }
        if self.retry_max_attempts == 0 {
            return Err(ConfigError::ZeroAttempts);
        }
        if self.rate_limit_guardrails_enabled {
            self.check_rate_budgets()?;
        }
        Ok(())
    }

    pub fn budget_usage(&self) -> Vec<BudgetUsage> {
        let calls_per_min = (self.pairs.len() * self.samples_per_minute) as f64;
        self.venues
            .iter()
            .map(|&venue| {
                let limits = venue.rate_budget();
                let windows_per_min = 60.0 / f64::from(limits.window_sec);
                let budget_per_min = f64::from(limits.budget) * windows_per_min;
                let weight_per_min = calls_per_min * f64::from(limits.weight_per_call);
                BudgetUsage {
                    venue,
                    weight_per_min,
                    budget_per_min,
                    usage_pct: weight_per_min / budget_per_min * 100.0,
                }
            })
            .collect()
    }

    fn check_rate_budgets(&self) -> Result<(), ConfigError> {
        for usage in self.budget_usage() {
            if usage.usage_pct >= BUDGET_REJECT_PCT && !self.allow_over_budget_override {
                return Err(ConfigError::OverBudget {
                    venue: usage.venue,
                    weight_per_min: usage.weight_per_min,
                    budget_per_min: usage.budget_per_min,
                    usage_pct: usage.usage_pct,
                });
            }
            if usage.usage_pct >= BUDGET_WARN_PCT {
                warn!(
                    venue = %usage.venue,
                    weight_per_min = usage.weight_per_min,
                    budget_per_min = usage.budget_per_min,
                    "Projected rate usage at {:.1}%",
                    usage.usage_pct
                );
            } else {
                info!(venue = %usage.venue, usage_pct = usage.usage_pct, "Rate budget ok");
            }
        }
        Ok(())
    }

    pub fn depth_limit(&self, venue: Venue) -> usize {
        self.depth_limit_by_venue.get(&venue).copied().unwrap_or_else(|| venue.default_depth())
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn stream_timeout(&self) -> Duration {
        Duration::from_millis(self.stream_timeout_ms)
    }

    pub fn stale_slack(&self) -> Duration {
        Duration::from_millis(self.stale_slack_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_max_attempts, Duration::from_millis(self.retry_backoff_ms))
    }
}
