use serde::{Deserialize, Serialize};

use crate::venue::Venue;

#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("postgres: {0}")]
    Postgres(#[from] sqlx::Error),
    #[error("csv: {0}")]
    Csv(#[from] csv::Error),
    #[error("serialization failure: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("format mismatch: {0}")]
    FormatMismatch(String),
    #[error("storage task failed: {0}")]
    Task(String),
}

pub type PersistResult<T> = Result<T, PersistError>;

/// How many keys a write created vs. overwrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertSummary {
    pub inserted: usize,
    pub replaced: usize,
}

impl UpsertSummary {
    pub fn rows(&self) -> usize {
        self.inserted + self.replaced
    }
}

/// Aggregated values for one notional tier. All `None` on a failed minute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierAggregate {
    pub notional: f64,
    pub ask_slip_bps: Option<f64>,
    pub bid_slip_bps: Option<f64>,
    pub ask_filled: Option<bool>,
    pub bid_filled: Option<bool>,
    pub ask_filled_notional: Option<f64>,
    pub bid_filled_notional: Option<f64>,
}

impl TierAggregate {
    pub fn label(&self) -> String {
        tier_label(self.notional)
    }
}

/// One stored row per (minute, venue, ticker).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinuteRow {
    pub ts_minute_utc: String,
    pub venue: Venue,
    pub ticker: String,
    pub symbol: String,
    pub samples_total: u32,
    pub samples_success: u32,
    pub book_timestamp_ms: Option<i64>,
    pub collected_at_utc: String,
    pub mid_price: Option<f64>,
    pub best_bid: Option<f64>,
    pub best_ask: Option<f64>,
    pub spread_usd: Option<f64>,
    pub spread_bps: Option<f64>,
    pub tiers: Vec<TierAggregate>,
    pub is_aggregated_estimate: bool,
    pub hyperliquid_n_sig_figs: Option<u32>,
    pub hyperliquid_n_sig_figs_per_tier: Option<Vec<u32>>,
    pub lighter_ws_fallback: bool,
    pub error: Option<String>,
}

impl MinuteRow {
    pub fn key(&self) -> RowKey {
        RowKey { ts_minute_utc: self.ts_minute_utc.clone(), venue: self.venue.key().to_string(), ticker: self.ticker.clone() }
    }

    /// Tier computed for exactly this notional.
    pub fn tier(&self, notional: f64) -> Option<&TierAggregate> {
        self.tiers.iter().find(|t| t.notional == notional)
    }
}

/// Upsert identity shared by every sink.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowKey {
    pub ts_minute_utc: String,
    pub venue: String,
    pub ticker: String,
}

/// Short column suffix for a notional: 1000 -> "1k", 1_000_000 -> "1m".
pub fn tier_label(notional: f64) -> String {
    let n = notional.round() as u64;
    if n >= 1_000_000 && n % 1_000_000 == 0 {
        format!("{}m", n / 1_000_000)
    } else if n >= 1_000 && n % 1_000 == 0 {
        format!("{}k", n / 1_000)
    } else {
        n.to_string()
    }
}
