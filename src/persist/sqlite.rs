// SQLite minute store. One transaction per batch; the primary key makes the
// upsert idempotent across restarts.

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::persist::{MinuteRow, MinuteSink, PersistError, PersistResult, TierAggregate, UpsertSummary};
use crate::venue::Venue;

const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;

CREATE TABLE IF NOT EXISTS depth_minutes (
    ts_minute_utc TEXT NOT NULL,
    venue TEXT NOT NULL,
    ticker TEXT NOT NULL,
    symbol TEXT NOT NULL,
    samples_total INTEGER NOT NULL,
    samples_success INTEGER NOT NULL,
    book_timestamp_ms INTEGER,
    collected_at_utc TEXT NOT NULL,
    mid_price REAL,
    best_bid REAL,
    best_ask REAL,
    spread_usd REAL,
    spread_bps REAL,
    tiers_json TEXT NOT NULL,
    is_aggregated_estimate INTEGER NOT NULL,
    hyperliquid_n_sig_figs INTEGER,
    hyperliquid_n_sig_figs_per_tier TEXT,
    lighter_ws_fallback INTEGER NOT NULL,
    error TEXT,
    PRIMARY KEY (ts_minute_utc, venue, ticker)
) WITHOUT ROWID;

CREATE INDEX IF NOT EXISTS idx_depth_minutes_venue_ticker
    ON depth_minutes(venue, ticker, ts_minute_utc DESC);
"#;

const UPSERT_SQL: &str = r#"
INSERT INTO depth_minutes (
    ts_minute_utc, venue, ticker, symbol, samples_total, samples_success,
    book_timestamp_ms, collected_at_utc, mid_price, best_bid, best_ask,
    spread_usd, spread_bps, tiers_json, is_aggregated_estimate,
    hyperliquid_n_sig_figs, hyperliquid_n_sig_figs_per_tier, lighter_ws_fallback, error
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)
ON CONFLICT(ts_minute_utc, venue, ticker) DO UPDATE SET
    symbol = excluded.symbol,
    samples_total = excluded.samples_total,
    samples_success = excluded.samples_success,
    book_timestamp_ms = excluded.book_timestamp_ms,
    collected_at_utc = excluded.collected_at_utc,
    mid_price = excluded.mid_price,
    best_bid = excluded.best_bid,
    best_ask = excluded.best_ask,
    spread_usd = excluded.spread_usd,
    spread_bps = excluded.spread_bps,
    tiers_json = excluded.tiers_json,
    is_aggregated_estimate = excluded.is_aggregated_estimate,
    hyperliquid_n_sig_figs = excluded.hyperliquid_n_sig_figs,
    hyperliquid_n_sig_figs_per_tier = excluded.hyperliquid_n_sig_figs_per_tier,
    lighter_ws_fallback = excluded.lighter_ws_fallback,
    error = excluded.error
"#;

pub struct SqliteMinuteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteMinuteStore {
    pub fn open(path: &Path) -> PersistResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        info!(path = %path.display(), "SQLite minute store opened");
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> PersistResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> PersistResult<Self> {
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    pub fn count(&self) -> PersistResult<usize> {
        let n: i64 = self.conn.lock().query_row("SELECT COUNT(*) FROM depth_minutes", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    /// Stored row for one key, if any.
    pub fn get(&self, ts_minute_utc: &str, venue: Venue, ticker: &str) -> PersistResult<Option<MinuteRow>> {
        let conn = self.conn.lock();
        let stored = conn
            .query_row(
                "SELECT * FROM depth_minutes WHERE ts_minute_utc = ?1 AND venue = ?2 AND ticker = ?3",
                params![ts_minute_utc, venue.key(), ticker],
                StoredRow::from_row,
            )
            .optional()?;
        stored.map(StoredRow::into_minute_row).transpose()
    }
}

#[async_trait::async_trait]
impl MinuteSink for SqliteMinuteStore {
    async fn upsert_rows(&self, rows: &[MinuteRow]) -> PersistResult<UpsertSummary> {
        let conn = Arc::clone(&self.conn);
        let rows = rows.to_vec();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock();
            upsert_blocking(&mut conn, &rows)
        })
        .await
        .map_err(|e| PersistError::Task(e.to_string()))?
    }
}

fn upsert_blocking(conn: &mut Connection, rows: &[MinuteRow]) -> PersistResult<UpsertSummary> {
    let tx = conn.transaction()?;
    let mut summary = UpsertSummary::default();
    {
        let mut exists =
            tx.prepare_cached("SELECT 1 FROM depth_minutes WHERE ts_minute_utc = ?1 AND venue = ?2 AND ticker = ?3")?;
        let mut upsert = tx.prepare_cached(UPSERT_SQL)?;

        for row in rows {
            let present = exists.exists(params![row.ts_minute_utc, row.venue.key(), row.ticker])?;
            let tiers_json = serde_json::to_string(&row.tiers)?;
            let per_tier_json = row.hyperliquid_n_sig_figs_per_tier.as_ref().map(serde_json::to_string).transpose()?;

            upsert.execute(params![
                row.ts_minute_utc,
                row.venue.key(),
                row.ticker,
                row.symbol,
                row.samples_total,
                row.samples_success,
                row.book_timestamp_ms,
                row.collected_at_utc,
                row.mid_price,
                row.best_bid,
                row.best_ask,
                row.spread_usd,
                row.spread_bps,
                tiers_json,
                row.is_aggregated_estimate,
                row.hyperliquid_n_sig_figs,
                per_tier_json,
                row.lighter_ws_fallback,
                row.error,
            ])?;

            if present {
                summary.replaced += 1;
            } else {
                summary.inserted += 1;
            }
        }
    }
    tx.commit()?;
    debug!(inserted = summary.inserted, replaced = summary.replaced, "SQLite upsert committed");
    Ok(summary)
}

// Column values as SQLite hands them back, before venue/JSON decoding
struct StoredRow {
    ts_minute_utc: String,
    venue: String,
    ticker: String,
    symbol: String,
    samples_total: u32,
    samples_success: u32,
    book_timestamp_ms: Option<i64>,
    collected_at_utc: String,
    mid_price: Option<f64>,
    best_bid: Option<f64>,
    best_ask: Option<f64>,
    spread_usd: Option<f64>,
    spread_bps: Option<f64>,
    tiers_json: String,
    is_aggregated_estimate: bool,
    hyperliquid_n_sig_figs: Option<u32>,
    per_tier_json: Option<String>,
    lighter_ws_fallback: bool,
    error: Option<String>,
}

impl StoredRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            ts_minute_utc: row.get("ts_minute_utc")?,
            venue: row.get("venue")?,
            ticker: row.get("ticker")?,
            symbol: row.get("symbol")?,
            samples_total: row.get("samples_total")?,
            samples_success: row.get("samples_success")?,
            book_timestamp_ms: row.get("book_timestamp_ms")?,
            collected_at_utc: row.get("collected_at_utc")?,
            mid_price: row.get("mid_price")?,
            best_bid: row.get("best_bid")?,
            best_ask: row.get("best_ask")?,
            spread_usd: row.get("spread_usd")?,
            spread_bps: row.get("spread_bps")?,
            tiers_json: row.get("tiers_json")?,
            is_aggregated_estimate: row.get("is_aggregated_estimate")?,
            hyperliquid_n_sig_figs: row.get("hyperliquid_n_sig_figs")?,
            per_tier_json: row.get("hyperliquid_n_sig_figs_per_tier")?,
            lighter_ws_fallback: row.get("lighter_ws_fallback")?,
            error: row.get("error")?,
        })
    }

    fn into_minute_row(self) -> PersistResult<MinuteRow> {
        let venue: Venue = self.venue.parse().map_err(|e| PersistError::FormatMismatch(format!("{e}")))?;
        let tiers: Vec<TierAggregate> = serde_json::from_str(&self.tiers_json)?;
        let per_tier = self.per_tier_json.as_deref().map(serde_json::from_str).transpose()?;
        Ok(MinuteRow {
            ts_minute_utc: self.ts_minute_utc,
            venue,
            ticker: self.ticker,
            symbol: self.symbol,
            samples_total: self.samples_total,
            samples_success: self.samples_success,
            book_timestamp_ms: self.book_timestamp_ms,
            collected_at_utc: self.collected_at_utc,
            mid_price: self.mid_price,
            best_bid: self.best_bid,
            best_ask: self.best_ask,
            spread_usd: self.spread_usd,
            spread_bps: self.spread_bps,
            tiers,
            is_aggregated_estimate: self.is_aggregated_estimate,
            hyperliquid_n_sig_figs: self.hyperliquid_n_sig_figs,
            hyperliquid_n_sig_figs_per_tier: per_tier,
            lighter_ws_fallback: self.lighter_ws_fallback,
            error: self.error,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn row(minute: &str, venue: Venue, ticker: &str, spread_bps: f64) -> MinuteRow {
        MinuteRow {
            ts_minute_utc: minute.to_string(),
            venue,
            ticker: ticker.to_string(),
            symbol: format!("{ticker}USDT"),
            samples_total: 4,
            samples_success: 4,
            book_timestamp_ms: Some(1_700_000_000_000),
            collected_at_utc: "2024-05-01T12:00:46.120Z".to_string(),
            mid_price: Some(100.0),
            best_bid: Some(99.99),
            best_ask: Some(100.01),
            spread_usd: Some(0.02),
            spread_bps: Some(spread_bps),
            tiers: vec![TierAggregate {
                notional: 1_000.0,
                ask_slip_bps: Some(1.0),
                bid_slip_bps: Some(1.5),
                ask_filled: Some(true),
                bid_filled: Some(false),
                ask_filled_notional: Some(1_000.0),
                bid_filled_notional: Some(640.5),
            }],
            is_aggregated_estimate: false,
            hyperliquid_n_sig_figs: None,
            hyperliquid_n_sig_figs_per_tier: None,
            lighter_ws_fallback: false,
            error: None,
        }
    }

    #[tokio::test]
    async fn test_second_write_replaces() {
        let store = SqliteMinuteStore::open_in_memory().unwrap();
        let first = row("2024-05-01T12:00:00Z", Venue::Binance, "BTC", 1.0);
        let second = row("2024-05-01T12:00:00Z", Venue::Binance, "BTC", 9.0);

        let s1 = store.upsert_rows(&[first]).await.unwrap();
        assert_eq!(s1, UpsertSummary { inserted: 1, replaced: 0 });
        let s2 = store.upsert_rows(&[second.clone()]).await.unwrap();
        assert_eq!(s2, UpsertSummary { inserted: 0, replaced: 1 });

        assert_eq!(store.count().unwrap(), 1);
        let stored = store.get("2024-05-01T12:00:00Z", Venue::Binance, "BTC").unwrap().unwrap();
        assert_eq!(stored, second);
    }

    #[tokio::test]
    async fn test_distinct_keys_append() {
        let store = SqliteMinuteStore::open_in_memory().unwrap();
        let rows = vec![
            row("2024-05-01T12:00:00Z", Venue::Binance, "BTC", 1.0),
            row("2024-05-01T12:00:00Z", Venue::Bybit, "BTC", 1.0),
            row("2024-05-01T12:01:00Z", Venue::Binance, "BTC", 1.0),
        ];
        let summary = store.upsert_rows(&rows).await.unwrap();
        assert_eq!(summary.inserted, 3);
        assert_eq!(store.count().unwrap(), 3);
    }

    #[tokio::test]
    async fn test_idempotent_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/depth.sqlite");
        {
            let store = SqliteMinuteStore::open(&path).unwrap();
            store.upsert_rows(&[row("2024-05-01T12:00:00Z", Venue::Dydx, "ETH", 2.0)]).await.unwrap();
        }

        let mut failed = row("2024-05-01T12:00:00Z", Venue::Dydx, "ETH", 0.0);
        failed.samples_success = 0;
        failed.spread_bps = None;
        failed.hyperliquid_n_sig_figs_per_tier = Some(vec![5, 4]);
        failed.error = Some("timeout: request timed out after 10000ms".into());

        let store = SqliteMinuteStore::open(&path).unwrap();
        let summary = store.upsert_rows(&[failed.clone()]).await.unwrap();
        assert_eq!(summary.replaced, 1);
        assert_eq!(store.count().unwrap(), 1);
        assert_eq!(store.get("2024-05-01T12:00:00Z", Venue::Dydx, "ETH").unwrap(), Some(failed));
    }
}
