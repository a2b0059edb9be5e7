use sqlx::types::Json;
use sqlx::Row;
use tracing::{debug, info};

use crate::persist::{MinuteRow, MinuteSink, PersistResult, UpsertSummary};

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS depth_minutes (
    ts_minute_utc TEXT NOT NULL,
    venue TEXT NOT NULL,
    ticker TEXT NOT NULL,
    symbol TEXT NOT NULL,
    samples_total INTEGER NOT NULL,
    samples_success INTEGER NOT NULL,
    book_timestamp_ms BIGINT,
    collected_at_utc TEXT NOT NULL,
    mid_price DOUBLE PRECISION,
    best_bid DOUBLE PRECISION,
    best_ask DOUBLE PRECISION,
    spread_usd DOUBLE PRECISION,
    spread_bps DOUBLE PRECISION,
    tiers JSONB NOT NULL,
    is_aggregated_estimate BOOLEAN NOT NULL,
    hyperliquid_n_sig_figs INTEGER,
    hyperliquid_n_sig_figs_per_tier JSONB,
    lighter_ws_fallback BOOLEAN NOT NULL,
    error TEXT,
    PRIMARY KEY (ts_minute_utc, venue, ticker)
)
"#;

// xmax is 0 only for a freshly inserted tuple
const UPSERT_SQL: &str = r#"
INSERT INTO depth_minutes (
    ts_minute_utc, venue, ticker, symbol, samples_total, samples_success,
    book_timestamp_ms, collected_at_utc, mid_price, best_bid, best_ask,
    spread_usd, spread_bps, tiers, is_aggregated_estimate,
    hyperliquid_n_sig_figs, hyperliquid_n_sig_figs_per_tier, lighter_ws_fallback, error
) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)
ON CONFLICT (ts_minute_utc, venue, ticker) DO UPDATE SET
    symbol = EXCLUDED.symbol,
    samples_total = EXCLUDED.samples_total,
    samples_success = EXCLUDED.samples_success,
    book_timestamp_ms = EXCLUDED.book_timestamp_ms,
    collected_at_utc = EXCLUDED.collected_at_utc,
    mid_price = EXCLUDED.mid_price,
    best_bid = EXCLUDED.best_bid,
    best_ask = EXCLUDED.best_ask,
    spread_usd = EXCLUDED.spread_usd,
    spread_bps = EXCLUDED.spread_bps,
    tiers = EXCLUDED.tiers,
    is_aggregated_estimate = EXCLUDED.is_aggregated_estimate,
    hyperliquid_n_sig_figs = EXCLUDED.hyperliquid_n_sig_figs,
    hyperliquid_n_sig_figs_per_tier = EXCLUDED.hyperliquid_n_sig_figs_per_tier,
    lighter_ws_fallback = EXCLUDED.lighter_ws_fallback,
    error = EXCLUDED.error
RETURNING (xmax = 0) AS inserted
"#;

pub struct PostgresMinuteStore {
    connection_pool: sqlx::PgPool,
}

impl PostgresMinuteStore {
    pub async fn connect(database_url: &str) -> PersistResult<Self> {
        let pool = sqlx::PgPool::connect(database_url).await?;
        sqlx::query(SCHEMA_SQL).execute(&pool).await?;
        info!("Postgres minute store ready");
        Ok(Self { connection_pool: pool })
    }
}

#[async_trait::async_trait]
impl MinuteSink for PostgresMinuteStore {
    async fn upsert_rows(&self, rows: &[MinuteRow]) -> PersistResult<UpsertSummary> {
        let mut tx = self.connection_pool.begin().await?;
        let mut summary = UpsertSummary::default();

        for row in rows {
            let returned = sqlx::query(UPSERT_SQL)
                .bind(&row.ts_minute_utc)
                .bind(row.venue.key())
                .bind(&row.ticker)
                .bind(&row.symbol)
                .bind(row.samples_total as i32)
                .bind(row.samples_success as i32)
                .bind(row.book_timestamp_ms)
                .bind(&row.collected_at_utc)
                .bind(row.mid_price)
                .bind(row.best_bid)
                .bind(row.best_ask)
                .bind(row.spread_usd)
                .bind(row.spread_bps)
                .bind(Json(&row.tiers))
                .bind(row.is_aggregated_estimate)
                .bind(row.hyperliquid_n_sig_figs.map(|n| n as i32))
                .bind(row.hyperliquid_n_sig_figs_per_tier.as_ref().map(Json))
                .bind(row.lighter_ws_fallback)
                .bind(&row.error)
                .fetch_one(&mut *tx)
                .await?;

            if returned.get::<bool, _>("inserted") {
                summary.inserted += 1;
            } else {
                summary.replaced += 1;
            }
        }

        tx.commit().await?;
        debug!(inserted = summary.inserted, replaced = summary.replaced, "Postgres upsert committed");
        Ok(summary)
    }
}
