pub mod types;
pub use types::*;
pub mod csv_store;
pub mod error_log;
pub mod postgres;
pub mod sqlite;

use async_trait::async_trait;

/// Durable home for minute rows. A row whose (minute, venue, ticker) key is
/// already stored replaces it; any other row is appended.
#[async_trait]
pub trait MinuteSink: Send + Sync {
    async fn upsert_rows(&self, rows: &[MinuteRow]) -> PersistResult<UpsertSummary>;
}
