// Monthly CSV files (`<dir>/YYYY-MM.csv`). Upserts read the month back with a
// real CSV reader, replace rows by key, and swap the file in via rename.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ahash::AHashMap;
use csv::StringRecord;
use itertools::Itertools;
use parking_lot::Mutex;
use tracing::debug;

use crate::persist::{tier_label, MinuteRow, MinuteSink, PersistError, PersistResult, RowKey, UpsertSummary};

const LEADING_COLUMNS: [&str; 13] = [
    "ts_minute_utc",
    "venue",
    "ticker",
    "symbol",
    "samples_total",
    "samples_success",
    "book_timestamp_ms",
    "collected_at_utc",
    "mid_price",
    "best_bid",
    "best_ask",
    "spread_usd",
    "spread_bps",
];

const TRAILING_COLUMNS: [&str; 5] = [
    "is_aggregated_estimate",
    "hyperliquid_n_sig_figs",
    "hyperliquid_n_sig_figs_per_tier",
    "lighter_ws_fallback",
    "error",
];

const TIER_COLUMNS: [&str; 6] =
    ["ask_slip", "bid_slip", "ask_fill", "bid_fill", "ask_filled_notional", "bid_filled_notional"];

pub struct CsvMinuteStore {
    dir: PathBuf,
    tiers: Vec<f64>,
    write_lock: Arc<Mutex<()>>,
}

impl CsvMinuteStore {
    /// `tiers` fixes the per-tier column set for every file this store writes.
    pub fn new(dir: impl Into<PathBuf>, tiers: &[f64]) -> Self {
        Self { dir: dir.into(), tiers: tiers.to_vec(), write_lock: Arc::new(Mutex::new(())) }
    }

    pub fn headers(&self) -> Vec<String> {
        headers_for(&self.tiers)
    }

    pub fn month_path(&self, month: &str) -> PathBuf {
        self.dir.join(format!("{month}.csv"))
    }

    /// Header and data records of one month file.
    pub fn read_month(&self, month: &str) -> PersistResult<(StringRecord, Vec<StringRecord>)> {
        read_file(&self.month_path(month))
    }
}

#[async_trait::async_trait]
impl MinuteSink for CsvMinuteStore {
    async fn upsert_rows(&self, rows: &[MinuteRow]) -> PersistResult<UpsertSummary> {
        let mut by_month: BTreeMap<String, Vec<StringRecord>> = BTreeMap::new();
        for row in rows {
            by_month.entry(month_of(&row.ts_minute_utc)?).or_default().push(encode_row(row, &self.tiers));
        }

        let dir = self.dir.clone();
        let headers = self.headers();
        let lock = Arc::clone(&self.write_lock);
        tokio::task::spawn_blocking(move || -> PersistResult<UpsertSummary> {
            let _guard = lock.lock();
            fs::create_dir_all(&dir)?;
            let mut total = UpsertSummary::default();
            for (month, records) in by_month {
                let summary = upsert_month(&dir.join(format!("{month}.csv")), &headers, records)?;
                total.inserted += summary.inserted;
                total.replaced += summary.replaced;
            }
            Ok(total)
        })
        .await
        .map_err(|e| PersistError::Task(e.to_string()))?
    }
}

fn headers_for(tiers: &[f64]) -> Vec<String> {
    let tier_columns = tiers
        .iter()
        .map(|&n| tier_label(n))
        .flat_map(|label| TIER_COLUMNS.iter().map(move |col| format!("{col}_{label}")));

    LEADING_COLUMNS
        .iter()
        .map(|c| c.to_string())
        .chain(tier_columns)
        .chain(TRAILING_COLUMNS.iter().map(|c| c.to_string()))
        .collect()
}

fn month_of(ts_minute_utc: &str) -> PersistResult<String> {
    match ts_minute_utc.get(..7) {
        Some(month) if month.as_bytes().get(4) == Some(&b'-') => Ok(month.to_string()),
        _ => Err(PersistError::FormatMismatch(format!("bad minute bucket: {ts_minute_utc}"))),
    }
}

fn key_of(record: &StringRecord) -> RowKey {
    RowKey {
        ts_minute_utc: record.get(0).unwrap_or_default().to_string(),
        venue: record.get(1).unwrap_or_default().to_string(),
        ticker: record.get(2).unwrap_or_default().to_string(),
    }
}

fn upsert_month(path: &Path, headers: &[String], incoming: Vec<StringRecord>) -> PersistResult<UpsertSummary> {
    let mut records = if path.exists() {
        let (existing_headers, records) = read_file(path)?;
        if existing_headers.iter().ne(headers.iter().map(String::as_str)) {
            return Err(PersistError::FormatMismatch(format!(
                "{} has a different column set; move it aside to change tiers",
                path.display()
            )));
        }
        records
    } else {
        Vec::new()
    };

    let mut index: AHashMap<RowKey, usize> = records.iter().enumerate().map(|(i, r)| (key_of(r), i)).collect();
    let mut summary = UpsertSummary::default();
    for record in incoming {
        let key = key_of(&record);
        match index.get(&key) {
            Some(&pos) => {
                records[pos] = record;
                summary.replaced += 1;
            }
            None => {
                index.insert(key, records.len());
                records.push(record);
                summary.inserted += 1;
            }
        }
    }

    let tmp = path.with_extension("csv.tmp");
    {
        let mut writer = csv::Writer::from_path(&tmp)?;
        writer.write_record(headers)?;
        for record in &records {
            writer.write_record(record)?;
        }
        writer.flush()?;
    }
    fs::rename(&tmp, path)?;

    debug!(path = %path.display(), rows = records.len(), "CSV month rewritten");
    Ok(summary)
}

fn read_file(path: &Path) -> PersistResult<(StringRecord, Vec<StringRecord>)> {
    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_path(path)?;
    let headers = reader.headers()?.clone();
    let records = reader.records().collect::<Result<Vec<_>, _>>()?;
    Ok((headers, records))
}

fn encode_row(row: &MinuteRow, tiers: &[f64]) -> StringRecord {
    let mut fields: Vec<String> = vec![
        row.ts_minute_utc.clone(),
        row.venue.key().to_string(),
        row.ticker.clone(),
        row.symbol.clone(),
        row.samples_total.to_string(),
        row.samples_success.to_string(),
        opt(row.book_timestamp_ms),
        row.collected_at_utc.clone(),
        opt(row.mid_price),
        opt(row.best_bid),
        opt(row.best_ask),
        opt(row.spread_usd),
        opt(row.spread_bps),
    ];

    // Column set follows the store's tiers; a row missing one leaves it blank
    for &notional in tiers {
        match row.tier(notional) {
            Some(t) => fields.extend([
                opt(t.ask_slip_bps),
                opt(t.bid_slip_bps),
                opt(t.ask_filled),
                opt(t.bid_filled),
                opt(t.ask_filled_notional),
                opt(t.bid_filled_notional),
            ]),
            None => fields.extend(std::iter::repeat(String::new()).take(TIER_COLUMNS.len())),
        }
    }

    fields.push(row.is_aggregated_estimate.to_string());
    fields.push(opt(row.hyperliquid_n_sig_figs));
    fields.push(
        row.hyperliquid_n_sig_figs_per_tier
            .as_ref()
            .map(|v| format!("[{}]", v.iter().join(",")))
            .unwrap_or_default(),
    );
    fields.push(row.lighter_ws_fallback.to_string());
    fields.push(row.error.as_deref().map(escape_newlines).unwrap_or_default());

    StringRecord::from(fields)
}

fn opt<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn escape_newlines(value: &str) -> String {
    value.replace('\r', "\\r").replace('\n', "\\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::sqlite::tests::row;
    use crate::venue::{Venue, DEFAULT_TIERS};

    fn column(headers: &StringRecord, name: &str) -> usize {
        headers.iter().position(|h| h == name).unwrap()
    }

    #[test]
    fn test_header_layout() {
        let headers = headers_for(&DEFAULT_TIERS);
        assert_eq!(headers.len(), 13 + 4 * 6 + 5);
        assert_eq!(headers[13], "ask_slip_1k");
        assert!(headers.contains(&"bid_filled_notional_1m".to_string()));
        assert_eq!(headers.last().unwrap(), "error");
    }

    #[test]
    fn test_tier_columns_follow_notional_not_label() {
        // 1000.2 and 1000 share the "1k" label
        let tiers = [1_000.2, 1_000.0];
        let mut r = row("2024-05-01T12:00:00Z", Venue::Binance, "BTC", 1.0);
        let mut near = r.tiers[0].clone();
        near.notional = 1_000.2;
        near.ask_slip_bps = Some(4.25);
        r.tiers.insert(0, near);

        let record = encode_row(&r, &tiers);
        let first = LEADING_COLUMNS.len();
        let second = first + TIER_COLUMNS.len();
        assert_eq!(&record[first], "4.25");
        assert_eq!(&record[second], "1");
    }

    #[test]
    fn test_missing_tier_leaves_blank_columns() {
        let r = row("2024-05-01T12:00:00Z", Venue::Binance, "BTC", 1.0);
        let record = encode_row(&r, &[10_000.0, 1_000.0]);
        let first = LEADING_COLUMNS.len();
        assert!(record.iter().skip(first).take(TIER_COLUMNS.len()).all(str::is_empty));
        assert_eq!(&record[first + TIER_COLUMNS.len()], "1");
    }

    #[tokio::test]
    async fn test_replace_by_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvMinuteStore::new(dir.path(), &DEFAULT_TIERS);

        let mut first = row("2024-05-01T12:00:00Z", Venue::Bybit, "BTC", 1.0);
        // commas and newlines in a field must not confuse key detection
        first.error = Some("transport_error: a, b\nsecond line".into());
        let other = row("2024-05-01T12:01:00Z", Venue::Bybit, "BTC", 3.0);
        let s1 = store.upsert_rows(&[first, other]).await.unwrap();
        assert_eq!(s1, UpsertSummary { inserted: 2, replaced: 0 });

        let second = row("2024-05-01T12:00:00Z", Venue::Bybit, "BTC", 7.5);
        let s2 = store.upsert_rows(&[second]).await.unwrap();
        assert_eq!(s2, UpsertSummary { inserted: 0, replaced: 1 });

        let (headers, records) = store.read_month("2024-05").unwrap();
        assert_eq!(records.len(), 2);
        let spread = column(&headers, "spread_bps");
        assert_eq!(&records[0][spread], "7.5");
        assert_eq!(&records[1][spread], "3");
        assert_eq!(&records[0][column(&headers, "error")], "");
        assert!(!store.dir.join("2024-05.csv.tmp").exists());
    }

    #[tokio::test]
    async fn test_newlines_escaped_and_months_split() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvMinuteStore::new(dir.path(), &[1_000.0]);

        let mut may = row("2024-05-31T23:59:00Z", Venue::Dydx, "ETH", 1.0);
        may.error = Some("line one\nline two".into());
        may.hyperliquid_n_sig_figs_per_tier = Some(vec![5, 3]);
        let june = row("2024-06-01T00:00:00Z", Venue::Dydx, "ETH", 1.0);
        store.upsert_rows(&[may, june]).await.unwrap();

        let (headers, records) = store.read_month("2024-05").unwrap();
        assert_eq!(&records[0][column(&headers, "error")], "line one\\nline two");
        assert_eq!(&records[0][column(&headers, "hyperliquid_n_sig_figs_per_tier")], "[5,3]");
        assert_eq!(&records[0][column(&headers, "ask_fill_1k")], "true");
        assert_eq!(&records[0][column(&headers, "bid_filled_notional_1k")], "640.5");
        assert_eq!(store.read_month("2024-06").unwrap().1.len(), 1);
    }

    #[tokio::test]
    async fn test_tier_change_refuses_to_rewrite() {
        let dir = tempfile::tempdir().unwrap();
        CsvMinuteStore::new(dir.path(), &[1_000.0])
            .upsert_rows(&[row("2024-05-01T12:00:00Z", Venue::Bybit, "BTC", 1.0)])
            .await
            .unwrap();

        let wider = CsvMinuteStore::new(dir.path(), &DEFAULT_TIERS);
        let err = wider.upsert_rows(&[row("2024-05-01T12:01:00Z", Venue::Bybit, "BTC", 1.0)]).await.unwrap_err();
        assert!(matches!(err, PersistError::FormatMismatch(_)));
    }

    #[test]
    fn test_bad_bucket_rejected() {
        assert!(month_of("2024-05-01T12:00:00Z").is_ok());
        assert!(month_of("garbage").is_err());
    }
}
