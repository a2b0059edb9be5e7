// Append-only JSON-lines log of failed samples, one directory per UTC day.

use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::market_data::{ErrorCode, FetchError};
use crate::persist::{PersistError, PersistResult};
use crate::venue::Venue;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub ts: String,
    pub venue: Venue,
    pub ticker: String,
    pub sample_index: usize,
    pub code: ErrorCode,
    pub message: String,
}

impl ErrorRecord {
    pub fn new(venue: Venue, ticker: &str, sample_index: usize, err: &FetchError) -> Self {
        Self::at(Utc::now(), venue, ticker, sample_index, err)
    }

    pub fn at(ts: DateTime<Utc>, venue: Venue, ticker: &str, sample_index: usize, err: &FetchError) -> Self {
        Self {
            ts: ts.to_rfc3339_opts(SecondsFormat::Millis, true),
            venue,
            ticker: ticker.to_string(),
            sample_index,
            code: err.code(),
            message: err.to_string(),
        }
    }

    fn day(&self) -> String {
        self.ts.get(..10).unwrap_or("unknown").to_string()
    }
}

pub struct ErrorLog {
    dir: PathBuf,
    // serialises appends from concurrent sample tasks
    write_lock: Arc<Mutex<()>>,
}

impl ErrorLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into(), write_lock: Arc::new(Mutex::new(())) }
    }

    pub fn path_for_day(&self, day: &str) -> PathBuf {
        self.dir.join(day).join("errors.jsonl")
    }

    /// File I/O runs on the blocking pool.
    pub async fn append(&self, record: &ErrorRecord) -> PersistResult<()> {
        let path = self.path_for_day(&record.day());
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let lock = Arc::clone(&self.write_lock);
        tokio::task::spawn_blocking(move || -> PersistResult<()> {
            let _guard = lock.lock();
            append_line(&path, &line)
        })
        .await
        .map_err(|e| PersistError::Task(e.to_string()))?
    }

    pub fn read_day(&self, day: NaiveDate) -> PersistResult<Vec<ErrorRecord>> {
        read_jsonl(&self.path_for_day(&day.format("%Y-%m-%d").to_string()))
    }
}

fn append_line(path: &Path, line: &str) -> PersistResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(line.as_bytes())?;
    Ok(())
}

fn read_jsonl(path: &Path) -> PersistResult<Vec<ErrorRecord>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let reader = BufReader::new(fs::File::open(path)?);
    let mut records = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if !line.trim().is_empty() {
            records.push(serde_json::from_str(&line)?);
        }
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::time::Duration;

    #[tokio::test]
    async fn test_records_land_in_day_directory() {
        let dir = tempfile::tempdir().unwrap();
        let log = ErrorLog::new(dir.path());
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 23, 59, 30).unwrap();

        log.append(&ErrorRecord::at(ts, Venue::Bybit, "ETH", 2, &FetchError::Parse("retCode 10001".into())))
            .await
            .unwrap();
        log.append(&ErrorRecord::at(ts, Venue::Dydx, "BTC", 3, &FetchError::Timeout(Duration::from_secs(10))))
            .await
            .unwrap();

        assert!(dir.path().join("2024-05-01/errors.jsonl").exists());
        let records = log.read_day(ts.date_naive()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].code, ErrorCode::ParseError);
        assert_eq!(records[0].ts, "2024-05-01T23:59:30.000Z");
        assert_eq!(records[1].venue, Venue::Dydx);
        assert_eq!(records[1].message, "request timed out after 10000ms");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_appends_stay_line_delimited() {
        let dir = tempfile::tempdir().unwrap();
        let log = Arc::new(ErrorLog::new(dir.path()));
        let ts = Utc.with_ymd_and_hms(2024, 5, 2, 8, 0, 0).unwrap();

        let tasks: Vec<_> = (0..32)
            .map(|i| {
                let log = Arc::clone(&log);
                tokio::spawn(async move {
                    let err = FetchError::Http { status: 503, detail: "x".repeat(512) };
                    log.append(&ErrorRecord::at(ts, Venue::Binance, "BTC", i, &err)).await
                })
            })
            .collect();
        for task in futures::future::join_all(tasks).await {
            task.unwrap().unwrap();
        }

        let mut indices: Vec<usize> = log.read_day(ts.date_naive()).unwrap().iter().map(|r| r.sample_index).collect();
        indices.sort_unstable();
        assert_eq!(indices, (0..32).collect::<Vec<_>>());
    }

    #[test]
    fn test_missing_day_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let log = ErrorLog::new(dir.path());
        let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert!(log.read_day(day).unwrap().is_empty());
    }
}
