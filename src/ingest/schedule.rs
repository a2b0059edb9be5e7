// Minute-aligned driver: sample at each configured offset, aggregate, persist.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use tracing::{error, info, instrument, warn};

use crate::ingest::aggregate::aggregate_minute;
use crate::ingest::sampler::SampleEngine;
use crate::persist::{MinuteSink, PersistResult, UpsertSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum RunMode {
    /// Sample for `run_duration_minutes`, then exit.
    Once,
    /// Sample until interrupted.
    Daemon,
}

/// UTC floor to the minute.
pub fn minute_floor(at: DateTime<Utc>) -> DateTime<Utc> {
    let secs = at.timestamp();
    Utc.timestamp_opt(secs - secs.rem_euclid(60), 0).single().unwrap_or(at)
}

/// `YYYY-MM-DDTHH:MM:00Z` for the minute containing `at`.
pub fn minute_bucket(at: DateTime<Utc>) -> String {
    minute_floor(at).format("%Y-%m-%dT%H:%M:00Z").to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffsetAction {
    /// Sleep `wait` (possibly zero), then collect.
    Collect { wait: Duration },
    /// Target passed more than the slack ago.
    SkipStale { lag: Duration },
}

pub fn plan_offset(cycle_start: DateTime<Utc>, offset_sec: u32, now: DateTime<Utc>, slack: Duration) -> OffsetAction {
    let target = cycle_start + chrono::Duration::seconds(i64::from(offset_sec));
    match (now - target).to_std() {
        // now is past the target
        Ok(lag) if lag > slack => OffsetAction::SkipStale { lag },
        Ok(_) => OffsetAction::Collect { wait: Duration::ZERO },
        Err(_) => OffsetAction::Collect { wait: (target - now).to_std().unwrap_or_default() },
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MinuteReport {
    pub minute: String,
    pub rounds: usize,
    pub samples_ok: usize,
    pub samples_failed: usize,
    pub upsert: UpsertSummary,
}

pub struct Scheduler {
    engine: SampleEngine,
    sink: Arc<dyn MinuteSink>,
    stop: Arc<AtomicBool>,
}

impl Scheduler {
    pub fn new(engine: SampleEngine, sink: Arc<dyn MinuteSink>) -> Self {
        Self { engine, sink, stop: Arc::new(AtomicBool::new(false)) }
    }

    /// Setting this stops scheduling further minutes; the current one finishes.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    #[instrument(skip(self), fields(minute = %minute_bucket(cycle_start)))]
    pub async fn run_minute(&self, cycle_start: DateTime<Utc>) -> PersistResult<MinuteReport> {
        let cfg = self.engine.config();
        let minute = minute_bucket(cycle_start);
        let mut offsets = cfg.sample_offsets_sec.clone();
        offsets.sort_unstable();

        let mut samples = Vec::new();
        let mut rounds = 0;
        for (sample_index, &offset) in offsets.iter().enumerate() {
            match plan_offset(cycle_start, offset, Utc::now(), cfg.stale_slack()) {
                OffsetAction::SkipStale { lag } => {
                    warn!(sample_index, offset, lag_ms = lag.as_millis() as u64, "Offset already passed, skipping");
                }
                OffsetAction::Collect { wait } => {
                    if !wait.is_zero() {
                        tokio::time::sleep(wait).await;
                    }
                    samples.extend(self.engine.collect_round(sample_index).await);
                    rounds += 1;
                }
            }
        }

        if rounds == 0 {
            warn!("Every offset was stale, collecting one immediate round");
            samples.extend(self.engine.collect_round(0).await);
            rounds = 1;
        }

        let samples_ok = samples.iter().filter(|s| s.is_ok()).count();
        let samples_failed = samples.len() - samples_ok;
        let rows = aggregate_minute(&samples, &minute);
        let upsert = self.sink.upsert_rows(&rows).await?;
        metrics::counter!("depth_rows_written_total").increment(upsert.rows() as u64);

        info!(minute = %minute, rows = rows.len(), ok = samples_ok, failed = samples_failed, "Minute persisted");
        Ok(MinuteReport { minute, rounds, samples_ok, samples_failed, upsert })
    }

    /// Drive minutes until the mode's end condition or a stop request.
    /// Returns the number of minutes persisted.
    pub async fn run(&self, mode: RunMode) -> usize {
        let started = Utc::now();
        let duration = chrono::Duration::minutes(self.engine.config().run_duration_minutes as i64);
        let deadline = started + duration;
        let mut cycle_start = minute_floor(started);
        let mut persisted = 0;

        info!(?mode, run_duration_minutes = self.engine.config().run_duration_minutes, "Sampler started");
        loop {
            if self.stop.load(Ordering::SeqCst) {
                info!("Stop requested, not scheduling further minutes");
                break;
            }
            if mode == RunMode::Once && deadline - Utc::now() < chrono::Duration::seconds(60) {
                info!("Run duration reached");
                break;
            }

            match self.run_minute(cycle_start).await {
                Ok(_) => persisted += 1,
                Err(err) => error!(error = %err, "Failed to persist minute"),
            }

            let next = cycle_start + chrono::Duration::minutes(1);
            cycle_start = next.max(minute_floor(Utc::now()));
        }

        info!(minutes = persisted, "Sampler finished");
        persisted
    }
}

/// Flip `stop` on SIGINT or SIGTERM.
pub fn spawn_signal_listener(stop: Arc<AtomicBool>) {
    tokio::spawn(async move {
        wait_for_signal().await;
        warn!("Shutdown signal received, finishing current minute");
        stop.store(true, Ordering::SeqCst);
    });
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(err) => {
            warn!(error = %err, "SIGTERM handler unavailable, listening for Ctrl-C only");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
