// One sampling round: every configured (ticker, venue) pair fetched and
// analysed concurrently, each under its own retry budget.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn, Instrument};

use crate::config::SamplingConfig;
use crate::engine::book::normalize_raw;
use crate::engine::slippage::analyze;
use crate::engine::types::LiquidityAnalysis;
use crate::ingest::fallback::fetch_with_stream_fallback;
use crate::ingest::refinement::fetch_progressive;
use crate::ingest::retry::with_retry;
use crate::market_data::{FetchError, MarketDataSource};
use crate::pairs::{PairMap, SymbolError};
use crate::persist::error_log::{ErrorLog, ErrorRecord};
use crate::venue::{Venue, HYPERLIQUID_SIG_FIGS_ORDER};

/// Outcome of one (venue, ticker) task in one round. Exactly one of
/// `analysis` and `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSample {
    pub venue: Venue,
    pub ticker: String,
    pub symbol: String,
    pub sample_index: usize,
    pub collected_at_ms: i64,
    pub analysis: Option<LiquidityAnalysis>,
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl RawSample {
    pub fn is_ok(&self) -> bool {
        self.analysis.is_some()
    }
}

/// fetch -> normalize -> analyze, the path every strategy builds on.
pub async fn fetch_analysis(
    source: &dyn MarketDataSource,
    venue: Venue,
    ticker: &str,
    symbol: &str,
    depth_limit: usize,
    sig_figs: Option<u32>,
    tiers: &[f64],
) -> Result<LiquidityAnalysis, FetchError> {
    let raw = source.fetch_book(venue, symbol, depth_limit, sig_figs).await?;
    let book = normalize_raw(&raw).ok_or_else(|| FetchError::EmptyBook(symbol.to_string()))?;
    Ok(analyze(&book, venue, ticker, tiers))
}

pub struct SampleEngine {
    source: Arc<dyn MarketDataSource>,
    pairs: PairMap,
    config: Arc<SamplingConfig>,
    error_log: Option<ErrorLog>,
}

impl SampleEngine {
    pub fn new(source: Arc<dyn MarketDataSource>, pairs: PairMap, config: Arc<SamplingConfig>) -> Self {
        Self { source, pairs, config, error_log: None }
    }

    pub fn with_error_log(mut self, error_log: ErrorLog) -> Self {
        self.error_log = Some(error_log);
        self
    }

    pub fn config(&self) -> &SamplingConfig {
        &self.config
    }

    /// Run every pair once and wait for all of them. Failures come back as
    /// samples with an error, never as an `Err`.
    #[instrument(skip(self))]
    pub async fn collect_round(&self, sample_index: usize) -> Vec<RawSample> {
        let started = Instant::now();
        let mut tasks = Vec::new();

        for ticker in &self.config.pairs {
            for &venue in &self.config.venues {
                let symbol = match self.pairs.resolve(ticker, venue) {
                    Err(SymbolError::Unsupported { .. }) => {
                        debug!(%venue, ticker = ticker.as_str(), "Pair unsupported on venue, skipping");
                        continue;
                    }
                    other => other,
                };
                let span = tracing::info_span!("sample", %venue, ticker = ticker.as_str(), sample_index);
                tasks.push(self.sample_pair(venue, ticker, symbol, sample_index).instrument(span));
            }
        }

        let samples = join_all(tasks).await;
        let ok = samples.iter().filter(|s| s.is_ok()).count();
        info!(
            sample_index,
            ok,
            failed = samples.len() - ok,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Round collected"
        );
        samples
    }

    async fn sample_pair(
        &self,
        venue: Venue,
        ticker: &str,
        symbol: Result<String, SymbolError>,
        sample_index: usize,
    ) -> RawSample {
        let started = Instant::now();
        let collected_at_ms = Utc::now().timestamp_millis();

        let (symbol, result) = match symbol {
            Ok(symbol) => {
                let label = format!("{venue}:{symbol}");
                let policy = self.config.retry_policy();
                let native = symbol.as_str();
                let result = with_retry(&label, &policy, move |_| self.fetch_for_venue(venue, ticker, native)).await;
                (symbol, result)
            }
            // Not retried: the mapping will not change between attempts
            Err(err) => (ticker.to_string(), Err(FetchError::Unknown(err.to_string()))),
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        metrics::histogram!("depth_sample_duration_ms", "venue" => venue.key()).record(duration_ms as f64);

        match result {
            Ok(analysis) => {
                metrics::counter!("depth_samples_total", "venue" => venue.key(), "outcome" => "ok").increment(1);
                debug!(mid = analysis.mid_price, spread_bps = analysis.spread_bps, duration_ms, "Sample ok");
                RawSample {
                    venue,
                    ticker: ticker.to_string(),
                    symbol,
                    sample_index,
                    collected_at_ms,
                    analysis: Some(analysis),
                    error: None,
                    duration_ms,
                }
            }
            Err(err) => {
                metrics::counter!("depth_samples_total", "venue" => venue.key(), "outcome" => err.code().as_str())
                    .increment(1);
                warn!(code = %err.code(), error = %err, duration_ms, "Sample failed");
                self.record_error(venue, ticker, sample_index, &err).await;
                RawSample {
                    venue,
                    ticker: ticker.to_string(),
                    symbol,
                    sample_index,
                    collected_at_ms,
                    analysis: None,
                    error: Some(err.classified()),
                    duration_ms,
                }
            }
        }
    }

    async fn fetch_for_venue(&self, venue: Venue, ticker: &str, symbol: &str) -> Result<LiquidityAnalysis, FetchError> {
        let cfg = &self.config;
        let source = self.source.as_ref();
        let depth = cfg.depth_limit(venue);

        match venue {
            Venue::Lighter if cfg.enable_lighter_ws_fallback => {
                fetch_with_stream_fallback(source, venue, ticker, symbol, depth, &cfg.tiers, cfg.stream_timeout()).await
            }
            Venue::Hyperliquid if cfg.enable_hyperliquid_adaptive_sigfigs => {
                fetch_progressive(source, venue, ticker, symbol, depth, &cfg.tiers, &HYPERLIQUID_SIG_FIGS_ORDER).await
            }
            _ => fetch_analysis(source, venue, ticker, symbol, depth, None, &cfg.tiers).await,
        }
    }

    async fn record_error(&self, venue: Venue, ticker: &str, sample_index: usize, err: &FetchError) {
        let Some(log) = &self.error_log else {
            return;
        };
        let record = ErrorRecord::new(venue, ticker, sample_index, err);
        if let Err(log_err) = log.append(&record).await {
            warn!(error = %log_err, "Could not append to error log");
        }
    }
}
