// REST first, push-stream snapshot only when REST leaves a tier unfilled.
// The stream is best effort: any failure there keeps the REST result.

use std::time::Duration;

use tracing::{debug, instrument, warn};

use crate::engine::book::normalize_raw;
use crate::engine::slippage::analyze;
use crate::engine::types::LiquidityAnalysis;
use crate::ingest::sampler::fetch_analysis;
use crate::market_data::{FetchError, MarketDataSource};
use crate::venue::Venue;

#[instrument(level = "debug", skip(source, tiers), fields(venue = %venue))]
pub async fn fetch_with_stream_fallback(
    source: &dyn MarketDataSource,
    venue: Venue,
    ticker: &str,
    symbol: &str,
    depth_limit: usize,
    tiers: &[f64],
    stream_timeout: Duration,
) -> Result<LiquidityAnalysis, FetchError> {
    let primary = fetch_analysis(source, venue, ticker, symbol, depth_limit, None, tiers).await?;
    if primary.all_tiers_filled() {
        return Ok(primary);
    }

    debug!(symbol, "Primary book leaves tiers unfilled, trying stream snapshot");
    let raw = match tokio::time::timeout(stream_timeout, source.fetch_stream_snapshot(venue, symbol)).await {
        Ok(Ok(raw)) => raw,
        Ok(Err(err)) => {
            warn!(symbol, code = %err.code(), error = %err, "Stream fallback failed, keeping primary book");
            return Ok(primary);
        }
        Err(_) => {
            warn!(symbol, timeout_ms = stream_timeout.as_millis() as u64, "Stream fallback timed out, keeping primary book");
            return Ok(primary);
        }
    };

    let Some(book) = normalize_raw(&raw) else {
        warn!(symbol, "Stream snapshot had no usable levels, keeping primary book");
        return Ok(primary);
    };

    let mut analysis = analyze(&book, venue, ticker, tiers);
    analysis.ws_fallback = true;
    Ok(analysis)
}
