// Progressive sig-fig refinement for venues that bucket prices server-side.
//
// The first successful resolution fixes mid/spread/top of book. Later, coarser
// resolutions only contribute tiers the finer ones could not fill.

use tracing::{debug, instrument};

use crate::engine::types::{LiquidityAnalysis, SlippageTierResult};
use crate::ingest::sampler::fetch_analysis;
use crate::market_data::{FetchError, MarketDataSource};
use crate::venue::Venue;

struct TierCursor {
    next: usize,
    resolution: Vec<Option<u32>>,
}

impl TierCursor {
    fn new(tiers: usize) -> Self {
        Self { next: 0, resolution: vec![None; tiers] }
    }

    fn done(&self) -> bool {
        self.next >= self.resolution.len()
    }

    // Copy consecutive filled tiers from `attempt` into `base`, starting at the cursor
    fn advance(&mut self, base: &mut [SlippageTierResult], attempt: &[SlippageTierResult], sig_figs: u32) {
        while self.next < self.resolution.len() {
            match attempt.get(self.next) {
                Some(tier) if tier.filled => {
                    base[self.next] = tier.clone();
                    self.resolution[self.next] = Some(sig_figs);
                    self.next += 1;
                }
                _ => break,
            }
        }
    }

    // Whatever is still unfilled takes the last successful attempt's value
    fn settle(&mut self, base: &mut [SlippageTierResult], last: &[SlippageTierResult], sig_figs: u32) {
        for i in self.next..self.resolution.len() {
            if let Some(tier) = last.get(i) {
                base[i] = tier.clone();
            }
            self.resolution[i] = Some(sig_figs);
        }
        self.next = self.resolution.len();
    }
}

/// Walk `sig_figs_order` finest to coarsest until every tier on both sides is
/// filled. Fails only if every resolution fails.
#[instrument(level = "debug", skip(source, tiers, sig_figs_order), fields(venue = %venue))]
pub async fn fetch_progressive(
    source: &dyn MarketDataSource,
    venue: Venue,
    ticker: &str,
    symbol: &str,
    depth_limit: usize,
    tiers: &[f64],
    sig_figs_order: &[u32],
) -> Result<LiquidityAnalysis, FetchError> {
    let mut base: Option<LiquidityAnalysis> = None;
    let mut last: Option<(LiquidityAnalysis, u32)> = None;
    let mut last_error: Option<FetchError> = None;
    let mut asks = TierCursor::new(tiers.len());
    let mut bids = TierCursor::new(tiers.len());

    for &sig_figs in sig_figs_order {
        let attempt = match fetch_analysis(source, venue, ticker, symbol, depth_limit, Some(sig_figs), tiers).await {
            Ok(analysis) => analysis,
            Err(err) => {
                debug!(sig_figs, error = %err, "Resolution attempt failed");
                last_error = Some(err);
                continue;
            }
        };

        let base = base.get_or_insert_with(|| attempt.clone());
        asks.advance(&mut base.asks, &attempt.asks, sig_figs);
        bids.advance(&mut base.bids, &attempt.bids, sig_figs);
        debug!(sig_figs, asks_filled = asks.next, bids_filled = bids.next, "Resolution attempt analysed");

        last = Some((attempt, sig_figs));
        if asks.done() && bids.done() {
            break;
        }
    }

    let (Some(mut base), Some((last, last_sig_figs))) = (base, last) else {
        return Err(last_error.unwrap_or_else(|| FetchError::EmptyBook(symbol.to_string())));
    };
    asks.settle(&mut base.asks, &last.asks, last_sig_figs);
    bids.settle(&mut base.bids, &last.bids, last_sig_figs);

    // A tier is only as precise as the coarser of its two sides
    let per_tier: Vec<u32> = asks
        .resolution
        .iter()
        .zip(&bids.resolution)
        .map(|(a, b)| a.unwrap_or(last_sig_figs).min(b.unwrap_or(last_sig_figs)))
        .collect();
    let finest = sig_figs_order.first().copied().unwrap_or(last_sig_figs);

    base.is_aggregated_estimate = per_tier.iter().any(|&sf| sf != finest);
    base.n_sig_figs = per_tier.iter().copied().min();
    base.n_sig_figs_per_tier = Some(per_tier);
    Ok(base)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::types::{OrderBookLevel, RawBook};
    use crate::market_data::adapters::ScriptedSource;
    use crate::venue::{DEFAULT_TIERS, HYPERLIQUID_SIG_FIGS_ORDER};

    // Symmetric book around 100 with `size` units per level on each side
    fn book(levels: usize, size: f64, tick: f64) -> RawBook {
        RawBook {
            bids: (0..levels).map(|i| OrderBookLevel::new(99.95 - i as f64 * tick, size)).collect(),
            asks: (0..levels).map(|i| OrderBookLevel::new(100.05 + i as f64 * tick, size)).collect(),
            timestamp_ms: Some(1_700_000_000_000),
        }
    }

    #[tokio::test]
    async fn test_finest_fills_everything() {
        let source = ScriptedSource::new();
        source.push_book(Venue::Hyperliquid, "BTC", Some(5), Ok(book(20, 1_000.0, 0.1)));

        let a = fetch_progressive(&source, Venue::Hyperliquid, "BTC", "BTC", 20, &DEFAULT_TIERS, &HYPERLIQUID_SIG_FIGS_ORDER)
            .await
            .unwrap();
        assert!(!a.is_aggregated_estimate);
        assert_eq!(a.n_sig_figs, Some(5));
        assert_eq!(a.n_sig_figs_per_tier, Some(vec![5, 5, 5, 5]));
        assert!(a.all_tiers_filled());
        // coarser resolutions never requested
        assert_eq!(source.book_calls().len(), 1);
    }

    #[tokio::test]
    async fn test_coarser_resolutions_fill_deeper_tiers() {
        let source = ScriptedSource::new();
        // ~$20k per side: fills 1k and 10k
        source.push_book(Venue::Hyperliquid, "BTC", Some(5), Ok(book(2, 100.0, 0.1)));
        // ~$200k per side: fills up to 100k, top of book is wider
        source.push_book(Venue::Hyperliquid, "BTC", Some(4), Ok(book(2, 1_000.0, 1.0)));
        // coarser still, but never enough for 1m
        source.push_book(Venue::Hyperliquid, "BTC", Some(3), Ok(book(3, 1_000.0, 10.0)));
        source.push_book(Venue::Hyperliquid, "BTC", Some(2), Ok(book(4, 1_000.0, 20.0)));

        let a = fetch_progressive(&source, Venue::Hyperliquid, "BTC", "BTC", 20, &DEFAULT_TIERS, &HYPERLIQUID_SIG_FIGS_ORDER)
            .await
            .unwrap();

        assert!(a.is_aggregated_estimate);
        assert_eq!(a.n_sig_figs_per_tier, Some(vec![5, 5, 4, 2]));
        assert_eq!(a.n_sig_figs, Some(2));
        // mid and spread come from the finest attempt
        assert_eq!(a.mid_price, 100.0);
        assert_eq!(a.best_ask, 100.05);

        assert!(a.asks[0].filled && a.asks[1].filled && a.asks[2].filled);
        // tier 3 is the coarsest attempt's partial fill: 4 levels * 1000 units
        assert!(!a.asks[3].filled);
        let expected: f64 = (0..4).map(|i| (100.05 + i as f64 * 20.0) * 1_000.0).sum();
        assert!((a.asks[3].filled_notional - expected).abs() < 0.01);
        assert_eq!(source.book_calls().len(), 4);
    }

    #[tokio::test]
    async fn test_failed_finest_still_uses_later_base() {
        let source = ScriptedSource::new();
        source.push_book(Venue::Hyperliquid, "ETH", Some(5), Err(FetchError::Transport("reset".into())));
        source.push_book(Venue::Hyperliquid, "ETH", Some(4), Ok(book(20, 1_000.0, 0.1)));

        let a = fetch_progressive(&source, Venue::Hyperliquid, "ETH", "ETH", 20, &DEFAULT_TIERS, &HYPERLIQUID_SIG_FIGS_ORDER)
            .await
            .unwrap();
        assert!(a.is_aggregated_estimate);
        assert_eq!(a.n_sig_figs_per_tier, Some(vec![4, 4, 4, 4]));
    }

    #[tokio::test]
    async fn test_all_resolutions_fail() {
        let source = ScriptedSource::new();
        for sf in HYPERLIQUID_SIG_FIGS_ORDER {
            source.push_book(Venue::Hyperliquid, "SOL", Some(sf), Ok(RawBook::default()));
        }
        let err = fetch_progressive(&source, Venue::Hyperliquid, "SOL", "SOL", 20, &DEFAULT_TIERS, &HYPERLIQUID_SIG_FIGS_ORDER)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::EmptyBook(_)));
    }
}
