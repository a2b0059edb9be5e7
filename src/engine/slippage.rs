// Mid/spread and VWAP slippage for a normalized book.
// Math runs at full precision; rounding is applied only to the reported values.

use crate::engine::types::{LiquidityAnalysis, NormalizedBook, OrderBookLevel, Side, SlippageTierResult};
use crate::venue::Venue;
use tracing::{instrument, trace};

const BPS: f64 = 10_000.0;
// Relative slack on the remaining notional; summing price * size leaves a few ULPs behind.
const FILL_TOLERANCE: f64 = 1e-9;

/// Round half away from zero to `decimals` places.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Walk `levels` best-to-worst until `target_notional` is consumed or the book runs out.
///
/// Positive slippage always means worse than mid: above it when lifting asks,
/// below it when hitting bids.
pub fn compute_slippage(
    levels: &[OrderBookLevel],
    target_notional: f64,
    mid_price: f64,
    side: Side,
) -> SlippageTierResult {
    let slack = target_notional.abs() * FILL_TOLERANCE;
    let mut remaining = target_notional;
    let mut total_cost = 0.0;
    let mut total_qty = 0.0;

    for level in levels {
        if remaining <= slack {
            break;
        }
        let level_notional = level.price * level.size;
        let fill = level_notional.min(remaining);

        total_cost += fill;
        total_qty += fill / level.price;
        remaining -= fill;
    }

    let vwap = if total_qty > 0.0 { total_cost / total_qty } else { 0.0 };

    let slippage_bps = if vwap > 0.0 && mid_price > 0.0 {
        match side {
            Side::Ask => (vwap - mid_price) / mid_price * BPS,
            Side::Bid => (mid_price - vwap) / mid_price * BPS,
        }
    } else {
        0.0
    };

    SlippageTierResult {
        notional: target_notional,
        vwap: round_to(vwap, 6),
        slippage_bps: round_to(slippage_bps, 2),
        filled: remaining <= slack,
        filled_notional: round_to(total_cost, 2),
    }
}

/// Mid, spread and per-tier slippage on both sides. Output tier vectors are
/// index-aligned with `tiers`.
#[instrument(level = "debug", skip(book, tiers), fields(bids = book.bids().len(), asks = book.asks().len()))]
pub fn analyze(book: &NormalizedBook, venue: Venue, ticker: &str, tiers: &[f64]) -> LiquidityAnalysis {
    let best_bid = book.best_bid();
    let best_ask = book.best_ask();

    let raw_mid = (best_bid + best_ask) / 2.0;
    let raw_spread = best_ask - best_bid;

    let asks: Vec<SlippageTierResult> = tiers
        .iter()
        .map(|&notional| compute_slippage(book.asks(), notional, raw_mid, Side::Ask))
        .collect();
    let bids: Vec<SlippageTierResult> = tiers
        .iter()
        .map(|&notional| compute_slippage(book.bids(), notional, raw_mid, Side::Bid))
        .collect();

    trace!(mid = raw_mid, spread = raw_spread, "Analysed book");

    LiquidityAnalysis {
        venue,
        ticker: ticker.to_string(),
        mid_price: round_to(raw_mid, 10),
        best_bid: round_to(best_bid, 10),
        best_ask: round_to(best_ask, 10),
        spread_usd: round_to(raw_spread, 10),
        spread_bps: round_to(raw_spread / raw_mid * BPS, 2),
        asks,
        bids,
        timestamp_ms: book.timestamp_ms(),
        is_aggregated_estimate: false,
        n_sig_figs: None,
        n_sig_figs_per_tier: None,
        ws_fallback: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::book::normalize;

    fn lvl(price: f64, size: f64) -> OrderBookLevel {
        OrderBookLevel::new(price, size)
    }

    fn decimals(v: f64) -> usize {
        let s = v.to_string();
        s.split_once('.').map(|(_, frac)| frac.len()).unwrap_or(0)
    }

    #[test]
    fn test_single_level_fill() {
        let r = compute_slippage(&[lvl(100.0, 20.0)], 1_000.0, 99.5, Side::Ask);
        assert!(r.filled);
        assert_eq!(r.filled_notional, 1_000.0);
        assert_eq!(r.vwap, 100.0);
        assert!((r.slippage_bps - 50.25).abs() < 0.01);
    }

    #[test]
    fn test_walk_across_ask_levels() {
        let r = compute_slippage(&[lvl(100.0, 5.0), lvl(101.0, 10.0)], 1_000.0, 100.0, Side::Ask);
        assert!(r.filled);
        assert_eq!(r.filled_notional, 1_000.0);
        // $500 at 100 (5 units) + $500 at 101 (~4.9505 units)
        assert!((r.vwap - 100.4975).abs() < 0.001);
    }

    #[test]
    fn test_walk_across_bid_levels() {
        let r = compute_slippage(&[lvl(100.0, 5.0), lvl(99.0, 10.0)], 1_000.0, 100.0, Side::Bid);
        assert!(r.filled);
        assert!((r.vwap - 99.4975).abs() < 0.001);
        assert!(r.slippage_bps > 0.0);
    }

    #[test]
    fn test_insufficient_liquidity() {
        let r = compute_slippage(&[lvl(100.0, 5.0)], 1_000.0, 99.5, Side::Ask);
        assert!(!r.filled);
        assert_eq!(r.filled_notional, 500.0);
        assert_eq!(r.vwap, 100.0);
    }

    #[test]
    fn test_empty_levels() {
        let r = compute_slippage(&[], 1_000.0, 100.0, Side::Bid);
        assert!(!r.filled);
        assert_eq!(r.filled_notional, 0.0);
        assert_eq!(r.vwap, 0.0);
        assert_eq!(r.slippage_bps, 0.0);
    }

    #[test]
    fn test_exact_boundary_counts_as_filled() {
        let r = compute_slippage(&[lvl(100.0, 4.0), lvl(100.0, 6.0)], 1_000.0, 100.0, Side::Ask);
        assert!(r.filled);
        assert_eq!(r.filled_notional, 1_000.0);
    }

    #[test]
    fn test_float_residue_at_boundary_counts_as_filled() {
        // 0.3 * 3.0 falls a few ULPs short of 0.9
        let r = compute_slippage(&[lvl(0.1, 1.0), lvl(0.3, 3.0)], 1.0, 0.2, Side::Ask);
        assert!(r.filled);
        assert_eq!(r.filled_notional, 1.0);
        assert_eq!(r.vwap, 0.25);

        let r = compute_slippage(&[lvl(0.1, 1.0), lvl(0.7, 7.0)], 5.0, 0.2, Side::Ask);
        assert!(r.filled);
        assert_eq!(r.filled_notional, 5.0);
    }

    #[test]
    fn test_short_book_stays_unfilled() {
        let r = compute_slippage(&[lvl(0.1, 1.0), lvl(0.3, 3.0)], 1.0001, 0.2, Side::Ask);
        assert!(!r.filled);
    }

    #[test]
    fn test_reported_values_are_rounded() {
        let r = compute_slippage(&[lvl(100.123456789, 3.0), lvl(101.987654321, 50.0)], 1_000.0, 99.1, Side::Ask);
        assert!(decimals(r.vwap) <= 6);
        assert!(decimals(r.slippage_bps) <= 2);
        assert!(decimals(r.filled_notional) <= 2);
    }

    #[test]
    fn test_analyze_simple_book() {
        let book = normalize(
            &[lvl(99.0, 10.0), lvl(98.0, 10.0)],
            &[lvl(101.0, 10.0), lvl(102.0, 10.0)],
            None,
        )
        .unwrap();
        let a = analyze(&book, Venue::Binance, "BTC", &[1_000.0, 10_000.0]);

        assert_eq!(a.best_bid, 99.0);
        assert_eq!(a.best_ask, 101.0);
        assert_eq!(a.mid_price, 100.0);
        assert_eq!(a.spread_usd, 2.0);
        assert_eq!(a.spread_bps, 200.0);
        assert_eq!(a.asks.len(), 2);
        assert!(a.asks[0].filled);
        assert_eq!(a.asks[0].vwap, 101.0);
        assert_eq!(a.asks[0].slippage_bps, 100.0);
        assert!(!a.asks[1].filled);
        assert!(!a.is_aggregated_estimate);
    }

    #[test]
    fn test_tier_results_follow_tier_order() {
        let book = normalize(&[lvl(99.0, 100.0)], &[lvl(101.0, 100.0)], None).unwrap();
        let a = analyze(&book, Venue::Dydx, "ETH", &[5_000.0, 500.0]);
        assert_eq!(a.asks[0].notional, 5_000.0);
        assert_eq!(a.asks[1].notional, 500.0);
        assert_eq!(a.bids[1].notional, 500.0);
    }
}
