use serde::{Deserialize, Serialize};

use crate::venue::Venue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Bid,
    Ask,
}

// One price level as reported by a venue (or after normalisation)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrderBookLevel {
    pub price: f64,
    pub size: f64,
}

impl OrderBookLevel {
    pub fn new(price: f64, size: f64) -> Self {
        Self { price, size }
    }

    pub fn is_valid(&self) -> bool {
        self.price.is_finite() && self.size.is_finite() && self.price > 0.0 && self.size > 0.0
    }
}

// What an adapter hands back: unfiltered, unsorted levels
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawBook {
    pub bids: Vec<OrderBookLevel>,
    pub asks: Vec<OrderBookLevel>,
    pub timestamp_ms: Option<i64>,
}

/// Clean two-sided book. Bids best (highest) first, asks best (lowest) first.
/// Neither side is ever empty.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedBook {
    bids: Vec<OrderBookLevel>,
    asks: Vec<OrderBookLevel>,
    timestamp_ms: Option<i64>,
}

impl NormalizedBook {
    /// `None` if either side is empty. Callers own ordering; see `book::normalize`.
    pub(crate) fn new(bids: Vec<OrderBookLevel>, asks: Vec<OrderBookLevel>, timestamp_ms: Option<i64>) -> Option<Self> {
        if bids.is_empty() || asks.is_empty() {
            return None;
        }
        Some(Self { bids, asks, timestamp_ms })
    }

    pub fn bids(&self) -> &[OrderBookLevel] {
        &self.bids
    }

    pub fn asks(&self) -> &[OrderBookLevel] {
        &self.asks
    }

    pub fn timestamp_ms(&self) -> Option<i64> {
        self.timestamp_ms
    }

    pub fn best_bid(&self) -> f64 {
        self.bids[0].price
    }

    pub fn best_ask(&self) -> f64 {
        self.asks[0].price
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlippageTierResult {
    pub notional: f64,
    pub vwap: f64,
    pub slippage_bps: f64,
    pub filled: bool,
    pub filled_notional: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquidityAnalysis {
    pub venue: Venue,
    pub ticker: String,
    pub mid_price: f64,
    pub best_bid: f64,
    pub best_ask: f64,
    pub spread_usd: f64,
    pub spread_bps: f64,
    // index-aligned with the tier list the analysis was run with
    pub asks: Vec<SlippageTierResult>,
    pub bids: Vec<SlippageTierResult>,
    pub timestamp_ms: Option<i64>,

    // progressive refinement (hyperliquid)
    pub is_aggregated_estimate: bool,
    pub n_sig_figs: Option<u32>,
    pub n_sig_figs_per_tier: Option<Vec<u32>>,

    // push-transport fallback (lighter)
    pub ws_fallback: bool,
}

impl LiquidityAnalysis {
    pub fn tiers(&self, side: Side) -> &[SlippageTierResult] {
        match side {
            Side::Bid => &self.bids,
            Side::Ask => &self.asks,
        }
    }

    pub fn all_tiers_filled(&self) -> bool {
        self.asks.iter().chain(self.bids.iter()).all(|t| t.filled)
    }
}
