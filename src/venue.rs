// Fixed set of venues the sampler knows how to read, plus their static metadata.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Venue {
    Hyperliquid,
    Dydx,
    Lighter,
    Asterdex,
    Binance,
    Bybit,
}

/// How a venue spells an instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolStyle {
    BaseOnly,      // "BTC"
    BaseDashQuote, // "BTC-USD"
    BaseQuote,     // "BTCUSDT"
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateBudget {
    pub budget: u32,
    pub window_sec: u32,
    pub weight_per_call: u32,
}

// Significant-figure settings Hyperliquid accepts, finest first.
pub const HYPERLIQUID_SIG_FIGS_ORDER: [u32; 4] = [5, 4, 3, 2];

pub const DEFAULT_TIERS: [f64; 4] = [1_000.0, 10_000.0, 100_000.0, 1_000_000.0];

pub const LIGHTER_WS_URL: &str = "wss://mainnet.zklighter.elliot.ai/stream";
pub const LIGHTER_REST_MAX_DEPTH: usize = 250;

impl Venue {
    pub const ALL: [Venue; 6] = [
        Venue::Hyperliquid,
        Venue::Dydx,
        Venue::Lighter,
        Venue::Asterdex,
        Venue::Binance,
        Venue::Bybit,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Venue::Hyperliquid => "hyperliquid",
            Venue::Dydx => "dydx",
            Venue::Lighter => "lighter",
            Venue::Asterdex => "asterdex",
            Venue::Binance => "binance",
            Venue::Bybit => "bybit",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Venue::Hyperliquid => "Hyperliquid",
            Venue::Dydx => "dYdX",
            Venue::Lighter => "Lighter",
            Venue::Asterdex => "AsterDEX",
            Venue::Binance => "Binance",
            Venue::Bybit => "Bybit",
        }
    }

    pub fn base_url(self) -> &'static str {
        match self {
            Venue::Hyperliquid => "https://api.hyperliquid.xyz",
            Venue::Dydx => "https://indexer.dydx.trade",
            Venue::Lighter => "https://mainnet.zklighter.elliot.ai",
            Venue::Asterdex => "https://fapi.asterdex.com",
            Venue::Binance => "https://fapi.binance.com",
            Venue::Bybit => "https://api.bybit.com",
        }
    }

    pub fn default_depth(self) -> usize {
        match self {
            Venue::Hyperliquid => 20, // hard cap by API
            Venue::Dydx => 100,       // no depth param, full book comes back
            Venue::Lighter => LIGHTER_REST_MAX_DEPTH,
            Venue::Asterdex | Venue::Binance | Venue::Bybit => 1000,
        }
    }

    pub fn symbol_style(self) -> SymbolStyle {
        match self {
            Venue::Hyperliquid | Venue::Lighter => SymbolStyle::BaseOnly,
            Venue::Dydx => SymbolStyle::BaseDashQuote,
            Venue::Asterdex | Venue::Binance | Venue::Bybit => SymbolStyle::BaseQuote,
        }
    }

    /// Quote currency the venue appends; empty means the mapping's own default is used.
    pub fn default_quote(self) -> &'static str {
        match self {
            Venue::Hyperliquid | Venue::Lighter => "",
            Venue::Dydx => "USD",
            Venue::Asterdex | Venue::Binance | Venue::Bybit => "USDT",
        }
    }

    pub fn rate_budget(self) -> RateBudget {
        let (budget, window_sec, weight_per_call) = match self {
            Venue::Hyperliquid => (1200, 60, 2),
            Venue::Dydx => (100, 10, 1),
            Venue::Lighter => (9999, 60, 1), // public reads are effectively unmetered
            Venue::Asterdex => (2400, 60, 20),
            Venue::Binance => (2400, 60, 40),
            Venue::Bybit => (600, 5, 1),
        };
        RateBudget { budget, window_sec, weight_per_call }
    }

    /// Requests to these venues may be routed through `HTTP_PROXY_PREFIX`.
    pub fn is_proxied(self) -> bool {
        matches!(self, Venue::Binance | Venue::Bybit)
    }
}

impl fmt::Display for Venue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown venue: {0}")]
pub struct UnknownVenue(pub String);

impl FromStr for Venue {
    type Err = UnknownVenue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Venue::ALL
            .into_iter()
            .find(|v| v.key() == s)
            .ok_or_else(|| UnknownVenue(s.to_string()))
    }
}
