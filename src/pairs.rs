//! Canonical tickers tracked by the sampler and how each venue spells them.
//!
//! `PairMap::builtin()` is the single source of truth for which instruments
//! exist. Add a `TickerMapping` there to track a new one.

use std::collections::BTreeMap;

use crate::venue::{SymbolStyle, Venue};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SymbolError {
    #[error("unknown canonical ticker: {0}")]
    UnknownTicker(String),
    #[error("ticker {ticker} is unsupported on {venue}")]
    Unsupported { ticker: String, venue: Venue },
}

#[derive(Debug, Clone)]
pub struct TickerMapping {
    pub canonical: String,
    pub default_quote: String,
    pub overrides: Vec<(Venue, String)>,
    pub unsupported: Vec<Venue>,
}

impl TickerMapping {
    pub fn new(canonical: &str, default_quote: &str) -> Self {
        Self {
            canonical: canonical.to_string(),
            default_quote: default_quote.to_string(),
            overrides: Vec::new(),
            unsupported: Vec::new(),
        }
    }

    pub fn with_override(mut self, venue: Venue, symbol: &str) -> Self {
        self.overrides.push((venue, symbol.to_string()));
        self
    }

    pub fn unsupported_on(mut self, venue: Venue) -> Self {
        self.unsupported.push(venue);
        self
    }

    fn override_for(&self, venue: Venue) -> Option<&str> {
        self.overrides.iter().find(|(v, _)| *v == venue).map(|(_, s)| s.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct PairMap {
    mappings: Vec<TickerMapping>,
}

impl Default for PairMap {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PairMap {
    pub fn new(mappings: Vec<TickerMapping>) -> Self {
        Self { mappings }
    }

    // With 4 samples/min at depth 1000, keep this to roughly a dozen tickers
    // before Binance/AsterDEX weight budgets get tight.
    pub fn builtin() -> Self {
        Self::new(vec![
            TickerMapping::new("BTC", "USD"),
            TickerMapping::new("ETH", "USD"),
            TickerMapping::new("SOL", "USD"),
            TickerMapping::new("XRP", "USD"),
            TickerMapping::new("HYPE", "USD"),
            TickerMapping::new("BONK", "USD")
                .with_override(Venue::Hyperliquid, "kBONK")
                .with_override(Venue::Lighter, "1000BONK")
                .with_override(Venue::Asterdex, "1000BONKUSDT")
                .with_override(Venue::Binance, "1000BONKUSDT")
                .with_override(Venue::Bybit, "1000BONKUSDT"),
            TickerMapping::new("PAXG", "USD").unsupported_on(Venue::Asterdex),
            TickerMapping::new("ZEC", "USD"),
        ])
    }

    pub fn canonical_tickers(&self) -> Vec<String> {
        self.mappings.iter().map(|m| m.canonical.clone()).collect()
    }

    pub fn contains(&self, ticker: &str) -> bool {
        self.mapping(ticker).is_ok()
    }

    /// Venue-native symbol for a canonical ticker.
    ///
    /// ```
    /// use depth_sampler::pairs::PairMap;
    /// use depth_sampler::venue::Venue;
    ///
    /// let pairs = PairMap::builtin();
    /// assert_eq!(pairs.resolve("BTC", Venue::Binance).unwrap(), "BTCUSDT");
    /// assert_eq!(pairs.resolve("BTC", Venue::Dydx).unwrap(), "BTC-USD");
    /// ```
    pub fn resolve(&self, ticker: &str, venue: Venue) -> Result<String, SymbolError> {
        let mapping = self.mapping(ticker)?;
        if mapping.unsupported.contains(&venue) {
            return Err(SymbolError::Unsupported { ticker: ticker.to_string(), venue });
        }
        if let Some(symbol) = mapping.override_for(venue) {
            return Ok(symbol.to_string());
        }

        let base = &mapping.canonical;
        let quote = match venue.default_quote() {
            "" => mapping.default_quote.as_str(),
            q => q,
        };
        Ok(match venue.symbol_style() {
            SymbolStyle::BaseOnly => base.clone(),
            SymbolStyle::BaseDashQuote => format!("{base}-{quote}"),
            SymbolStyle::BaseQuote => format!("{base}{quote}"),
        })
    }

    /// False for unknown tickers as well as explicitly unsupported pairs.
    pub fn is_supported(&self, ticker: &str, venue: Venue) -> bool {
        self.mapping(ticker).map(|m| !m.unsupported.contains(&venue)).unwrap_or(false)
    }

    /// venue -> ticker -> native symbol, skipping unsupported pairs.
    pub fn symbol_map(&self, tickers: &[String], venues: &[Venue]) -> BTreeMap<Venue, BTreeMap<String, String>> {
        venues
            .iter()
            .map(|&venue| {
                let symbols = tickers
                    .iter()
                    .filter_map(|t| self.resolve(t, venue).ok().map(|s| (t.clone(), s)))
                    .collect();
                (venue, symbols)
            })
            .collect()
    }

    fn mapping(&self, ticker: &str) -> Result<&TickerMapping, SymbolError> {
        self.mappings
            .iter()
            .find(|m| m.canonical == ticker)
            .ok_or_else(|| SymbolError::UnknownTicker(ticker.to_string()))
    }
}
