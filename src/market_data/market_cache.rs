// Symbol -> numeric market id, for venues addressed by id (Lighter).
// Entries expire by age only. Concurrent misses may both resolve and insert;
// they write the same value, so last-writer-wins is fine.

use std::time::{Duration, Instant};

use ahash::AHashMap;
use parking_lot::RwLock;
use tracing::trace;

pub const DEFAULT_MARKET_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, Copy)]
struct CachedMarket {
    id: u32,
    cached_at: Instant,
}

#[derive(Debug)]
pub struct MarketIdCache {
    ttl: Duration,
    entries: RwLock<AHashMap<String, CachedMarket>>,
}

impl Default for MarketIdCache {
    fn default() -> Self {
        Self::new(DEFAULT_MARKET_TTL)
    }
}

impl MarketIdCache {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, entries: RwLock::new(AHashMap::new()) }
    }

    /// Fresh id for `symbol`, or `None` if missing or older than the TTL.
    pub fn get(&self, symbol: &str) -> Option<u32> {
        let entries = self.entries.read();
        let entry = entries.get(symbol)?;
        if entry.cached_at.elapsed() < self.ttl {
            Some(entry.id)
        } else {
            trace!(symbol, "Market id cache entry expired");
            None
        }
    }

    pub fn insert(&self, symbol: &str, id: u32) {
        self.entries
            .write()
            .insert(symbol.to_string(), CachedMarket { id, cached_at: Instant::now() });
    }

    /// Insert a whole market listing under one write lock.
    pub fn insert_all<I>(&self, markets: I)
    where
        I: IntoIterator<Item = (String, u32)>,
    {
        let now = Instant::now();
        let mut entries = self.entries.write();
        for (symbol, id) in markets {
            entries.insert(symbol, CachedMarket { id, cached_at: now });
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_within_ttl() {
        let cache = MarketIdCache::new(Duration::from_secs(60));
        cache.insert("BTC", 1);
        assert_eq!(cache.get("BTC"), Some(1));
        assert_eq!(cache.get("ETH"), None);
    }

    #[test]
    fn test_expired_entry_is_a_miss() {
        let cache = MarketIdCache::new(Duration::ZERO);
        cache.insert("BTC", 1);
        assert_eq!(cache.get("BTC"), None);
        // still stored until overwritten
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_insert_all_overwrites() {
        let cache = MarketIdCache::default();
        cache.insert("SOL", 9);
        cache.insert_all(vec![("SOL".to_string(), 2), ("ETH".to_string(), 0)]);
        assert_eq!(cache.get("SOL"), Some(2));
        assert_eq!(cache.get("ETH"), Some(0));
    }
}
