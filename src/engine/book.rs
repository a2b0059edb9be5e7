use std::cmp::Ordering;

use crate::engine::types::{NormalizedBook, OrderBookLevel, RawBook};
use tracing::{instrument, trace};

/// Clean raw levels into a two-sided book.
///
/// Levels with a non-finite or non-positive price or size are dropped. Bids are
/// sorted best (highest) first and asks best (lowest) first. Levels sharing a
/// price are kept as separate entries. Returns `None` when either side has no
/// level left, since a one-sided book can't be analysed.
#[instrument(level = "trace", skip_all, fields(raw_bids = raw_bids.len(), raw_asks = raw_asks.len()))]
pub fn normalize(
    raw_bids: &[OrderBookLevel],
    raw_asks: &[OrderBookLevel],
    timestamp_ms: Option<i64>,
) -> Option<NormalizedBook> {
    let mut bids = valid_levels(raw_bids);
    let mut asks = valid_levels(raw_asks);

    // Finite prices only past this point, so partial_cmp never fails
    bids.sort_by(|a, b| b.price.partial_cmp(&a.price).unwrap_or(Ordering::Equal));
    asks.sort_by(|a, b| a.price.partial_cmp(&b.price).unwrap_or(Ordering::Equal));

    let (n_bids, n_asks) = (bids.len(), asks.len());
    let book = NormalizedBook::new(bids, asks, timestamp_ms);
    if book.is_none() {
        trace!(bids = n_bids, asks = n_asks, "Rejecting one-sided book");
    }
    book
}

pub fn normalize_raw(raw: &RawBook) -> Option<NormalizedBook> {
    normalize(&raw.bids, &raw.asks, raw.timestamp_ms)
}

fn valid_levels(levels: &[OrderBookLevel]) -> Vec<OrderBookLevel> {
    levels.iter().copied().filter(OrderBookLevel::is_valid).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn lvl(price: f64, size: f64) -> OrderBookLevel {
        OrderBookLevel::new(price, size)
    }

    #[test]
    fn test_sorts_each_side() {
        let bids = [lvl(98.0, 1.0), lvl(100.0, 2.0), lvl(99.0, 3.0)];
        let asks = [lvl(103.0, 1.0), lvl(101.0, 2.0), lvl(102.0, 3.0)];
        let book = normalize(&bids, &asks, None).unwrap();

        let bid_px: Vec<f64> = book.bids().iter().map(|l| l.price).collect();
        let ask_px: Vec<f64> = book.asks().iter().map(|l| l.price).collect();
        assert_eq!(bid_px, vec![100.0, 99.0, 98.0]);
        assert_eq!(ask_px, vec![101.0, 102.0, 103.0]);
    }

    #[test]
    fn test_drops_invalid_levels() {
        let bids = [lvl(f64::NAN, 1.0), lvl(100.0, 1.0), lvl(0.0, 1.0), lvl(-1.0, 5.0), lvl(99.0, f64::INFINITY)];
        let asks = [lvl(101.0, 0.0), lvl(101.0, 2.0), lvl(102.0, -3.0)];
        let book = normalize(&bids, &asks, None).unwrap();

        assert_eq!(book.bids(), &[lvl(100.0, 1.0)]);
        assert_eq!(book.asks(), &[lvl(101.0, 2.0)]);
    }

    #[test]
    fn test_absent_when_a_side_empties() {
        assert!(normalize(&[lvl(f64::NAN, 1.0)], &[lvl(100.0, 1.0)], None).is_none());
        assert!(normalize(&[lvl(99.0, 1.0)], &[], None).is_none());
        assert!(normalize(&[], &[], None).is_none());
    }

    #[test]
    fn test_keeps_duplicate_prices_and_timestamp() {
        let bids = [lvl(99.0, 1.0), lvl(99.0, 2.0)];
        let asks = [lvl(101.0, 1.0)];
        let book = normalize(&bids, &asks, Some(1_700_000_000_000)).unwrap();
        assert_eq!(book.bids().len(), 2);
        assert_eq!(book.timestamp_ms(), Some(1_700_000_000_000));
    }

    fn any_level() -> impl Strategy<Value = OrderBookLevel> {
        let num = prop_oneof![
            4 => -10.0f64..1_000.0,
            1 => Just(f64::NAN),
            1 => Just(f64::INFINITY),
            1 => Just(0.0),
        ];
        (num.clone(), num).prop_map(|(p, s)| OrderBookLevel::new(p, s))
    }

    proptest! {
        #[test]
        fn prop_output_is_ordered_and_valid(
            bids in prop::collection::vec(any_level(), 0..40),
            asks in prop::collection::vec(any_level(), 0..40),
        ) {
            let expect_some = bids.iter().any(OrderBookLevel::is_valid) && asks.iter().any(OrderBookLevel::is_valid);
            match normalize(&bids, &asks, None) {
                None => prop_assert!(!expect_some),
                Some(book) => {
                    prop_assert!(expect_some);
                    prop_assert!(book.bids().iter().chain(book.asks().iter()).all(OrderBookLevel::is_valid));
                    prop_assert!(book.bids().windows(2).all(|w| w[0].price >= w[1].price));
                    prop_assert!(book.asks().windows(2).all(|w| w[0].price <= w[1].price));
                }
            }
        }
    }
}
