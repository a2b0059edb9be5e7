// Reduce one minute's samples to one row per (venue, ticker): medians for
// numbers, majority vote for fill flags, OR for venue annotations.

use std::collections::BTreeMap;

use chrono::{SecondsFormat, TimeZone, Utc};
use itertools::Itertools;

use crate::engine::types::{LiquidityAnalysis, SlippageTierResult};
use crate::ingest::sampler::RawSample;
use crate::persist::{MinuteRow, TierAggregate};
use crate::venue::Venue;

const MAX_ERRORS_KEPT: usize = 3;

/// Even-length input averages the two middle values. Non-finite values are ignored.
pub fn median(values: impl IntoIterator<Item = f64>) -> Option<f64> {
    let mut values: Vec<f64> = values.into_iter().filter(|v| v.is_finite()).collect();
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    Some(if values.len() % 2 == 0 { (values[mid - 1] + values[mid]) / 2.0 } else { values[mid] })
}

/// Strict majority; a tie is `false`.
pub fn majority(flags: impl IntoIterator<Item = bool>) -> Option<bool> {
    let (yes, total) = flags.into_iter().fold((0usize, 0usize), |(yes, total), f| (yes + f as usize, total + 1));
    (total > 0).then_some(yes * 2 > total)
}

pub fn aggregate_minute(samples: &[RawSample], minute: &str) -> Vec<MinuteRow> {
    let mut groups: BTreeMap<(Venue, &str), Vec<&RawSample>> = BTreeMap::new();
    for sample in samples {
        groups.entry((sample.venue, sample.ticker.as_str())).or_default().push(sample);
    }

    groups
        .into_iter()
        .map(|((venue, ticker), group)| aggregate_group(minute, venue, ticker, &group))
        .collect()
}

fn aggregate_group(minute: &str, venue: Venue, ticker: &str, group: &[&RawSample]) -> MinuteRow {
    let ok: Vec<&LiquidityAnalysis> = group.iter().filter_map(|s| s.analysis.as_ref()).collect();
    let symbol = group.first().map(|s| s.symbol.clone()).unwrap_or_default();
    let collected_at_ms = group.iter().map(|s| s.collected_at_ms).max().unwrap_or_default();

    let mut row = MinuteRow {
        ts_minute_utc: minute.to_string(),
        venue,
        ticker: ticker.to_string(),
        symbol,
        samples_total: group.len() as u32,
        samples_success: ok.len() as u32,
        book_timestamp_ms: None,
        collected_at_utc: format_millis(collected_at_ms),
        mid_price: None,
        best_bid: None,
        best_ask: None,
        spread_usd: None,
        spread_bps: None,
        tiers: Vec::new(),
        is_aggregated_estimate: false,
        hyperliquid_n_sig_figs: None,
        hyperliquid_n_sig_figs_per_tier: None,
        lighter_ws_fallback: false,
        error: None,
    };

    if ok.is_empty() {
        let errors = group.iter().filter_map(|s| s.error.as_deref()).unique().take(MAX_ERRORS_KEPT).join("; ");
        row.error = Some(if errors.is_empty() { "no successful samples".to_string() } else { errors });
        return row;
    }

    row.mid_price = median(ok.iter().map(|a| a.mid_price));
    row.best_bid = median(ok.iter().map(|a| a.best_bid));
    row.best_ask = median(ok.iter().map(|a| a.best_ask));
    row.spread_usd = median(ok.iter().map(|a| a.spread_usd));
    row.spread_bps = median(ok.iter().map(|a| a.spread_bps));
    row.book_timestamp_ms = median(ok.iter().filter_map(|a| a.timestamp_ms).map(|t| t as f64)).map(|t| t.round() as i64);
    row.tiers = aggregate_tiers(&ok);

    row.is_aggregated_estimate = ok.iter().any(|a| a.is_aggregated_estimate);
    row.lighter_ws_fallback = ok.iter().any(|a| a.ws_fallback);
    row.hyperliquid_n_sig_figs = ok.iter().filter_map(|a| a.n_sig_figs).min();
    row.hyperliquid_n_sig_figs_per_tier = per_tier_min(ok.iter().filter_map(|a| a.n_sig_figs_per_tier.as_deref()));
    row
}

// Tier vectors are index-aligned across samples of one run
fn aggregate_tiers(ok: &[&LiquidityAnalysis]) -> Vec<TierAggregate> {
    let count = ok.iter().map(|a| a.asks.len().max(a.bids.len())).max().unwrap_or(0);
    (0..count)
        .map(|i| {
            let asks: Vec<&SlippageTierResult> = ok.iter().filter_map(|a| a.asks.get(i)).collect();
            let bids: Vec<&SlippageTierResult> = ok.iter().filter_map(|a| a.bids.get(i)).collect();
            let notional = asks.first().or(bids.first()).map(|t| t.notional).unwrap_or_default();
            TierAggregate {
                notional,
                ask_slip_bps: median(asks.iter().map(|t| t.slippage_bps)),
                bid_slip_bps: median(bids.iter().map(|t| t.slippage_bps)),
                ask_filled: majority(asks.iter().map(|t| t.filled)),
                bid_filled: majority(bids.iter().map(|t| t.filled)),
                ask_filled_notional: median(asks.iter().map(|t| t.filled_notional)),
                bid_filled_notional: median(bids.iter().map(|t| t.filled_notional)),
            }
        })
        .collect()
}

fn per_tier_min<'a>(vectors: impl Iterator<Item = &'a [u32]>) -> Option<Vec<u32>> {
    vectors.fold(None, |acc: Option<Vec<u32>>, v| match acc {
        None => Some(v.to_vec()),
        Some(mut acc) => {
            for (i, &sf) in v.iter().enumerate() {
                match acc.get_mut(i) {
                    Some(slot) => *slot = (*slot).min(sf),
                    None => acc.push(sf),
                }
            }
            Some(acc)
        }
    })
}

fn format_millis(ms: i64) -> String {
    Utc.timestamp_millis_opt(ms)
        .single()
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_default()
}
