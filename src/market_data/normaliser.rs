// Convert venue wire values (mostly decimal strings) into f64 levels.
// Unparseable numbers become NaN so book::normalize drops that level instead of
// the whole response failing.

use crate::engine::types::OrderBookLevel;

pub fn parse_decimal(s: &str) -> f64 {
    s.trim().parse::<f64>().unwrap_or(f64::NAN)
}

pub fn level_from_strs(px: &str, sz: &str) -> OrderBookLevel {
    OrderBookLevel::new(parse_decimal(px), parse_decimal(sz))
}

/// Map `[price, size]` string pairs (Binance/Bybit layout).
pub fn levels_from_pairs(pairs: &[(String, String)]) -> Vec<OrderBookLevel> {
    pairs.iter().map(|(p, s)| level_from_strs(p, s)).collect()
}

/// Accepts a JSON number or a numeric string; anything else is `None`.
pub fn value_as_f64(v: &serde_json::Value) -> Option<f64> {
    match v {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
