// Bybit V5 linear orderbook.
// GET /v5/market/orderbook?category=linear&symbol={symbol}&limit={limit}

use serde::Deserialize;

use super::http::HttpClient;
use crate::engine::types::RawBook;
use crate::market_data::error::FetchError;
use crate::market_data::normaliser::{levels_from_pairs, value_as_f64};
use crate::venue::Venue;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderbookResponse {
    pub ret_code: i64,
    #[serde(default)]
    pub ret_msg: String,
    pub result: Option<OrderbookResult>,
}

#[derive(Debug, Deserialize)]
pub struct OrderbookResult {
    #[serde(default)]
    pub b: Vec<(String, String)>,
    #[serde(default)]
    pub a: Vec<(String, String)>,
    // ms; number on the wire, string in some proxies' re-encodings
    #[serde(default)]
    pub ts: Option<serde_json::Value>,
}

pub async fn fetch_book(http: &HttpClient, symbol: &str, depth_limit: usize) -> Result<RawBook, FetchError> {
    let url = format!(
        "{}/v5/market/orderbook?category=linear&symbol={symbol}&limit={depth_limit}",
        Venue::Bybit.base_url()
    );
    let response: OrderbookResponse = http.get_json(Venue::Bybit, &url).await?;
    into_raw_book(response)
}

fn into_raw_book(response: OrderbookResponse) -> Result<RawBook, FetchError> {
    if response.ret_code != 0 {
        return Err(FetchError::Transport(format!(
            "Bybit retCode {}: {}",
            response.ret_code, response.ret_msg
        )));
    }
    let result = response
        .result
        .ok_or_else(|| FetchError::Parse("Bybit response missing result".into()))?;

    Ok(RawBook {
        bids: levels_from_pairs(&result.b),
        asks: levels_from_pairs(&result.a),
        timestamp_ms: result.ts.as_ref().and_then(value_as_f64).map(|ts| ts as i64),
    })
}
