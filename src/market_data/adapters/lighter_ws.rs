// One-shot Lighter websocket read: subscribe to order_book/{id}, take the
// first full snapshot, close. The caller bounds the whole exchange with a timeout.

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, trace};

use crate::engine::types::{OrderBookLevel, RawBook};
use crate::market_data::error::FetchError;
use crate::market_data::normaliser::value_as_f64;

pub async fn fetch_snapshot(ws_url: &str, market_id: u32) -> Result<RawBook, FetchError> {
    let (mut ws, response) = connect_async(ws_url).await?;
    debug!(market_id, status = %response.status(), "Lighter websocket connected");

    let subscribe = serde_json::json!({
        "type": "subscribe",
        "channel": format!("order_book/{market_id}"),
    });
    ws.send(Message::Text(subscribe.to_string())).await?;

    while let Some(msg) = ws.next().await {
        match msg? {
            Message::Text(text) => {
                let Ok(value) = serde_json::from_str::<Value>(&text) else {
                    trace!("Ignoring non-JSON websocket frame");
                    continue;
                };
                if let Some(book) = extract_snapshot(&value) {
                    // Best effort; the snapshot is already in hand
                    let _ = ws.close(None).await;
                    return Ok(book);
                }
                trace!("Ignoring non-orderbook message");
            }
            Message::Close(frame) => {
                return Err(FetchError::Realtime(format!("closed before snapshot: {frame:?}")));
            }
            _ => {}
        }
    }

    Err(FetchError::Realtime("stream ended before snapshot".into()))
}

/// Snapshot under `order_book`, `data.order_book`, or `bids`/`asks` at the root.
pub(crate) fn extract_snapshot(msg: &Value) -> Option<RawBook> {
    let book = msg
        .get("order_book")
        .or_else(|| msg.get("data").and_then(|d| d.get("order_book")))
        .or_else(|| (msg.get("bids").is_some() && msg.get("asks").is_some()).then_some(msg))?;

    Some(RawBook { bids: side(book.get("bids")), asks: side(book.get("asks")), timestamp_ms: None })
}

fn side(levels: Option<&Value>) -> Vec<OrderBookLevel> {
    let Some(levels) = levels.and_then(Value::as_array) else {
        return Vec::new();
    };
    levels
        .iter()
        .map(|lvl| {
            let price = lvl.get("price").and_then(value_as_f64).unwrap_or(f64::NAN);
            let size = lvl.get("size").and_then(value_as_f64).unwrap_or(f64::NAN);
            OrderBookLevel::new(price, size)
        })
        .collect()
}
