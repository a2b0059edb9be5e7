// Source: https://api.hyperliquid.xyz/info -> { "type": "l2Book" }
// Same level layout as the l2Book websocket channel.
#[derive(Debug, serde::Deserialize)]
pub struct L2Book {
    #[serde(default)]
    pub coin: String,
    pub levels: Vec<Vec<L2Level>>, // [bids, asks]
    #[serde(default)]
    pub time: Option<i64>,
}

#[derive(Debug, serde::Deserialize)]
pub struct L2Level {
    pub px: String, // price string, e.g. "1234.56"
    pub sz: String, // size string, e.g. "0.01"
    #[serde(default)]
    pub n: u32,     // number of orders at this level
}

// Request body for the l2Book info query
#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct L2BookRequest<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub coin: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n_sig_figs: Option<u32>,
}
