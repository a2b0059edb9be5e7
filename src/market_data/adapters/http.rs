// Thin reqwest wrapper: per-request deadline, status check, JSON decode,
// optional proxy routing for venues that geo-block.

use std::time::Duration;

use serde::de::DeserializeOwned;
use tracing::{debug, trace};

use crate::market_data::error::FetchError;
use crate::venue::Venue;

const ERROR_BODY_PREVIEW: usize = 200;

pub struct HttpClient {
    client: reqwest::Client,
    timeout: Duration,
    proxy_prefix: Option<String>,
}

impl HttpClient {
    pub fn new(timeout: Duration, proxy_prefix: Option<String>) -> Result<Self, FetchError> {
        Self::from_builder(reqwest::Client::builder(), timeout, proxy_prefix)
    }

    fn from_builder(
        builder: reqwest::ClientBuilder,
        timeout: Duration,
        proxy_prefix: Option<String>,
    ) -> Result<Self, FetchError> {
        let client = builder.gzip(true).build().map_err(|e| FetchError::Transport(e.to_string()))?;
        if let Some(prefix) = &proxy_prefix {
            debug!(prefix = %prefix, "Routing proxied venues through HTTP prefix");
        }
        Ok(Self { client, timeout, proxy_prefix })
    }

    pub async fn get_json<T: DeserializeOwned>(&self, venue: Venue, url: &str) -> Result<T, FetchError> {
        let url = build_request_url(venue, url, self.proxy_prefix.as_deref());
        trace!(%venue, url = %url, "GET");
        self.send(self.client.get(url)).await
    }

    pub async fn post_json<T: DeserializeOwned>(&self, url: &str, body: &serde_json::Value) -> Result<T, FetchError> {
        trace!(url = %url, "POST");
        self.send(self.client.post(url).json(body)).await
    }

    async fn send<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T, FetchError> {
        let exchange = async {
            let response = request.send().await?;
            let status = response.status();
            let body = response.text().await?;
            if !status.is_success() {
                return Err(FetchError::Http {
                    status: status.as_u16(),
                    detail: body.chars().take(ERROR_BODY_PREVIEW).collect(),
                });
            }
            serde_json::from_str(&body).map_err(|e| FetchError::Parse(e.to_string()))
        };

        // Dropping the future on expiry aborts the in-flight request
        tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| FetchError::Timeout(self.timeout))?
    }
}

/// `HTTP_PROXY_PREFIX`, then `NEXT_PUBLIC_HTTP_PROXY_PREFIX`; blank counts as unset.
pub fn proxy_prefix_from_env() -> Option<String> {
    proxy_prefix_from(|key| std::env::var(key).ok())
}

fn proxy_prefix_from(lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
    let raw = lookup("HTTP_PROXY_PREFIX").or_else(|| lookup("NEXT_PUBLIC_HTTP_PROXY_PREFIX"))?;
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Wrap `target` in the proxy prefix for proxied venues. A `{url}` placeholder
/// in the prefix is replaced by the encoded target; otherwise it is appended.
pub fn build_request_url(venue: Venue, target: &str, prefix: Option<&str>) -> String {
    let Some(prefix) = prefix.filter(|_| venue.is_proxied()) else {
        return target.to_string();
    };
    let encoded: String = url::form_urlencoded::byte_serialize(target.as_bytes()).collect();
    if prefix.contains("{url}") {
        prefix.replace("{url}", &encoded)
    } else {
        format!("{prefix}{encoded}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    const TARGET: &str = "https://fapi.binance.com/fapi/v1/depth?symbol=BTCUSDT&limit=1000";
    const ENCODED: &str = "https%3A%2F%2Ffapi.binance.com%2Ffapi%2Fv1%2Fdepth%3Fsymbol%3DBTCUSDT%26limit%3D1000";

    #[test]
    fn test_no_prefix_passes_through() {
        assert_eq!(build_request_url(Venue::Binance, TARGET, None), TARGET);
    }

    #[test]
    fn test_unproxied_venue_ignores_prefix() {
        let url = "https://indexer.dydx.trade/v4/orderbooks/perpetualMarket/BTC-USD";
        assert_eq!(build_request_url(Venue::Dydx, url, Some("https://proxy/?url=")), url);
    }

    #[test]
    fn test_prefix_and_template_styles() {
        assert_eq!(
            build_request_url(Venue::Binance, TARGET, Some("https://proxy/?url=")),
            format!("https://proxy/?url={ENCODED}")
        );
        assert_eq!(
            build_request_url(Venue::Bybit, TARGET, Some("https://proxy/?target={url}&x=1")),
            format!("https://proxy/?target={ENCODED}&x=1")
        );
    }

    #[test]
    fn test_prefix_env_priority_and_blank() {
        let both = |k: &str| match k {
            "HTTP_PROXY_PREFIX" => Some(" https://a/?u= ".to_string()),
            "NEXT_PUBLIC_HTTP_PROXY_PREFIX" => Some("https://b/?u=".to_string()),
            _ => None,
        };
        assert_eq!(proxy_prefix_from(both).as_deref(), Some("https://a/?u="));

        let public_only = |k: &str| (k == "NEXT_PUBLIC_HTTP_PROXY_PREFIX").then(|| "https://b/?u=".to_string());
        assert_eq!(proxy_prefix_from(public_only).as_deref(), Some("https://b/?u="));

        let blank = |k: &str| (k == "HTTP_PROXY_PREFIX").then(|| "   ".to_string());
        assert_eq!(proxy_prefix_from(blank), None);
    }

    #[tokio::test]
    async fn test_silent_server_times_out() {
        // accepts connections and never answers
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let timeout = Duration::from_millis(200);
        // straight to the listener even if the environment sets a system proxy
        let client = HttpClient::from_builder(reqwest::Client::builder().no_proxy(), timeout, None).unwrap();
        let started = std::time::Instant::now();
        let result = client.get_json::<serde_json::Value>(Venue::Dydx, &format!("http://{addr}/v4/orderbooks")).await;

        assert!(matches!(result, Err(FetchError::Timeout(t)) if t == timeout), "{result:?}");
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
