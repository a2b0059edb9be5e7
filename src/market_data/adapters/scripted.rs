// In-memory MarketDataSource that replays canned books.

use std::collections::VecDeque;
use std::time::Duration;

use ahash::AHashMap;
use parking_lot::Mutex;

use super::MarketDataSource;
use crate::engine::types::RawBook;
use crate::market_data::error::FetchError;
use crate::venue::Venue;

type BookKey = (Venue, String, Option<u32>);

/// Test double for [`MarketDataSource`]: replays canned books in place of live
/// venues. Exported so integration tests can drive the pipeline; the binary
/// never constructs one.
#[derive(Default)]
pub struct ScriptedSource {
    books: Mutex<AHashMap<BookKey, VecDeque<Result<RawBook, FetchError>>>>,
    streams: Mutex<AHashMap<(Venue, String), Result<RawBook, FetchError>>>,
    stream_delay: Option<Duration>,
    book_delay: Option<Duration>,
    calls: Mutex<Vec<BookKey>>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response for `fetch_book`. Responses are consumed in order and
    /// the last one repeats.
    pub fn push_book(&self, venue: Venue, symbol: &str, sig_figs: Option<u32>, response: Result<RawBook, FetchError>) {
        self.books.lock().entry((venue, symbol.to_string(), sig_figs)).or_default().push_back(response);
    }

    pub fn set_stream(&self, venue: Venue, symbol: &str, response: Result<RawBook, FetchError>) {
        self.streams.lock().insert((venue, symbol.to_string()), response);
    }

    /// Delay every stream snapshot, for exercising the caller's timeout.
    pub fn with_stream_delay(mut self, delay: Duration) -> Self {
        self.stream_delay = Some(delay);
        self
    }

    /// Delay every `fetch_book`, for exercising round concurrency.
    pub fn with_book_delay(mut self, delay: Duration) -> Self {
        self.book_delay = Some(delay);
        self
    }

    pub fn book_calls(&self) -> Vec<BookKey> {
        self.calls.lock().clone()
    }

    pub fn calls_for(&self, venue: Venue, symbol: &str) -> usize {
        self.calls.lock().iter().filter(|(v, s, _)| *v == venue && s == symbol).count()
    }
}

#[async_trait::async_trait]
impl MarketDataSource for ScriptedSource {
    async fn fetch_book(
        &self,
        venue: Venue,
        symbol: &str,
        _depth_limit: usize,
        sig_figs: Option<u32>,
    ) -> Result<RawBook, FetchError> {
        let key = (venue, symbol.to_string(), sig_figs);
        self.calls.lock().push(key.clone());
        if let Some(delay) = self.book_delay {
            tokio::time::sleep(delay).await;
        }

        let mut books = self.books.lock();
        let Some(queue) = books.get_mut(&key) else {
            return Err(FetchError::Transport(format!("no scripted book for {venue}/{symbol}")));
        };
        match queue.len() {
            0 => Err(FetchError::Transport(format!("no scripted book for {venue}/{symbol}"))),
            1 => queue[0].clone(),
            _ => queue.pop_front().unwrap_or_else(|| Err(FetchError::Unknown("drained".into()))),
        }
    }

    async fn fetch_stream_snapshot(&self, venue: Venue, symbol: &str) -> Result<RawBook, FetchError> {
        if let Some(delay) = self.stream_delay {
            tokio::time::sleep(delay).await;
        }
        self.streams
            .lock()
            .get(&(venue, symbol.to_string()))
            .cloned()
            .unwrap_or_else(|| Err(FetchError::Realtime(format!("no scripted stream for {venue}/{symbol}"))))
    }
}
