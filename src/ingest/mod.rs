// Sampling pipeline: strategies, rounds, minute aggregation, scheduling
pub mod aggregate;  // samples -> one row per (venue, ticker)
pub mod fallback;   // REST, then push snapshot when tiers are short
pub mod refinement; // coarser sig figs until every tier fills
pub mod retry;      // backoff + jitter
pub mod sampler;    // concurrent round over all pairs
pub mod schedule;   // minute-aligned driver

pub use aggregate::aggregate_minute;
pub use retry::{with_retry, RetryPolicy};
pub use sampler::{RawSample, SampleEngine};
pub use schedule::{minute_bucket, RunMode, Scheduler};
