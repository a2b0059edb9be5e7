pub mod config;
pub mod engine;
pub mod ingest;
pub mod market_data;
pub mod pairs;
pub mod persist;
pub mod telemetry;
pub mod venue;
