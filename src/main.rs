use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{info, info_span, Instrument};

use depth_sampler::config::{SamplingConfig, StorageKind};
use depth_sampler::ingest::schedule::spawn_signal_listener;
use depth_sampler::ingest::{RunMode, SampleEngine, Scheduler};
use depth_sampler::market_data::{HttpMarketData, MarketIdCache};
use depth_sampler::pairs::PairMap;
use depth_sampler::persist::csv_store::CsvMinuteStore;
use depth_sampler::persist::error_log::ErrorLog;
use depth_sampler::persist::postgres::PostgresMinuteStore;
use depth_sampler::persist::sqlite::SqliteMinuteStore;
use depth_sampler::persist::MinuteSink;
use depth_sampler::telemetry;

/// Sample order-book depth across venues and store one row per minute.
#[derive(Parser, Debug)]
#[command(name = "depth-sampler", version)]
struct Cli {
    #[arg(long, value_enum, default_value_t = RunMode::Once)]
    mode: RunMode,

    /// Config file (toml/json/yaml); `DEPTH_SAMPLER__*` env vars override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Overrides the configured storage backend.
    #[arg(long, value_enum)]
    storage: Option<StorageKind>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok(); // load .env
    let cli = Cli::parse();

    let pairs = PairMap::builtin();
    let mut cfg = SamplingConfig::from_sources(cli.config.as_deref()).context("failed to load configuration")?;
    if let Some(storage) = cli.storage {
        cfg.storage = storage;
    }

    telemetry::init_tracing(&cfg.log_level, cfg.log_json);
    telemetry::init_metrics(cfg.metrics_port)?;
    cfg.validate(&pairs).context("invalid configuration")?;

    let run_id = telemetry::new_run_id();
    run(cli.mode, cfg, pairs).instrument(info_span!("run", run_id = %run_id)).await
}

async fn run(mode: RunMode, cfg: SamplingConfig, pairs: PairMap) -> anyhow::Result<()> {
    info!(
        pairs = cfg.pairs.len(),
        venues = cfg.venues.len(),
        samples_per_minute = cfg.samples_per_minute,
        storage = ?cfg.storage,
        "Starting depth sampler"
    );

    let sink: Arc<dyn MinuteSink> = match cfg.storage {
        StorageKind::Sqlite => Arc::new(SqliteMinuteStore::open(&cfg.sqlite_path)?),
        StorageKind::Csv => Arc::new(CsvMinuteStore::new(&cfg.csv_dir, &cfg.tiers)),
        StorageKind::Postgres => {
            let url = cfg.database_url.as_deref().context("postgres storage needs DATABASE_URL")?;
            Arc::new(PostgresMinuteStore::connect(url).await?)
        }
    };

    let source = Arc::new(HttpMarketData::new(cfg.fetch_timeout(), Arc::new(MarketIdCache::default()))?);
    let error_log = ErrorLog::new(cfg.error_log_dir.clone());
    let engine = SampleEngine::new(source, pairs, Arc::new(cfg)).with_error_log(error_log);

    let scheduler = Scheduler::new(engine, sink);
    spawn_signal_listener(scheduler.stop_handle());

    let minutes = scheduler.run(mode).await;
    info!(minutes, "Done");
    Ok(())
}
