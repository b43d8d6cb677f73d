use std::sync::Arc;

use anyhow::Result;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use vire::config::Config;
use vire::freshness::FreshnessConfig;
use vire::jobs::executors::{
    CollectBulkEodExecutor, CollectCoreExecutor, CollectFilingPdfsExecutor, CollectFilingSummariesExecutor,
    CollectNewsExecutor, ComputeSignalsExecutor,
};
use vire::jobs::JobManager;
use vire::models::{JobType, SliceKind};
use vire::router::{self, AppState};
use vire::store::Store;
use vire::vendor::{HttpSummarizer, HttpVendor};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "failed to load configuration");
            eprintln!("configuration error: {e}");
            eprintln!("set MARKET_VENDOR_BASE_URL, MARKET_VENDOR_API_KEY and SUMMARIZER_BASE_URL or provide a .env file");
            std::process::exit(1);
        }
    };

    let store = match Store::connect(&config.market_storage, config.portfolio_storage.as_ref()).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!(error = %e, "failed to connect to storage");
            std::process::exit(1);
        }
    };

    let reset = store.jobs.reset_running_jobs().await?;
    if reset > 0 {
        info!(count = reset, "reset jobs left running by a previous crash");
    }

    let freshness = Arc::new(FreshnessConfig::default());
    let default_vendor: Arc<dyn vire::vendor::MarketDataVendor> = Arc::new(HttpVendor::new(&config.market_vendor));
    let default_summarizer: Arc<dyn vire::vendor::FilingSummarizer> = Arc::new(HttpSummarizer::new(&config.summarizer));

    let mut job_manager = JobManager::new(store.jobs.clone(), config.job_manager.clone());
    job_manager.register(
        JobType::CollectEod,
        Arc::new(CollectCoreExecutor { store: store.clone(), vendor: default_vendor.clone(), slice: SliceKind::Eod }),
    );
    job_manager.register(
        JobType::CollectFundamentals,
        Arc::new(CollectCoreExecutor {
            store: store.clone(),
            vendor: default_vendor.clone(),
            slice: SliceKind::Fundamentals,
        }),
    );
    job_manager.register(
        JobType::CollectFilingsIndex,
        Arc::new(CollectCoreExecutor {
            store: store.clone(),
            vendor: default_vendor.clone(),
            slice: SliceKind::FilingsIndex,
        }),
    );
    job_manager.register(
        JobType::CollectFilingPdfs,
        Arc::new(CollectFilingPdfsExecutor { store: store.clone(), vendor: default_vendor.clone() }),
    );
    job_manager.register(
        JobType::CollectFilingSummaries,
        Arc::new(CollectFilingSummariesExecutor {
            store: store.clone(),
            summarizer: default_summarizer.clone(),
            freshness: freshness.clone(),
        }),
    );
    job_manager.register(
        JobType::CollectNews,
        Arc::new(CollectNewsExecutor { store: store.clone(), vendor: default_vendor.clone() }),
    );
    job_manager.register(JobType::ComputeSignals, Arc::new(ComputeSignalsExecutor { store: store.clone() }));
    job_manager.register(
        JobType::CollectBulkEod,
        Arc::new(CollectBulkEodExecutor { store: store.clone(), vendor: default_vendor.clone() }),
    );

    let shutdown = job_manager.shutdown_token();
    let worker_handles = job_manager.spawn();

    let state = AppState::new(store.clone(), freshness, default_vendor, default_summarizer, &config);
    let app = router::build_router(state);

    let listener = tokio::net::TcpListener::bind(config.http_bind_addr.as_str()).await?;
    info!(addr = %config.http_bind_addr, "listening");

    let serve = axum::serve(listener, app).with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown signal received");
    });

    if let Err(e) = serve.await {
        error!(error = %e, "http server error");
    }

    shutdown.cancel();
    for handle in worker_handles {
        let _ = handle.await;
    }

    if let Some(store) = Arc::into_inner(store) {
        store.close().await?;
    }

    Ok(())
}
