//! Process configuration, loaded from the environment the way the teacher's
//! `Config::from_env` does: a `.env` file is loaded if present, required
//! variables error out, optional ones fall back to sane defaults.

use anyhow::{anyhow, Result};

/// One logical storage section: a namespace name plus the sqlite database
/// it is backed by (spec section 6: "two logical storage sections,
/// `storage.market` and `storage.portfolio`").
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub namespace: String,
    pub database_path: String,
}

#[derive(Debug, Clone)]
pub struct VendorConfig {
    pub base_url: String,
    pub api_key: String,
    pub rate_limit_per_minute: u32,
}

#[derive(Debug, Clone)]
pub struct JobManagerConfig {
    pub heavy_workers: usize,
    pub light_workers: usize,
    pub heavy_timeout_secs: u64,
    pub light_timeout_secs: u64,
    pub poll_interval_ms: u64,
}

impl Default for JobManagerConfig {
    fn default() -> Self {
        Self {
            heavy_workers: 2,
            light_workers: 5,
            heavy_timeout_secs: 600,
            light_timeout_secs: 120,
            poll_interval_ms: 50,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub market_storage: StorageConfig,
    /// `None` in a market-only deployment (spec section 4.2).
    pub portfolio_storage: Option<StorageConfig>,
    pub market_vendor: VendorConfig,
    pub summarizer: VendorConfig,
    pub service_registration_key: Option<String>,
    pub job_manager: JobManagerConfig,
    pub http_bind_addr: String,
    pub file_storage_dir: String,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let market_storage = StorageConfig {
            namespace: env_or("STORAGE_MARKET_NAMESPACE", "market"),
            database_path: env_or("STORAGE_MARKET_DATABASE", "data/market.db"),
        };

        let portfolio_storage = match std::env::var("STORAGE_PORTFOLIO_DATABASE") {
            Ok(path) => Some(StorageConfig {
                namespace: env_or("STORAGE_PORTFOLIO_NAMESPACE", "portfolio"),
                database_path: path,
            }),
            Err(_) => None,
        };

        let market_vendor = VendorConfig {
            base_url: std::env::var("MARKET_VENDOR_BASE_URL")
                .map_err(|_| anyhow!("MARKET_VENDOR_BASE_URL environment variable required"))?,
            api_key: std::env::var("MARKET_VENDOR_API_KEY")
                .map_err(|_| anyhow!("MARKET_VENDOR_API_KEY environment variable required"))?,
            rate_limit_per_minute: env_parse_or("MARKET_VENDOR_RATE_LIMIT_PER_MINUTE", 120),
        };

        let summarizer = VendorConfig {
            base_url: std::env::var("SUMMARIZER_BASE_URL")
                .map_err(|_| anyhow!("SUMMARIZER_BASE_URL environment variable required"))?,
            api_key: std::env::var("SUMMARIZER_API_KEY").unwrap_or_default(),
            rate_limit_per_minute: env_parse_or("SUMMARIZER_RATE_LIMIT_PER_MINUTE", 20),
        };

        let job_manager = JobManagerConfig {
            heavy_workers: env_parse_or("JOB_HEAVY_WORKERS", 2),
            light_workers: env_parse_or("JOB_LIGHT_WORKERS", 5),
            heavy_timeout_secs: env_parse_or("JOB_HEAVY_TIMEOUT_SECS", 600),
            light_timeout_secs: env_parse_or("JOB_LIGHT_TIMEOUT_SECS", 120),
            poll_interval_ms: env_parse_or("JOB_POLL_INTERVAL_MS", 50),
        };

        Ok(Config {
            market_storage,
            portfolio_storage,
            market_vendor,
            summarizer,
            service_registration_key: std::env::var("SERVICE_REGISTRATION_KEY").ok(),
            job_manager,
            http_bind_addr: env_or("HTTP_BIND_ADDR", "0.0.0.0:8080"),
            file_storage_dir: env_or("FILE_STORAGE_DIR", "data/files"),
        })
    }
}
