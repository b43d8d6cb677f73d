//! Dual Namespace Store (spec section 4.2): two independent sqlite
//! connections, one per logical namespace (`market`, shared; `portfolio`,
//! per-user), exposing typed sub-stores. Market is a leaf: nothing in this
//! module lets market code read the portfolio pool (spec section 9,
//! "cyclic references avoided").

mod feedback;
mod files;
mod internal;
mod jobs;
mod market;
mod oauth;
mod stock_index;
mod user_data;

pub use feedback::FeedbackStore;
pub use files::FileStore;
pub use internal::InternalStore;
pub use jobs::JobQueueStore;
pub use market::{MarketDataStore, SignalStore};
pub use oauth::OAuthStore;
pub use stock_index::StockIndexStore;
pub use user_data::UserDataStore;

use std::collections::HashMap;

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tracing::info;

use crate::config::StorageConfig;
use crate::error::{VireError, VireResult};

static MARKET_MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("migrations/market");
static PORTFOLIO_MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("migrations/portfolio");

/// Coordinates the two namespace connections and the typed sub-stores built
/// on top of them. Per-user sub-stores are `None` in a market-only
/// deployment; callers that require them refuse to run at construction
/// time rather than panicking deep in a request path.
pub struct Store {
    market_pool: SqlitePool,
    portfolio_pool: Option<SqlitePool>,

    pub market_data: MarketDataStore,
    pub signals: SignalStore,
    pub stock_index: StockIndexStore,
    pub jobs: JobQueueStore,
    pub files: FileStore,
    pub feedback: FeedbackStore,

    pub internal: Option<InternalStore>,
    pub user_data: Option<UserDataStore>,
    pub oauth: Option<OAuthStore>,
}

async fn open_pool(cfg: &StorageConfig) -> VireResult<SqlitePool> {
    if let Some(parent) = std::path::Path::new(&cfg.database_path).parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| VireError::StorageUnavailable(format!("creating {}: {e}", parent.display())))?;
    }
    let url = format!("sqlite://{}?mode=rwc", cfg.database_path);
    SqlitePoolOptions::new()
        .max_connections(8)
        .connect(&url)
        .await
        .map_err(|e| VireError::StorageUnavailable(format!("connecting to {} namespace: {e}", cfg.namespace)))
}

impl Store {
    /// Connect both namespaces and run migrations. Connection failure is
    /// fatal (spec section 4.2).
    pub async fn connect(
        market_cfg: &StorageConfig,
        portfolio_cfg: Option<&StorageConfig>,
    ) -> VireResult<Self> {
        info!(namespace = %market_cfg.namespace, "connecting market namespace");
        let market_pool = open_pool(market_cfg).await?;
        sqlx::query("PRAGMA journal_mode=WAL").execute(&market_pool).await?;
        sqlx::query("PRAGMA busy_timeout=5000").execute(&market_pool).await?;
        MARKET_MIGRATOR
            .run(&market_pool)
            .await
            .map_err(|e| VireError::StorageUnavailable(format!("market migrations: {e}")))?;

        let portfolio_pool = match portfolio_cfg {
            Some(cfg) => {
                info!(namespace = %cfg.namespace, "connecting portfolio namespace");
                let pool = open_pool(cfg).await?;
                sqlx::query("PRAGMA journal_mode=WAL").execute(&pool).await?;
                sqlx::query("PRAGMA busy_timeout=5000").execute(&pool).await?;
                PORTFOLIO_MIGRATOR
                    .run(&pool)
                    .await
                    .map_err(|e| VireError::StorageUnavailable(format!("portfolio migrations: {e}")))?;
                Some(pool)
            }
            None => {
                info!("no portfolio storage configured; running market-only");
                None
            }
        };

        Ok(Self::from_pools(market_pool, portfolio_pool))
    }

    fn from_pools(market_pool: SqlitePool, portfolio_pool: Option<SqlitePool>) -> Self {
        let market_data = MarketDataStore::new(market_pool.clone());
        let signals = SignalStore::new(market_pool.clone());
        let stock_index = StockIndexStore::new(market_pool.clone());
        let jobs = JobQueueStore::new(market_pool.clone());
        let feedback = FeedbackStore::new(market_pool.clone());
        let files = FileStore::new(market_pool.clone(), portfolio_pool.clone());

        let internal = portfolio_pool.as_ref().map(|p| InternalStore::new(p.clone()));
        let user_data = portfolio_pool.as_ref().map(|p| UserDataStore::new(p.clone()));
        let oauth = portfolio_pool.as_ref().map(|p| OAuthStore::new(p.clone()));

        Self {
            market_pool,
            portfolio_pool,
            market_data,
            signals,
            stock_index,
            jobs,
            files,
            feedback,
            internal,
            user_data,
            oauth,
        }
    }

    /// Require the per-user sub-stores to be present, returning a typed
    /// `invalid_input`-class error if this is a market-only deployment
    /// (spec section 4.2).
    pub fn require_user_stores(&self) -> VireResult<(&InternalStore, &UserDataStore, &OAuthStore)> {
        match (&self.internal, &self.user_data, &self.oauth) {
            (Some(i), Some(u), Some(o)) => Ok((i, u, o)),
            _ => Err(VireError::InvalidInput(
                "this deployment has no portfolio storage configured".to_string(),
            )),
        }
    }

    pub fn has_portfolio_namespace(&self) -> bool {
        self.portfolio_pool.is_some()
    }

    /// Remove market data, signals, filings and pending/completed jobs; keep
    /// user-authored records. Returns a per-kind count (spec section 4.2).
    pub async fn purge_derived_data(&self) -> VireResult<HashMap<String, u64>> {
        let mut counts = HashMap::new();

        let market_rows = sqlx::query("DELETE FROM market_data")
            .execute(&self.market_pool)
            .await?
            .rows_affected();
        counts.insert("market_data".to_string(), market_rows);

        let signal_rows = sqlx::query("DELETE FROM signals")
            .execute(&self.market_pool)
            .await?
            .rows_affected();
        counts.insert("signals".to_string(), signal_rows);

        let file_rows = sqlx::query("DELETE FROM files WHERE category = 'filing_pdf'")
            .execute(&self.market_pool)
            .await?
            .rows_affected();
        counts.insert("filing_pdfs".to_string(), file_rows);

        let job_rows = sqlx::query("DELETE FROM jobs")
            .execute(&self.market_pool)
            .await?
            .rows_affected();
        counts.insert("jobs".to_string(), job_rows);

        if let Some(user_data) = &self.user_data {
            let report_rows = user_data.delete_by_subject_all_users(crate::models::Subject::Report).await?;
            counts.insert("reports".to_string(), report_rows);
        }

        // Stock index stays, but every slice timestamp left in it reports
        // as zero from now on, per spec section 4.2.
        let zeroed = self.stock_index.zero_all_timestamps().await?;
        counts.insert("stock_index_timestamps_reset".to_string(), zeroed);

        Ok(counts)
    }

    /// Close both connections; errors from each are aggregated rather than
    /// masked (spec section 4.2).
    pub async fn close(self) -> VireResult<()> {
        let mut errors = Vec::new();

        self.market_pool.close().await;
        if !self.market_pool.is_closed() {
            errors.push("market pool did not close".to_string());
        }

        if let Some(pool) = &self.portfolio_pool {
            pool.close().await;
            if !pool.is_closed() {
                errors.push("portfolio pool did not close".to_string());
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(VireError::StorageUnavailable(errors.join("; ")))
        }
    }
}

/// Shared helper: JSON-encode a document for a TEXT column.
pub(crate) fn encode<T: serde::Serialize>(value: &T) -> VireResult<String> {
    Ok(serde_json::to_string(value)?)
}

/// Shared helper: JSON-decode a document from a TEXT column.
pub(crate) fn decode<T: serde::de::DeserializeOwned>(raw: &str) -> VireResult<T> {
    Ok(serde_json::from_str(raw)?)
}
