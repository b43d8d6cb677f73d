use chrono::Utc;
use sqlx::SqlitePool;

use crate::error::{VireError, VireResult};
use crate::models::{MarketData, Signals};

use super::{decode, encode};

/// Market data sub-store: whole-document reads and writes, per ticker
/// (spec section 4.2).
#[derive(Clone)]
pub struct MarketDataStore {
    pool: SqlitePool,
}

impl MarketDataStore {
    pub(super) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, ticker: &str) -> VireResult<MarketData> {
        let row = sqlx::query_as::<_, (String,)>("SELECT body FROM market_data WHERE ticker = ?1")
            .bind(ticker)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some((body,)) => decode(&body),
            None => Err(VireError::NotFound(format!("market data for {ticker}"))),
        }
    }

    pub async fn save(&self, record: &MarketData) -> VireResult<()> {
        let body = encode(record)?;
        sqlx::query(
            "INSERT INTO market_data (ticker, body, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(ticker) DO UPDATE SET body = excluded.body, updated_at = excluded.updated_at",
        )
        .bind(&record.ticker)
        .bind(body)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Missing tickers are simply omitted from the result (spec section 4.2).
    pub async fn batch_get(&self, tickers: &[String]) -> VireResult<Vec<MarketData>> {
        if tickers.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = tickers.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!("SELECT body FROM market_data WHERE ticker IN ({placeholders})");
        let mut query = sqlx::query_as::<_, (String,)>(&sql);
        for t in tickers {
            query = query.bind(t);
        }
        let rows = query.fetch_all(&self.pool).await?;
        rows.into_iter().map(|(body,)| decode(&body)).collect()
    }

    /// Tickers on `exchange` whose EOD slice is older than `max_age_seconds`,
    /// used by bulk EOD collection to pick a batch (spec section 4.2).
    pub async fn list_stale(&self, exchange: &str, max_age_seconds: i64) -> VireResult<Vec<String>> {
        let cutoff = (Utc::now() - chrono::Duration::seconds(max_age_seconds)).to_rfc3339();
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT ticker FROM stock_index WHERE exchange = ?1 AND eod_collected_at < ?2",
        )
        .bind(exchange)
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(t,)| t).collect())
    }
}

/// Signal sub-store: same shape as market data, per ticker (spec section
/// 4.2).
#[derive(Clone)]
pub struct SignalStore {
    pool: SqlitePool,
}

impl SignalStore {
    pub(super) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, ticker: &str) -> VireResult<Signals> {
        let row = sqlx::query_as::<_, (String,)>("SELECT body FROM signals WHERE ticker = ?1")
            .bind(ticker)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some((body,)) => decode(&body),
            None => Err(VireError::NotFound(format!("signals for {ticker}"))),
        }
    }

    pub async fn save(&self, record: &Signals) -> VireResult<()> {
        let body = encode(record)?;
        sqlx::query(
            "INSERT INTO signals (ticker, body, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(ticker) DO UPDATE SET body = excluded.body, updated_at = excluded.updated_at",
        )
        .bind(&record.ticker)
        .bind(body)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EodBar;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        sqlx::migrate!("migrations/market").run(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn save_then_get_round_trips() {
        let pool = test_pool().await;
        let store = MarketDataStore::new(pool);

        let mut record = MarketData::empty("AAPL");
        record.eod_bars.push(EodBar {
            date: chrono::NaiveDate::from_ymd_opt(2026, 1, 2).unwrap(),
            open: 1.0,
            high: 2.0,
            low: 0.5,
            close: 1.5,
            volume: Some(1000),
        });

        store.save(&record).await.unwrap();
        let fetched = store.get("AAPL").await.unwrap();
        assert_eq!(fetched.ticker, "AAPL");
        assert_eq!(fetched.eod_bars.len(), 1);
    }

    #[tokio::test]
    async fn get_missing_ticker_is_not_found() {
        let pool = test_pool().await;
        let store = MarketDataStore::new(pool);
        let err = store.get("ZZZZ").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn batch_get_omits_missing() {
        let pool = test_pool().await;
        let store = MarketDataStore::new(pool);
        store.save(&MarketData::empty("AAPL")).await.unwrap();

        let found = store
            .batch_get(&["AAPL".to_string(), "MISSING".to_string()])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].ticker, "AAPL");
    }
}
