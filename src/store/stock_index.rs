use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use crate::error::{VireError, VireResult};
use crate::models::{SliceKind, StockIndexEntry};

#[derive(sqlx::FromRow)]
struct StockIndexRow {
    ticker: String,
    code: String,
    exchange: String,
    source: String,
    added_at: String,
    eod_collected_at: String,
    fundamentals_collected_at: String,
    filings_index_collected_at: String,
    filings_pdfs_collected_at: String,
    filing_summaries_collected_at: String,
    news_collected_at: String,
    signals_collected_at: String,
    company_timeline_collected_at: String,
    earnings_calendar_collected_at: String,
}

fn parse_ts(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|_| crate::models::zero_instant())
}

impl From<StockIndexRow> for StockIndexEntry {
    fn from(row: StockIndexRow) -> Self {
        StockIndexEntry {
            ticker: row.ticker,
            code: row.code,
            exchange: row.exchange,
            source: row.source,
            added_at: parse_ts(&row.added_at),
            eod_collected_at: parse_ts(&row.eod_collected_at),
            fundamentals_collected_at: parse_ts(&row.fundamentals_collected_at),
            filings_index_collected_at: parse_ts(&row.filings_index_collected_at),
            filings_pdfs_collected_at: parse_ts(&row.filings_pdfs_collected_at),
            filing_summaries_collected_at: parse_ts(&row.filing_summaries_collected_at),
            news_collected_at: parse_ts(&row.news_collected_at),
            signals_collected_at: parse_ts(&row.signals_collected_at),
            company_timeline_collected_at: parse_ts(&row.company_timeline_collected_at),
            earnings_calendar_collected_at: parse_ts(&row.earnings_calendar_collected_at),
        }
    }
}

/// Stock Index sub-store. `update_timestamp` is the only narrow-write
/// operation in the core: a short critical section that reads, modifies
/// one named field and writes back, validated against a closed allow-list
/// of field names (spec section 4.2).
#[derive(Clone)]
pub struct StockIndexStore {
    pool: SqlitePool,
}

impl StockIndexStore {
    pub(super) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn upsert(&self, entry: &StockIndexEntry) -> VireResult<()> {
        sqlx::query(
            "INSERT INTO stock_index (
                ticker, code, exchange, source, added_at,
                eod_collected_at, fundamentals_collected_at, filings_index_collected_at,
                filings_pdfs_collected_at, filing_summaries_collected_at, news_collected_at,
                signals_collected_at, company_timeline_collected_at, earnings_calendar_collected_at
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14)
            ON CONFLICT(ticker) DO UPDATE SET
                code = excluded.code,
                exchange = excluded.exchange,
                source = excluded.source,
                eod_collected_at = excluded.eod_collected_at,
                fundamentals_collected_at = excluded.fundamentals_collected_at,
                filings_index_collected_at = excluded.filings_index_collected_at,
                filings_pdfs_collected_at = excluded.filings_pdfs_collected_at,
                filing_summaries_collected_at = excluded.filing_summaries_collected_at,
                news_collected_at = excluded.news_collected_at,
                signals_collected_at = excluded.signals_collected_at,
                company_timeline_collected_at = excluded.company_timeline_collected_at,
                earnings_calendar_collected_at = excluded.earnings_calendar_collected_at",
        )
        .bind(&entry.ticker)
        .bind(&entry.code)
        .bind(&entry.exchange)
        .bind(&entry.source)
        .bind(entry.added_at.to_rfc3339())
        .bind(entry.eod_collected_at.to_rfc3339())
        .bind(entry.fundamentals_collected_at.to_rfc3339())
        .bind(entry.filings_index_collected_at.to_rfc3339())
        .bind(entry.filings_pdfs_collected_at.to_rfc3339())
        .bind(entry.filing_summaries_collected_at.to_rfc3339())
        .bind(entry.news_collected_at.to_rfc3339())
        .bind(entry.signals_collected_at.to_rfc3339())
        .bind(entry.company_timeline_collected_at.to_rfc3339())
        .bind(entry.earnings_calendar_collected_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get(&self, ticker: &str) -> VireResult<StockIndexEntry> {
        let row = sqlx::query_as::<_, StockIndexRow>("SELECT * FROM stock_index WHERE ticker = ?1")
            .bind(ticker)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Into::into)
            .ok_or_else(|| VireError::NotFound(format!("stock index entry for {ticker}")))
    }

    pub async fn list(&self) -> VireResult<Vec<StockIndexEntry>> {
        let rows = sqlx::query_as::<_, StockIndexRow>("SELECT * FROM stock_index ORDER BY ticker ASC")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn list_by_exchange(&self, exchange: &str) -> VireResult<Vec<StockIndexEntry>> {
        let rows = sqlx::query_as::<_, StockIndexRow>(
            "SELECT * FROM stock_index WHERE exchange = ?1 ORDER BY ticker ASC",
        )
        .bind(exchange)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Read-modify-write one named timestamp column. `slice` comes from the
    /// closed `SliceKind` enum, so the column name is never attacker- or
    /// caller-controlled text; this function still asserts it against the
    /// same allow-list `SliceKind::timestamp_field` uses, so a future
    /// refactor can't accidentally widen it to an arbitrary string.
    pub async fn update_timestamp(&self, ticker: &str, slice: SliceKind, t: DateTime<Utc>) -> VireResult<()> {
        const ALLOWED: &[&str] = &[
            "eod_collected_at",
            "fundamentals_collected_at",
            "filings_index_collected_at",
            "filings_pdfs_collected_at",
            "filing_summaries_collected_at",
            "news_collected_at",
            "signals_collected_at",
            "company_timeline_collected_at",
            "earnings_calendar_collected_at",
        ];
        let column = slice.timestamp_field();
        if !ALLOWED.contains(&column) {
            return Err(VireError::Internal(format!("unsafe stock index column: {column}")));
        }

        let mut tx = self.pool.begin().await?;
        let sql = format!("UPDATE stock_index SET {column} = ?1 WHERE ticker = ?2");
        let result = sqlx::query(&sql)
            .bind(t.to_rfc3339())
            .bind(ticker)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(VireError::NotFound(format!("stock index entry for {ticker}")));
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn delete(&self, ticker: &str) -> VireResult<()> {
        sqlx::query("DELETE FROM stock_index WHERE ticker = ?1")
            .bind(ticker)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Zero every slice timestamp for every remaining ticker; used by
    /// `purge_derived_data` (spec section 4.2).
    pub(super) async fn zero_all_timestamps(&self) -> VireResult<u64> {
        let zero = crate::models::zero_instant().to_rfc3339();
        let result = sqlx::query(
            "UPDATE stock_index SET
                eod_collected_at = ?1, fundamentals_collected_at = ?1, filings_index_collected_at = ?1,
                filings_pdfs_collected_at = ?1, filing_summaries_collected_at = ?1, news_collected_at = ?1,
                signals_collected_at = ?1, company_timeline_collected_at = ?1, earnings_calendar_collected_at = ?1",
        )
        .bind(zero)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// True if the ticker has no index entry yet.
    pub async fn is_unknown(&self, ticker: &str) -> VireResult<bool> {
        let row = sqlx::query("SELECT 1 FROM stock_index WHERE ticker = ?1")
            .bind(ticker)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get::<i64, _>(0)).is_none())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        sqlx::migrate!("migrations/market").run(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn update_timestamp_preserves_other_fields() {
        let pool = test_pool().await;
        let store = StockIndexStore::new(pool);
        let entry = StockIndexEntry::new("AAPL", "AAPL", "NASDAQ", "vendor");
        store.upsert(&entry).await.unwrap();

        let now = Utc::now();
        store.update_timestamp("AAPL", SliceKind::Eod, now).await.unwrap();

        let after = store.get("AAPL").await.unwrap();
        assert_eq!(after.eod_collected_at.timestamp(), now.timestamp());
        assert!(crate::models::is_zero_instant(after.fundamentals_collected_at));
    }

    #[tokio::test]
    async fn update_timestamp_on_unknown_ticker_is_not_found() {
        let pool = test_pool().await;
        let store = StockIndexStore::new(pool);
        let err = store
            .update_timestamp("ZZZZ", SliceKind::Eod, Utc::now())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
