use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::error::{VireError, VireResult};
use crate::models::{Job, JobStatus, JobType};

#[derive(sqlx::FromRow)]
struct JobRow {
    id: String,
    job_type: String,
    ticker: String,
    priority: i64,
    status: String,
    created_at: String,
    started_at: Option<String>,
    completed_at: Option<String>,
    duration_ms: Option<i64>,
    error: Option<String>,
    correlation_id: Option<String>,
}

fn parse_ts(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|_| crate::models::zero_instant())
}

impl TryFrom<JobRow> for Job {
    type Error = VireError;

    fn try_from(row: JobRow) -> VireResult<Self> {
        Ok(Job {
            id: Uuid::parse_str(&row.id).map_err(|e| VireError::Internal(e.to_string()))?,
            job_type: row
                .job_type
                .parse()
                .map_err(|_| VireError::Internal(format!("unknown job type: {}", row.job_type)))?,
            ticker: row.ticker,
            priority: row.priority,
            status: row
                .status
                .parse()
                .map_err(|_| VireError::Internal(format!("unknown job status: {}", row.status)))?,
            created_at: parse_ts(&row.created_at),
            started_at: row.started_at.as_deref().map(parse_ts),
            completed_at: row.completed_at.as_deref().map(parse_ts),
            duration_ms: row.duration_ms,
            error: row.error,
            correlation_id: row.correlation_id,
        })
    }
}

/// Persistent priority queue over Job records (spec section 4.3). Survives
/// restarts; dequeue is serializable against concurrent dequeuers via a
/// `BEGIN IMMEDIATE` transaction.
#[derive(Clone)]
pub struct JobQueueStore {
    pool: SqlitePool,
}

impl JobQueueStore {
    pub(super) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// No-op (returns success) if a pending job with the same
    /// `(type, ticker)` already exists (spec section 4.3).
    pub async fn enqueue(&self, job: &Job) -> VireResult<()> {
        let result = sqlx::query(
            "INSERT INTO jobs (id, job_type, ticker, priority, status, created_at, correlation_id)
             VALUES (?1, ?2, ?3, ?4, 'pending', ?5, ?6)",
        )
        .bind(job.id.to_string())
        .bind(job.job_type.as_str())
        .bind(&job.ticker)
        .bind(job.priority)
        .bind(job.created_at.to_rfc3339())
        .bind(&job.correlation_id)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Atomically selects the pending job with the highest priority (ties
    /// broken by oldest `created_at`), transitions it to `running`, and
    /// returns it. `None` if the queue is empty (or empty for `types`, when
    /// given).
    pub async fn dequeue(&self, types: Option<&[JobType]>) -> VireResult<Option<Job>> {
        let mut tx = self.pool.begin().await?;

        let candidate: Option<(String,)> = if let Some(types) = types {
            if types.is_empty() {
                return Ok(None);
            }
            let placeholders = types.iter().map(|_| "?").collect::<Vec<_>>().join(",");
            let sql = format!(
                "SELECT id FROM jobs WHERE status = 'pending' AND job_type IN ({placeholders})
                 ORDER BY priority DESC, created_at ASC LIMIT 1"
            );
            let mut query = sqlx::query_as(&sql);
            for t in types {
                query = query.bind(t.as_str());
            }
            query.fetch_optional(&mut *tx).await?
        } else {
            sqlx::query_as(
                "SELECT id FROM jobs WHERE status = 'pending'
                 ORDER BY priority DESC, created_at ASC LIMIT 1",
            )
            .fetch_optional(&mut *tx)
            .await?
        };

        let Some((id,)) = candidate else {
            tx.commit().await?;
            return Ok(None);
        };

        let started_at = Utc::now();
        sqlx::query("UPDATE jobs SET status = 'running', started_at = ?1 WHERE id = ?2")
            .bind(started_at.to_rfc3339())
            .bind(&id)
            .execute(&mut *tx)
            .await?;

        let row = sqlx::query_as::<_, JobRow>("SELECT * FROM jobs WHERE id = ?1")
            .bind(&id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some(row.try_into()?))
    }

    /// Transitions `running -> done` (or `failed` when `error` is
    /// non-empty). A job cancelled while running is left `cancelled` and
    /// this call is ignored (spec section 4.3).
    pub async fn complete(&self, id: Uuid, error: Option<&str>, duration_ms: i64) -> VireResult<()> {
        let status = if error.is_some() { "failed" } else { "done" };
        sqlx::query(
            "UPDATE jobs SET status = ?1, completed_at = ?2, duration_ms = ?3, error = ?4
             WHERE id = ?5 AND status = 'running'",
        )
        .bind(status)
        .bind(Utc::now().to_rfc3339())
        .bind(duration_ms)
        .bind(error)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Transitions pending or running jobs to `cancelled`.
    pub async fn cancel(&self, id: Uuid) -> VireResult<()> {
        sqlx::query(
            "UPDATE jobs SET status = 'cancelled' WHERE id = ?1 AND status IN ('pending', 'running')",
        )
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn cancel_by_ticker(&self, ticker: &str) -> VireResult<u64> {
        let result = sqlx::query(
            "UPDATE jobs SET status = 'cancelled' WHERE ticker = ?1 AND status IN ('pending', 'running')",
        )
        .bind(ticker)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn set_priority(&self, id: Uuid, priority: i64) -> VireResult<()> {
        sqlx::query("UPDATE jobs SET priority = ?1 WHERE id = ?2")
            .bind(priority)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn get_max_priority(&self) -> VireResult<i64> {
        let row: (Option<i64>,) = sqlx::query_as("SELECT MAX(priority) FROM jobs WHERE status = 'pending'")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0.unwrap_or(0))
    }

    pub async fn list_pending(&self) -> VireResult<Vec<Job>> {
        self.list_by_status("pending").await
    }

    pub async fn list_all(&self) -> VireResult<Vec<Job>> {
        let rows = sqlx::query_as::<_, JobRow>("SELECT * FROM jobs ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn list_by_status(&self, status: &str) -> VireResult<Vec<Job>> {
        let rows = sqlx::query_as::<_, JobRow>(
            "SELECT * FROM jobs WHERE status = ?1 ORDER BY priority DESC, created_at ASC",
        )
        .bind(status)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    pub async fn list_by_ticker(&self, ticker: &str) -> VireResult<Vec<Job>> {
        let rows = sqlx::query_as::<_, JobRow>(
            "SELECT * FROM jobs WHERE ticker = ?1 ORDER BY created_at DESC",
        )
        .bind(ticker)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    pub async fn count_pending(&self, job_type: Option<JobType>) -> VireResult<i64> {
        let count: (i64,) = match job_type {
            Some(t) => {
                sqlx::query_as("SELECT COUNT(*) FROM jobs WHERE status = 'pending' AND job_type = ?1")
                    .bind(t.as_str())
                    .fetch_one(&self.pool)
                    .await?
            }
            None => {
                sqlx::query_as("SELECT COUNT(*) FROM jobs WHERE status = 'pending'")
                    .fetch_one(&self.pool)
                    .await?
            }
        };
        Ok(count.0)
    }

    pub async fn has_pending(&self, job_type: JobType, ticker: &str) -> VireResult<bool> {
        let row = sqlx::query(
            "SELECT 1 FROM jobs WHERE status = 'pending' AND job_type = ?1 AND ticker = ?2",
        )
        .bind(job_type.as_str())
        .bind(ticker)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| r.get::<i64, _>(0)).is_some())
    }

    pub async fn purge_completed(&self, older_than: DateTime<Utc>) -> VireResult<u64> {
        let result = sqlx::query(
            "DELETE FROM jobs WHERE status IN ('done', 'failed', 'cancelled') AND completed_at < ?1",
        )
        .bind(older_than.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Transitions all `running` jobs back to `pending`. Called exactly
    /// once at process startup; this is the at-least-once recovery hook
    /// (spec section 4.3).
    pub async fn reset_running_jobs(&self) -> VireResult<u64> {
        let result = sqlx::query("UPDATE jobs SET status = 'pending', started_at = NULL WHERE status = 'running'")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn get(&self, id: Uuid) -> VireResult<Job> {
        let row = sqlx::query_as::<_, JobRow>("SELECT * FROM jobs WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => row.try_into(),
            None => Err(VireError::NotFound(format!("job {id}"))),
        }
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
    async fn duplicate_enqueue_is_a_no_op() {
        let pool = test_pool().await;
        let store = JobQueueStore::new(pool);

        let job1 = Job::new_pending(JobType::CollectFilingPdfs, "AAPL", 10, None);
        let job2 = Job::new_pending(JobType::CollectFilingPdfs, "AAPL", 20, None);

        store.enqueue(&job1).await.unwrap();
        store.enqueue(&job2).await.unwrap();

        assert_eq!(store.count_pending(Some(JobType::CollectFilingPdfs)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn dequeue_picks_highest_priority_then_oldest() {
        let pool = test_pool().await;
        let store = JobQueueStore::new(pool);

        let low = Job::new_pending(JobType::CollectNews, "AAPL", 1, None);
        store.enqueue(&low).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let high = Job::new_pending(JobType::CollectNews, "MSFT", 50, None);
        store.enqueue(&high).await.unwrap();

        let dequeued = store.dequeue(None).await.unwrap().unwrap();
        assert_eq!(dequeued.ticker, "MSFT");
        assert_eq!(dequeued.status, JobStatus::Running);
    }

    #[tokio::test]
    async fn dequeue_filters_by_type_set() {
        let pool = test_pool().await;
        let store = JobQueueStore::new(pool);

        store
            .enqueue(&Job::new_pending(JobType::CollectFilingPdfs, "AAPL", 10, None))
            .await
            .unwrap();
        store
            .enqueue(&Job::new_pending(JobType::CollectNews, "MSFT", 100, None))
            .await
            .unwrap();

        let dequeued = store
            .dequeue(Some(&[JobType::CollectFilingPdfs, JobType::CollectFilingSummaries]))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(dequeued.ticker, "AAPL");
    }

    #[tokio::test]
    async fn enqueue_dequeue_complete_removes_from_pending() {
        let pool = test_pool().await;
        let store = JobQueueStore::new(pool);

        let job = Job::new_pending(JobType::ComputeSignals, "AAPL", 10, None);
        store.enqueue(&job).await.unwrap();
        let dequeued = store.dequeue(None).await.unwrap().unwrap();
        store.complete(dequeued.id, None, 42).await.unwrap();

        assert_eq!(store.list_pending().await.unwrap().len(), 0);
        let completed = store.get(dequeued.id).await.unwrap();
        assert_eq!(completed.status, JobStatus::Done);
        assert_eq!(completed.duration_ms, Some(42));
    }

    #[tokio::test]
    async fn reset_running_jobs_on_restart() {
        let pool = test_pool().await;
        let store = JobQueueStore::new(pool);

        store
            .enqueue(&Job::new_pending(JobType::CollectFilingSummaries, "AAPL", 10, None))
            .await
            .unwrap();
        store.dequeue(None).await.unwrap();

        let reset = store.reset_running_jobs().await.unwrap();
        assert_eq!(reset, 1);
        assert_eq!(store.list_pending().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn cancel_running_job_then_complete_is_ignored() {
        let pool = test_pool().await;
        let store = JobQueueStore::new(pool);

        store
            .enqueue(&Job::new_pending(JobType::CollectNews, "AAPL", 10, None))
            .await
            .unwrap();
        let job = store.dequeue(None).await.unwrap().unwrap();
        store.cancel(job.id).await.unwrap();
        store.complete(job.id, None, 10).await.unwrap();

        let after = store.get(job.id).await.unwrap();
        assert_eq!(after.status, JobStatus::Cancelled);
    }
}
