use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::{VireError, VireResult};
use crate::models::{QueryOrder, Subject, UserRecord, UserRecordQuery};

#[derive(sqlx::FromRow)]
struct UserRecordRow {
    user_id: String,
    subject: String,
    key: String,
    value: String,
    version: i64,
    created_at: String,
    datetime: String,
}

fn parse_ts(raw: &str) -> chrono::DateTime<Utc> {
    chrono::DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|_| crate::models::zero_instant())
}

impl TryFrom<UserRecordRow> for UserRecord {
    type Error = VireError;

    fn try_from(row: UserRecordRow) -> VireResult<Self> {
        Ok(UserRecord {
            user_id: Uuid::parse_str(&row.user_id).map_err(|e| VireError::Internal(e.to_string()))?,
            subject: row
                .subject
                .parse()
                .map_err(|_| VireError::Internal(format!("unknown subject: {}", row.subject)))?,
            key: row.key,
            value: row.value,
            version: row.version,
            created_at: parse_ts(&row.created_at),
            datetime: parse_ts(&row.datetime),
        })
    }
}

/// User Data sub-store for opaque, versioned domain records (spec section
/// 4.2). Writers must bump `version` and preserve `created_at`; this store
/// enforces that in `put`, it does not trust the caller's envelope.
#[derive(Clone)]
pub struct UserDataStore {
    pool: SqlitePool,
}

impl UserDataStore {
    pub(super) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, user_id: Uuid, subject: Subject, key: &str) -> VireResult<UserRecord> {
        let row = sqlx::query_as::<_, UserRecordRow>(
            "SELECT * FROM user_records WHERE user_id = ?1 AND subject = ?2 AND key = ?3",
        )
        .bind(user_id.to_string())
        .bind(subject.as_str())
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => row.try_into(),
            None => Err(VireError::NotFound(format!("{}/{key} for user {user_id}", subject.as_str()))),
        }
    }

    /// Insert the first version, or bump an existing record's version,
    /// preserving `created_at` (spec section 3, "User record versioning").
    pub async fn put(&self, user_id: Uuid, subject: Subject, key: &str, value: String) -> VireResult<UserRecord> {
        let existing = self.get(user_id, subject, key).await;
        let record = match existing {
            Ok(current) => current.next_version(value),
            Err(VireError::NotFound(_)) => UserRecord::first_version(user_id, subject, key, value),
            Err(e) => return Err(e),
        };

        sqlx::query(
            "INSERT INTO user_records (user_id, subject, key, value, version, created_at, datetime)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(user_id, subject, key) DO UPDATE SET
                value = excluded.value, version = excluded.version, datetime = excluded.datetime",
        )
        .bind(record.user_id.to_string())
        .bind(record.subject.as_str())
        .bind(&record.key)
        .bind(&record.value)
        .bind(record.version)
        .bind(record.created_at.to_rfc3339())
        .bind(record.datetime.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(record)
    }

    pub async fn delete(&self, user_id: Uuid, subject: Subject, key: &str) -> VireResult<()> {
        sqlx::query("DELETE FROM user_records WHERE user_id = ?1 AND subject = ?2 AND key = ?3")
            .bind(user_id.to_string())
            .bind(subject.as_str())
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn list(&self, user_id: Uuid, subject: Subject) -> VireResult<Vec<UserRecord>> {
        self.query(user_id, subject, &UserRecordQuery::default()).await
    }

    pub async fn query(
        &self,
        user_id: Uuid,
        subject: Subject,
        query: &UserRecordQuery,
    ) -> VireResult<Vec<UserRecord>> {
        let order = match query.order_by {
            QueryOrder::DatetimeAsc => "ASC",
            QueryOrder::DatetimeDesc => "DESC",
        };
        let sql = format!(
            "SELECT * FROM user_records WHERE user_id = ?1 AND subject = ?2 ORDER BY datetime {order} LIMIT ?3"
        );
        let rows = sqlx::query_as::<_, UserRecordRow>(&sql)
            .bind(user_id.to_string())
            .bind(subject.as_str())
            .bind(query.limit.unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    pub async fn delete_by_subject(&self, user_id: Uuid, subject: Subject) -> VireResult<u64> {
        let result = sqlx::query("DELETE FROM user_records WHERE user_id = ?1 AND subject = ?2")
            .bind(user_id.to_string())
            .bind(subject.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Used by `Store::purge_derived_data` to clear `report` records across
    /// every user (reports are derived data, spec section 4.2).
    pub(super) async fn delete_by_subject_all_users(&self, subject: Subject) -> VireResult<u64> {
        let result = sqlx::query("DELETE FROM user_records WHERE subject = ?1")
            .bind(subject.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        sqlx::migrate!("migrations/portfolio").run(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn put_bumps_version_and_preserves_created_at() {
        let pool = test_pool().await;
        let store = UserDataStore::new(pool);
        let user_id = Uuid::new_v4();

        let v1 = store.put(user_id, Subject::Watchlist, "default", "{}".to_string()).await.unwrap();
        assert_eq!(v1.version, 1);

        let v2 = store
            .put(user_id, Subject::Watchlist, "default", "{\"tickers\":[\"AAPL\"]}".to_string())
            .await
            .unwrap();
        assert_eq!(v2.version, 2);
        assert_eq!(v2.created_at, v1.created_at);
    }

    #[tokio::test]
    async fn query_respects_order_and_limit() {
        let pool = test_pool().await;
        let store = UserDataStore::new(pool);
        let user_id = Uuid::new_v4();

        store.put(user_id, Subject::Search, "q1", "a".to_string()).await.unwrap();
        store.put(user_id, Subject::Search, "q2", "b".to_string()).await.unwrap();

        let results = store
            .query(
                user_id,
                Subject::Search,
                &UserRecordQuery { limit: Some(1), order_by: QueryOrder::DatetimeAsc },
            )
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].key, "q1");
    }
}
