use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::{VireError, VireResult};
use crate::models::{Feedback, FeedbackStatus};

use super::{decode, encode};

/// Feedback sub-store: append-only create from clients, admin-only
/// mutation restricted to `status` and `resolution_notes` (spec section 6).
#[derive(Clone)]
pub struct FeedbackStore {
    pool: SqlitePool,
}

impl FeedbackStore {
    pub(super) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, feedback: &Feedback) -> VireResult<()> {
        let body = encode(feedback)?;
        sqlx::query(
            "INSERT INTO feedback (id, body, status, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(feedback.id.to_string())
        .bind(body)
        .bind(feedback_status_str(feedback.status))
        .bind(feedback.created_at.to_rfc3339())
        .bind(feedback.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get(&self, id: Uuid) -> VireResult<Feedback> {
        let row: Option<(String,)> = sqlx::query_as("SELECT body FROM feedback WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some((body,)) => decode(&body),
            None => Err(VireError::NotFound(format!("feedback {id}"))),
        }
    }

    pub async fn list(&self, status: Option<FeedbackStatus>) -> VireResult<Vec<Feedback>> {
        let rows: Vec<(String,)> = match status {
            Some(status) => {
                sqlx::query_as("SELECT body FROM feedback WHERE status = ?1 ORDER BY created_at DESC")
                    .bind(feedback_status_str(status))
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                sqlx::query_as("SELECT body FROM feedback ORDER BY created_at DESC")
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        rows.into_iter().map(|(body,)| decode(&body)).collect()
    }

    /// Admin mutation: only `status` and `resolution_notes` may change
    /// (spec section 6).
    pub async fn update_triage(
        &self,
        id: Uuid,
        status: FeedbackStatus,
        resolution_notes: Option<String>,
    ) -> VireResult<Feedback> {
        let mut feedback = self.get(id).await?;
        feedback.status = status;
        feedback.resolution_notes = resolution_notes;
        feedback.updated_at = Utc::now();

        let body = encode(&feedback)?;
        sqlx::query("UPDATE feedback SET body = ?1, status = ?2, updated_at = ?3 WHERE id = ?4")
            .bind(body)
            .bind(feedback_status_str(status))
            .bind(feedback.updated_at.to_rfc3339())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(feedback)
    }

    pub async fn delete(&self, id: Uuid) -> VireResult<()> {
        sqlx::query("DELETE FROM feedback WHERE id = ?1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn feedback_status_str(status: FeedbackStatus) -> &'static str {
    match status {
        FeedbackStatus::New => "new",
        FeedbackStatus::Acknowledged => "acknowledged",
        FeedbackStatus::Resolved => "resolved",
        FeedbackStatus::Dismissed => "dismissed",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ClientType, FeedbackCategory, FeedbackSeverity};

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        sqlx::migrate!("migrations/market").run(&pool).await.unwrap();
        pool
    }

    fn sample() -> Feedback {
        let now = Utc::now();
        Feedback {
            id: Uuid::new_v4(),
            session_id: "sess-1".to_string(),
            client_type: ClientType::ClaudeCli,
            category: FeedbackCategory::DataAnomaly,
            severity: FeedbackSeverity::Medium,
            description: "EOD bar looks wrong".to_string(),
            ticker: Some("AAPL".to_string()),
            portfolio_name: None,
            tool_name: Some("get_stock_data".to_string()),
            observed_value: None,
            expected_value: None,
            status: FeedbackStatus::New,
            resolution_notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn create_then_triage_updates_only_status_fields() {
        let pool = test_pool().await;
        let store = FeedbackStore::new(pool);
        let feedback = sample();
        store.create(&feedback).await.unwrap();

        let updated = store
            .update_triage(feedback.id, FeedbackStatus::Resolved, Some("fixed vendor parse".to_string()))
            .await
            .unwrap();
        assert_eq!(updated.status, FeedbackStatus::Resolved);
        assert_eq!(updated.description, feedback.description);
    }
}
