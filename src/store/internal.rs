use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::{VireError, VireResult};
use crate::models::{Role, UserAccount, UserKv};

#[derive(sqlx::FromRow)]
struct UserAccountRow {
    user_id: String,
    email: String,
    display_name: String,
    role: String,
    created_at: String,
    updated_at: String,
}

impl TryFrom<UserAccountRow> for UserAccount {
    type Error = VireError;

    fn try_from(row: UserAccountRow) -> VireResult<Self> {
        Ok(UserAccount {
            user_id: Uuid::parse_str(&row.user_id).map_err(|e| VireError::Internal(e.to_string()))?,
            email: row.email,
            display_name: row.display_name,
            role: row.role.parse().map_err(|_| VireError::Internal(format!("unknown role: {}", row.role)))?,
            created_at: chrono::DateTime::parse_from_rfc3339(&row.created_at)
                .map(|t| t.with_timezone(&Utc))
                .unwrap_or_else(|_| crate::models::zero_instant()),
            updated_at: chrono::DateTime::parse_from_rfc3339(&row.updated_at)
                .map(|t| t.with_timezone(&Utc))
                .unwrap_or_else(|_| crate::models::zero_instant()),
        })
    }
}

/// Internal (portfolio-namespace) sub-store: user accounts, per-user KV and
/// process-wide system KV (spec section 4.2).
#[derive(Clone)]
pub struct InternalStore {
    pool: SqlitePool,
}

impl InternalStore {
    pub(super) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create_user(&self, email: &str, display_name: &str, role: Role) -> VireResult<UserAccount> {
        let existing = sqlx::query("SELECT 1 FROM user_accounts WHERE email = ?1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        if existing.is_some() {
            return Err(VireError::AlreadyExists(format!("user with email {email}")));
        }

        let now = Utc::now();
        let account = UserAccount {
            user_id: Uuid::new_v4(),
            email: email.to_string(),
            display_name: display_name.to_string(),
            role,
            created_at: now,
            updated_at: now,
        };
        sqlx::query(
            "INSERT INTO user_accounts (user_id, email, display_name, role, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(account.user_id.to_string())
        .bind(&account.email)
        .bind(&account.display_name)
        .bind(account.role.as_str())
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(account)
    }

    pub async fn get_by_id(&self, user_id: Uuid) -> VireResult<UserAccount> {
        let row = sqlx::query_as::<_, UserAccountRow>("SELECT * FROM user_accounts WHERE user_id = ?1")
            .bind(user_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => row.try_into(),
            None => Err(VireError::NotFound(format!("user {user_id}"))),
        }
    }

    pub async fn get_by_email(&self, email: &str) -> VireResult<UserAccount> {
        let row = sqlx::query_as::<_, UserAccountRow>("SELECT * FROM user_accounts WHERE email = ?1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => row.try_into(),
            None => Err(VireError::NotFound(format!("user with email {email}"))),
        }
    }

    pub async fn list_users(&self) -> VireResult<Vec<UserAccount>> {
        let rows = sqlx::query_as::<_, UserAccountRow>("SELECT * FROM user_accounts ORDER BY created_at ASC")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Admin role changes. Service principals may never log in and may not
    /// be created by promotion (spec section 4.6).
    pub async fn set_role(&self, user_id: Uuid, role: Role) -> VireResult<()> {
        if role == Role::Service {
            return Err(VireError::Forbidden(
                "admin-granted role changes may not promote to service".to_string(),
            ));
        }
        let result = sqlx::query("UPDATE user_accounts SET role = ?1, updated_at = ?2 WHERE user_id = ?3")
            .bind(role.as_str())
            .bind(Utc::now().to_rfc3339())
            .bind(user_id.to_string())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(VireError::NotFound(format!("user {user_id}")));
        }
        Ok(())
    }

    pub async fn get_kv(&self, user_id: Uuid, key: &str) -> VireResult<UserKv> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM user_kv WHERE user_id = ?1 AND key = ?2")
            .bind(user_id.to_string())
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some((value,)) => Ok(UserKv {
                user_id,
                key: key.to_string(),
                value,
                updated_at: Utc::now(),
            }),
            None => Err(VireError::NotFound(format!("kv {key} for user {user_id}"))),
        }
    }

    pub async fn put_kv(&self, user_id: Uuid, key: &str, value: &str) -> VireResult<()> {
        sqlx::query(
            "INSERT INTO user_kv (user_id, key, value, updated_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(user_id, key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(user_id.to_string())
        .bind(key)
        .bind(value)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_system_kv(&self, key: &str) -> VireResult<String> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM system_kv WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|(v,)| v).ok_or_else(|| VireError::NotFound(format!("system kv {key}")))
    }

    pub async fn put_system_kv(&self, key: &str, value: &str) -> VireResult<()> {
        sqlx::query(
            "INSERT INTO system_kv (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
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
    async fn create_and_lookup_by_both_keys() {
        let pool = test_pool().await;
        let store = InternalStore::new(pool);
        let account = store.create_user("a@example.com", "Alice", Role::User).await.unwrap();

        let by_id = store.get_by_id(account.user_id).await.unwrap();
        let by_email = store.get_by_email("a@example.com").await.unwrap();
        assert_eq!(by_id.user_id, by_email.user_id);
    }

    #[tokio::test]
    async fn set_role_refuses_promotion_to_service() {
        let pool = test_pool().await;
        let store = InternalStore::new(pool);
        let account = store.create_user("b@example.com", "Bob", Role::User).await.unwrap();
        let err = store.set_role(account.user_id, Role::Service).await.unwrap_err();
        assert!(matches!(err, VireError::Forbidden(_)));
    }
}
