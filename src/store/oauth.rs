use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::{VireError, VireResult};
use crate::models::{AuthorizationCode, OAuthClient, OAuthSession, RefreshToken};

/// OAuth artifact sub-store (spec section 3/6). Short-lived artifacts
/// (codes, sessions) and medium-lived ones (refresh tokens, clients) share
/// one sub-store; expiry is enforced by callers checking `expires_at`
/// against `now`, consistent with how freshness is checked elsewhere.
#[derive(Clone)]
pub struct OAuthStore {
    pool: SqlitePool,
}

impl OAuthStore {
    pub(super) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn register_client(&self, client: &OAuthClient) -> VireResult<()> {
        let redirect_uris = serde_json::to_string(&client.redirect_uris)?;
        sqlx::query(
            "INSERT INTO oauth_clients (client_id, client_secret_hash, redirect_uris, created_at)
             VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(&client.client_id)
        .bind(&client.client_secret_hash)
        .bind(redirect_uris)
        .bind(client.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_client(&self, client_id: &str) -> VireResult<OAuthClient> {
        let row: Option<(String, String, String, String)> = sqlx::query_as(
            "SELECT client_id, client_secret_hash, redirect_uris, created_at FROM oauth_clients WHERE client_id = ?1",
        )
        .bind(client_id)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some((client_id, client_secret_hash, redirect_uris, created_at)) => Ok(OAuthClient {
                client_id,
                client_secret_hash,
                redirect_uris: serde_json::from_str(&redirect_uris)?,
                created_at: parse_ts(&created_at),
            }),
            None => Err(VireError::NotFound(format!("oauth client {client_id}"))),
        }
    }

    pub async fn issue_code(&self, code: &AuthorizationCode) -> VireResult<()> {
        sqlx::query(
            "INSERT INTO oauth_codes (code, client_id, user_id, redirect_uri, scope, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(&code.code)
        .bind(&code.client_id)
        .bind(code.user_id.to_string())
        .bind(&code.redirect_uri)
        .bind(&code.scope)
        .bind(code.expires_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Consume (and delete) an authorization code, per standard OAuth
    /// single-use semantics.
    pub async fn consume_code(&self, code: &str) -> VireResult<AuthorizationCode> {
        let row: Option<(String, String, String, String, String)> = sqlx::query_as(
            "SELECT client_id, user_id, redirect_uri, scope, expires_at FROM oauth_codes WHERE code = ?1",
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        let Some((client_id, user_id, redirect_uri, scope, expires_at)) = row else {
            return Err(VireError::NotFound("authorization code".to_string()));
        };
        sqlx::query("DELETE FROM oauth_codes WHERE code = ?1")
            .bind(code)
            .execute(&self.pool)
            .await?;

        let expires_at = parse_ts(&expires_at);
        if expires_at < Utc::now() {
            return Err(VireError::InvalidInput("authorization code expired".to_string()));
        }

        Ok(AuthorizationCode {
            code: code.to_string(),
            client_id,
            user_id: Uuid::parse_str(&user_id).map_err(|e| VireError::Internal(e.to_string()))?,
            redirect_uri,
            scope,
            expires_at,
        })
    }

    pub async fn issue_refresh_token(&self, token: &RefreshToken) -> VireResult<()> {
        sqlx::query(
            "INSERT INTO oauth_refresh_tokens (token, client_id, user_id, scope, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(&token.token)
        .bind(&token.client_id)
        .bind(token.user_id.to_string())
        .bind(&token.scope)
        .bind(token.expires_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_refresh_token(&self, token: &str) -> VireResult<RefreshToken> {
        let row: Option<(String, String, String, String)> = sqlx::query_as(
            "SELECT client_id, user_id, scope, expires_at FROM oauth_refresh_tokens WHERE token = ?1",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some((client_id, user_id, scope, expires_at)) => Ok(RefreshToken {
                token: token.to_string(),
                client_id,
                user_id: Uuid::parse_str(&user_id).map_err(|e| VireError::Internal(e.to_string()))?,
                scope,
                expires_at: parse_ts(&expires_at),
            }),
            None => Err(VireError::NotFound("refresh token".to_string())),
        }
    }

    pub async fn revoke_refresh_token(&self, token: &str) -> VireResult<()> {
        sqlx::query("DELETE FROM oauth_refresh_tokens WHERE token = ?1")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn create_session(&self, session: &OAuthSession) -> VireResult<()> {
        sqlx::query("INSERT INTO oauth_sessions (session_id, user_id, expires_at) VALUES (?1, ?2, ?3)")
            .bind(&session.session_id)
            .bind(session.user_id.to_string())
            .bind(session.expires_at.to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn get_session(&self, session_id: &str) -> VireResult<OAuthSession> {
        let row: Option<(String, String)> = sqlx::query_as(
            "SELECT user_id, expires_at FROM oauth_sessions WHERE session_id = ?1",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some((user_id, expires_at)) => Ok(OAuthSession {
                session_id: session_id.to_string(),
                user_id: Uuid::parse_str(&user_id).map_err(|e| VireError::Internal(e.to_string()))?,
                expires_at: parse_ts(&expires_at),
            }),
            None => Err(VireError::NotFound("oauth session".to_string())),
        }
    }
}

fn parse_ts(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|_| crate::models::zero_instant())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        sqlx::migrate!("migrations/portfolio").run(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn consume_code_is_single_use() {
        let pool = test_pool().await;
        let store = OAuthStore::new(pool);
        let code = AuthorizationCode {
            code: "abc123".to_string(),
            client_id: "client-1".to_string(),
            user_id: Uuid::new_v4(),
            redirect_uri: "https://example.com/cb".to_string(),
            scope: "read".to_string(),
            expires_at: Utc::now() + Duration::minutes(5),
        };
        store.issue_code(&code).await.unwrap();
        store.consume_code("abc123").await.unwrap();
        let err = store.consume_code("abc123").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn consume_expired_code_is_invalid() {
        let pool = test_pool().await;
        let store = OAuthStore::new(pool);
        let code = AuthorizationCode {
            code: "expired".to_string(),
            client_id: "client-1".to_string(),
            user_id: Uuid::new_v4(),
            redirect_uri: "https://example.com/cb".to_string(),
            scope: "read".to_string(),
            expires_at: Utc::now() - Duration::minutes(5),
        };
        store.issue_code(&code).await.unwrap();
        let err = store.consume_code("expired").await.unwrap_err();
        assert!(matches!(err, VireError::InvalidInput(_)));
    }
}
