use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Registered OAuth client (spec section 3, "OAuth artifacts").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthClient {
    pub client_id: String,
    pub client_secret_hash: String,
    pub redirect_uris: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Short-lived authorization code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationCode {
    pub code: String,
    pub client_id: String,
    pub user_id: Uuid,
    pub redirect_uri: String,
    pub scope: String,
    pub expires_at: DateTime<Utc>,
}

/// Medium-lived refresh token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshToken {
    pub token: String,
    pub client_id: String,
    pub user_id: Uuid,
    pub scope: String,
    pub expires_at: DateTime<Utc>,
}

/// Short-lived browser session used while the user completes the
/// authorization step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthSession {
    pub session_id: String,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

/// A per-user override of an upstream vendor credential, carried on the
/// user context (spec section 4.6 / glossary "user context").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VendorCredential {
    pub vendor: String,
    pub api_key: String,
}
