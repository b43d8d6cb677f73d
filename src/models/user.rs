use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Anonymous,
    User,
    Admin,
    /// Service principals authenticate with a pre-shared key and may never
    /// log in interactively (spec section 4.6).
    Service,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Anonymous => "anonymous",
            Role::User => "user",
            Role::Admin => "admin",
            Role::Service => "service",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "anonymous" => Role::Anonymous,
            "user" => Role::User,
            "admin" => Role::Admin,
            "service" => Role::Service,
            _ => return Err(()),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAccount {
    pub user_id: Uuid,
    pub email: String,
    pub display_name: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Per-user key/value configuration row (spec section 3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserKv {
    pub user_id: Uuid,
    pub key: String,
    pub value: String,
    pub updated_at: DateTime<Utc>,
}

/// Process-wide system key/value row, stored alongside user accounts in the
/// internal store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemKv {
    pub key: String,
    pub value: String,
    pub updated_at: DateTime<Utc>,
}

/// Closed set of user-domain record subjects (spec section 3). Values are
/// opaque JSON owned by higher layers; the core never inspects them beyond
/// the envelope fields below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Subject {
    Portfolio,
    Strategy,
    Plan,
    Watchlist,
    Report,
    Cashflow,
    Search,
}

impl Subject {
    pub fn as_str(self) -> &'static str {
        match self {
            Subject::Portfolio => "portfolio",
            Subject::Strategy => "strategy",
            Subject::Plan => "plan",
            Subject::Watchlist => "watchlist",
            Subject::Report => "report",
            Subject::Cashflow => "cashflow",
            Subject::Search => "search",
        }
    }
}

impl std::str::FromStr for Subject {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "portfolio" => Subject::Portfolio,
            "strategy" => Subject::Strategy,
            "plan" => Subject::Plan,
            "watchlist" => Subject::Watchlist,
            "report" => Subject::Report,
            "cashflow" => Subject::Cashflow,
            "search" => Subject::Search,
            _ => return Err(()),
        })
    }
}

/// Persisted user domain record (spec section 6). `value` is opaque JSON
/// carrying its own schema version; the core stores and versions it but
/// never interprets it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub user_id: Uuid,
    pub subject: Subject,
    pub key: String,
    pub value: String,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub datetime: DateTime<Utc>,
}

impl UserRecord {
    /// Build the next version of this record, preserving `created_at`
    /// (spec section 3, "User record versioning").
    pub fn next_version(&self, new_value: String) -> Self {
        Self {
            user_id: self.user_id,
            subject: self.subject,
            key: self.key.clone(),
            value: new_value,
            version: self.version + 1,
            created_at: self.created_at,
            datetime: Utc::now(),
        }
    }

    pub fn first_version(user_id: Uuid, subject: Subject, key: &str, value: String) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            subject,
            key: key.to_string(),
            value,
            version: 1,
            created_at: now,
            datetime: now,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryOrder {
    DatetimeAsc,
    DatetimeDesc,
}

#[derive(Debug, Clone)]
pub struct UserRecordQuery {
    pub limit: Option<i64>,
    pub order_by: QueryOrder,
}

impl Default for UserRecordQuery {
    fn default() -> Self {
        Self {
            limit: None,
            order_by: QueryOrder::DatetimeDesc,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClientType {
    ClaudeDesktop,
    ClaudeCli,
    ClaudeApi,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackCategory {
    DataAnomaly,
    SyncDelay,
    CalculationError,
    MissingData,
    SchemaChange,
    ToolError,
    Observation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackSeverity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackStatus {
    New,
    Acknowledged,
    Resolved,
    Dismissed,
}

/// Persisted feedback record (spec section 6). Create is append-only and
/// fire-and-forget; admin mutation is restricted to `status` and
/// `resolution_notes`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feedback {
    pub id: Uuid,
    pub session_id: String,
    pub client_type: ClientType,
    pub category: FeedbackCategory,
    pub severity: FeedbackSeverity,
    pub description: String,
    pub ticker: Option<String>,
    pub portfolio_name: Option<String>,
    pub tool_name: Option<String>,
    pub observed_value: Option<String>,
    pub expected_value: Option<String>,
    pub status: FeedbackStatus,
    pub resolution_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
