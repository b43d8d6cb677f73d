use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Closed set of background job types (spec section 6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    CollectEod,
    CollectFundamentals,
    CollectFilingsIndex,
    CollectFilingPdfs,
    CollectFilingSummaries,
    CollectNews,
    ComputeSignals,
    CollectBulkEod,
}

impl JobType {
    pub fn as_str(self) -> &'static str {
        match self {
            JobType::CollectEod => "collect_eod",
            JobType::CollectFundamentals => "collect_fundamentals",
            JobType::CollectFilingsIndex => "collect_filings_index",
            JobType::CollectFilingPdfs => "collect_filing_pdfs",
            JobType::CollectFilingSummaries => "collect_filing_summaries",
            JobType::CollectNews => "collect_news",
            JobType::ComputeSignals => "compute_signals",
            JobType::CollectBulkEod => "collect_bulk_eod",
        }
    }

    /// Heavy job types are filing downloads and LLM summarization; everything
    /// else is light (spec section 4.4).
    pub fn is_heavy(self) -> bool {
        matches!(
            self,
            JobType::CollectFilingPdfs | JobType::CollectFilingSummaries
        )
    }
}

impl std::str::FromStr for JobType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "collect_eod" => JobType::CollectEod,
            "collect_fundamentals" => JobType::CollectFundamentals,
            "collect_filings_index" => JobType::CollectFilingsIndex,
            "collect_filing_pdfs" => JobType::CollectFilingPdfs,
            "collect_filing_summaries" => JobType::CollectFilingSummaries,
            "collect_news" => JobType::CollectNews,
            "compute_signals" => JobType::ComputeSignals,
            "collect_bulk_eod" => JobType::CollectBulkEod,
            _ => return Err(()),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Done,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "pending" => JobStatus::Pending,
            "running" => JobStatus::Running,
            "done" => JobStatus::Done,
            "failed" => JobStatus::Failed,
            "cancelled" => JobStatus::Cancelled,
            _ => return Err(()),
        })
    }
}

/// Persisted job record (spec section 6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub job_type: JobType,
    pub ticker: String,
    pub priority: i64,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub error: Option<String>,
    /// Correlation id of the request that enqueued this job, if any
    /// (spec section 4.4, "propagated into the job record").
    pub correlation_id: Option<String>,
}

impl Job {
    pub fn new_pending(job_type: JobType, ticker: &str, priority: i64, correlation_id: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_type,
            ticker: ticker.to_string(),
            priority,
            status: JobStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            duration_ms: None,
            error: None,
            correlation_id,
        }
    }
}

/// Default priorities used by the collection pipeline when enqueuing slow
/// work. Operators may override with `set_priority`.
pub mod default_priority {
    pub const USER_REQUESTED: i64 = 100;
    pub const BULK_BACKGROUND: i64 = 10;
}
