use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::zero_instant;

/// The closed set of independently-refreshed data slices (spec section 4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SliceKind {
    Eod,
    Fundamentals,
    FilingsIndex,
    FilingsPdfs,
    FilingSummaries,
    News,
    Signals,
    CompanyTimeline,
    EarningsCalendar,
}

impl SliceKind {
    pub const ALL: [SliceKind; 9] = [
        SliceKind::Eod,
        SliceKind::Fundamentals,
        SliceKind::FilingsIndex,
        SliceKind::FilingsPdfs,
        SliceKind::FilingSummaries,
        SliceKind::News,
        SliceKind::Signals,
        SliceKind::CompanyTimeline,
        SliceKind::EarningsCalendar,
    ];

    /// Core slices are collected inline by `get_stock_data`; slow slices
    /// are enqueued as background jobs (spec section 2, "core" vs "slow").
    pub fn is_core(self) -> bool {
        matches!(
            self,
            SliceKind::Eod | SliceKind::Fundamentals | SliceKind::FilingsIndex
        )
    }

    /// Column name on the stock index row holding this slice's
    /// "collected at" timestamp. Used as the allow-list for
    /// `StockIndexStore::update_timestamp` (spec section 4.2).
    pub fn timestamp_field(self) -> &'static str {
        match self {
            SliceKind::Eod => "eod_collected_at",
            SliceKind::Fundamentals => "fundamentals_collected_at",
            SliceKind::FilingsIndex => "filings_index_collected_at",
            SliceKind::FilingsPdfs => "filings_pdfs_collected_at",
            SliceKind::FilingSummaries => "filing_summaries_collected_at",
            SliceKind::News => "news_collected_at",
            SliceKind::Signals => "signals_collected_at",
            SliceKind::CompanyTimeline => "company_timeline_collected_at",
            SliceKind::EarningsCalendar => "earnings_calendar_collected_at",
        }
    }

    /// Job type enqueued when this slice is stale, for slices that are
    /// collected out of line. Core slices have no dedicated job type:
    /// they are folded into `collect_core`.
    pub fn job_type(self) -> Option<JobType> {
        match self {
            SliceKind::FilingsPdfs => Some(JobType::CollectFilingPdfs),
            SliceKind::FilingSummaries => Some(JobType::CollectFilingSummaries),
            SliceKind::News => Some(JobType::CollectNews),
            SliceKind::Signals => Some(JobType::ComputeSignals),
            _ => None,
        }
    }
}

// Re-exported here to avoid a circular `use` between market.rs and job.rs;
// the canonical definition lives in job.rs.
pub use super::job::JobType;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EodBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Fundamentals {
    pub pe_ratio: Option<f64>,
    pub market_cap: Option<f64>,
    pub dividend_yield: Option<f64>,
    pub eps: Option<f64>,
    pub revenue_ttm: Option<f64>,
    pub as_of: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Filing {
    /// Stable identity used to match filings across re-fetches of the
    /// index (spec section 4.5.1, "match existing filings by stable
    /// `document_key`").
    pub document_key: String,
    pub form_type: String,
    pub filed_at: NaiveDate,
    pub source_url: String,
    pub pdf_path: Option<String>,
    pub file_size: Option<u64>,
    pub summary: Option<FilingSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilingSummary {
    pub summary_text: String,
    pub key_points: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsItem {
    pub headline: String,
    pub url: String,
    pub published_at: DateTime<Utc>,
    pub source: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub date: NaiveDate,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EarningsCalendarEntry {
    pub date: NaiveDate,
    pub estimate_eps: Option<f64>,
}

/// The whole-document Market Data record for one ticker (spec section 3).
/// Every slice not currently being updated must survive a read-modify-write
/// unchanged (spec section 3, "Market Data slice independence").
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MarketData {
    pub ticker: String,
    pub eod_bars: Vec<EodBar>,
    pub fundamentals: Option<Fundamentals>,
    pub filings: Vec<Filing>,
    pub news: Vec<NewsItem>,
    pub company_timeline: Vec<TimelineEvent>,
    pub earnings_calendar: Vec<EarningsCalendarEntry>,
}

impl MarketData {
    pub fn empty(ticker: &str) -> Self {
        Self {
            ticker: ticker.to_string(),
            ..Default::default()
        }
    }
}

/// Recomputed per-ticker technical signals, lifetime tied to Market Data
/// (spec section 3).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Signals {
    pub ticker: String,
    pub sma_50: Option<f64>,
    pub sma_200: Option<f64>,
    pub rsi_14: Option<f64>,
    pub computed_at: Option<DateTime<Utc>>,
}

/// Shared, slice-timestamp tracking row per ticker (spec section 6).
/// Freshness is derived from these timestamps, not from the (possibly
/// large) Market Data document itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockIndexEntry {
    pub ticker: String,
    pub code: String,
    pub exchange: String,
    pub source: String,
    pub added_at: DateTime<Utc>,
    pub eod_collected_at: DateTime<Utc>,
    pub fundamentals_collected_at: DateTime<Utc>,
    pub filings_index_collected_at: DateTime<Utc>,
    pub filings_pdfs_collected_at: DateTime<Utc>,
    pub filing_summaries_collected_at: DateTime<Utc>,
    pub news_collected_at: DateTime<Utc>,
    pub signals_collected_at: DateTime<Utc>,
    pub company_timeline_collected_at: DateTime<Utc>,
    pub earnings_calendar_collected_at: DateTime<Utc>,
}

impl StockIndexEntry {
    pub fn new(ticker: &str, code: &str, exchange: &str, source: &str) -> Self {
        let zero = zero_instant();
        Self {
            ticker: ticker.to_string(),
            code: code.to_string(),
            exchange: exchange.to_string(),
            source: source.to_string(),
            added_at: Utc::now(),
            eod_collected_at: zero,
            fundamentals_collected_at: zero,
            filings_index_collected_at: zero,
            filings_pdfs_collected_at: zero,
            filing_summaries_collected_at: zero,
            news_collected_at: zero,
            signals_collected_at: zero,
            company_timeline_collected_at: zero,
            earnings_calendar_collected_at: zero,
        }
    }

    pub fn timestamp_for(&self, kind: SliceKind) -> DateTime<Utc> {
        match kind {
            SliceKind::Eod => self.eod_collected_at,
            SliceKind::Fundamentals => self.fundamentals_collected_at,
            SliceKind::FilingsIndex => self.filings_index_collected_at,
            SliceKind::FilingsPdfs => self.filings_pdfs_collected_at,
            SliceKind::FilingSummaries => self.filing_summaries_collected_at,
            SliceKind::News => self.news_collected_at,
            SliceKind::Signals => self.signals_collected_at,
            SliceKind::CompanyTimeline => self.company_timeline_collected_at,
            SliceKind::EarningsCalendar => self.earnings_calendar_collected_at,
        }
    }
}
