//! Adapters binding each `JobType` to a Collection Pipeline function (spec
//! section 4.5.3: core slices have no dedicated job type of their own, but a
//! job of that type can still be enqueued manually — e.g. via the admin
//! CLI — and must dispatch somewhere). Each adapter borrows nothing; it
//! owns `Arc`s so it can be registered once at startup and shared across
//! every worker loop.

use std::sync::Arc;

use async_trait::async_trait;

use crate::collection;
use crate::error::VireResult;
use crate::freshness::FreshnessConfig;
use crate::models::{Job, SliceKind};
use crate::store::Store;
use crate::vendor::{FilingSummarizer, MarketDataVendor};

use super::executor::JobExecutor;

pub struct CollectCoreExecutor {
    pub store: Arc<Store>,
    pub vendor: Arc<dyn MarketDataVendor>,
    pub slice: SliceKind,
}

#[async_trait]
impl JobExecutor for CollectCoreExecutor {
    async fn execute(&self, job: &Job) -> VireResult<()> {
        collection::collect_core(&self.store, self.vendor.as_ref(), &job.ticker, &[self.slice], true).await?;
        Ok(())
    }
}

pub struct CollectFilingPdfsExecutor {
    pub store: Arc<Store>,
    pub vendor: Arc<dyn MarketDataVendor>,
}

#[async_trait]
impl JobExecutor for CollectFilingPdfsExecutor {
    async fn execute(&self, job: &Job) -> VireResult<()> {
        collection::collect_filing_pdfs(&self.store, self.vendor.as_ref(), &job.ticker, false).await
    }
}

pub struct CollectFilingSummariesExecutor {
    pub store: Arc<Store>,
    pub summarizer: Arc<dyn FilingSummarizer>,
    pub freshness: Arc<FreshnessConfig>,
}

#[async_trait]
impl JobExecutor for CollectFilingSummariesExecutor {
    async fn execute(&self, job: &Job) -> VireResult<()> {
        collection::collect_filing_summaries(&self.store, self.summarizer.as_ref(), &self.freshness, &job.ticker).await
    }
}

pub struct CollectNewsExecutor {
    pub store: Arc<Store>,
    pub vendor: Arc<dyn MarketDataVendor>,
}

#[async_trait]
impl JobExecutor for CollectNewsExecutor {
    async fn execute(&self, job: &Job) -> VireResult<()> {
        collection::collect_news(&self.store, self.vendor.as_ref(), &job.ticker).await
    }
}

pub struct ComputeSignalsExecutor {
    pub store: Arc<Store>,
}

#[async_trait]
impl JobExecutor for ComputeSignalsExecutor {
    async fn execute(&self, job: &Job) -> VireResult<()> {
        collection::compute_signals_for_ticker(&self.store, &job.ticker).await
    }
}

/// `CollectBulkEod` jobs repurpose `Job.ticker` to carry the exchange name,
/// since the bulk operation has no single ticker of its own.
pub struct CollectBulkEodExecutor {
    pub store: Arc<Store>,
    pub vendor: Arc<dyn MarketDataVendor>,
}

#[async_trait]
impl JobExecutor for CollectBulkEodExecutor {
    async fn execute(&self, job: &Job) -> VireResult<()> {
        collection::collect_bulk_eod(&self.store, self.vendor.as_ref(), &job.ticker, true).await
    }
}
