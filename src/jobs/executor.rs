//! The `JobExecutor` seam: the Job Manager only knows how to dequeue,
//! time-box and record outcomes, never what a given job type actually
//! does. Each executor is registered once at startup against the
//! `JobType` it handles.

use async_trait::async_trait;

use crate::error::VireResult;
use crate::models::Job;

#[async_trait]
pub trait JobExecutor: Send + Sync {
    async fn execute(&self, job: &Job) -> VireResult<()>;
}
