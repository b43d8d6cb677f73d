//! Job Manager (spec section 4.4): a fixed pool of heavy and light worker
//! loops that dequeue from the persistent job queue, dispatch to a
//! registered `JobExecutor`, enforce a per-class timeout, and record the
//! outcome back onto the job record. Generalizes the teacher's
//! `ConcurrentFetcher` worker-pool shape (bounded concurrency, one loop per
//! slot) from a single quote-fetch task to an arbitrary, type-dispatched
//! job body.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant as StdInstant;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::JobManagerConfig;
use crate::error::VireError;
use crate::models::{Job, JobType};
use crate::store::JobQueueStore;

use super::executor::JobExecutor;

const HEAVY_TYPES: &[JobType] = &[JobType::CollectFilingPdfs, JobType::CollectFilingSummaries];
const LIGHT_TYPES: &[JobType] = &[
    JobType::CollectEod,
    JobType::CollectFundamentals,
    JobType::CollectFilingsIndex,
    JobType::CollectNews,
    JobType::ComputeSignals,
    JobType::CollectBulkEod,
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum WorkerClass {
    Heavy,
    Light,
}

impl WorkerClass {
    fn types(self) -> &'static [JobType] {
        match self {
            WorkerClass::Heavy => HEAVY_TYPES,
            WorkerClass::Light => LIGHT_TYPES,
        }
    }

    fn label(self) -> &'static str {
        match self {
            WorkerClass::Heavy => "heavy",
            WorkerClass::Light => "light",
        }
    }
}

/// Owns the worker pool. `spawn` returns immediately with join handles for
/// every worker task; callers hold on to the `CancellationToken` to request
/// a clean shutdown and should await the handles afterwards.
pub struct JobManager {
    jobs: JobQueueStore,
    config: JobManagerConfig,
    executors: HashMap<JobType, Arc<dyn JobExecutor>>,
    shutdown: CancellationToken,
}

impl JobManager {
    pub fn new(jobs: JobQueueStore, config: JobManagerConfig) -> Self {
        Self {
            jobs,
            config,
            executors: HashMap::new(),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn register(&mut self, job_type: JobType, executor: Arc<dyn JobExecutor>) {
        self.executors.insert(job_type, executor);
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Spawn `heavy_workers + light_workers` loops. Each loop keeps running
    /// until the shutdown token fires.
    pub fn spawn(self) -> Vec<JoinHandle<()>> {
        let executors = Arc::new(self.executors);
        let mut handles = Vec::with_capacity(self.config.heavy_workers + self.config.light_workers);

        for slot in 0..self.config.heavy_workers {
            handles.push(spawn_worker(
                WorkerClass::Heavy,
                slot,
                self.jobs.clone(),
                executors.clone(),
                self.config.clone(),
                self.shutdown.clone(),
            ));
        }
        for slot in 0..self.config.light_workers {
            handles.push(spawn_worker(
                WorkerClass::Light,
                slot,
                self.jobs.clone(),
                executors.clone(),
                self.config.clone(),
                self.shutdown.clone(),
            ));
        }

        handles
    }
}

fn spawn_worker(
    class: WorkerClass,
    slot: usize,
    jobs: JobQueueStore,
    executors: Arc<HashMap<JobType, Arc<dyn JobExecutor>>>,
    config: JobManagerConfig,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(class = class.label(), slot, "worker started");
        loop {
            if shutdown.is_cancelled() {
                break;
            }

            let dequeued = tokio::select! {
                _ = shutdown.cancelled() => break,
                result = jobs.dequeue(Some(class.types())) => result,
            };

            let job = match dequeued {
                Ok(Some(job)) => job,
                Ok(None) => {
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(std::time::Duration::from_millis(config.poll_interval_ms)) => {}
                    }
                    continue;
                }
                Err(e) => {
                    error!(class = class.label(), slot, error = %e, "dequeue failed");
                    tokio::time::sleep(std::time::Duration::from_millis(config.poll_interval_ms)).await;
                    continue;
                }
            };

            run_job(class, &jobs, &executors, &config, job).await;
        }
        info!(class = class.label(), slot, "worker stopped");
    })
}

async fn run_job(
    class: WorkerClass,
    jobs: &JobQueueStore,
    executors: &HashMap<JobType, Arc<dyn JobExecutor>>,
    config: &JobManagerConfig,
    job: Job,
) {
    let started = StdInstant::now();
    let timeout_secs = match class {
        WorkerClass::Heavy => config.heavy_timeout_secs,
        WorkerClass::Light => config.light_timeout_secs,
    };

    let Some(executor) = executors.get(&job.job_type) else {
        warn!(job_id = %job.id, job_type = job.job_type.as_str(), "no executor registered for job type");
        let _ = jobs
            .complete(job.id, Some("no executor registered"), started.elapsed().as_millis() as i64)
            .await;
        return;
    };

    let outcome = tokio::time::timeout(
        std::time::Duration::from_secs(timeout_secs),
        executor.execute(&job),
    )
    .await;

    let duration_ms = started.elapsed().as_millis() as i64;
    let error_text = match outcome {
        Ok(Ok(())) => None,
        Ok(Err(e)) => Some(e.to_string()),
        Err(_) => Some(VireError::JOB_TIMEOUT_CODE.to_string()),
    };

    if let Some(err) = &error_text {
        warn!(
            correlation_id = job.correlation_id.as_deref().unwrap_or(""),
            job_id = %job.id,
            job_type = job.job_type.as_str(),
            ticker = %job.ticker,
            duration_ms,
            outcome = "failed",
            error = %err,
            "job finished",
        );
    } else {
        info!(
            correlation_id = job.correlation_id.as_deref().unwrap_or(""),
            job_id = %job.id,
            job_type = job.job_type.as_str(),
            ticker = %job.ticker,
            duration_ms,
            outcome = "done",
            "job finished",
        );
    }

    if let Err(e) = jobs.complete(job.id, error_text.as_deref(), duration_ms).await {
        error!(job_id = %job.id, error = %e, "failed to persist job completion");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VireResult;
    use sqlx::SqlitePool;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        sqlx::migrate!("migrations/market").run(&pool).await.unwrap();
        pool
    }

    struct CountingExecutor {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl JobExecutor for CountingExecutor {
        async fn execute(&self, _job: &Job) -> VireResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct HangingExecutor;

    #[async_trait::async_trait]
    impl JobExecutor for HangingExecutor {
        async fn execute(&self, _job: &Job) -> VireResult<()> {
            tokio::time::sleep(std::time::Duration::from_secs(600)).await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn worker_dispatches_to_registered_executor_and_marks_done() {
        let pool = test_pool().await;
        let jobs = JobQueueStore::new(pool);
        jobs.enqueue(&Job::new_pending(JobType::CollectNews, "AAPL", 10, None)).await.unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let mut manager = JobManager::new(
            jobs.clone(),
            JobManagerConfig {
                heavy_workers: 0,
                light_workers: 1,
                heavy_timeout_secs: 5,
                light_timeout_secs: 5,
                poll_interval_ms: 10,
            },
        );
        manager.register(JobType::CollectNews, Arc::new(CountingExecutor { calls: calls.clone() }));
        let shutdown = manager.shutdown_token();
        let handles = manager.spawn();

        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        shutdown.cancel();
        for h in handles {
            let _ = h.await;
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(jobs.list_pending().await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn timed_out_job_is_recorded_as_failed() {
        let pool = test_pool().await;
        let jobs = JobQueueStore::new(pool);
        let job = Job::new_pending(JobType::CollectFilingPdfs, "AAPL", 10, None);
        jobs.enqueue(&job).await.unwrap();

        let mut manager = JobManager::new(
            jobs.clone(),
            JobManagerConfig {
                heavy_workers: 1,
                light_workers: 0,
                heavy_timeout_secs: 0,
                light_timeout_secs: 5,
                poll_interval_ms: 10,
            },
        );
        manager.register(JobType::CollectFilingPdfs, Arc::new(HangingExecutor));
        let shutdown = manager.shutdown_token();
        let handles = manager.spawn();

        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        shutdown.cancel();
        for h in handles {
            let _ = h.await;
        }

        let record = jobs.get(job.id).await.unwrap();
        assert_eq!(record.error.as_deref(), Some(VireError::JOB_TIMEOUT_CODE));
    }
}
