use crate::{
    chunk_plan::ChunkPlan,
    config::Config,
    dispatch::Dispatcher,
    error::BroadcastError,
    job::{BroadcastJob, BroadcastRequest},
    progress::Estimate,
    report::{Report, ReportBuilder},
    sink::{ProgressSink, ReportSink},
    worker::{Worker, WorkerPool},
};
use std::sync::Arc;
use tracing::{info, warn};

/// Entry point for starting a broadcast on a long-lived worker pool.
pub struct Broadcaster<W: Worker> {
    cfg: Config,
    pool: Arc<WorkerPool<W>>,
}

impl<W: Worker + 'static> Broadcaster<W> {
    pub fn new(cfg: &Config, pool: Arc<WorkerPool<W>>) -> Self {
        Self {
            cfg: cfg.clone(),
            pool,
        }
    }

    pub fn pool(&self) -> &Arc<WorkerPool<W>> {
        &self.pool
    }

    pub fn estimate(&self, total: usize) -> Estimate {
        Estimate::new(&self.cfg.broadcast, self.pool.len(), total as u64)
    }

    /// Validates `request`, fans it out over the pool and publishes the
    /// report. Only invalid input or an empty pool produce an error; in that
    /// case nothing is sent and no report is built.
    pub async fn start<P, R>(
        &self,
        request: BroadcastRequest,
        progress: Arc<P>,
        reports: &R,
    ) -> Result<Report, BroadcastError>
    where
        P: ProgressSink + 'static,
        R: ReportSink + ?Sized,
    {
        let job = BroadcastJob::new(&self.cfg.broadcast, request)?;
        if self.pool.is_empty() {
            warn!("job {} rejected: no workers available", job.job_id);
            return Err(BroadcastError::NoWorkersAvailable);
        }

        let plan = ChunkPlan::round_robin(&job.recipients, self.pool.len())?;
        let estimate = self.estimate(job.total());
        info!(
            "job {} starting: {} recipients, {} workers ({})",
            job.job_id,
            job.total(),
            self.pool.len(),
            self.pool.tags().join(" | ")
        );
        if let Err(err) = progress.started(&estimate).await {
            warn!("failed to publish start estimate: {err:#}");
        }

        let job = Arc::new(job);
        let dispatcher = Dispatcher::new(Arc::clone(&self.pool), &self.cfg);
        let result = dispatcher
            .dispatch(Arc::clone(&job), plan, progress)
            .await?;

        let report = ReportBuilder::new(&self.cfg, self.pool.tags()).build(&job, &result);
        if report.failures.omits_any() {
            let all: Vec<String> = result
                .failed_recipients
                .iter()
                .map(|f| format!("{} ({})", f.recipient.label(), f.reason))
                .collect();
            info!(
                "job {} failed recipients ({}): {}",
                job.job_id,
                all.len(),
                all.join(", ")
            );
        }

        if let Err(err) = reports.publish(&report).await {
            warn!("failed to publish report for job {}: {err:#}", job.job_id);
        }

        Ok(report)
    }
}
