use crate::{
    chunk_plan::{Chunk, ChunkPlan},
    config::Config,
    error::BroadcastError,
    failure::{FailureReason, FailureRecord},
    job::{BroadcastJob, Recipient},
    progress::{ProgressSnapshot, ProgressThrottle},
    result::JobResult,
    sink::ProgressSink,
    worker::{Resolution, Worker, WorkerPool},
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Runs one chunk per worker concurrently and collects the outcome.
pub struct Dispatcher<W: Worker> {
    pool: Arc<WorkerPool<W>>,
    pacing: Duration,
    throttle: ProgressThrottle,
    reason_max_len: usize,
}

/// Reason recorded for recipients a crashed chunk task never reached.
const TASK_FAILED: &str = "worker task failed";

/// State every chunk task of one job writes to.
struct Shared<P> {
    result: Mutex<JobResult>,
    // Recipients recorded per chunk, indexed by chunk position.
    done: Vec<AtomicUsize>,
    // Highest processed count handed to the sink so far. Holding this lock
    // is what serializes sink calls.
    last_pushed: tokio::sync::Mutex<Option<u64>>,
    sink: Arc<P>,
    throttle: ProgressThrottle,
    workers: usize,
}

impl<W: Worker + 'static> Dispatcher<W> {
    pub fn new(pool: Arc<WorkerPool<W>>, cfg: &Config) -> Self {
        Self {
            pacing: cfg.broadcast.pacing_interval(pool.len()),
            throttle: ProgressThrottle::new(&cfg.progress),
            reason_max_len: cfg.report.reason_max_len,
            pool,
        }
    }

    pub fn pacing(&self) -> Duration {
        self.pacing
    }

    /// Sends `job` to every recipient in `plan`, worker `i` handling chunk
    /// `i`. Returns once every chunk is finished; per-recipient failures are
    /// recorded in the result and never abort the job. If a chunk task dies,
    /// the recipients it had not reached are recorded as failed.
    pub async fn dispatch<P: ProgressSink + 'static>(
        &self,
        job: Arc<BroadcastJob>,
        plan: ChunkPlan,
        sink: Arc<P>,
    ) -> Result<JobResult, BroadcastError> {
        if self.pool.is_empty() {
            return Err(BroadcastError::NoWorkersAvailable);
        }
        if plan.chunks.is_empty() || plan.chunks.len() > self.pool.len() {
            return Err(BroadcastError::InvalidWorkerCount(plan.chunks.len()));
        }

        let started = Instant::now();
        let shared = Arc::new(Shared {
            result: Mutex::new(JobResult::new(plan.total() as u64, started)),
            done: plan.chunks.iter().map(|_| AtomicUsize::new(0)).collect(),
            last_pushed: tokio::sync::Mutex::new(None),
            sink,
            throttle: self.throttle.clone(),
            workers: self.pool.len(),
        });

        info!(
            "job {} dispatching {} recipients on {} workers, pacing {}ms",
            job.job_id,
            plan.total(),
            plan.chunks.len(),
            self.pacing.as_millis()
        );

        let chunks: Vec<Arc<Chunk>> = plan.chunks.into_iter().map(Arc::new).collect();
        let mut tasks = JoinSet::new();
        let mut owners = HashMap::with_capacity(chunks.len());
        for (slot, (chunk, worker)) in chunks
            .iter()
            .zip(self.pool.workers().cloned())
            .enumerate()
        {
            let handle = tasks.spawn(run_chunk(
                Arc::clone(&self.pool),
                worker,
                slot,
                Arc::clone(chunk),
                Arc::clone(&job),
                Arc::clone(&shared),
                self.pacing,
                self.reason_max_len,
            ));
            owners.insert(handle.id(), slot);
        }

        while let Some(joined) = tasks.join_next().await {
            let Err(err) = joined else { continue };
            error!("job {} chunk task failed: {err}", job.job_id);
            if let Some(&slot) = owners.get(&err.id()) {
                let lost = shared.fail_unprocessed(slot, &chunks[slot]);
                warn!(
                    "job {} recorded {lost} unreached recipients of chunk {slot} as failed",
                    job.job_id
                );
            }
        }

        // Covers jobs whose last update never went out: crashed chunks and
        // empty jobs.
        shared.push_latest().await;

        let mut result = shared.result.lock().clone();
        result.finish(Instant::now());

        info!(
            "job {} completed: success={} failed={}",
            job.job_id, result.success_count, result.failure_count
        );
        Ok(result)
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_chunk<W: Worker, P: ProgressSink>(
    pool: Arc<WorkerPool<W>>,
    worker: Arc<W>,
    slot: usize,
    chunk: Arc<Chunk>,
    job: Arc<BroadcastJob>,
    shared: Arc<Shared<P>>,
    pacing: Duration,
    reason_max_len: usize,
) {
    let tag = worker.tag();
    info!("worker {tag} assigned {} recipients", chunk.len());

    for recipient in &chunk.recipients {
        let in_flight = pool.begin(worker.id());

        let outcome = deliver(worker.as_ref(), &job, recipient, reason_max_len).await;

        let push = {
            let mut result = shared.result.lock();
            match outcome {
                Ok(()) => result.record_success(),
                Err(reason) => result.record_failure(FailureRecord {
                    recipient: recipient.clone(),
                    reason,
                }),
            }
            shared.done[slot].fetch_add(1, Ordering::AcqRel);
            shared.throttle.should_push(&mut result, Instant::now())
        };

        if push {
            shared.push_latest().await;
        }

        drop(in_flight);
        tokio::time::sleep(pacing).await;
    }

    info!("worker {tag} completed {} recipients", chunk.len());
}

async fn deliver<W: Worker>(
    worker: &W,
    job: &BroadcastJob,
    recipient: &Recipient,
    reason_max_len: usize,
) -> Result<(), FailureReason> {
    let target = match worker.resolve_sendable(recipient).await {
        Resolution::Found(target) => target,
        Resolution::NotFound => {
            error!(
                "worker {} failed to send to {}: could not resolve recipient",
                worker.tag(),
                recipient.label()
            );
            return Err(FailureReason::RecipientNotFound);
        }
    };

    let text = job.text_for(recipient);
    worker.send(&target, &text).await.map_err(|err| {
        let reason = FailureReason::classify(&err, reason_max_len);
        error!(
            "worker {} failed to send to {} ({}): {err}",
            worker.tag(),
            recipient.label(),
            reason.category()
        );
        reason
    })
}

impl<P: ProgressSink> Shared<P> {
    /// Records every recipient of `chunk` past the ones its task finished
    /// as failed. Returns how many were added.
    fn fail_unprocessed(&self, slot: usize, chunk: &Chunk) -> usize {
        let mut result = self.result.lock();
        let done = self.done[slot].load(Ordering::Acquire);
        let rest = chunk.recipients.get(done..).unwrap_or_default();
        for recipient in rest {
            result.record_failure(FailureRecord {
                recipient: recipient.clone(),
                reason: FailureReason::TransientError(TASK_FAILED.to_string()),
            });
        }
        self.done[slot].fetch_add(rest.len(), Ordering::AcqRel);
        rest.len()
    }

    /// Pushes the newest aggregate, skipping it if a later one already went
    /// out. Keeps processed counts seen by the sink strictly increasing.
    async fn push_latest(&self) {
        let mut last = self.last_pushed.lock().await;

        let snapshot = {
            let result = self.result.lock();
            ProgressSnapshot::capture(&result, Instant::now(), self.workers)
        };
        if let Some(prev) = *last
            && snapshot.processed <= prev
        {
            debug!("progress {} already covered by {prev}", snapshot.processed);
            return;
        }
        *last = Some(snapshot.processed);

        if let Err(err) = self.sink.push(&snapshot).await {
            warn!("failed to push progress update: {err:#}");
        }
    }
}
