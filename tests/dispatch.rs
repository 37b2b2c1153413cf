use async_trait::async_trait;
use broadcaster::{
    chunk_plan::ChunkPlan,
    config::Config,
    dispatch::Dispatcher,
    error::BroadcastError,
    failure::FailureReason,
    job::{BroadcastJob, BroadcastRequest, Recipient, RecipientId},
    pipeline::Broadcaster,
    progress::{Estimate, ProgressSnapshot},
    report::{FailureListing, Report},
    sink::{ProgressSink, ReportSink},
    worker::{Roster, SendError, SimulatedWorker, Worker, WorkerPool},
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

#[derive(Default)]
struct RecordingProgress {
    estimates: Mutex<Vec<Estimate>>,
    snapshots: Mutex<Vec<ProgressSnapshot>>,
}

#[async_trait]
impl ProgressSink for RecordingProgress {
    async fn started(&self, estimate: &Estimate) -> anyhow::Result<()> {
        self.estimates.lock().push(estimate.clone());
        Ok(())
    }

    async fn push(&self, snapshot: &ProgressSnapshot) -> anyhow::Result<()> {
        self.snapshots.lock().push(snapshot.clone());
        Ok(())
    }
}

#[derive(Default)]
struct RecordingReports(Mutex<Vec<Report>>);

#[async_trait]
impl ReportSink for RecordingReports {
    async fn publish(&self, report: &Report) -> anyhow::Result<()> {
        self.0.lock().push(report.clone());
        Ok(())
    }
}

/// Delivers everything, or panics on every send when `crash` is set.
struct CrashingWorker {
    id: &'static str,
    crash: bool,
}

#[async_trait]
impl Worker for CrashingWorker {
    type Sendable = RecipientId;

    fn id(&self) -> &str {
        self.id
    }

    fn cached(&self, _recipient: &RecipientId) -> Option<RecipientId> {
        None
    }

    async fn fetch(&self, recipient: &RecipientId) -> Result<RecipientId, SendError> {
        Ok(recipient.clone())
    }

    async fn send(&self, _target: &RecipientId, _text: &str) -> Result<(), SendError> {
        if self.crash {
            panic!("connection state corrupted");
        }
        Ok(())
    }
}

const MIXED_ROSTER: &str = "\
# id, display name, outcome
u1,Alice
u2,Bob,closed
u3,,denied
u4,Dana,missing
u5,,error:gateway timeout
u6,Frank,unlisted
u7,,unlisted
u8
";

fn all_ok(n: usize) -> Roster {
    let raw: String = (0..n).map(|i| format!("u{i}\n")).collect();
    Roster::parse(&raw).expect("roster")
}

fn pool_for(roster: &Roster, workers: usize) -> Arc<WorkerPool<SimulatedWorker>> {
    Arc::new(WorkerPool::new(SimulatedWorker::fleet(
        workers,
        roster,
        Duration::ZERO,
    )))
}

fn request(roster: &Roster) -> BroadcastRequest {
    BroadcastRequest {
        message: "hello".into(),
        recipients: roster.recipients.clone(),
    }
}

#[tokio::test(start_paused = true)]
async fn every_recipient_is_accounted_for() {
    let cfg = Config::default();
    let roster = Roster::parse(MIXED_ROSTER).expect("roster");
    let pool = pool_for(&roster, 2);
    let broadcaster = Broadcaster::new(&cfg, Arc::clone(&pool));
    let progress = Arc::new(RecordingProgress::default());
    let reports = RecordingReports::default();

    let report = broadcaster
        .start(request(&roster), Arc::clone(&progress), &reports)
        .await
        .expect("broadcast");

    assert_eq!(report.total_members, 8);
    assert_eq!(report.success_count, 3);
    assert_eq!(report.failure_count, 5);
    assert_eq!(report.success_count + report.failure_count, report.total_members);
    assert_eq!(report.success_rate, 37);

    let breakdown: HashMap<&str, u64> = report
        .failure_breakdown
        .iter()
        .map(|(k, v)| (k.as_str(), *v))
        .collect();
    assert_eq!(breakdown.get("recipient_not_found"), Some(&2));
    assert_eq!(breakdown.get("recipient_unreachable"), Some(&1));
    assert_eq!(breakdown.get("permission_denied"), Some(&1));
    assert_eq!(breakdown.get("transient_error"), Some(&1));

    match &report.failures {
        FailureListing::Pages { pages, total_pages, additional } => {
            assert_eq!(*total_pages, 1);
            assert_eq!(*additional, 0);
            let mut labels = pages[0].clone();
            labels.sort();
            assert_eq!(labels, vec!["<@u3>", "<@u5>", "<@u7>", "Bob", "Dana"]);
        }
        other => panic!("unexpected listing: {other:?}"),
    }

    let mut delivered: Vec<(String, String)> = pool
        .workers()
        .flat_map(|w| w.sent())
        .map(|(id, text)| (id.to_string(), text))
        .collect();
    delivered.sort();
    assert_eq!(
        delivered,
        vec![
            ("u1".to_string(), "hello\n\n<@u1>".to_string()),
            ("u6".to_string(), "hello\n\n<@u6>".to_string()),
            ("u8".to_string(), "hello\n\n<@u8>".to_string()),
        ]
    );

    assert_eq!(progress.estimates.lock().len(), 1);
    assert_eq!(reports.0.lock().as_slice(), &[report]);
}

#[tokio::test(start_paused = true)]
async fn transient_reason_keeps_platform_message() {
    let cfg = Config::default();
    let roster = Roster::parse("u1,,error:gateway timeout\n").expect("roster");
    let pool = pool_for(&roster, 1);
    let job = Arc::new(BroadcastJob::new(&cfg.broadcast, request(&roster)).expect("job"));
    let plan = ChunkPlan::round_robin(&job.recipients, 1).expect("plan");

    let result = Dispatcher::new(pool, &cfg)
        .dispatch(job, plan, Arc::new(RecordingProgress::default()))
        .await
        .expect("dispatch");

    assert_eq!(result.failed_recipients.len(), 1);
    assert_eq!(
        result.failed_recipients[0].reason,
        FailureReason::TransientError("gateway timeout".into())
    );
}

#[tokio::test(start_paused = true)]
async fn sends_are_paced_per_worker() {
    let cfg = Config::default();
    let roster = all_ok(6);
    let pool = pool_for(&roster, 2);
    let dispatcher = Dispatcher::new(Arc::clone(&pool), &cfg);
    assert_eq!(dispatcher.pacing(), Duration::from_millis(500));

    let job = Arc::new(BroadcastJob::new(&cfg.broadcast, request(&roster)).expect("job"));
    let plan = ChunkPlan::round_robin(&job.recipients, pool.len()).expect("plan");
    let result = dispatcher
        .dispatch(job, plan, Arc::new(RecordingProgress::default()))
        .await
        .expect("dispatch");

    assert_eq!(result.success_count, 6);
    assert!(result.elapsed() >= Duration::from_millis(1500));
    assert_eq!(pool.load("sim-1"), Some(0));
    assert_eq!(pool.load("sim-2"), Some(0));
}

#[tokio::test(start_paused = true)]
async fn progress_is_monotonic_and_completes_once() {
    let cfg = Config::default();
    let roster = all_ok(40);
    let broadcaster = Broadcaster::new(&cfg, pool_for(&roster, 4));
    let progress = Arc::new(RecordingProgress::default());

    broadcaster
        .start(request(&roster), Arc::clone(&progress), &RecordingReports::default())
        .await
        .expect("broadcast");

    let snapshots = progress.snapshots.lock();
    assert!(!snapshots.is_empty());
    assert!(
        snapshots
            .windows(2)
            .all(|w| w[0].processed < w[1].processed)
    );
    assert_eq!(snapshots.iter().filter(|s| s.is_complete()).count(), 1);
    let last = snapshots.last().expect("final update");
    assert_eq!(last.processed, 40);
    assert_eq!(last.percent, 100);
    assert_eq!(last.remaining, 0);
    assert_eq!(last.workers, 4);
}

#[tokio::test(start_paused = true)]
async fn final_update_is_pushed_for_odd_steps() {
    let mut cfg = Config::default();
    cfg.progress.step_percent = 7;
    let roster = all_ok(10);
    let broadcaster = Broadcaster::new(&cfg, pool_for(&roster, 3));
    let progress = Arc::new(RecordingProgress::default());

    broadcaster
        .start(request(&roster), Arc::clone(&progress), &RecordingReports::default())
        .await
        .expect("broadcast");

    let snapshots = progress.snapshots.lock();
    assert_eq!(snapshots.first().map(|s| s.processed), Some(1));
    assert_eq!(snapshots.last().map(|s| s.processed), Some(10));
}

#[tokio::test(start_paused = true)]
async fn empty_pool_fails_before_sending() {
    let cfg = Config::default();
    let roster = all_ok(3);
    let outcomes = Arc::new(roster.outcomes.clone());
    let pool = Arc::new(WorkerPool::new(vec![
        SimulatedWorker::new("", Arc::clone(&outcomes), Duration::ZERO),
        SimulatedWorker::new("  ", outcomes, Duration::ZERO),
    ]));
    assert!(pool.is_empty());
    assert_eq!(pool.rejected(), 2);

    let broadcaster = Broadcaster::new(&cfg, pool);
    let progress = Arc::new(RecordingProgress::default());
    let reports = RecordingReports::default();

    let err = broadcaster
        .start(request(&roster), Arc::clone(&progress), &reports)
        .await
        .unwrap_err();

    assert_eq!(err, BroadcastError::NoWorkersAvailable);
    assert!(err.is_fatal_precondition());
    assert!(progress.estimates.lock().is_empty());
    assert!(progress.snapshots.lock().is_empty());
    assert!(reports.0.lock().is_empty());
}

#[tokio::test(start_paused = true)]
async fn invalid_message_is_rejected_without_sends() {
    let cfg = Config::default();
    let roster = all_ok(2);
    let pool = pool_for(&roster, 2);
    let broadcaster = Broadcaster::new(&cfg, Arc::clone(&pool));

    let err = broadcaster
        .start(
            BroadcastRequest {
                message: "   ".into(),
                recipients: roster.recipients.clone(),
            },
            Arc::new(RecordingProgress::default()),
            &RecordingReports::default(),
        )
        .await
        .unwrap_err();

    assert_eq!(err, BroadcastError::EmptyMessage);
    assert!(pool.workers().all(|w| w.sent().is_empty()));
}

#[tokio::test(start_paused = true)]
async fn plan_larger_than_pool_is_rejected() {
    let cfg = Config::default();
    let roster = all_ok(6);
    let pool = pool_for(&roster, 2);
    let job = Arc::new(BroadcastJob::new(&cfg.broadcast, request(&roster)).expect("job"));
    let plan = ChunkPlan::round_robin(&job.recipients, 3).expect("plan");

    let err = Dispatcher::new(pool, &cfg)
        .dispatch(job, plan, Arc::new(RecordingProgress::default()))
        .await
        .unwrap_err();

    assert_eq!(err, BroadcastError::InvalidWorkerCount(3));
}

#[tokio::test(start_paused = true)]
async fn duplicate_recipients_are_sent_once() {
    let cfg = Config::default();
    let roster = all_ok(2);
    let pool = pool_for(&roster, 2);
    let broadcaster = Broadcaster::new(&cfg, Arc::clone(&pool));
    let mut recipients = roster.recipients.clone();
    recipients.push(Recipient::new("u0"));

    let report = broadcaster
        .start(
            BroadcastRequest {
                message: "hi".into(),
                recipients,
            },
            Arc::new(RecordingProgress::default()),
            &RecordingReports::default(),
        )
        .await
        .expect("broadcast");

    assert_eq!(report.total_members, 2);
    let sent: usize = pool.workers().map(|w| w.sent().len()).sum();
    assert_eq!(sent, 2);
}

#[tokio::test(start_paused = true)]
async fn crashed_chunk_counts_its_unreached_recipients_as_failed() {
    let cfg = Config::default();
    let roster = all_ok(6);
    let pool = Arc::new(WorkerPool::new(vec![
        CrashingWorker { id: "a", crash: false },
        CrashingWorker { id: "b", crash: true },
    ]));
    let broadcaster = Broadcaster::new(&cfg, Arc::clone(&pool));
    let progress = Arc::new(RecordingProgress::default());

    let report = broadcaster
        .start(request(&roster), Arc::clone(&progress), &RecordingReports::default())
        .await
        .expect("broadcast");

    assert_eq!(report.total_members, 6);
    assert_eq!(report.success_count, 3);
    assert_eq!(report.failure_count, 3);
    assert_eq!(report.failure_breakdown.get("transient_error"), Some(&3));
    match &report.failures {
        FailureListing::Pages { pages, .. } => {
            assert_eq!(pages[0], vec!["<@u1>", "<@u3>", "<@u5>"]);
        }
        other => panic!("unexpected listing: {other:?}"),
    }

    let snapshots = progress.snapshots.lock();
    let last = snapshots.last().expect("final update");
    assert_eq!(last.processed, 6);
    assert_eq!(last.percent, 100);
    assert_eq!(snapshots.iter().filter(|s| s.is_complete()).count(), 1);

    assert_eq!(pool.load("a"), Some(0));
    assert_eq!(pool.load("b"), Some(0));
}

#[tokio::test(start_paused = true)]
async fn crashed_chunk_reason_is_reported() {
    let cfg = Config::default();
    let roster = all_ok(2);
    let pool = Arc::new(WorkerPool::new(vec![CrashingWorker { id: "b", crash: true }]));
    let job = Arc::new(BroadcastJob::new(&cfg.broadcast, request(&roster)).expect("job"));
    let plan = ChunkPlan::round_robin(&job.recipients, 1).expect("plan");

    let result = Dispatcher::new(pool, &cfg)
        .dispatch(job, plan, Arc::new(RecordingProgress::default()))
        .await
        .expect("dispatch");

    assert_eq!(result.processed_count, 2);
    assert!(
        result
            .failed_recipients
            .iter()
            .all(|f| f.reason == FailureReason::TransientError("worker task failed".into()))
    );
}

#[tokio::test(start_paused = true)]
async fn empty_job_pushes_one_complete_update() {
    let cfg = Config::default();
    let roster = all_ok(0);
    let broadcaster = Broadcaster::new(&cfg, pool_for(&roster, 2));
    let progress = Arc::new(RecordingProgress::default());

    let report = broadcaster
        .start(request(&roster), Arc::clone(&progress), &RecordingReports::default())
        .await
        .expect("broadcast");

    assert_eq!(report.total_members, 0);
    let snapshots = progress.snapshots.lock();
    assert_eq!(snapshots.len(), 1);
    assert!(snapshots[0].is_complete());
    assert_eq!(snapshots[0].percent, 100);
}
