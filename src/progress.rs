use crate::{
    config,
    result::JobResult,
    util::{format_minutes, format_number, progress_bar},
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

/// Point-in-time view of a running job, derived from its [`JobResult`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub percent: u64,
    pub processed: u64,
    pub total: u64,
    pub success: u64,
    pub failure: u64,
    pub remaining: u64,
    pub elapsed_ms: u64,
    pub eta_ms: u64,
    /// Recipients per second since the job started, rounded.
    pub throughput: u64,
    pub workers: usize,
}

impl ProgressSnapshot {
    pub fn capture(result: &JobResult, now: Instant, workers: usize) -> Self {
        let elapsed = result.elapsed_at(now);
        let processed = result.processed_count;
        let remaining = result.remaining();

        let eta_ms = if processed > 0 {
            let avg_ms = elapsed.as_secs_f64() * 1000.0 / processed as f64;
            (avg_ms * remaining as f64) as u64
        } else {
            0
        };

        let secs = elapsed.as_secs_f64();
        let throughput = if processed > 0 && secs > 0.0 {
            (processed as f64 / secs).round() as u64
        } else {
            0
        };

        Self {
            percent: result.percent(),
            processed,
            total: result.total_members,
            success: result.success_count,
            failure: result.failure_count,
            remaining,
            elapsed_ms: elapsed.as_millis() as u64,
            eta_ms,
            throughput,
            workers,
        }
    }

    pub fn elapsed(&self) -> Duration {
        Duration::from_millis(self.elapsed_ms)
    }

    pub fn eta(&self) -> Duration {
        Duration::from_millis(self.eta_ms)
    }

    pub fn is_complete(&self) -> bool {
        self.processed >= self.total
    }

    pub fn render(&self) -> String {
        format!(
            "{} {}% | {}/{} processed | {} ok | {} failed | elapsed {} | remaining {} | ~{}/s on {} workers",
            progress_bar(self.percent),
            self.percent,
            format_number(self.processed),
            format_number(self.total),
            format_number(self.success),
            format_number(self.failure),
            format_minutes(self.elapsed()),
            format_minutes(self.eta()),
            self.throughput,
            self.workers
        )
    }
}

/// Decides which processed recipients trigger a progress push.
#[derive(Debug, Clone)]
pub struct ProgressThrottle {
    step_percent: u64,
    heartbeat: Duration,
}

impl ProgressThrottle {
    pub fn new(cfg: &config::Progress) -> Self {
        Self {
            step_percent: cfg.step_percent,
            heartbeat: Duration::from_millis(cfg.heartbeat_ms),
        }
    }

    /// Called right after `processed_count` moved. Pushes on every
    /// `step_percent` boundary, after `heartbeat` of silence, for the first
    /// recipient and for the last one. Stamps `last_progress_push` when it
    /// says yes.
    pub fn should_push(&self, result: &mut JobResult, now: Instant) -> bool {
        let percent = result.percent();
        let on_step = self.step_percent > 0 && percent % self.step_percent == 0;
        let stale = now.saturating_duration_since(result.last_progress_push) > self.heartbeat;
        let first = result.processed_count == 1;
        let last = result.remaining() == 0;

        if on_step || stale || first || last {
            result.last_progress_push = now;
            true
        } else {
            false
        }
    }
}

/// Up-front duration and speed estimate shown when a job starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Estimate {
    pub total: u64,
    pub workers: usize,
    pub per_recipient_ms: u64,
    pub total_ms: u64,
    /// Nominal recipients per second across all workers.
    pub speed: u64,
}

impl Estimate {
    pub fn new(cfg: &config::Broadcast, workers: usize, total: u64) -> Self {
        let per_recipient_ms = if workers == 0 {
            0
        } else {
            (cfg.cooldown_ms + cfg.member_cooldown_ms) / workers as u64
        };
        Self {
            total,
            workers,
            per_recipient_ms,
            total_ms: per_recipient_ms * total,
            speed: cfg.requests_per_second * workers as u64,
        }
    }

    pub fn render(&self) -> String {
        format!(
            "{} recipients | estimated {} | ~{} recipients/s | {} workers distributing work",
            format_number(self.total),
            format_minutes(Duration::from_millis(self.total_ms)),
            self.speed,
            self.workers
        )
    }
}
