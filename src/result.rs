use crate::failure::FailureRecord;
use std::time::Duration;
use tokio::time::Instant;

/// Running tally of one job, shared by all chunk tasks behind a mutex.
///
/// `success_count + failure_count == processed_count <= total_members`
/// holds after every mutation, and `failed_recipients` has exactly
/// `failure_count` entries.
#[derive(Debug, Clone)]
pub struct JobResult {
    pub total_members: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub failed_recipients: Vec<FailureRecord>,
    pub processed_count: u64,
    pub started_at: Instant,
    pub finished_at: Option<Instant>,
    pub last_progress_push: Instant,
}

impl JobResult {
    pub fn new(total_members: u64, started_at: Instant) -> Self {
        Self {
            total_members,
            success_count: 0,
            failure_count: 0,
            failed_recipients: Vec::new(),
            processed_count: 0,
            started_at,
            finished_at: None,
            last_progress_push: started_at,
        }
    }

    pub fn record_success(&mut self) {
        self.success_count += 1;
        self.processed_count += 1;
    }

    pub fn record_failure(&mut self, record: FailureRecord) {
        self.failure_count += 1;
        self.failed_recipients.push(record);
        self.processed_count += 1;
    }

    pub fn remaining(&self) -> u64 {
        self.total_members.saturating_sub(self.processed_count)
    }

    /// Whole-number percentage, rounded down. An empty job counts as done.
    pub fn percent(&self) -> u64 {
        if self.total_members == 0 {
            return 100;
        }
        self.processed_count * 100 / self.total_members
    }

    pub fn elapsed_at(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.started_at)
    }

    /// Time from start to completion, or to now while still running.
    pub fn elapsed(&self) -> Duration {
        self.elapsed_at(self.finished_at.unwrap_or_else(Instant::now))
    }

    pub fn finish(&mut self, at: Instant) {
        self.finished_at = Some(at);
    }
}
