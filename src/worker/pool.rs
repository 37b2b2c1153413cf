use super::Worker;
use crate::error::BroadcastError;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{error, info, warn};

struct Slot<W> {
    worker: Arc<W>,
    load: AtomicUsize,
}

/// The delivery workers available to this process, in registration order,
/// each with an in-flight load counter.
///
/// Membership is fixed at construction; load counters live as long as the
/// pool and are shared by every job dispatched through it.
pub struct WorkerPool<W: Worker> {
    slots: Vec<Slot<W>>,
    rejected: usize,
}

impl<W: Worker> WorkerPool<W> {
    /// Admits workers that expose a usable, unique identity. Others are
    /// skipped with a warning and counted in [`WorkerPool::rejected`].
    pub fn new(workers: impl IntoIterator<Item = W>) -> Self {
        let mut slots = Vec::new();
        let mut seen = HashSet::new();
        let mut offered = 0usize;

        for worker in workers {
            offered += 1;
            let id = worker.id().trim().to_string();
            if id.is_empty() {
                warn!("skipping worker without identity");
                continue;
            }
            if !seen.insert(id.clone()) {
                warn!("skipping worker {} registered twice", worker.tag());
                continue;
            }
            info!("worker {} registered", worker.tag());
            slots.push(Slot {
                worker: Arc::new(worker),
                load: AtomicUsize::new(0),
            });
        }

        let rejected = offered - slots.len();
        if rejected > 0 {
            warn!("only {} of {offered} workers are valid", slots.len());
        }
        if slots.is_empty() {
            error!("no valid workers available; broadcasting will not work");
        }

        Self { slots, rejected }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn rejected(&self) -> usize {
        self.rejected
    }

    pub fn worker(&self, index: usize) -> Option<&Arc<W>> {
        self.slots.get(index).map(|s| &s.worker)
    }

    pub fn workers(&self) -> impl Iterator<Item = &Arc<W>> {
        self.slots.iter().map(|s| &s.worker)
    }

    pub fn tags(&self) -> Vec<String> {
        self.slots.iter().map(|s| s.worker.tag()).collect()
    }

    /// Worker with the fewest sends in flight; the earliest registered wins
    /// ties.
    pub fn select_least_loaded(&self) -> Result<&Arc<W>, BroadcastError> {
        self.slots
            .iter()
            .min_by_key(|s| s.load.load(Ordering::Acquire))
            .map(|s| &s.worker)
            .ok_or(BroadcastError::NoWorkersAvailable)
    }

    pub fn load(&self, worker_id: &str) -> Option<usize> {
        self.slot(worker_id).map(|s| s.load.load(Ordering::Acquire))
    }

    pub fn increment(&self, worker_id: &str) {
        if let Some(slot) = self.slot(worker_id) {
            slot.load.fetch_add(1, Ordering::AcqRel);
        }
    }

    /// Counts one send in flight on `worker_id` until the guard is dropped,
    /// including when the sending task unwinds.
    pub fn begin<'a>(&'a self, worker_id: &'a str) -> InFlight<'a, W> {
        self.increment(worker_id);
        InFlight {
            pool: self,
            worker_id,
        }
    }

    /// Never drops a counter below zero.
    pub fn decrement(&self, worker_id: &str) {
        if let Some(slot) = self.slot(worker_id) {
            let _ = slot
                .load
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        }
    }

    fn slot(&self, worker_id: &str) -> Option<&Slot<W>> {
        self.slots.iter().find(|s| s.worker.id() == worker_id)
    }
}

/// One unit of load held on a worker. See [`WorkerPool::begin`].
pub struct InFlight<'a, W: Worker> {
    pool: &'a WorkerPool<W>,
    worker_id: &'a str,
}

impl<W: Worker> Drop for InFlight<'_, W> {
    fn drop(&mut self) {
        self.pool.decrement(self.worker_id);
    }
}
