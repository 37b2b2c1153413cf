use crate::{error::BroadcastError, job::Recipient};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// How a job's recipients are spread over the worker pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkPlan {
    pub worker_count: usize,
    pub chunks: Vec<Chunk>,
    pub strategy: String,
}

/// Recipients handled by one worker, in the order they will be sent to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub index: usize, // also the worker slot
    pub recipients: Vec<Recipient>,
}

impl Chunk {
    pub fn len(&self) -> usize {
        self.recipients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recipients.is_empty()
    }
}

impl ChunkPlan {
    /// Recipient `i` goes to chunk `i % worker_count`. Chunk sizes differ by
    /// at most one and each chunk keeps the input order.
    pub fn round_robin(
        recipients: &[Recipient],
        worker_count: usize,
    ) -> Result<ChunkPlan, BroadcastError> {
        if worker_count == 0 {
            return Err(BroadcastError::InvalidWorkerCount(worker_count));
        }

        let mut chunks: Vec<Chunk> = (0..worker_count)
            .map(|index| Chunk {
                index,
                recipients: Vec::with_capacity(recipients.len() / worker_count + 1),
            })
            .collect();

        for (i, r) in recipients.iter().enumerate() {
            chunks[i % worker_count].recipients.push(r.clone());
        }

        let busy = chunks.iter().filter(|c| !c.is_empty()).count();
        if busy < worker_count {
            warn!("only {busy} of {worker_count} workers will be used due to recipient distribution");
        }
        info!(
            "distributed {} recipients across {} workers: {}",
            recipients.len(),
            worker_count,
            chunks
                .iter()
                .map(|c| c.len().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );

        Ok(ChunkPlan {
            worker_count,
            chunks,
            strategy: "round_robin".to_string(),
        })
    }

    pub fn total(&self) -> usize {
        self.chunks.iter().map(Chunk::len).sum()
    }
}
