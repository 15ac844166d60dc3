use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::{PipelineError, PipelineResult};

/// Counting semaphore in front of the synthesis collaborator. One permit is
/// held per in-flight synthesis call and released when the guard drops.
#[derive(Debug, Clone)]
pub struct AdmissionControl {
    permits: Arc<Semaphore>,
    capacity: usize,
}

impl AdmissionControl {
    /// Capacity below one is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Waits while all permits are out.
    pub async fn acquire(&self) -> PipelineResult<OwnedSemaphorePermit> {
        self.permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| PipelineError::Synthesis("admission semaphore closed".into()))
    }
}
