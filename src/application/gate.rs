//! Admission control for external processes.
//!
//! One gate is shared by every request; it bounds how many ffmpeg/ffprobe
//! processes run at once across the whole service.

use crate::error::ThumbError;
use tokio::sync::{Semaphore, SemaphorePermit};
use tokio_util::sync::CancellationToken;

#[derive(Debug)]
pub struct ProcessGate {
    semaphore: Semaphore,
    capacity: usize,
}

/// One unit of gate capacity. Returned to the gate when dropped.
#[derive(Debug)]
pub struct ProcessSlot<'a> {
    _permit: SemaphorePermit<'a>,
}

impl ProcessSlot<'_> {
    pub fn release(self) {}
}

impl ProcessGate {
    /// `capacity` is fixed for the lifetime of the gate. A capacity of zero
    /// would block every caller forever, so it is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Semaphore::new(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots not currently held.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Waits for a free slot. Waiters are woken in FIFO order.
    pub async fn acquire(&self, token: &CancellationToken) -> Result<ProcessSlot<'_>, ThumbError> {
        tokio::select! {
            biased;
            _ = token.cancelled() => Err(ThumbError::Cancelled),
            permit = self.semaphore.acquire() => permit
                .map(|permit| ProcessSlot { _permit: permit })
                .map_err(|_| ThumbError::Cancelled),
        }
    }
}
