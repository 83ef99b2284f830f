//! Request coalescing: at most one pipeline run per video at a time.
//!
//! The first caller for a [`RunKey`] becomes the leader and receives a
//! [`RunTicket`]. Later callers become followers and wait on the leader's
//! outcome instead of doing the work again. Dropping the ticket always clears
//! the key, whether the leader finished, failed, was cancelled or panicked.

use crate::domain::thumbnail::RunKey;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Lifecycle of one run as seen by its followers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Running,
    /// The artifact is in place.
    Published,
    /// The run failed; carries the leader's error message.
    Failed(String),
    /// The leader went away without finishing (cancelled or panicked).
    Abandoned,
}

#[derive(Debug, Default)]
pub struct RequestCoalescer {
    runs: Mutex<HashMap<RunKey, watch::Sender<RunOutcome>>>,
}

pub enum Role<'a> {
    Leader(RunTicket<'a>),
    Follower(Follower),
}

impl RequestCoalescer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically claims `key`. Returns a ticket if the key was free, or a
    /// follower handle on the run already in progress.
    pub fn try_become_leader(&self, key: &RunKey) -> Role<'_> {
        let mut runs = self.lock();
        if let Some(sender) = runs.get(key) {
            return Role::Follower(Follower {
                key: key.clone(),
                receiver: sender.subscribe(),
            });
        }
        let (sender, _) = watch::channel(RunOutcome::Running);
        runs.insert(key.clone(), sender);
        Role::Leader(RunTicket {
            coalescer: self,
            key: key.clone(),
            outcome: None,
        })
    }

    pub fn is_active(&self, key: &RunKey) -> bool {
        self.lock().contains_key(key)
    }

    pub fn active_count(&self) -> usize {
        self.lock().len()
    }

    /// Removes ownership of `key` and wakes every follower with `outcome`.
    fn release(&self, key: &RunKey, outcome: RunOutcome) {
        let sender = self.lock().remove(key);
        if let Some(sender) = sender {
            sender.send_replace(outcome);
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<RunKey, watch::Sender<RunOutcome>>> {
        // A panic while holding the lock cannot leave the map half-updated.
        self.runs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Leadership of one key. Released exactly once, on drop.
pub struct RunTicket<'a> {
    coalescer: &'a RequestCoalescer,
    key: RunKey,
    outcome: Option<RunOutcome>,
}

impl RunTicket<'_> {
    pub fn key(&self) -> &RunKey {
        &self.key
    }

    /// Records how the run ended. Followers see it when the ticket drops.
    pub fn finish(mut self, outcome: RunOutcome) {
        self.outcome = Some(outcome);
    }
}

impl Drop for RunTicket<'_> {
    fn drop(&mut self) {
        let outcome = self.outcome.take().unwrap_or(RunOutcome::Abandoned);
        self.coalescer.release(&self.key, outcome);
    }
}

pub struct Follower {
    key: RunKey,
    receiver: watch::Receiver<RunOutcome>,
}

impl Follower {
    pub fn key(&self) -> &RunKey {
        &self.key
    }

    /// Waits for the leader's outcome. Returns `None` if `token` is cancelled
    /// first; that only ends this wait, the leader keeps going.
    pub async fn wait(mut self, token: &CancellationToken) -> Option<RunOutcome> {
        tokio::select! {
            biased;
            _ = token.cancelled() => None,
            outcome = next_outcome(&mut self.receiver) => Some(outcome),
        }
    }
}

async fn next_outcome(receiver: &mut watch::Receiver<RunOutcome>) -> RunOutcome {
    loop {
        let current = receiver.borrow_and_update().clone();
        if current != RunOutcome::Running {
            return current;
        }
        if receiver.changed().await.is_err() {
            // Sender gone; it always publishes before closing.
            let last = receiver.borrow().clone();
            return match last {
                RunOutcome::Running => RunOutcome::Abandoned,
                other => other,
            };
        }
    }
}
