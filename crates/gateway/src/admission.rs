//! Admission queue in front of the single generation slot.
//!
//! Two locks, never nested the wrong way round:
//!
//! - the position lock (`std::sync::Mutex<QueueState>`), held only to assign
//!   a position or update bookkeeping, never across an await;
//! - the generation guard (`tokio::sync::Mutex<()>`), held for a whole
//!   generation.
//!
//! A request registers with [`AdmissionQueue::enqueue`] and gets a
//! [`QueueTicket`] carrying its position. Positions come from one counter
//! that only ever grows, so no two requests in the life of the process
//! share a position. Tickets take the guard in position order:
//! only the lowest waiting position may lock it. Dropping a ticket, on any
//! path, removes it from the queue.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{OwnedMutexGuard, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QueueStats {
    pub was_queued: bool,
    pub queue_wait_ms: f64,
    /// Position assigned at registration. Grows for the life of the process.
    pub queue_position: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationStatus {
    pub generating_session_id: Option<String>,
    /// Waiting requests in position order.
    pub queued_session_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdmissionError {
    #[error("Timed out after {minutes} minutes waiting for another request to finish.")]
    WaitTimedOut { minutes: u64 },

    #[error("Generation timed out after {minutes} minutes.")]
    GenerationTimedOut { minutes: u64 },

    #[error("Generation task failed: {0}")]
    Aborted(String),
}

struct Entry {
    session_id: String,
    position: u64,
}

#[derive(Default)]
struct QueueState {
    next_position: u64,
    next_ticket: u64,
    entries: HashMap<u64, Entry>,
    /// position -> ticket, for tickets that do not hold the guard yet.
    waiting: BTreeMap<u64, u64>,
    generating: Option<u64>,
}

impl QueueState {
    fn head(&self) -> Option<u64> {
        self.waiting.keys().next().copied()
    }
}

pub struct AdmissionQueue {
    state: Mutex<QueueState>,
    guard: Arc<tokio::sync::Mutex<()>>,
    /// Lowest waiting position; the ticket holding it may take the guard.
    turn: watch::Sender<Option<u64>>,
    request_timeout: Duration,
    queued_threshold: Duration,
}

impl AdmissionQueue {
    /// `request_timeout` is one deadline covering both the wait for the
    /// guard and the generation itself.
    pub fn new(request_timeout: Duration, queued_threshold: Duration) -> Arc<Self> {
        let (turn, _) = watch::channel(None);
        Arc::new(Self {
            state: Mutex::new(QueueState::default()),
            guard: Arc::new(tokio::sync::Mutex::new(())),
            turn,
            request_timeout,
            queued_threshold,
        })
    }

    pub fn from_config(config: &turnstile_config::GatewayConfig) -> Arc<Self> {
        Self::new(
            Duration::from_secs(config.request_timeout_secs),
            Duration::from_millis(config.queued_threshold_ms),
        )
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Register a request and assign its position.
    ///
    /// Call this before any await in the handler, then yield once so that
    /// requests arriving together all register before one of them starts.
    pub fn enqueue(self: &Arc<Self>, session_id: impl Into<String>) -> QueueTicket {
        let session_id = session_id.into();
        let mut state = self.lock_state();

        let id = state.next_ticket;
        state.next_ticket += 1;
        let position = state.next_position;
        state.next_position += 1;

        state.entries.insert(
            id,
            Entry {
                session_id: session_id.clone(),
                position,
            },
        );
        state.waiting.insert(position, id);
        self.publish_turn(&state);
        drop(state);

        info!(session_id = %session_id, position, "Request queued");

        QueueTicket {
            queue: self.clone(),
            id,
            position,
            session_id,
            registered_at: Instant::now(),
        }
    }

    pub fn status(&self) -> GenerationStatus {
        let state = self.lock_state();
        let session_of = |ticket: &u64| state.entries.get(ticket).map(|e| e.session_id.clone());

        GenerationStatus {
            generating_session_id: state.generating.as_ref().and_then(session_of),
            queued_session_ids: state.waiting.values().filter_map(session_of).collect(),
        }
    }

    pub fn is_generating(&self) -> bool {
        self.lock_state().generating.is_some()
    }

    /// Requests registered and not yet released, waiting or generating.
    pub fn outstanding(&self) -> usize {
        self.lock_state().entries.len()
    }

    fn lock_state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn publish_turn(&self, state: &QueueState) {
        let head = state.head();
        self.turn.send_if_modified(|current| {
            let changed = *current != head;
            *current = head;
            changed
        });
    }

    fn mark_generating(&self, id: u64, position: u64) {
        let mut state = self.lock_state();
        state.waiting.remove(&position);
        state.generating = Some(id);
        self.publish_turn(&state);
    }

    /// Remove a ticket. Safe to call more than once.
    fn release(&self, id: u64) {
        let mut state = self.lock_state();
        let Some(entry) = state.entries.remove(&id) else {
            return;
        };

        if state.waiting.get(&entry.position) == Some(&id) {
            state.waiting.remove(&entry.position);
        }
        if state.generating == Some(id) {
            state.generating = None;
        }
        self.publish_turn(&state);
        drop(state);

        debug!(session_id = %entry.session_id, position = entry.position, "Request left queue");
    }
}

/// A registered request. Dropping it releases its queue entry.
pub struct QueueTicket {
    queue: Arc<AdmissionQueue>,
    id: u64,
    position: u64,
    session_id: String,
    registered_at: Instant,
}

impl QueueTicket {
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Wait for this ticket's turn, then take the generation guard.
    ///
    /// Cancel-safe: dropping the future drops the ticket.
    pub async fn acquire(self) -> GenerationPermit {
        let mut turn = self.queue.turn.subscribe();
        // The sender lives as long as the queue, which this ticket keeps alive.
        let _ = turn.wait_for(|head| *head == Some(self.position)).await;

        let guard = self.queue.guard.clone().lock_owned().await;
        let waited = self.registered_at.elapsed();
        self.queue.mark_generating(self.id, self.position);

        let stats = QueueStats {
            was_queued: waited > self.queue.queued_threshold,
            queue_wait_ms: waited.as_secs_f64() * 1000.0,
            queue_position: self.position,
        };

        info!(
            session_id = %self.session_id,
            position = self.position,
            wait_ms = waited.as_millis() as u64,
            "Generation guard acquired"
        );

        GenerationPermit {
            ticket: self,
            _guard: guard,
            stats,
        }
    }

    /// Acquire the guard and run `work` under it, bounded by the queue's
    /// request timeout measured from registration.
    ///
    /// `work` runs on its own task, which owns the permit. If the deadline
    /// passes mid-generation the caller gets
    /// [`AdmissionError::GenerationTimedOut`] while the task runs on to
    /// completion and only then frees the slot.
    pub async fn run<F, Fut, T>(self, work: F) -> Result<(T, QueueStats), AdmissionError>
    where
        F: FnOnce(QueueStats) -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let timeout = self.queue.request_timeout;
        let minutes = timeout.as_secs() / 60;
        let deadline = self.registered_at + timeout;
        let session_id = self.session_id.clone();

        let permit = match tokio::time::timeout_at(deadline, self.acquire()).await {
            Ok(permit) => permit,
            Err(_) => {
                warn!(session_id = %session_id, "Timed out waiting for the generation guard");
                return Err(AdmissionError::WaitTimedOut { minutes });
            }
        };

        let stats = permit.stats();
        let task = tokio::spawn(async move {
            let output = work(stats).await;
            drop(permit);
            output
        });

        match tokio::time::timeout_at(deadline, task).await {
            Ok(Ok(output)) => Ok((output, stats)),
            Ok(Err(e)) => {
                warn!(session_id = %session_id, error = %e, "Generation task failed");
                Err(AdmissionError::Aborted(e.to_string()))
            }
            Err(_) => {
                warn!(session_id = %session_id, "Generation exceeded the request deadline");
                Err(AdmissionError::GenerationTimedOut { minutes })
            }
        }
    }
}

impl Drop for QueueTicket {
    fn drop(&mut self) {
        self.queue.release(self.id);
    }
}

/// Exclusive right to generate. Releases the queue entry and then the guard
/// when dropped.
pub struct GenerationPermit {
    ticket: QueueTicket,
    _guard: OwnedMutexGuard<()>,
    stats: QueueStats,
}

impl GenerationPermit {
    pub fn stats(&self) -> QueueStats {
        self.stats
    }

    pub fn session_id(&self) -> &str {
        self.ticket.session_id()
    }
}
