//! The two queues that mediate UI ↔ core traffic.
//!
//! `SubmissionQueue` is a bounded FIFO whose producers block at capacity;
//! `EventQueue` is unbounded and never blocks the producer. Event dispatch
//! runs on a dedicated task so an `emit` never reenters the caller, and
//! each listener sees a submission's events in emit order.

use std::collections::{HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::error::AgentError;
use crate::ids::AtomicCounter;

use super::{EventEnvelope, EventMsg, Op, Submission};

pub const DEFAULT_SUBMISSION_CAPACITY: usize = 64;
pub const DEFAULT_MAX_RECENT_EVENTS: usize = 100;

// ── SubmissionQueue ──────────────────────────────────────────────────────

pub struct SubmissionQueue {
    tx:      Mutex<Option<mpsc::Sender<Submission>>>,
    rx:      tokio::sync::Mutex<mpsc::Receiver<Submission>>,
    counter: AtomicCounter,
}

impl SubmissionQueue {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_SUBMISSION_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            tx:      Mutex::new(Some(tx)),
            rx:      tokio::sync::Mutex::new(rx),
            counter: AtomicCounter::new(),
        }
    }

    /// Enqueue an operation, blocking while the queue is at capacity.
    /// Returns the assigned submission id.
    pub async fn submit(&self, op: Op) -> Result<String, AgentError> {
        let sender = {
            let guard = self.tx.lock().unwrap();
            guard.clone()
        };
        let Some(sender) = sender else { return Err(AgentError::QueueClosed) };

        let id = self.counter.next_id();
        sender
            .send(Submission { id: id.clone(), op })
            .await
            .map_err(|_| AgentError::QueueClosed)?;
        Ok(id)
    }

    /// Dequeue the next submission; blocks while empty. `None` is the
    /// closed sentinel: the queue was closed and fully drained.
    pub async fn take(&self) -> Option<Submission> {
        self.rx.lock().await.recv().await
    }

    /// Close the queue. Pending `take` calls return `None` once the
    /// remaining submissions are drained. Idempotent.
    pub fn close(&self) {
        self.tx.lock().unwrap().take();
    }

    pub fn is_closed(&self) -> bool {
        self.tx.lock().unwrap().is_none()
    }
}

impl Default for SubmissionQueue {
    fn default() -> Self {
        Self::new()
    }
}

// ── EventQueue ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
#[error("timed out after {timeout_ms}ms waiting for event '{event_type}'")]
pub struct EventTimeoutError {
    pub event_type: String,
    pub timeout_ms: u64,
}

type Listener = Arc<dyn Fn(&EventEnvelope) + Send + Sync>;

#[derive(Default)]
struct Registry {
    global:       Vec<Listener>,
    by_type:      HashMap<String, Vec<Listener>>,
    once_waiters: HashMap<String, Vec<oneshot::Sender<EventEnvelope>>>,
    recent:       VecDeque<EventEnvelope>,
}

pub struct EventQueue {
    registry:    Arc<Mutex<Registry>>,
    dispatch_tx: mpsc::UnboundedSender<EventEnvelope>,
    max_recent:  usize,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::with_max_recent(DEFAULT_MAX_RECENT_EVENTS)
    }

    pub fn with_max_recent(max_recent: usize) -> Self {
        let registry: Arc<Mutex<Registry>> = Arc::new(Mutex::new(Registry::default()));
        let (dispatch_tx, mut dispatch_rx) = mpsc::unbounded_channel::<EventEnvelope>();

        let dispatch_registry = Arc::clone(&registry);
        tokio::spawn(async move {
            while let Some(envelope) = dispatch_rx.recv().await {
                deliver(&dispatch_registry, envelope);
            }
        });

        Self { registry, dispatch_tx, max_recent }
    }

    /// Register a listener for every event.
    pub fn on_any(&self, listener: impl Fn(&EventEnvelope) + Send + Sync + 'static) {
        self.registry.lock().unwrap().global.push(Arc::new(listener));
    }

    /// Register a listener for one event type (the wire `type` tag).
    pub fn on(&self, event_type: &str, listener: impl Fn(&EventEnvelope) + Send + Sync + 'static) {
        self.registry
            .lock()
            .unwrap()
            .by_type
            .entry(event_type.to_string())
            .or_default()
            .push(Arc::new(listener));
    }

    /// Emit an event. Never blocks; the envelope lands in the recent ring
    /// immediately and listeners are invoked from the dispatch task.
    pub fn emit(&self, submission_id: &str, event: EventMsg) {
        let envelope = EventEnvelope {
            submission_id: submission_id.to_string(),
            event,
            timestamp:     chrono::Utc::now().timestamp_millis(),
        };
        {
            let mut registry = self.registry.lock().unwrap();
            registry.recent.push_back(envelope.clone());
            while registry.recent.len() > self.max_recent {
                registry.recent.pop_front();
            }
        }
        // Receiver only goes away if the runtime shut down under us.
        let _ = self.dispatch_tx.send(envelope);
    }

    /// Wait for the next event of `event_type`, up to `timeout_ms`
    /// (`None` waits indefinitely).
    pub async fn once(
        &self,
        event_type: &str,
        timeout_ms: Option<u64>,
    ) -> Result<EventEnvelope, EventTimeoutError> {
        let (tx, rx) = oneshot::channel();
        self.registry
            .lock()
            .unwrap()
            .once_waiters
            .entry(event_type.to_string())
            .or_default()
            .push(tx);

        match timeout_ms {
            Some(ms) => match tokio::time::timeout(std::time::Duration::from_millis(ms), rx).await {
                Ok(Ok(envelope)) => Ok(envelope),
                _ => Err(EventTimeoutError { event_type: event_type.to_string(), timeout_ms: ms }),
            },
            None => rx.await.map_err(|_| EventTimeoutError {
                event_type: event_type.to_string(),
                timeout_ms: 0,
            }),
        }
    }

    /// Snapshot of the bounded recent-events ring, oldest first.
    pub fn recent_events(&self) -> Vec<EventEnvelope> {
        self.registry.lock().unwrap().recent.iter().cloned().collect()
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Invoke listeners for one envelope. A panicking listener is swallowed;
/// dispatch is fire-and-forget.
fn deliver(registry: &Arc<Mutex<Registry>>, envelope: EventEnvelope) {
    let event_type = envelope.event.event_type();
    let (listeners, waiters) = {
        let mut guard = registry.lock().unwrap();
        let mut listeners: Vec<Listener> = guard.global.clone();
        if let Some(typed) = guard.by_type.get(event_type) {
            listeners.extend(typed.iter().cloned());
        }
        let waiters = guard.once_waiters.remove(event_type).unwrap_or_default();
        (listeners, waiters)
    };

    for listener in listeners {
        let result = std::panic::catch_unwind(AssertUnwindSafe(|| listener(&envelope)));
        if result.is_err() {
            tracing::warn!(event_type, "event listener panicked; continuing");
        }
    }
    for waiter in waiters {
        let _ = waiter.send(envelope.clone());
    }
}
