//! The bridge pulls submissions and routes them to one operation handler.
//!
//! A handler failure becomes a recoverable `error` event against the
//! submission's id; the run loop itself only exits when the submission
//! queue closes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use super::{EventMsg, EventQueue, Submission, SubmissionQueue};

#[async_trait]
pub trait OperationHandler: Send + Sync {
    async fn handle(&self, submission: Submission, events: &EventQueue) -> anyhow::Result<()>;
}

pub struct Bridge {
    submissions: Arc<SubmissionQueue>,
    events:      Arc<EventQueue>,
    handler:     Arc<dyn OperationHandler>,
    stopped:     AtomicBool,
}

impl Bridge {
    pub fn new(
        submissions: Arc<SubmissionQueue>,
        events:      Arc<EventQueue>,
        handler:     Arc<dyn OperationHandler>,
    ) -> Self {
        Self { submissions, events, handler, stopped: AtomicBool::new(false) }
    }

    pub fn events(&self) -> &Arc<EventQueue> {
        &self.events
    }

    pub fn submissions(&self) -> &Arc<SubmissionQueue> {
        &self.submissions
    }

    /// Pull submissions until the queue closes. Handler errors are
    /// converted to events; they never terminate the loop.
    pub async fn run(&self) {
        tracing::info!("bridge loop started");
        while let Some(submission) = self.submissions.take().await {
            if self.stopped.load(Ordering::SeqCst) {
                break;
            }
            let id = submission.id.clone();
            tracing::debug!(submission = %id, "dispatching operation");
            if let Err(err) = self.handler.handle(submission, &self.events).await {
                tracing::error!(submission = %id, error = %err, "operation handler failed");
                self.events.emit(
                    &id,
                    EventMsg::Error {
                        code:        "OPERATION_HANDLER_ERROR".to_string(),
                        message:     err.to_string(),
                        recoverable: true,
                        stack:       Some(format!("{err:?}")),
                    },
                );
            }
        }
        tracing::info!("bridge loop stopped");
    }

    /// Stop the bridge: close the submission queue and let the in-flight
    /// operation finish. Idempotent.
    pub fn stop(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            self.submissions.close();
        }
    }
}
