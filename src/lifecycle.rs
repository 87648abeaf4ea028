//! Component lifecycle: three hooks and a state machine.
//!
//! Components implement `on_init`/`on_cleanup`/`on_reset`; the host
//! tracks the state, emits `manager.*` events, and makes `init`
//! re-entrant — concurrent callers join the same in-flight completion.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::OnceCell;

use crate::protocol::{EventMsg, EventQueue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentState {
    Created,
    Initializing,
    Ready,
    CleaningUp,
    Disposed,
}

#[async_trait]
pub trait Component: Send + Sync {
    fn name(&self) -> &str;

    async fn on_init(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_cleanup(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_reset(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Session-scoped id used on lifecycle event envelopes, which are not
/// tied to any one submission.
const LIFECYCLE_SUBMISSION_ID: &str = "session";

pub struct ComponentHost {
    component: Arc<dyn Component>,
    state:     Mutex<ComponentState>,
    init_once: OnceCell<()>,
    events:    Option<Arc<EventQueue>>,
}

impl ComponentHost {
    pub fn new(component: Arc<dyn Component>, events: Option<Arc<EventQueue>>) -> Self {
        Self {
            component,
            state: Mutex::new(ComponentState::Created),
            init_once: OnceCell::new(),
            events,
        }
    }

    pub fn state(&self) -> ComponentState {
        *self.state.lock().unwrap()
    }

    fn emit(&self, event: EventMsg) {
        if let Some(events) = &self.events {
            events.emit(LIFECYCLE_SUBMISSION_ID, event);
        }
    }

    /// Initialize the component. Re-entrant: a second caller while init is
    /// in flight awaits the same completion; after success it is a no-op.
    pub async fn init(&self) -> anyhow::Result<()> {
        {
            let mut state = self.state.lock().unwrap();
            if *state == ComponentState::Created {
                *state = ComponentState::Initializing;
            }
        }
        let component = Arc::clone(&self.component);
        let result = self
            .init_once
            .get_or_try_init(|| async move { component.on_init().await })
            .await;

        match result {
            Ok(_) => {
                *self.state.lock().unwrap() = ComponentState::Ready;
                self.emit(EventMsg::ManagerInitialized {
                    component: self.component.name().to_string(),
                });
                Ok(())
            }
            Err(err) => {
                *self.state.lock().unwrap() = ComponentState::Created;
                self.emit(EventMsg::ManagerError {
                    component: self.component.name().to_string(),
                    message:   err.to_string(),
                });
                Err(anyhow::anyhow!("init of '{}' failed: {err}", self.component.name()))
            }
        }
    }

    pub async fn cleanup(&self) -> anyhow::Result<()> {
        *self.state.lock().unwrap() = ComponentState::CleaningUp;
        let result = self.component.on_cleanup().await;
        *self.state.lock().unwrap() = ComponentState::Disposed;
        match result {
            Ok(()) => {
                self.emit(EventMsg::ManagerCleanup { component: self.component.name().to_string() });
                Ok(())
            }
            Err(err) => {
                self.emit(EventMsg::ManagerError {
                    component: self.component.name().to_string(),
                    message:   err.to_string(),
                });
                Err(err)
            }
        }
    }

    /// Reset a ready component to a clean state without disposing it.
    pub async fn reset(&self) -> anyhow::Result<()> {
        match self.component.on_reset().await {
            Ok(()) => {
                self.emit(EventMsg::ManagerReset { component: self.component.name().to_string() });
                Ok(())
            }
            Err(err) => {
                self.emit(EventMsg::ManagerError {
                    component: self.component.name().to_string(),
                    message:   err.to_string(),
                });
                Err(err)
            }
        }
    }
}
