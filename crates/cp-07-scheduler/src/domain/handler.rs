//! Task handlers.
//!
//! Handlers are registered at startup, one per task type. Each handler
//! deserializes its own payload; the engine treats payloads as opaque
//! bytes.

use super::entities::{ScheduledTask, TaskExecutionError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// One registered unit of deferred work.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// The task type this handler owns.
    fn task_type(&self) -> &'static str;

    /// Execute one task. Failures carry their retry classification.
    async fn execute(&self, task: &ScheduledTask) -> Result<(), TaskExecutionError>;
}

/// Startup-time handler registry.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<&'static str, Arc<dyn TaskHandler>>,
}

impl HandlerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. Last registration for a type wins.
    pub fn register(&mut self, handler: Arc<dyn TaskHandler>) {
        self.handlers.insert(handler.task_type(), handler);
    }

    /// Look up the handler for a task type.
    #[must_use]
    pub fn get(&self, task_type: &str) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.get(task_type).cloned()
    }

    /// Registered type names, for startup logging.
    #[must_use]
    pub fn task_types(&self) -> Vec<&'static str> {
        self.handlers.keys().copied().collect()
    }
}
