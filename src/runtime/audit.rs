//! Lifecycle audit hooks.
//!
//! An audit sink observes the orchestrator's major transitions as structured
//! records. Recording never affects the lifecycle itself.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;

use serde_json::Value;

/// Checkpoints emitted by [`Application`](super::Application).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleStage {
    /// The instance claimed the active slot.
    Constructed,
    /// One plugin finished its `setup` hook.
    PluginSetup,
    /// Deferred preinit started.
    PreInit,
    PreloadStarted,
    PreloadFinished,
    /// `afterInit` was emitted.
    InitCompleted,
    Paused,
    Resumed,
    DisplayAdded,
    DisplayRemoved,
    /// One plugin finished its `teardown` hook.
    PluginTeardown,
    Destroyed,
}

#[derive(Debug, Clone)]
pub struct LifecycleAuditEvent {
    pub timestamp: SystemTime,
    pub stage: LifecycleStage,
    pub details: Vec<(String, Value)>,
}

impl LifecycleAuditEvent {
    pub fn detail(&self, key: &str) -> Option<&Value> {
        self.details
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value)
    }
}

pub struct LifecycleAuditEventBuilder {
    event: LifecycleAuditEvent,
}

impl LifecycleAuditEventBuilder {
    pub fn new(stage: LifecycleStage) -> Self {
        Self {
            event: LifecycleAuditEvent {
                timestamp: SystemTime::now(),
                stage,
                details: Vec::new(),
            },
        }
    }

    pub fn detail(mut self, key: impl Into<String>, value: Value) -> Self {
        self.event.details.push((key.into(), value));
        self
    }

    pub fn finish(self) -> LifecycleAuditEvent {
        self.event
    }
}

pub trait LifecycleAudit: Send + Sync {
    fn record(&self, event: LifecycleAuditEvent);
}

/// Used when no audit sink is configured.
#[derive(Debug, Default)]
pub struct NullAudit;

impl LifecycleAudit for NullAudit {
    fn record(&self, _event: LifecycleAuditEvent) {}
}

/// Keeps every record in memory. Clones share the buffer.
#[derive(Debug, Clone, Default)]
pub struct BufferedAudit {
    events: Arc<Mutex<Vec<LifecycleAuditEvent>>>,
}

impl BufferedAudit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<LifecycleAuditEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn stages(&self) -> Vec<LifecycleStage> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|event| event.stage)
            .collect()
    }

    pub fn clear(&self) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl LifecycleAudit for BufferedAudit {
    fn record(&self, event: LifecycleAuditEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn buffered_audit_keeps_order_and_details() {
        let audit = BufferedAudit::new();
        audit.record(LifecycleAuditEventBuilder::new(LifecycleStage::Constructed).finish());
        audit.record(
            LifecycleAuditEventBuilder::new(LifecycleStage::PluginSetup)
                .detail("plugin", json!("audio"))
                .finish(),
        );
        assert_eq!(
            audit.stages(),
            vec![LifecycleStage::Constructed, LifecycleStage::PluginSetup]
        );
        let events = audit.events();
        assert_eq!(events[1].detail("plugin"), Some(&json!("audio")));
        audit.clear();
        assert!(audit.events().is_empty());
    }
}
