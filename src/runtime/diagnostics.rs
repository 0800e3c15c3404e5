//! Ready-made plugins that observe an application through its event stream.

use std::cell::Cell;
use std::rc::Rc;

use serde_json::json;

use crate::events::{AppEvent, EventKind};
use crate::logging::{LogLevel, Logger, event_with_fields, json_kv};
use crate::plugins::PluginEntry;

use super::Application;

pub const LIFECYCLE_TARGET: &str = "stage::runtime.lifecycle";
pub const METRICS_TARGET: &str = "stage::runtime.metrics";

const LIFECYCLE_KINDS: [EventKind; 9] = [
    EventKind::BeforeInit,
    EventKind::Init,
    EventKind::AfterInit,
    EventKind::Pause,
    EventKind::Paused,
    EventKind::Resumed,
    EventKind::DisplayAdded,
    EventKind::DisplayRemoved,
    EventKind::Destroy,
];

/// Logs lifecycle events for observability and debugging.
#[derive(Clone)]
pub struct LifecycleLogger {
    logger: Logger,
    level: LogLevel,
    log_updates: bool,
}

impl LifecycleLogger {
    pub fn new(logger: Logger) -> Self {
        Self {
            logger,
            level: LogLevel::Debug,
            log_updates: false,
        }
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    /// Also log every `update` tick. Off by default.
    pub fn log_updates(mut self, enabled: bool) -> Self {
        self.log_updates = enabled;
        self
    }

    pub fn into_plugin(self) -> PluginEntry {
        let teardown = self.clone();
        PluginEntry::new("diagnostics.lifecycle_logger")
            .setup(move |app| {
                self.attach(app);
                self.emit(
                    "plugin_initialized",
                    [json_kv("logger_level", json!(format!("{:?}", self.level)))],
                );
                Ok(())
            })
            .teardown(move |_| {
                teardown.emit("plugin_teardown", std::iter::empty());
                Ok(())
            })
    }

    fn attach(&self, app: &Application) {
        let mut kinds = LIFECYCLE_KINDS.to_vec();
        if self.log_updates {
            kinds.push(EventKind::Update);
        }
        for kind in kinds {
            let this = self.clone();
            app.events().on(kind, move |event| this.log_event(event));
        }
    }

    fn log_event(&self, event: &AppEvent) {
        let message = format!("event.{}", event.kind().as_str());
        match event {
            AppEvent::Update(elapsed) => {
                self.emit(&message, [json_kv("elapsed_ms", *elapsed)]);
            }
            AppEvent::Pause(paused) | AppEvent::Paused(paused) | AppEvent::Resumed(paused) => {
                self.emit(&message, [json_kv("paused", *paused)]);
            }
            AppEvent::DisplayAdded(handle) => {
                let id = handle.borrow().id().to_string();
                self.emit(&message, [json_kv("id", id)]);
            }
            AppEvent::DisplayRemoved(id) => {
                self.emit(&message, [json_kv("id", id.as_str())]);
            }
            _ => self.emit(&message, std::iter::empty()),
        }
    }

    fn emit(&self, message: &str, fields: impl IntoIterator<Item = (String, serde_json::Value)>) {
        let event = event_with_fields(self.level, LIFECYCLE_TARGET, message, fields);
        let _ = self.logger.log_event(event);
    }
}

pub fn lifecycle_logger_plugin(logger: Logger) -> PluginEntry {
    LifecycleLogger::new(logger).into_plugin()
}

/// Emits a metrics snapshot each time `interval_ms` of tick time has passed.
/// An interval of zero disables snapshots. A final snapshot is written on
/// destroy.
pub fn metrics_snapshot_plugin(logger: Logger, interval_ms: f64) -> PluginEntry {
    let on_destroy = logger.clone();
    PluginEntry::new("diagnostics.metrics_snapshot")
        .setup(move |app| {
            if interval_ms <= 0.0 {
                return Ok(());
            }
            let since_emit = Rc::new(Cell::new(0.0_f64));
            let weak = app.downgrade();
            let logger = logger.clone();
            app.events().on(EventKind::Update, move |event| {
                let AppEvent::Update(elapsed) = event else {
                    return;
                };
                let total = since_emit.get() + elapsed;
                if total < interval_ms {
                    since_emit.set(total);
                    return;
                }
                since_emit.set(0.0);
                if let Some(app) = weak.upgrade() {
                    let _ = logger.log_event(app.metrics().to_log_event(METRICS_TARGET));
                }
            });
            Ok(())
        })
        .teardown(move |app| {
            on_destroy.log_event(app.metrics().to_log_event(METRICS_TARGET))?;
            Ok(())
        })
}
