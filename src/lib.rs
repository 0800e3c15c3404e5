//! Lifecycle orchestration and frame scheduling for an interactive
//! presentation runtime.
//!
//! One [`Application`] per thread boots its plugins in order, drives a single
//! tick loop over the registered displays and hands out pause-aware timers.
//! Everything runs on a cooperative [`EventLoop`]; tests drive it with a
//! [`ManualClock`].

pub mod display;
pub mod error;
pub mod events;
pub mod host;
pub mod logging;
pub mod metrics;
pub mod options;
pub mod plugins;
pub mod runtime;
pub mod timer;

pub use display::{Display, DisplayFactory, DisplayHandle, DisplayRegistry};
pub use error::{AppError, Result};
pub use events::{AppEvent, EventDispatcher, EventKind, ListenerId};
pub use host::{Clock, EventLoop, EventLoopConfig, ManualClock, SystemClock, TaskId};
pub use logging::{
    FileSink, LogEvent, LogFields, LogLevel, LogSink, Logger, LoggingError, LoggingResult,
    MemorySink,
};
pub use metrics::{MetricSnapshot, RuntimeMetrics};
pub use options::{AppOptions, FrameOptions, InitialDisplay, Options};
pub use plugins::{PluginEntry, PluginRegistry, PreloadDone};
pub use runtime::audit::{
    BufferedAudit, LifecycleAudit, LifecycleAuditEvent, LifecycleAuditEventBuilder,
    LifecycleStage, NullAudit,
};
pub use runtime::diagnostics::{LifecycleLogger, lifecycle_logger_plugin, metrics_snapshot_plugin};
pub use runtime::scheduler::{
    AnimationFrameStrategy, CompensatedTimeoutStrategy, FrameBudget, FrameScheduler,
    FrameStrategy,
};
pub use runtime::shared_state::{SharedState, SharedStateError};
pub use runtime::{Application, ApplicationBuilder, WeakApplication};
pub use timer::{DelayOptions, DelayUnit, DelayedCall};
