//! The lifecycle orchestrator.
//!
//! An [`Application`] boots in phases: plugin setup runs during construction,
//! preinit runs on a later loop turn, preload hooks run one at a time, and
//! init un-pauses the frame scheduler. From then on every tick publishes
//! `update`, renders the registered displays and schedules the next tick
//! until the application is paused or destroyed.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use serde_json::{Value, json};

use crate::display::registry::PendingOp;
use crate::display::{Display, DisplayHandle, DisplayRegistry};
use crate::error::{AppError, Result};
use crate::events::{AppEvent, EventDispatcher, EventKind};
use crate::host::EventLoop;
use crate::logging::{LogLevel, Logger, event_with_fields, json_kv};
use crate::metrics::{MetricSnapshot, RuntimeMetrics};
use crate::options::{AppOptions, FPS_OPTION, Options, RAF_OPTION};
use crate::plugins::{self, PluginRegistry, PreloadDone, SeriesTask, run_series};
use crate::timer::{DelayOptions, DelayUnit, DelayedCall, WeakDelayedCall};

pub mod audit;
pub mod diagnostics;
pub mod instance;
pub mod scheduler;
pub mod shared_state;

use audit::{LifecycleAudit, LifecycleAuditEventBuilder, LifecycleStage, NullAudit};
use scheduler::{AnimationFrameStrategy, FrameScheduler, FrameStrategy};
use shared_state::SharedState;

pub const RUNTIME_TARGET: &str = "stage::runtime";

type InitCallback = Box<dyn FnOnce(&Application) -> Result<()>>;

pub(crate) struct AppInner {
    host: EventLoop,
    options: Options,
    events: EventDispatcher,
    displays: RefCell<DisplayRegistry>,
    plugins: PluginRegistry,
    on_init: RefCell<Option<InitCallback>>,
    enabled: Cell<bool>,
    paused: Cell<bool>,
    destroyed: Cell<bool>,
    scheduler: RefCell<FrameScheduler>,
    timers: RefCell<Vec<WeakDelayedCall>>,
    logger: Option<Logger>,
    audit: Arc<dyn LifecycleAudit>,
    metrics: RefCell<RuntimeMetrics>,
    shared: SharedState,
    started_ms: f64,
}

/// Handle to the process-wide orchestrator. Clones refer to the same
/// instance.
#[derive(Clone)]
pub struct Application {
    pub(crate) inner: Rc<AppInner>,
}

/// Non-owning handle, for listeners that must not keep the application alive.
#[derive(Clone)]
pub struct WeakApplication {
    inner: Weak<AppInner>,
}

impl WeakApplication {
    pub fn upgrade(&self) -> Option<Application> {
        self.inner.upgrade().map(|inner| Application { inner })
    }
}

impl fmt::Debug for Application {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Application")
            .field("enabled", &self.enabled())
            .field("paused", &self.paused())
            .field("destroyed", &self.is_destroyed())
            .field("displays", &self.inner.displays.borrow().len())
            .field("plugins", &self.inner.plugins.names())
            .finish()
    }
}

pub struct ApplicationBuilder {
    host: EventLoop,
    options: AppOptions,
    plugins: Option<PluginRegistry>,
    on_init: Option<InitCallback>,
    logger: Option<Logger>,
    audit: Arc<dyn LifecycleAudit>,
}

impl ApplicationBuilder {
    fn new(host: &EventLoop) -> Self {
        Self {
            host: host.clone(),
            options: AppOptions::default(),
            plugins: None,
            on_init: None,
            logger: None,
            audit: Arc::new(NullAudit),
        }
    }

    pub fn options(mut self, options: AppOptions) -> Self {
        self.options = options;
        self
    }

    /// Use `plugins` instead of the process-wide registry.
    pub fn plugins(mut self, plugins: PluginRegistry) -> Self {
        self.plugins = Some(plugins);
        self
    }

    /// Callback run once init has un-paused the scheduler.
    pub fn on_init<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(&Application) -> Result<()> + 'static,
    {
        self.on_init = Some(Box::new(callback));
        self
    }

    pub fn logger(mut self, logger: Logger) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn audit(mut self, audit: Arc<dyn LifecycleAudit>) -> Self {
        self.audit = audit;
        self
    }

    /// Claim the active slot, run every plugin `setup` and queue preinit.
    ///
    /// Fails with [`AppError::SingletonActive`] while another instance is
    /// active. A failing `setup` hook leaves the instance registered; fetch it with [`Application::instance`] and
    /// destroy it before building again.
    pub fn build(self) -> Result<Application> {
        let frame = self.options.frame;
        let inner = Rc::new(AppInner {
            scheduler: RefCell::new(FrameScheduler::new(&self.host, frame.raf, frame.fps)),
            started_ms: self.host.now_ms(),
            host: self.host,
            options: Options::new(self.options),
            events: EventDispatcher::new(),
            displays: RefCell::new(DisplayRegistry::new()),
            plugins: self.plugins.unwrap_or_else(plugins::global_snapshot),
            on_init: RefCell::new(self.on_init),
            enabled: Cell::new(true),
            paused: Cell::new(true),
            destroyed: Cell::new(false),
            timers: RefCell::new(Vec::new()),
            logger: self.logger,
            audit: self.audit,
            metrics: RefCell::new(RuntimeMetrics::new()),
            shared: SharedState::new(),
        });
        let app = Application { inner };
        instance::claim(&app)?;
        app.record(
            LifecycleAuditEventBuilder::new(LifecycleStage::Constructed)
                .detail("plugins", json!(app.inner.plugins.len())),
        );
        app.log(
            LogLevel::Info,
            "application_constructed",
            [json_kv("plugins", json!(app.inner.plugins.names()))],
        );

        let mut setup_result = Ok(());
        app.inner.plugins.for_each_in_order(|entry| {
            if setup_result.is_err() {
                return;
            }
            setup_result = entry.run_setup(&app);
            if setup_result.is_ok() {
                app.record(
                    LifecycleAuditEventBuilder::new(LifecycleStage::PluginSetup)
                        .detail("plugin", json!(entry.name())),
                );
                app.log(
                    LogLevel::Debug,
                    "plugin_setup",
                    [json_kv("plugin", entry.name())],
                );
            }
        });
        setup_result?;

        app.inner.options.finalize();
        let weak = app.downgrade();
        app.inner.host.defer(move || match weak.upgrade() {
            Some(app) => app.pre_init(),
            None => Ok(()),
        });
        Ok(app)
    }
}

impl Application {
    pub fn builder(host: &EventLoop) -> ApplicationBuilder {
        ApplicationBuilder::new(host)
    }

    /// Build with the process-wide plugin registry.
    pub fn new(host: &EventLoop, options: AppOptions) -> Result<Self> {
        Self::builder(host).options(options).build()
    }

    /// The active instance on this thread, if any.
    pub fn instance() -> Option<Self> {
        instance::current()
    }

    pub fn downgrade(&self) -> WeakApplication {
        WeakApplication {
            inner: Rc::downgrade(&self.inner),
        }
    }

    pub fn host(&self) -> &EventLoop {
        &self.inner.host
    }

    pub fn options(&self) -> &Options {
        &self.inner.options
    }

    pub fn events(&self) -> &EventDispatcher {
        &self.inner.events
    }

    /// Resources plugins hand to each other.
    pub fn shared(&self) -> &SharedState {
        &self.inner.shared
    }

    pub fn logger(&self) -> Option<&Logger> {
        self.inner.logger.as_ref()
    }

    pub fn plugin_names(&self) -> Vec<String> {
        self.inner.plugins.names()
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.get()
    }

    pub fn enabled(&self) -> bool {
        self.inner.enabled.get()
    }

    /// Mirror `enabled` onto every registered display.
    pub fn set_enabled(&self, enabled: bool) {
        if self.is_destroyed() {
            return;
        }
        self.inner.enabled.set(enabled);
        self.inner.displays.borrow_mut().set_enabled_all(enabled);
    }

    pub fn paused(&self) -> bool {
        self.inner.paused.get()
    }

    /// Stop or (re)start the tick loop. Events fire on every call, even when
    /// the value does not change.
    pub fn set_paused(&self, paused: bool) {
        if self.is_destroyed() {
            return;
        }
        self.apply_paused(paused);
    }

    pub fn frame_rate(&self) -> u32 {
        self.inner.scheduler.borrow().fps()
    }

    pub fn uses_animation_frame(&self) -> bool {
        self.inner.scheduler.borrow().strategy_name() == AnimationFrameStrategy.name()
    }

    pub fn metrics(&self) -> MetricSnapshot {
        let uptime = self.inner.host.now_ms() - self.inner.started_ms;
        self.inner.metrics.borrow().snapshot(uptime)
    }

    /// Create a display through `factory` and register it under `id`.
    ///
    /// Returns `Ok(None)` once the application is destroyed. An id that is
    /// already registered fails before `factory` runs.
    pub fn add_display<F, D>(
        &self,
        id: &str,
        factory: F,
        options: Value,
    ) -> Result<Option<DisplayHandle>>
    where
        F: FnOnce(&str, &Value) -> Result<D>,
        D: Display + 'static,
    {
        if self.is_destroyed() {
            return Ok(None);
        }
        if self.inner.displays.borrow().contains(id) {
            return Err(AppError::DuplicateDisplay(id.to_string()));
        }
        let display = factory(id, &options)?;
        let handle: DisplayHandle = Rc::new(RefCell::new(display));
        handle.borrow_mut().set_enabled(self.enabled());
        self.inner.displays.borrow_mut().insert(id, handle.clone())?;

        self.record(
            LifecycleAuditEventBuilder::new(LifecycleStage::DisplayAdded).detail("id", json!(id)),
        );
        self.log(LogLevel::Debug, "display_added", [json_kv("id", id)]);
        self.inner.events.trigger(&AppEvent::DisplayAdded(handle.clone()));
        Ok(Some(handle))
    }

    /// Unregister and destroy `id`. Returns `false` when it was not present.
    /// The primary display reference is kept even if `id` was primary.
    pub fn remove_display(&self, id: &str) -> bool {
        if self.is_destroyed() {
            return false;
        }
        let removed = self.inner.displays.borrow_mut().remove(id);
        let Some(handle) = removed else {
            return false;
        };
        self.destroy_display(&handle);
        self.record(
            LifecycleAuditEventBuilder::new(LifecycleStage::DisplayRemoved).detail("id", json!(id)),
        );
        self.log(LogLevel::Debug, "display_removed", [json_kv("id", id)]);
        self.inner
            .events
            .trigger(&AppEvent::DisplayRemoved(id.to_string()));
        true
    }

    pub fn get_display(&self, id: &str) -> Option<DisplayHandle> {
        self.inner.displays.borrow().get(id)
    }

    /// Registered displays in registration order.
    pub fn displays(&self) -> Vec<DisplayHandle> {
        self.inner.displays.borrow().handles()
    }

    pub fn primary_display(&self) -> Option<DisplayHandle> {
        self.inner.displays.borrow().primary()
    }

    /// One-shot timer driven by `update` events.
    pub fn set_timeout<F>(
        &self,
        callback: F,
        delay: f64,
        unit: DelayUnit,
        auto_destroy: bool,
    ) -> DelayedCall
    where
        F: FnMut(&DelayedCall) + 'static,
    {
        self.attach_timer(callback, delay, DelayOptions::timeout(unit, auto_destroy))
    }

    /// Repeating timer driven by `update` events.
    pub fn set_interval<F>(&self, callback: F, delay: f64, unit: DelayUnit) -> DelayedCall
    where
        F: FnMut(&DelayedCall) + 'static,
    {
        self.attach_timer(callback, delay, DelayOptions::interval(unit))
    }

    /// Tear everything down. Later calls are no-ops.
    ///
    /// Every teardown hook runs even if an earlier one fails; the first
    /// failure is returned once cleanup has finished.
    pub fn destroy(&self) -> Result<()> {
        if self.is_destroyed() {
            return Ok(());
        }
        self.inner.destroyed.set(true);
        self.apply_paused(true);
        self.inner.events.trigger(&AppEvent::Destroy);

        let mut first_error = None;
        self.inner.plugins.for_each_in_reverse_order(|entry| {
            match entry.run_teardown(self) {
                Ok(()) => self.record(
                    LifecycleAuditEventBuilder::new(LifecycleStage::PluginTeardown)
                        .detail("plugin", json!(entry.name())),
                ),
                Err(err) => {
                    self.log(
                        LogLevel::Error,
                        "plugin_teardown_failed",
                        [
                            json_kv("plugin", entry.name()),
                            json_kv("error", err.to_string()),
                        ],
                    );
                    first_error.get_or_insert(err);
                }
            }
        });

        let released = self.inner.displays.borrow_mut().release_all();
        for handle in &released {
            self.destroy_display(handle);
        }
        drop(released);

        instance::release(self);
        self.inner.scheduler.borrow_mut().cancel();
        self.inner.options.destroy();
        self.inner.events.destroy();

        let timers: Vec<WeakDelayedCall> = self.inner.timers.borrow_mut().drain(..).collect();
        for timer in timers.iter().filter_map(WeakDelayedCall::upgrade) {
            timer.cancel();
        }
        self.inner.shared.clear();

        self.record(LifecycleAuditEventBuilder::new(LifecycleStage::Destroyed));
        let metrics = self.metrics();
        self.log(
            LogLevel::Info,
            "application_destroyed",
            [
                json_kv("uptime_ms", metrics.uptime_ms),
                json_kv("ticks", metrics.ticks),
            ],
        );
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn pre_init(&self) -> Result<()> {
        if self.is_destroyed() {
            return Ok(());
        }
        self.record(LifecycleAuditEventBuilder::new(LifecycleStage::PreInit));

        let frame = self.inner.options.frame();
        {
            let mut scheduler = self.inner.scheduler.borrow_mut();
            scheduler.set_use_raf(frame.raf);
            scheduler.set_fps(frame.fps);
        }
        let weak = self.downgrade();
        self.inner.options.on_change(RAF_OPTION, move |value| {
            if let (Some(app), Some(raf)) = (weak.upgrade(), value.as_bool()) {
                app.inner.scheduler.borrow_mut().set_use_raf(raf);
            }
        });
        let weak = self.downgrade();
        self.inner.options.on_change(FPS_OPTION, move |value| {
            let fps = value.as_u64().and_then(|fps| u32::try_from(fps).ok());
            if let (Some(app), Some(fps)) = (weak.upgrade(), fps) {
                app.inner.scheduler.borrow_mut().set_fps(fps);
            }
        });

        if let Some(initial) = self.inner.options.take_initial_display() {
            let factory = initial.factory.clone();
            self.add_display(&initial.id, |id, options| factory(id, options), initial.options)?;
        }

        let mut tasks: Vec<SeriesTask> = Vec::new();
        self.inner.plugins.for_each_in_order(|entry| {
            let Some(hook) = entry.preload_hook() else {
                return;
            };
            let weak = self.downgrade();
            let name = entry.name().to_string();
            tasks.push(Box::new(move |done: PreloadDone| match weak.upgrade() {
                Some(app) => {
                    app.log(LogLevel::Debug, "plugin_preload", [json_kv("plugin", name)]);
                    hook(&app, done)
                }
                None => Ok(()),
            }));
        });
        self.record(
            LifecycleAuditEventBuilder::new(LifecycleStage::PreloadStarted)
                .detail("tasks", json!(tasks.len())),
        );

        let cancelled = self.downgrade();
        let finished = self.downgrade();
        run_series(
            &self.inner.host,
            tasks,
            move || cancelled.upgrade().is_none_or(|app| app.is_destroyed()),
            move || match finished.upgrade() {
                Some(app) => app.do_init(),
                None => Ok(()),
            },
        )
    }

    fn do_init(&self) -> Result<()> {
        if self.is_destroyed() {
            return Ok(());
        }
        self.record(LifecycleAuditEventBuilder::new(LifecycleStage::PreloadFinished));
        self.inner.events.trigger(&AppEvent::BeforeInit);
        self.set_paused(false);
        self.inner.events.trigger(&AppEvent::Init);

        let on_init = self.inner.on_init.borrow_mut().take();
        if let Some(on_init) = on_init {
            on_init(self)?;
        }
        if self.is_destroyed() {
            return Ok(());
        }
        self.inner.events.trigger(&AppEvent::AfterInit);
        self.record(LifecycleAuditEventBuilder::new(LifecycleStage::InitCompleted));
        self.log(
            LogLevel::Info,
            "application_initialized",
            [
                json_kv("fps", self.frame_rate()),
                json_kv("raf", self.uses_animation_frame()),
            ],
        );
        Ok(())
    }

    fn apply_paused(&self, paused: bool) {
        self.inner.paused.set(paused);
        self.inner.metrics.borrow_mut().record_pause_toggle();
        if paused {
            self.inner.scheduler.borrow_mut().cancel();
        } else {
            let now = {
                let mut scheduler = self.inner.scheduler.borrow_mut();
                scheduler.reset_baseline();
                scheduler.last_frame_ms()
            };
            self.schedule_tick(now);
        }

        let stage = if paused {
            LifecycleStage::Paused
        } else {
            LifecycleStage::Resumed
        };
        self.record(LifecycleAuditEventBuilder::new(stage));
        self.inner.events.trigger(&AppEvent::Pause(paused));
        if paused {
            self.inner.events.trigger(&AppEvent::Paused(paused));
        } else {
            self.inner.events.trigger(&AppEvent::Resumed(paused));
        }
    }

    fn schedule_tick(&self, tick_started_ms: f64) {
        let weak = self.downgrade();
        self.inner.scheduler.borrow_mut().schedule(
            tick_started_ms,
            Box::new(move || match weak.upgrade() {
                Some(app) => app.tick(),
                None => Ok(()),
            }),
        );
    }

    fn tick(&self) -> Result<()> {
        if self.paused() || self.is_destroyed() {
            return Ok(());
        }
        let (now, elapsed) = self.inner.scheduler.borrow_mut().begin_tick();
        self.inner.metrics.borrow_mut().record_tick();
        self.inner.events.trigger(&AppEvent::Update(elapsed));

        self.apply_pending_display_ops();
        let handles = self.inner.displays.borrow().handles();
        let mut rendered = 0;
        for handle in &handles {
            // Earlier renders may have removed this display or torn us down.
            let live = {
                let displays = self.inner.displays.borrow();
                !displays.is_released() && displays.holds(handle)
            };
            if self.is_destroyed() || !live {
                continue;
            }
            if let Ok(mut display) = handle.try_borrow_mut() {
                display.render(elapsed);
                rendered += 1;
            }
            self.apply_pending_display_ops();
        }
        self.inner.metrics.borrow_mut().record_render(rendered);

        // An update listener may have paused or destroyed us.
        if self.paused() || self.is_destroyed() {
            return Ok(());
        }
        self.schedule_tick(now);
        Ok(())
    }

    /// Destroy now, or once the display's current render returns.
    fn destroy_display(&self, handle: &DisplayHandle) {
        match handle.try_borrow_mut() {
            Ok(mut display) => display.destroy(),
            Err(_) => self.inner.displays.borrow_mut().defer_destroy(handle),
        }
    }

    fn apply_pending_display_ops(&self) {
        let pending = self.inner.displays.borrow_mut().take_pending();
        for (handle, op) in pending {
            match op {
                PendingOp::Destroy => self.destroy_display(&handle),
                PendingOp::SetEnabled(enabled) => match handle.try_borrow_mut() {
                    Ok(mut display) => display.set_enabled(enabled),
                    Err(_) => self
                        .inner
                        .displays
                        .borrow_mut()
                        .defer_enabled(&handle, enabled),
                },
            }
        }
    }

    fn attach_timer<F>(&self, mut callback: F, delay: f64, options: DelayOptions) -> DelayedCall
    where
        F: FnMut(&DelayedCall) + 'static,
    {
        let counter = self.downgrade();
        let timer = DelayedCall::new(
            move |call: &DelayedCall| {
                if let Some(app) = counter.upgrade() {
                    app.inner.metrics.borrow_mut().record_timer_fired();
                }
                callback(call);
            },
            delay,
            options,
        );
        if self.is_destroyed() {
            timer.cancel();
            return timer;
        }

        let owner = self.downgrade();
        timer.set_tick_source(move |call| {
            let Some(app) = owner.upgrade() else {
                return Box::new(|| {});
            };
            let driven = call.clone();
            let listener = app.inner.events.on(EventKind::Update, move |event| {
                if let AppEvent::Update(elapsed) = event {
                    driven.update(*elapsed);
                }
            });
            let owner = app.downgrade();
            Box::new(move || {
                if let Some(app) = owner.upgrade() {
                    app.inner.events.off(listener);
                }
            })
        });

        let mut timers = self.inner.timers.borrow_mut();
        timers.retain(|entry| entry.upgrade().is_some_and(|call| !call.is_destroyed()));
        timers.push(timer.downgrade());
        timer
    }

    fn record(&self, event: LifecycleAuditEventBuilder) {
        self.inner.audit.record(event.finish());
    }

    fn log<I>(&self, level: LogLevel, message: &str, fields: I)
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        if let Some(logger) = self.inner.logger.as_ref() {
            let event = event_with_fields(level, RUNTIME_TARGET, message, fields);
            let _ = logger.log_event(event);
        }
    }
}
