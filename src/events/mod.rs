use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::display::DisplayHandle;

/// Events published by the orchestrator, one variant per event name.
#[derive(Clone)]
pub enum AppEvent {
    BeforeInit,
    Init,
    AfterInit,
    /// Milliseconds elapsed since the previous tick.
    Update(f64),
    Pause(bool),
    Paused(bool),
    Resumed(bool),
    DisplayAdded(DisplayHandle),
    DisplayRemoved(String),
    Destroy,
}

impl AppEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            AppEvent::BeforeInit => EventKind::BeforeInit,
            AppEvent::Init => EventKind::Init,
            AppEvent::AfterInit => EventKind::AfterInit,
            AppEvent::Update(_) => EventKind::Update,
            AppEvent::Pause(_) => EventKind::Pause,
            AppEvent::Paused(_) => EventKind::Paused,
            AppEvent::Resumed(_) => EventKind::Resumed,
            AppEvent::DisplayAdded(_) => EventKind::DisplayAdded,
            AppEvent::DisplayRemoved(_) => EventKind::DisplayRemoved,
            AppEvent::Destroy => EventKind::Destroy,
        }
    }
}

impl fmt::Debug for AppEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppEvent::Update(elapsed) => f.debug_tuple("Update").field(elapsed).finish(),
            AppEvent::Pause(paused) => f.debug_tuple("Pause").field(paused).finish(),
            AppEvent::Paused(paused) => f.debug_tuple("Paused").field(paused).finish(),
            AppEvent::Resumed(paused) => f.debug_tuple("Resumed").field(paused).finish(),
            AppEvent::DisplayAdded(handle) => f
                .debug_tuple("DisplayAdded")
                .field(&handle.borrow().id().to_string())
                .finish(),
            AppEvent::DisplayRemoved(id) => f.debug_tuple("DisplayRemoved").field(id).finish(),
            other => f.write_str(other.kind().as_str()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    BeforeInit,
    Init,
    AfterInit,
    Update,
    Pause,
    Paused,
    Resumed,
    DisplayAdded,
    DisplayRemoved,
    Destroy,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::BeforeInit => "beforeInit",
            EventKind::Init => "init",
            EventKind::AfterInit => "afterInit",
            EventKind::Update => "update",
            EventKind::Pause => "pause",
            EventKind::Paused => "paused",
            EventKind::Resumed => "resumed",
            EventKind::DisplayAdded => "displayAdded",
            EventKind::DisplayRemoved => "displayRemoved",
            EventKind::Destroy => "destroy",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Handler = Rc<dyn Fn(&AppEvent)>;

struct Listener {
    id: ListenerId,
    kind: EventKind,
    once: bool,
    handler: Handler,
}

/// FIFO publish/subscribe hub. Handlers may subscribe or unsubscribe while an
/// event is being delivered; changes apply from the next `trigger`.
#[derive(Default)]
pub struct EventDispatcher {
    listeners: RefCell<Vec<Listener>>,
    next_id: Cell<u64>,
    destroyed: Cell<bool>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<F>(&self, kind: EventKind, handler: F) -> ListenerId
    where
        F: Fn(&AppEvent) + 'static,
    {
        self.subscribe(kind, false, Rc::new(handler))
    }

    pub fn once<F>(&self, kind: EventKind, handler: F) -> ListenerId
    where
        F: Fn(&AppEvent) + 'static,
    {
        self.subscribe(kind, true, Rc::new(handler))
    }

    pub fn off(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.borrow_mut();
        let before = listeners.len();
        listeners.retain(|listener| listener.id != id);
        listeners.len() != before
    }

    pub fn has_listeners(&self, kind: EventKind) -> bool {
        self.listeners
            .borrow()
            .iter()
            .any(|listener| listener.kind == kind)
    }

    pub fn trigger(&self, event: &AppEvent) {
        if self.destroyed.get() {
            return;
        }
        let kind = event.kind();
        let handlers: Vec<Handler> = {
            let mut listeners = self.listeners.borrow_mut();
            let matched = listeners
                .iter()
                .filter(|listener| listener.kind == kind)
                .map(|listener| listener.handler.clone())
                .collect();
            listeners.retain(|listener| !(listener.once && listener.kind == kind));
            matched
        };
        for handler in handlers {
            handler(event);
        }
    }

    /// Drop every listener and ignore all further triggers.
    pub fn destroy(&self) {
        self.destroyed.set(true);
        self.listeners.borrow_mut().clear();
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.get()
    }

    fn subscribe(&self, kind: EventKind, once: bool, handler: Handler) -> ListenerId {
        let id = ListenerId(self.next_id.get() + 1);
        self.next_id.set(id.0);
        if !self.destroyed.get() {
            self.listeners.borrow_mut().push(Listener {
                id,
                kind,
                once,
                handler,
            });
        }
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log() -> Rc<RefCell<Vec<String>>> {
        Rc::new(RefCell::new(Vec::new()))
    }

    #[test]
    fn listeners_fire_in_subscription_order() {
        let events = EventDispatcher::new();
        let seen = log();
        for tag in ["first", "second"] {
            let seen = seen.clone();
            events.on(EventKind::Update, move |event| {
                if let AppEvent::Update(ms) = event {
                    seen.borrow_mut().push(format!("{tag}:{ms}"));
                }
            });
        }
        events.trigger(&AppEvent::Update(16.0));
        events.trigger(&AppEvent::Init);
        assert_eq!(*seen.borrow(), vec!["first:16", "second:16"]);
    }

    #[test]
    fn once_and_off_remove_listeners() {
        let events = EventDispatcher::new();
        let seen = log();
        let sink = seen.clone();
        events.once(EventKind::Init, move |_| sink.borrow_mut().push("once".into()));
        let sink = seen.clone();
        let id = events.on(EventKind::Init, move |_| sink.borrow_mut().push("on".into()));
        events.trigger(&AppEvent::Init);
        assert!(events.off(id));
        events.trigger(&AppEvent::Init);
        assert_eq!(*seen.borrow(), vec!["once", "on"]);
        assert!(!events.has_listeners(EventKind::Init));
    }

    #[test]
    fn handlers_may_subscribe_while_dispatching() {
        let events = Rc::new(EventDispatcher::new());
        let seen = log();
        let inner_events = events.clone();
        let sink = seen.clone();
        events.on(EventKind::Destroy, move |_| {
            let sink = sink.clone();
            inner_events.on(EventKind::Destroy, move |_| sink.borrow_mut().push("late".into()));
        });
        events.trigger(&AppEvent::Destroy);
        assert!(seen.borrow().is_empty());
        events.trigger(&AppEvent::Destroy);
        assert_eq!(seen.borrow().len(), 1);
    }

    #[test]
    fn destroyed_dispatcher_is_silent() {
        let events = EventDispatcher::new();
        let seen = log();
        let sink = seen.clone();
        events.on(EventKind::Init, move |_| sink.borrow_mut().push("init".into()));
        events.destroy();
        events.trigger(&AppEvent::Init);
        events.on(EventKind::Init, |_| panic!("must not be stored"));
        events.trigger(&AppEvent::Init);
        assert!(seen.borrow().is_empty());
        assert!(events.is_destroyed());
    }
}
