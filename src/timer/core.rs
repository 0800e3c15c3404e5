use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

/// How a delay is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DelayUnit {
    /// Counts down by the elapsed milliseconds passed to each update.
    #[default]
    Millis,
    /// Counts down by exactly one per update, whatever the elapsed time.
    Frames,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayOptions {
    pub repeat: bool,
    pub auto_destroy: bool,
    pub unit: DelayUnit,
}

impl Default for DelayOptions {
    fn default() -> Self {
        Self {
            repeat: false,
            auto_destroy: true,
            unit: DelayUnit::Millis,
        }
    }
}

impl DelayOptions {
    pub fn timeout(unit: DelayUnit, auto_destroy: bool) -> Self {
        Self {
            repeat: false,
            auto_destroy,
            unit,
        }
    }

    pub fn interval(unit: DelayUnit) -> Self {
        Self {
            repeat: true,
            auto_destroy: false,
            unit,
        }
    }
}

type Callback = Box<dyn FnMut(&DelayedCall)>;
type Detach = Box<dyn FnOnce()>;
type Attach = Rc<dyn Fn(&DelayedCall) -> Detach>;

struct TimerState {
    callback: Option<Callback>,
    delay: f64,
    options: DelayOptions,
    active: bool,
    paused: bool,
    destroyed: bool,
    elapsed_ms: f64,
    frames_left: i64,
    attach: Option<Attach>,
    detach: Option<Detach>,
}

impl TimerState {
    fn reset_countdown(&mut self) {
        self.elapsed_ms = 0.0;
        self.frames_left = frame_count(self.delay);
    }

    /// Advance the countdown; true when the threshold was crossed.
    fn advance(&mut self, elapsed_ms: f64) -> bool {
        match self.options.unit {
            DelayUnit::Millis => {
                self.elapsed_ms += elapsed_ms;
                if self.elapsed_ms < self.delay {
                    return false;
                }
                if self.options.repeat {
                    self.elapsed_ms = (self.elapsed_ms - self.delay.max(0.0)).max(0.0);
                }
                true
            }
            DelayUnit::Frames => {
                self.frames_left -= 1;
                if self.frames_left > 0 {
                    return false;
                }
                if self.options.repeat {
                    self.frames_left = frame_count(self.delay);
                }
                true
            }
        }
    }
}

fn frame_count(delay: f64) -> i64 {
    if delay <= 0.0 { 0 } else { delay.round() as i64 }
}

/// Pausable, cancellable countdown that invokes its callback when the delay
/// has elapsed. Clones refer to the same timer.
///
/// Non-repeating timers deactivate after firing; with `auto_destroy` they
/// also drop their callback. Repeating millisecond timers carry any overshoot
/// into the next period.
#[derive(Clone)]
pub struct DelayedCall {
    state: Rc<RefCell<TimerState>>,
}

impl fmt::Debug for DelayedCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("DelayedCall")
            .field("delay", &state.delay)
            .field("options", &state.options)
            .field("active", &state.active)
            .field("paused", &state.paused)
            .field("destroyed", &state.destroyed)
            .finish()
    }
}

impl DelayedCall {
    pub fn new<F>(callback: F, delay: f64, options: DelayOptions) -> Self
    where
        F: FnMut(&DelayedCall) + 'static,
    {
        let mut state = TimerState {
            callback: Some(Box::new(callback)),
            delay,
            options,
            active: true,
            paused: false,
            destroyed: false,
            elapsed_ms: 0.0,
            frames_left: 0,
            attach: None,
            detach: None,
        };
        state.reset_countdown();
        Self {
            state: Rc::new(RefCell::new(state)),
        }
    }

    /// Feed elapsed time from one scheduler tick.
    pub fn update(&self, elapsed_ms: f64) {
        let fired = {
            let mut state = self.state.borrow_mut();
            if !state.active || state.paused || state.destroyed {
                return;
            }
            let fired = state.advance(elapsed_ms);
            if fired && !state.options.repeat {
                state.active = false;
            }
            fired
        };
        if fired {
            self.fire();
        }
    }

    /// Stop for good without firing and release the callback. Idempotent.
    pub fn cancel(&self) {
        self.destroy();
    }

    /// Reset the countdown to the full delay and reactivate.
    pub fn restart(&self) {
        {
            let mut state = self.state.borrow_mut();
            if state.destroyed {
                return;
            }
            state.reset_countdown();
            state.active = true;
            state.paused = false;
        }
        self.attach_to_source();
    }

    /// Freeze the countdown; updates are ignored until [`resume`](Self::resume).
    pub fn pause(&self) {
        self.state.borrow_mut().paused = true;
    }

    pub fn resume(&self) {
        self.state.borrow_mut().paused = false;
    }

    pub fn is_paused(&self) -> bool {
        self.state.borrow().paused
    }

    pub fn is_active(&self) -> bool {
        let state = self.state.borrow();
        state.active && !state.destroyed
    }

    pub fn is_destroyed(&self) -> bool {
        self.state.borrow().destroyed
    }

    pub fn has_callback(&self) -> bool {
        self.state.borrow().callback.is_some()
    }

    pub fn delay(&self) -> f64 {
        self.state.borrow().delay
    }

    /// Change the delay. Takes effect on the next period.
    pub fn set_delay(&self, delay: f64) {
        self.state.borrow_mut().delay = delay;
    }

    pub fn options(&self) -> DelayOptions {
        self.state.borrow().options
    }

    /// Subscribe to a tick source. `attach` returns the matching unsubscribe
    /// hook. A one-shot that settles after firing unsubscribes and attaches
    /// again on [`restart`](Self::restart).
    pub(crate) fn set_tick_source<F>(&self, attach: F)
    where
        F: Fn(&DelayedCall) -> Detach + 'static,
    {
        let previous = {
            let mut state = self.state.borrow_mut();
            if state.destroyed {
                return;
            }
            state.attach = Some(Rc::new(attach));
            state.detach.take()
        };
        if let Some(detach) = previous {
            detach();
        }
        self.attach_to_source();
    }

    pub(crate) fn is_attached(&self) -> bool {
        self.state.borrow().detach.is_some()
    }

    fn attach_to_source(&self) {
        let attach = {
            let state = self.state.borrow();
            if state.destroyed || state.detach.is_some() {
                return;
            }
            state.attach.clone()
        };
        let Some(attach) = attach else {
            return;
        };
        let detach = attach(self);
        self.state.borrow_mut().detach = Some(detach);
    }

    fn detach_from_source(&self) {
        let detach = self.state.borrow_mut().detach.take();
        if let Some(detach) = detach {
            detach();
        }
    }

    pub(crate) fn downgrade(&self) -> WeakDelayedCall {
        WeakDelayedCall {
            state: Rc::downgrade(&self.state),
        }
    }

    fn destroy(&self) {
        let (callback, detach) = {
            let mut state = self.state.borrow_mut();
            if state.destroyed {
                return;
            }
            state.destroyed = true;
            state.active = false;
            state.attach = None;
            (state.callback.take(), state.detach.take())
        };
        drop(callback);
        if let Some(detach) = detach {
            detach();
        }
    }

    fn fire(&self) {
        let callback = self.state.borrow_mut().callback.take();
        let Some(mut callback) = callback else {
            return;
        };
        callback(self);

        let (settled, auto_destroy) = {
            let mut state = self.state.borrow_mut();
            if state.destroyed {
                return;
            }
            state.callback = Some(callback);
            (
                !state.options.repeat && !state.active,
                state.options.auto_destroy,
            )
        };
        if !settled {
            return;
        }
        if auto_destroy {
            self.destroy();
        } else {
            self.detach_from_source();
        }
    }
}

/// Non-owning reference used by tick subscriptions.
#[derive(Clone)]
pub(crate) struct WeakDelayedCall {
    state: Weak<RefCell<TimerState>>,
}

impl WeakDelayedCall {
    pub(crate) fn upgrade(&self) -> Option<DelayedCall> {
        self.state.upgrade().map(|state| DelayedCall { state })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn counter() -> Rc<Cell<u32>> {
        Rc::new(Cell::new(0))
    }

    fn counting(count: &Rc<Cell<u32>>) -> impl FnMut(&DelayedCall) + 'static {
        let count = count.clone();
        move |_| count.set(count.get() + 1)
    }

    #[test]
    fn repeating_millis_timer_carries_overshoot() {
        let fired = counter();
        let timer = DelayedCall::new(
            counting(&fired),
            100.0,
            DelayOptions::interval(DelayUnit::Millis),
        );
        timer.update(40.0);
        timer.update(40.0);
        assert_eq!(fired.get(), 0);
        // 120 crosses 100; the extra 20 carries over.
        timer.update(40.0);
        assert_eq!(fired.get(), 1);
        timer.update(40.0);
        assert_eq!(fired.get(), 1);
        timer.update(40.0);
        assert_eq!(fired.get(), 2);

        let overshoot = counter();
        let late = DelayedCall::new(
            counting(&overshoot),
            100.0,
            DelayOptions::interval(DelayUnit::Millis),
        );
        late.update(160.0);
        late.update(40.0);
        assert_eq!(overshoot.get(), 2);
        assert!(timer.is_active());
    }

    #[test]
    fn frame_timer_ignores_elapsed_values() {
        let fired = counter();
        let timer = DelayedCall::new(
            counting(&fired),
            3.0,
            DelayOptions::timeout(DelayUnit::Frames, false),
        );
        timer.update(1000.0);
        timer.update(0.0);
        assert_eq!(fired.get(), 0);
        timer.update(0.5);
        assert_eq!(fired.get(), 1);
        timer.update(16.0);
        assert_eq!(fired.get(), 1);
        assert!(!timer.is_active());
        assert!(timer.has_callback());
    }

    #[test]
    fn non_positive_delay_fires_on_next_update() {
        let fired = counter();
        let millis = DelayedCall::new(counting(&fired), 0.0, DelayOptions::default());
        millis.update(0.0);
        let frames = DelayedCall::new(
            counting(&fired),
            -2.0,
            DelayOptions::timeout(DelayUnit::Frames, true),
        );
        frames.update(0.0);
        assert_eq!(fired.get(), 2);
    }

    #[test]
    fn auto_destroy_releases_callback_after_single_fire() {
        let fired = counter();
        let timer = DelayedCall::new(counting(&fired), 10.0, DelayOptions::default());
        timer.update(10.0);
        assert_eq!(fired.get(), 1);
        assert!(timer.is_destroyed());
        assert!(!timer.has_callback());
        timer.restart();
        timer.update(10.0);
        assert_eq!(fired.get(), 1);
    }

    #[test]
    fn cancel_is_idempotent_and_never_fires() {
        let fired = counter();
        let detached = counter();
        let timer = DelayedCall::new(
            counting(&fired),
            5.0,
            DelayOptions::interval(DelayUnit::Millis),
        );
        let hook = detached.clone();
        timer.set_tick_source(move |_| {
            let hook = hook.clone();
            Box::new(move || hook.set(hook.get() + 1))
        });
        timer.cancel();
        timer.cancel();
        timer.update(50.0);
        assert_eq!(fired.get(), 0);
        assert_eq!(detached.get(), 1);
        assert!(!timer.has_callback());
    }

    #[test]
    fn fired_one_shot_unsubscribes_until_restarted() {
        let fired = counter();
        let attached = counter();
        let detached = counter();
        let timer = DelayedCall::new(
            counting(&fired),
            1.0,
            DelayOptions::timeout(DelayUnit::Frames, false),
        );
        let (on, off) = (attached.clone(), detached.clone());
        timer.set_tick_source(move |_| {
            on.set(on.get() + 1);
            let off = off.clone();
            Box::new(move || off.set(off.get() + 1))
        });
        assert!(timer.is_attached());

        timer.update(0.0);
        assert_eq!(fired.get(), 1);
        assert!(!timer.is_attached());
        assert_eq!(detached.get(), 1);
        assert!(timer.has_callback());

        timer.restart();
        assert!(timer.is_attached());
        assert_eq!(attached.get(), 2);
        timer.restart();
        assert_eq!(attached.get(), 2);
        timer.update(0.0);
        assert_eq!(fired.get(), 2);
        assert_eq!(detached.get(), 2);
    }

    #[test]
    fn restart_and_pause_control_the_countdown() {
        let fired = counter();
        let timer = DelayedCall::new(
            counting(&fired),
            100.0,
            DelayOptions::timeout(DelayUnit::Millis, false),
        );
        timer.update(90.0);
        timer.restart();
        timer.update(90.0);
        assert_eq!(fired.get(), 0);
        timer.pause();
        timer.update(500.0);
        assert_eq!(fired.get(), 0);
        timer.resume();
        timer.update(10.0);
        assert_eq!(fired.get(), 1);
        timer.restart();
        timer.update(100.0);
        assert_eq!(fired.get(), 2);
    }

    #[test]
    fn callback_can_cancel_its_own_timer() {
        let fired = counter();
        let count = fired.clone();
        let timer = DelayedCall::new(
            move |call: &DelayedCall| {
                count.set(count.get() + 1);
                call.cancel();
            },
            1.0,
            DelayOptions::interval(DelayUnit::Frames),
        );
        timer.update(0.0);
        timer.update(0.0);
        assert_eq!(fired.get(), 1);
        assert!(timer.is_destroyed());
        assert!(!timer.has_callback());
    }
}
