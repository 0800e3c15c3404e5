//! Frame pacing for the tick loop.
//!
//! A [`FrameScheduler`] owns at most one outstanding request on the event
//! loop. The strategy deciding *when* the next tick runs can be swapped at
//! any time; a request issued under the old strategy is still cancelled
//! through the strategy that issued it.

use std::fmt;
use std::rc::Rc;

use crate::Result;
use crate::host::{EventLoop, TaskId};
use crate::options::ms_per_frame;

pub type TickCallback = Box<dyn FnOnce() -> Result<()>>;

/// Timing facts a strategy may use to place the next tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameBudget {
    /// Clock reading taken when the current tick started.
    pub tick_started_ms: f64,
    /// Target spacing between ticks; zero when uncapped.
    pub ms_per_frame: f64,
}

pub trait FrameStrategy {
    fn name(&self) -> &'static str;

    /// Queue `callback` for the next tick and return the cancellation token.
    fn schedule_next(
        &self,
        host: &EventLoop,
        budget: FrameBudget,
        callback: TickCallback,
    ) -> TaskId;

    fn cancel(&self, host: &EventLoop, token: TaskId) -> bool {
        host.cancel(token)
    }
}

/// Ticks on the host's next paint boundary.
#[derive(Debug, Default, Clone, Copy)]
pub struct AnimationFrameStrategy;

impl FrameStrategy for AnimationFrameStrategy {
    fn name(&self) -> &'static str {
        "animation_frame"
    }

    fn schedule_next(
        &self,
        host: &EventLoop,
        _budget: FrameBudget,
        callback: TickCallback,
    ) -> TaskId {
        host.request_animation_frame(callback)
    }
}

/// Ticks after the frame budget minus the time the current tick already used.
#[derive(Debug, Default, Clone, Copy)]
pub struct CompensatedTimeoutStrategy;

impl CompensatedTimeoutStrategy {
    pub fn delay_ms(now_ms: f64, budget: FrameBudget) -> f64 {
        let spent = now_ms - budget.tick_started_ms;
        (budget.ms_per_frame - spent).max(0.0)
    }
}

impl FrameStrategy for CompensatedTimeoutStrategy {
    fn name(&self) -> &'static str {
        "compensated_timeout"
    }

    fn schedule_next(
        &self,
        host: &EventLoop,
        budget: FrameBudget,
        callback: TickCallback,
    ) -> TaskId {
        let delay = Self::delay_ms(host.now_ms(), budget);
        host.set_timeout(delay, callback)
    }
}

struct PendingRequest {
    token: TaskId,
    strategy: Rc<dyn FrameStrategy>,
}

pub struct FrameScheduler {
    host: EventLoop,
    strategy: Rc<dyn FrameStrategy>,
    fps: u32,
    ms_per_frame: f64,
    last_frame_ms: f64,
    pending: Option<PendingRequest>,
}

impl fmt::Debug for FrameScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameScheduler")
            .field("strategy", &self.strategy.name())
            .field("fps", &self.fps)
            .field("last_frame_ms", &self.last_frame_ms)
            .field("scheduled", &self.is_scheduled())
            .finish()
    }
}

impl FrameScheduler {
    pub fn new(host: &EventLoop, use_raf: bool, fps: u32) -> Self {
        Self {
            host: host.clone(),
            strategy: strategy_for(use_raf),
            fps,
            ms_per_frame: ms_per_frame(fps),
            last_frame_ms: host.now_ms(),
            pending: None,
        }
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    pub fn set_strategy(&mut self, strategy: Rc<dyn FrameStrategy>) {
        self.strategy = strategy;
    }

    /// Switch between the two built-in strategies. The outstanding request,
    /// if any, is left alone.
    pub fn set_use_raf(&mut self, use_raf: bool) {
        self.strategy = strategy_for(use_raf);
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }

    pub fn set_fps(&mut self, fps: u32) {
        self.fps = fps;
        self.ms_per_frame = ms_per_frame(fps);
    }

    pub fn ms_per_frame(&self) -> f64 {
        self.ms_per_frame
    }

    pub fn last_frame_ms(&self) -> f64 {
        self.last_frame_ms
    }

    /// Take a fresh baseline so the next tick measures from now.
    pub fn reset_baseline(&mut self) {
        self.last_frame_ms = self.host.now_ms();
    }

    /// Mark the outstanding request consumed and return the elapsed time
    /// since the previous baseline, which becomes `now`.
    pub fn begin_tick(&mut self) -> (f64, f64) {
        self.pending = None;
        let now = self.host.now_ms();
        let elapsed = now - self.last_frame_ms;
        self.last_frame_ms = now;
        (now, elapsed)
    }

    /// Request the next tick, replacing any request still outstanding.
    pub fn schedule(&mut self, tick_started_ms: f64, callback: TickCallback) {
        self.cancel();
        let budget = FrameBudget {
            tick_started_ms,
            ms_per_frame: self.ms_per_frame,
        };
        let token = self.strategy.schedule_next(&self.host, budget, callback);
        self.pending = Some(PendingRequest {
            token,
            strategy: self.strategy.clone(),
        });
    }

    /// Cancel the outstanding request. Returns `false` when none was pending.
    pub fn cancel(&mut self) -> bool {
        match self.pending.take() {
            Some(request) => request.strategy.cancel(&self.host, request.token),
            None => false,
        }
    }

    pub fn is_scheduled(&self) -> bool {
        self.pending.is_some()
    }
}

fn strategy_for(use_raf: bool) -> Rc<dyn FrameStrategy> {
    if use_raf {
        Rc::new(AnimationFrameStrategy)
    } else {
        Rc::new(CompensatedTimeoutStrategy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{EventLoopConfig, ManualClock};
    use std::cell::{Cell, RefCell};

    fn manual() -> (ManualClock, EventLoop) {
        let clock = ManualClock::new();
        let host = EventLoop::with_config(
            clock.clone(),
            EventLoopConfig {
                frame_interval_ms: 10.0,
                min_timeout_ms: 1.0,
            },
        );
        (clock, host)
    }

    #[test]
    fn compensated_delay_subtracts_tick_cost() {
        let budget = FrameBudget {
            tick_started_ms: 100.0,
            ms_per_frame: 20.0,
        };
        assert_eq!(CompensatedTimeoutStrategy::delay_ms(104.0, budget), 16.0);
        assert_eq!(CompensatedTimeoutStrategy::delay_ms(130.0, budget), 0.0);
        let uncapped = FrameBudget {
            tick_started_ms: 0.0,
            ms_per_frame: 0.0,
        };
        assert_eq!(CompensatedTimeoutStrategy::delay_ms(3.0, uncapped), 0.0);
    }

    #[test]
    fn only_one_request_is_ever_pending() {
        let (_clock, host) = manual();
        let mut scheduler = FrameScheduler::new(&host, true, 60);
        let fired = Rc::new(Cell::new(0));
        for _ in 0..2 {
            let fired = fired.clone();
            scheduler.schedule(
                0.0,
                Box::new(move || {
                    fired.set(fired.get() + 1);
                    Ok(())
                }),
            );
        }
        scheduler.set_use_raf(false);
        let count = fired.clone();
        scheduler.schedule(
            0.0,
            Box::new(move || {
                count.set(count.get() + 1);
                Ok(())
            }),
        );
        assert_eq!(host.pending(), 1);
        assert_eq!(host.pending_timeouts(), 1);
        host.run().unwrap();
        assert_eq!(fired.get(), 1);
    }

    #[test]
    fn cancel_uses_the_strategy_that_issued_the_request() {
        let (_clock, host) = manual();
        let mut scheduler = FrameScheduler::new(&host, true, 60);
        scheduler.schedule(0.0, Box::new(|| Ok(())));
        assert_eq!(host.pending_frames(), 1);
        scheduler.set_use_raf(false);
        assert_eq!(scheduler.strategy_name(), "compensated_timeout");
        assert!(scheduler.cancel());
        assert!(!scheduler.cancel());
        assert!(host.is_idle());
    }

    #[test]
    fn begin_tick_measures_from_the_last_baseline() {
        let (clock, host) = manual();
        let mut scheduler = FrameScheduler::new(&host, false, 50);
        assert_eq!(scheduler.ms_per_frame(), 20.0);
        clock.advance(16.0);
        assert_eq!(scheduler.begin_tick(), (16.0, 16.0));
        clock.advance(5000.0);
        scheduler.reset_baseline();
        clock.advance(20.0);
        let (_, elapsed) = scheduler.begin_tick();
        assert_eq!(elapsed, 20.0);
    }

    #[test]
    fn timeout_strategy_spaces_ticks_by_budget() {
        let (clock, host) = manual();
        let scheduler = Rc::new(RefCell::new(FrameScheduler::new(&host, false, 50)));
        let starts = Rc::new(RefCell::new(Vec::new()));
        fn tick(
            scheduler: Rc<RefCell<FrameScheduler>>,
            clock: ManualClock,
            starts: Rc<RefCell<Vec<f64>>>,
        ) -> Result<()> {
            let (now, _) = scheduler.borrow_mut().begin_tick();
            starts.borrow_mut().push(now);
            clock.advance(4.0);
            if starts.borrow().len() < 3 {
                let next = (scheduler.clone(), clock.clone(), starts.clone());
                scheduler
                    .borrow_mut()
                    .schedule(now, Box::new(move || tick(next.0, next.1, next.2)));
            }
            Ok(())
        }
        let first = (scheduler.clone(), clock.clone(), starts.clone());
        scheduler
            .borrow_mut()
            .schedule(0.0, Box::new(move || tick(first.0, first.1, first.2)));
        host.run().unwrap();
        assert_eq!(*starts.borrow(), vec![20.0, 40.0, 60.0]);
    }
}
