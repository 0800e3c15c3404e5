//! Cooperative single-threaded event loop.
//!
//! This is the environment the orchestrator lives in: it provides the three
//! primitives the runtime needs (run-later, delayed call, next-paint) and the
//! drivers that move time forward. Nothing here is preemptive; every task runs
//! to completion before the next one is picked.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use crate::Result;

pub mod clock;

pub use clock::{Clock, ManualClock, SystemClock};

/// Identifier handed out for every scheduled task; used for cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

type Task = Box<dyn FnOnce() -> Result<()>>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EventLoopConfig {
    /// Spacing of animation-frame boundaries.
    pub frame_interval_ms: f64,
    /// Lower bound applied to every timeout delay.
    pub min_timeout_ms: f64,
}

impl Default for EventLoopConfig {
    fn default() -> Self {
        Self {
            frame_interval_ms: 1000.0 / 60.0,
            min_timeout_ms: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimedKind {
    Timeout,
    Frame,
}

struct TimedTask {
    id: TaskId,
    due: f64,
    kind: TimedKind,
    task: Task,
}

#[derive(Default)]
struct LoopState {
    next_id: u64,
    deferred: VecDeque<(TaskId, Task)>,
    timed: Vec<TimedTask>,
}

impl LoopState {
    fn allocate(&mut self) -> TaskId {
        self.next_id += 1;
        TaskId(self.next_id)
    }

    fn take_ready(&mut self, now: f64) -> Option<Task> {
        if let Some((_, task)) = self.deferred.pop_front() {
            return Some(task);
        }
        let index = self
            .timed
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.due <= now)
            .min_by(|(_, a), (_, b)| a.due.total_cmp(&b.due).then(a.id.cmp(&b.id)))
            .map(|(index, _)| index)?;
        Some(self.timed.remove(index).task)
    }

    fn next_due(&self) -> Option<f64> {
        self.timed
            .iter()
            .map(|entry| entry.due)
            .min_by(|a, b| a.total_cmp(b))
    }
}

/// Handle to a cooperative event loop. Clones drive the same queue.
#[derive(Clone)]
pub struct EventLoop {
    state: Rc<RefCell<LoopState>>,
    clock: Rc<dyn Clock>,
    config: EventLoopConfig,
}

impl fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLoop")
            .field("now_ms", &self.now_ms())
            .field("pending", &self.pending())
            .field("config", &self.config)
            .finish()
    }
}

impl EventLoop {
    pub fn new<C>(clock: C) -> Self
    where
        C: Clock + 'static,
    {
        Self::with_config(clock, EventLoopConfig::default())
    }

    pub fn with_config<C>(clock: C, config: EventLoopConfig) -> Self
    where
        C: Clock + 'static,
    {
        Self {
            state: Rc::new(RefCell::new(LoopState::default())),
            clock: Rc::new(clock),
            config,
        }
    }

    /// Event loop backed by real time.
    pub fn system() -> Self {
        Self::new(SystemClock::new())
    }

    pub fn config(&self) -> EventLoopConfig {
        self.config
    }

    pub fn now_ms(&self) -> f64 {
        self.clock.now_ms()
    }

    /// Run `task` on a later turn of the loop, after the current call stack.
    pub fn defer<F>(&self, task: F) -> TaskId
    where
        F: FnOnce() -> Result<()> + 'static,
    {
        let mut state = self.state.borrow_mut();
        let id = state.allocate();
        state.deferred.push_back((id, Box::new(task)));
        id
    }

    pub fn set_timeout<F>(&self, delay_ms: f64, task: F) -> TaskId
    where
        F: FnOnce() -> Result<()> + 'static,
    {
        let delay = delay_ms.max(self.config.min_timeout_ms);
        let due = self.now_ms() + delay;
        self.push_timed(due, TimedKind::Timeout, Box::new(task))
    }

    /// Run `task` on the next frame boundary.
    pub fn request_animation_frame<F>(&self, task: F) -> TaskId
    where
        F: FnOnce() -> Result<()> + 'static,
    {
        let due = self.next_frame_boundary(self.now_ms());
        self.push_timed(due, TimedKind::Frame, Box::new(task))
    }

    /// Drop a pending task. Returns `false` if it already ran or never existed.
    pub fn cancel(&self, id: TaskId) -> bool {
        let mut state = self.state.borrow_mut();
        if let Some(index) = state.timed.iter().position(|entry| entry.id == id) {
            state.timed.remove(index);
            return true;
        }
        if let Some(index) = state.deferred.iter().position(|(task_id, _)| *task_id == id) {
            state.deferred.remove(index);
            return true;
        }
        false
    }

    pub fn pending(&self) -> usize {
        let state = self.state.borrow();
        state.deferred.len() + state.timed.len()
    }

    pub fn pending_frames(&self) -> usize {
        self.pending_of(TimedKind::Frame)
    }

    pub fn pending_timeouts(&self) -> usize {
        self.pending_of(TimedKind::Timeout)
    }

    pub fn is_idle(&self) -> bool {
        self.pending() == 0
    }

    /// Run deferred work and every task already due, without moving the clock.
    pub fn run_until_idle(&self) -> Result<()> {
        loop {
            let now = self.now_ms();
            let next = self.state.borrow_mut().take_ready(now);
            match next {
                Some(task) => task()?,
                None => return Ok(()),
            }
        }
    }

    /// Let `ms` milliseconds pass, running tasks in due order along the way.
    pub fn run_for(&self, ms: f64) -> Result<()> {
        let deadline = self.now_ms() + ms.max(0.0);
        loop {
            self.run_until_idle()?;
            let next_due = self.state.borrow().next_due();
            match next_due {
                Some(due) if due <= deadline => self.clock.sleep_until(due),
                _ => {
                    self.clock.sleep_until(deadline);
                    return self.run_until_idle();
                }
            }
        }
    }

    /// Drive the loop until no task is pending.
    pub fn run(&self) -> Result<()> {
        loop {
            self.run_until_idle()?;
            let next_due = self.state.borrow().next_due();
            match next_due {
                Some(due) => self.clock.sleep_until(due),
                None => return Ok(()),
            }
        }
    }

    fn push_timed(&self, due: f64, kind: TimedKind, task: Task) -> TaskId {
        let mut state = self.state.borrow_mut();
        let id = state.allocate();
        state.timed.push(TimedTask {
            id,
            due,
            kind,
            task,
        });
        id
    }

    fn pending_of(&self, kind: TimedKind) -> usize {
        self.state
            .borrow()
            .timed
            .iter()
            .filter(|entry| entry.kind == kind)
            .count()
    }

    fn next_frame_boundary(&self, now: f64) -> f64 {
        let interval = self.config.frame_interval_ms;
        if interval <= 0.0 {
            return now;
        }
        ((now / interval).floor() + 1.0) * interval
    }
}
