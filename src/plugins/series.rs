use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use crate::Result;
use crate::host::EventLoop;

/// Single-shot completion signal handed to each series task. Clones share
/// the signal; only the first `complete` call counts.
#[derive(Clone)]
pub struct Done {
    signal: Rc<RefCell<Option<Box<dyn FnOnce()>>>>,
}

impl Done {
    fn new<F>(on_done: F) -> Self
    where
        F: FnOnce() + 'static,
    {
        Self {
            signal: Rc::new(RefCell::new(Some(Box::new(on_done)))),
        }
    }

    pub fn complete(&self) {
        let on_done = self.signal.borrow_mut().take();
        if let Some(on_done) = on_done {
            on_done();
        }
    }

    pub fn is_completed(&self) -> bool {
        self.signal.borrow().is_none()
    }
}

impl fmt::Debug for Done {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Done")
            .field("completed", &self.is_completed())
            .finish()
    }
}

pub type SeriesTask = Box<dyn FnOnce(Done) -> Result<()>>;

struct Series {
    host: EventLoop,
    queue: RefCell<VecDeque<SeriesTask>>,
    is_cancelled: Box<dyn Fn() -> bool>,
    on_complete: RefCell<Option<Box<dyn FnOnce() -> Result<()>>>>,
}

/// Run `tasks` strictly one at a time. Task `n + 1` starts on a loop turn
/// after task `n` signalled [`Done`]; `on_complete` runs once all finished.
/// When `is_cancelled` reports true the series stops before the next task and
/// `on_complete` is dropped without running.
pub fn run_series<C, F>(
    host: &EventLoop,
    tasks: Vec<SeriesTask>,
    is_cancelled: C,
    on_complete: F,
) -> Result<()>
where
    C: Fn() -> bool + 'static,
    F: FnOnce() -> Result<()> + 'static,
{
    let series = Rc::new(Series {
        host: host.clone(),
        queue: RefCell::new(tasks.into()),
        is_cancelled: Box::new(is_cancelled),
        on_complete: RefCell::new(Some(Box::new(on_complete))),
    });
    step(series)
}

fn step(series: Rc<Series>) -> Result<()> {
    if (series.is_cancelled)() {
        series.queue.borrow_mut().clear();
        series.on_complete.borrow_mut().take();
        return Ok(());
    }
    let next = series.queue.borrow_mut().pop_front();
    match next {
        Some(task) => {
            let host = series.host.clone();
            let resume = series.clone();
            let done = Done::new(move || {
                host.defer(move || step(resume));
            });
            task(done)
        }
        None => {
            let on_complete = series.on_complete.borrow_mut().take();
            match on_complete {
                Some(on_complete) => on_complete(),
                None => Ok(()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::ManualClock;
    use std::cell::Cell;

    type Journal = Rc<RefCell<Vec<String>>>;

    fn journal() -> Journal {
        Rc::new(RefCell::new(Vec::new()))
    }

    fn immediate(name: &'static str, log: &Journal) -> SeriesTask {
        let log = log.clone();
        Box::new(move |done: Done| {
            log.borrow_mut().push(name.to_string());
            done.complete();
            done.complete();
            Ok(())
        })
    }

    #[test]
    fn tasks_run_one_per_turn_in_order() {
        let host = EventLoop::new(ManualClock::new());
        let log = journal();
        let finished = log.clone();
        run_series(
            &host,
            vec![immediate("a", &log), immediate("b", &log), immediate("c", &log)],
            || false,
            move || {
                finished.borrow_mut().push("complete".into());
                Ok(())
            },
        )
        .unwrap();
        assert_eq!(*log.borrow(), vec!["a"]);
        host.run_until_idle().unwrap();
        assert_eq!(*log.borrow(), vec!["a", "b", "c", "complete"]);
    }

    #[test]
    fn next_task_waits_for_the_signal() {
        let host = EventLoop::new(ManualClock::new());
        let log = journal();
        let parked: Rc<RefCell<Option<Done>>> = Rc::new(RefCell::new(None));
        let slot = parked.clone();
        let first: SeriesTask = Box::new(move |done: Done| {
            *slot.borrow_mut() = Some(done);
            Ok(())
        });
        run_series(&host, vec![first, immediate("second", &log)], || false, || Ok(())).unwrap();
        host.run_until_idle().unwrap();
        assert!(log.borrow().is_empty());

        let done = parked.borrow_mut().take().unwrap();
        done.complete();
        assert!(log.borrow().is_empty());
        host.run_until_idle().unwrap();
        assert_eq!(*log.borrow(), vec!["second"]);
    }

    #[test]
    fn cancellation_stops_before_next_task() {
        let host = EventLoop::new(ManualClock::new());
        let log = journal();
        let cancelled = Rc::new(Cell::new(false));
        let flag = cancelled.clone();
        let first: SeriesTask = {
            let log = log.clone();
            Box::new(move |done: Done| {
                log.borrow_mut().push("first".into());
                flag.set(true);
                done.complete();
                Ok(())
            })
        };
        let check = cancelled.clone();
        let finished = log.clone();
        run_series(
            &host,
            vec![first, immediate("second", &log)],
            move || check.get(),
            move || {
                finished.borrow_mut().push("complete".into());
                Ok(())
            },
        )
        .unwrap();
        host.run_until_idle().unwrap();
        assert_eq!(*log.borrow(), vec!["first"]);
    }

    #[test]
    fn empty_series_completes_immediately() {
        let host = EventLoop::new(ManualClock::new());
        let log = journal();
        let finished = log.clone();
        run_series(&host, Vec::new(), || false, move || {
            finished.borrow_mut().push("complete".into());
            Ok(())
        })
        .unwrap();
        assert_eq!(*log.borrow(), vec!["complete"]);
    }
}
