//! The active-application slot.
//!
//! Holds at most one [`Application`] per thread. The slot keeps the instance
//! alive from construction until `destroy` releases it, so a half-built
//! instance can still be reached and torn down.

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::{AppError, Result};

use super::Application;

thread_local! {
    static ACTIVE: RefCell<Option<Application>> = const { RefCell::new(None) };
}

pub(crate) fn claim(app: &Application) -> Result<()> {
    ACTIVE.with(|slot| {
        let mut slot = slot.borrow_mut();
        if slot.is_some() {
            return Err(AppError::SingletonActive);
        }
        *slot = Some(app.clone());
        Ok(())
    })
}

/// Free the slot if `app` occupies it.
pub(crate) fn release(app: &Application) {
    let released = ACTIVE.with(|slot| {
        let mut slot = slot.borrow_mut();
        let owned = slot
            .as_ref()
            .is_some_and(|active| Rc::ptr_eq(&active.inner, &app.inner));
        if owned { slot.take() } else { None }
    });
    drop(released);
}

pub fn current() -> Option<Application> {
    ACTIVE.with(|slot| slot.borrow().clone())
}

pub fn is_active() -> bool {
    ACTIVE.with(|slot| slot.borrow().is_some())
}
