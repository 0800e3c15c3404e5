//! Renderable surfaces driven by the frame scheduler.
//!
//! Drawing itself belongs to the concrete display; the runtime only needs to
//! hand out elapsed time, flip the enabled flag, and tear surfaces down.

use std::cell::RefCell;
use std::rc::Rc;

pub mod registry;

pub use registry::DisplayRegistry;

/// Contract implemented by every renderable surface.
pub trait Display {
    fn id(&self) -> &str;

    /// Draw one frame. `elapsed_ms` is the time since the previous tick.
    fn render(&mut self, elapsed_ms: f64);

    fn enabled(&self) -> bool;

    fn set_enabled(&mut self, enabled: bool);

    /// Release backend resources. Called exactly once by the runtime.
    fn destroy(&mut self);
}

impl<D> Display for Box<D>
where
    D: Display + ?Sized,
{
    fn id(&self) -> &str {
        (**self).id()
    }

    fn render(&mut self, elapsed_ms: f64) {
        (**self).render(elapsed_ms)
    }

    fn enabled(&self) -> bool {
        (**self).enabled()
    }

    fn set_enabled(&mut self, enabled: bool) {
        (**self).set_enabled(enabled)
    }

    fn destroy(&mut self) {
        (**self).destroy()
    }
}

/// Shared handle to a registered display.
pub type DisplayHandle = Rc<RefCell<dyn Display>>;

/// Factory used when the initial display is described through options.
pub type DisplayFactory = Rc<dyn Fn(&str, &serde_json::Value) -> crate::Result<Box<dyn Display>>>;

#[cfg(test)]
pub(crate) mod testing;
