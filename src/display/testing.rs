use std::cell::RefCell;
use std::rc::Rc;

use super::Display;

/// Display double that writes every call into a shared journal.
pub(crate) struct RecordingDisplay {
    id: String,
    enabled: bool,
    journal: Rc<RefCell<Vec<String>>>,
}

impl RecordingDisplay {
    pub(crate) fn new(id: &str) -> Self {
        Self::with_journal(id, Rc::new(RefCell::new(Vec::new())))
    }

    pub(crate) fn with_journal(id: &str, journal: Rc<RefCell<Vec<String>>>) -> Self {
        Self {
            id: id.to_string(),
            enabled: true,
            journal,
        }
    }
}

impl Display for RecordingDisplay {
    fn id(&self) -> &str {
        &self.id
    }

    fn render(&mut self, elapsed_ms: f64) {
        self.journal
            .borrow_mut()
            .push(format!("{}:render:{elapsed_ms}", self.id));
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn destroy(&mut self) {
        self.journal
            .borrow_mut()
            .push(format!("{}:destroy", self.id));
    }
}
