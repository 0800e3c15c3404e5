use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::rc::Rc;

use crate::error::{AppError, Result};

use super::DisplayHandle;

/// Change that could not be applied because the display was mid-render.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum PendingOp {
    Destroy,
    SetEnabled(bool),
}

/// Ordered, id-keyed set of displays owned by one application.
///
/// The first display ever inserted becomes the primary display. Removing it
/// does not clear the primary reference.
#[derive(Default)]
pub struct DisplayRegistry {
    order: Vec<DisplayHandle>,
    by_id: HashMap<String, DisplayHandle>,
    primary: Option<DisplayHandle>,
    released: bool,
    pending: Vec<(DisplayHandle, PendingOp)>,
}

impl DisplayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: &str, handle: DisplayHandle) -> Result<()> {
        match self.by_id.entry(id.to_string()) {
            Entry::Occupied(_) => Err(AppError::DuplicateDisplay(id.to_string())),
            Entry::Vacant(vacant) => {
                vacant.insert(handle.clone());
                if self.primary.is_none() {
                    self.primary = Some(handle.clone());
                }
                self.order.push(handle);
                Ok(())
            }
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    /// True while `handle` itself is registered.
    pub fn holds(&self, handle: &DisplayHandle) -> bool {
        self.order.iter().any(|entry| Rc::ptr_eq(entry, handle))
    }

    /// Unregister `id` and hand the handle back. The caller destroys it.
    pub fn remove(&mut self, id: &str) -> Option<DisplayHandle> {
        let handle = self.by_id.remove(id)?;
        self.order.retain(|entry| !Rc::ptr_eq(entry, &handle));
        Some(handle)
    }

    pub fn get(&self, id: &str) -> Option<DisplayHandle> {
        self.by_id.get(id).cloned()
    }

    /// Snapshot of every display in registration order.
    pub fn handles(&self) -> Vec<DisplayHandle> {
        self.order.clone()
    }

    pub fn primary(&self) -> Option<DisplayHandle> {
        self.primary.clone()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Flip every display. A display that is busy rendering gets the change
    /// once its frame returns.
    pub fn set_enabled_all(&mut self, enabled: bool) {
        for handle in &self.order {
            match handle.try_borrow_mut() {
                Ok(mut display) => display.set_enabled(enabled),
                Err(_) => Self::queue_enabled(&mut self.pending, handle, enabled),
            }
        }
    }

    pub(crate) fn defer_enabled(&mut self, handle: &DisplayHandle, enabled: bool) {
        Self::queue_enabled(&mut self.pending, handle, enabled);
    }

    /// Queue `handle` for destruction; supersedes any queued enable change.
    pub(crate) fn defer_destroy(&mut self, handle: &DisplayHandle) {
        self.pending.retain(|(entry, _)| !Rc::ptr_eq(entry, handle));
        self.pending.push((handle.clone(), PendingOp::Destroy));
    }

    pub(crate) fn take_pending(&mut self) -> Vec<(DisplayHandle, PendingOp)> {
        std::mem::take(&mut self.pending)
    }

    fn queue_enabled(
        pending: &mut Vec<(DisplayHandle, PendingOp)>,
        handle: &DisplayHandle,
        enabled: bool,
    ) {
        let doomed = pending
            .iter()
            .any(|(entry, op)| Rc::ptr_eq(entry, handle) && *op == PendingOp::Destroy);
        if doomed {
            return;
        }
        pending.retain(|(entry, _)| !Rc::ptr_eq(entry, handle));
        pending.push((handle.clone(), PendingOp::SetEnabled(enabled)));
    }

    /// Take every display out of the registry and mark it released. Callers
    /// destroy the returned handles outside of any registry borrow.
    pub fn release_all(&mut self) -> Vec<DisplayHandle> {
        self.released = true;
        self.by_id.clear();
        self.primary = None;
        std::mem::take(&mut self.order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::testing::RecordingDisplay;
    use std::cell::RefCell;

    fn handle(id: &str) -> DisplayHandle {
        Rc::new(RefCell::new(RecordingDisplay::new(id)))
    }

    #[test]
    fn first_display_becomes_primary() {
        let mut registry = DisplayRegistry::new();
        registry.insert("main", handle("main")).unwrap();
        registry.insert("overlay", handle("overlay")).unwrap();
        let primary = registry.primary().unwrap();
        assert_eq!(primary.borrow().id(), "main");
        let ids: Vec<String> = registry
            .handles()
            .iter()
            .map(|h| h.borrow().id().to_string())
            .collect();
        assert_eq!(ids, vec!["main", "overlay"]);
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let mut registry = DisplayRegistry::new();
        let original = handle("main");
        registry.insert("main", original.clone()).unwrap();
        let err = registry.insert("main", handle("main")).unwrap_err();
        assert!(matches!(err, AppError::DuplicateDisplay(id) if id == "main"));
        assert!(Rc::ptr_eq(&registry.get("main").unwrap(), &original));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn removing_primary_keeps_primary_reference() {
        let mut registry = DisplayRegistry::new();
        registry.insert("main", handle("main")).unwrap();
        registry.insert("side", handle("side")).unwrap();
        assert!(registry.remove("main").is_some());
        assert!(registry.remove("main").is_none());
        assert_eq!(registry.primary().unwrap().borrow().id(), "main");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn busy_displays_get_their_changes_queued() {
        let mut registry = DisplayRegistry::new();
        let busy = handle("busy");
        let idle = handle("idle");
        registry.insert("busy", busy.clone()).unwrap();
        registry.insert("idle", idle.clone()).unwrap();

        let guard = busy.borrow_mut();
        registry.set_enabled_all(false);
        registry.set_enabled_all(true);
        registry.set_enabled_all(false);
        assert!(!idle.borrow().enabled());
        drop(guard);
        assert!(busy.borrow().enabled());

        let pending = registry.take_pending();
        assert_eq!(pending.len(), 1);
        assert!(Rc::ptr_eq(&pending[0].0, &busy));
        assert_eq!(pending[0].1, PendingOp::SetEnabled(false));

        registry.defer_enabled(&busy, true);
        registry.defer_destroy(&busy);
        registry.defer_enabled(&busy, false);
        let pending = registry.take_pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].1, PendingOp::Destroy);
        assert!(registry.take_pending().is_empty());
    }

    #[test]
    fn release_all_empties_both_containers() {
        let mut registry = DisplayRegistry::new();
        registry.insert("main", handle("main")).unwrap();
        let released = registry.release_all();
        assert_eq!(released.len(), 1);
        assert!(registry.is_empty());
        assert!(registry.get("main").is_none());
        assert!(registry.is_released());
    }
}
