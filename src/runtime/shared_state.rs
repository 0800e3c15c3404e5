use std::any::{Any, TypeId, type_name};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use thiserror::Error;

/// Type-keyed resource map shared by the plugins of one application. Each
/// type appears at most once; a plugin publishes a resource during setup or
/// preload and later plugins pick it up by type.
#[derive(Clone, Default)]
pub struct SharedState {
    inner: Rc<RefCell<HashMap<TypeId, Rc<dyn Any>>>>,
}

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<T>(&self, value: T) -> Result<Rc<T>, SharedStateError>
    where
        T: 'static,
    {
        let value = Rc::new(value);
        self.insert_rc(value.clone())?;
        Ok(value)
    }

    pub fn insert_rc<T>(&self, value: Rc<T>) -> Result<(), SharedStateError>
    where
        T: 'static,
    {
        let mut guard = self.inner.borrow_mut();
        let type_id = TypeId::of::<T>();
        if guard.contains_key(&type_id) {
            return Err(SharedStateError::AlreadyExists(type_name::<T>()));
        }
        guard.insert(type_id, value);
        Ok(())
    }

    pub fn get<T>(&self) -> Result<Rc<T>, SharedStateError>
    where
        T: 'static,
    {
        let entry = self
            .inner
            .borrow()
            .get(&TypeId::of::<T>())
            .cloned()
            .ok_or(SharedStateError::Missing(type_name::<T>()))?;
        entry
            .downcast::<T>()
            .map_err(|_| SharedStateError::TypeMismatch(type_name::<T>()))
    }

    pub fn get_or_insert_with<T, F>(&self, make: F) -> Result<Rc<T>, SharedStateError>
    where
        T: 'static,
        F: FnOnce() -> T,
    {
        if let Ok(value) = self.get::<T>() {
            return Ok(value);
        }
        self.insert(make())
    }

    pub fn contains<T>(&self) -> bool
    where
        T: 'static,
    {
        self.inner.borrow().contains_key(&TypeId::of::<T>())
    }

    pub fn remove<T>(&self) -> Option<Rc<T>>
    where
        T: 'static,
    {
        let entry = self.inner.borrow_mut().remove(&TypeId::of::<T>())?;
        entry.downcast::<T>().ok()
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.borrow().is_empty()
    }

    /// Drop every resource. Entries are dropped after the map borrow ends so
    /// destructors may touch the map again.
    pub fn clear(&self) {
        let drained: Vec<Rc<dyn Any>> = self.inner.borrow_mut().drain().map(|(_, v)| v).collect();
        drop(drained);
    }
}

#[derive(Debug, Error)]
pub enum SharedStateError {
    #[error("resource `{0}` already exists")]
    AlreadyExists(&'static str),
    #[error("resource `{0}` missing")]
    Missing(&'static str),
    #[error("resource `{0}` type mismatch")]
    TypeMismatch(&'static str),
}
