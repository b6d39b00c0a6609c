//! A model shared between threads.
//!
//! [`Model`] is single-threaded: evaluation needs `&mut` access from the
//! first call to the last cached write. Hosts that serve several threads put
//! it behind one lock and hold the guard for a whole operation.

use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::engine::Model;

#[derive(Debug, Clone)]
pub struct SharedModel {
    inner: Arc<Mutex<Model>>,
}

impl SharedModel {
    pub fn new(model: Model) -> Self {
        Self {
            inner: Arc::new(Mutex::new(model)),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, Model> {
        self.inner.lock()
    }

    /// Run `f` with exclusive access to the model.
    pub fn with<R>(&self, f: impl FnOnce(&mut Model) -> R) -> R {
        let mut guard = self.inner.lock();
        f(&mut guard)
    }

    /// The model, if this is the last handle to it.
    pub fn into_inner(self) -> Result<Model, SharedModel> {
        Arc::try_unwrap(self.inner)
            .map(Mutex::into_inner)
            .map_err(|inner| SharedModel { inner })
    }
}

impl From<Model> for SharedModel {
    fn from(model: Model) -> Self {
        Self::new(model)
    }
}
