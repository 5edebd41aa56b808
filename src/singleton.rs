//! Process-wide dispatcher lookup.
//!
//! At most one [`WebPool`] exists per process. The first caller of [`init`]
//! (or [`instance`]) builds it; everyone after that shares the same `Arc`.
//! [`reset_session`] drops it unless it was configured as persistent, and
//! [`shutdown`] always drops it.

use crate::config::WebPoolDesc;
use crate::error::Result;
use crate::web::{Transport, WebPool};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A lazily created, replaceable shared value.
pub struct Singleton<T> {
    slot: Mutex<Option<Arc<T>>>,
}

impl<T> Default for Singleton<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Singleton<T> {
    pub const fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    /// Returns the current value, building it with `init` if the slot is empty.
    ///
    /// Construction happens under the slot lock, so concurrent callers never
    /// build twice. A failed `init` leaves the slot empty.
    pub fn get_or_try_init<F, E>(&self, init: F) -> std::result::Result<Arc<T>, E>
    where
        F: FnOnce() -> std::result::Result<T, E>,
    {
        let mut slot = self.lock();
        if let Some(existing) = slot.as_ref() {
            return Ok(existing.clone());
        }
        let created = Arc::new(init()?);
        *slot = Some(created.clone());
        Ok(created)
    }

    pub fn get(&self) -> Option<Arc<T>> {
        self.lock().clone()
    }

    pub fn is_set(&self) -> bool {
        self.lock().is_some()
    }

    pub fn take(&self) -> Option<Arc<T>> {
        self.lock().take()
    }

    /// Empties the slot only when `predicate` holds for the current value.
    pub fn take_if<P>(&self, predicate: P) -> Option<Arc<T>>
    where
        P: FnOnce(&T) -> bool,
    {
        let mut slot = self.lock();
        if slot.as_deref().is_some_and(predicate) {
            slot.take()
        } else {
            None
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Arc<T>>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

static WEB_POOL: Singleton<WebPool> = Singleton::new();

/// Returns the process-wide dispatcher, creating it from `desc` if needed.
///
/// `desc` is ignored when a dispatcher already exists.
pub fn init(desc: WebPoolDesc) -> Result<Arc<WebPool>> {
    WEB_POOL.get_or_try_init(|| {
        log::info!("Creating process-wide web pool");
        WebPool::new(desc)
    })
}

pub fn init_with_transport(
    desc: WebPoolDesc,
    transport: Arc<dyn Transport>,
) -> Result<Arc<WebPool>> {
    WEB_POOL.get_or_try_init(|| {
        log::info!("Creating process-wide web pool with custom transport");
        WebPool::with_transport(desc, transport)
    })
}

/// The process-wide dispatcher, created with default settings on first use.
pub fn instance() -> Result<Arc<WebPool>> {
    init(WebPoolDesc::default())
}

pub fn exists() -> bool {
    WEB_POOL.is_set()
}

/// Drops the process-wide dispatcher. Returns whether one existed.
///
/// Outstanding `Arc`s keep working; the next [`instance`] call builds a new one.
pub fn shutdown() -> bool {
    let removed = WEB_POOL.take().is_some();
    if removed {
        log::info!("Process-wide web pool shut down");
    }
    removed
}

/// Ends a session: drops the dispatcher unless it is persistent.
pub fn reset_session() -> bool {
    let removed = WEB_POOL.take_if(|web| !web.is_persistent()).is_some();
    if removed {
        log::info!("Non-persistent web pool dropped with session");
    }
    removed
}
