//! Shared handle for concurrent pool access.
//!
//! Mutations (insert, remove, sweeps) take the write lock so the entry
//! tables and all three indices update atomically. Read-only queries take
//! the read lock and always observe a fully-updated pool.

use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::mempool::Mempool;

/// Cloneable handle to one pool shared across threads.
#[derive(Clone, Default)]
pub struct SharedMempool {
    inner: Arc<RwLock<Mempool>>,
}

impl SharedMempool {
    pub fn new(pool: Mempool) -> Self {
        Self {
            inner: Arc::new(RwLock::new(pool)),
        }
    }

    /// Acquire shared read access.
    pub fn read(&self) -> RwLockReadGuard<'_, Mempool> {
        self.inner.read()
    }

    /// Acquire exclusive write access.
    pub fn write(&self) -> RwLockWriteGuard<'_, Mempool> {
        self.inner.write()
    }
}
