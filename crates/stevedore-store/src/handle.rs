use crate::layout::StoreLayout;
use crate::StoreError;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

/// An open handle on the local build store.
///
/// Opening takes a shared advisory lock on the store's lock file, so several
/// backends may use one store concurrently while tooling that needs the store
/// to itself can wait for an exclusive lock. The handle is released once by
/// [`close`](Self::close); every later call reports [`StoreError::Closed`].
pub struct BuildStore {
    layout: StoreLayout,
    lock_file: Mutex<Option<File>>,
}

impl BuildStore {
    pub fn open(layout: StoreLayout) -> Result<Self, StoreError> {
        layout.initialize()?;

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(layout.lock_file())?;

        file.lock_shared()
            .map_err(|e| StoreError::LockFailed(format!("{}: {e}", layout.lock_file().display())))?;

        debug!(
            "opened build store graph_root={} run_root={}",
            layout.graph_root().display(),
            layout.run_root().display()
        );

        Ok(Self {
            layout,
            lock_file: Mutex::new(Some(file)),
        })
    }

    fn guard(&self) -> MutexGuard<'_, Option<File>> {
        // The guarded value is only ever replaced with None; a poisoned lock
        // still holds a consistent Option.
        self.lock_file
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// The store layout, or `Closed` if the handle has been released.
    pub fn layout(&self) -> Result<&StoreLayout, StoreError> {
        if self.guard().is_none() {
            return Err(StoreError::Closed);
        }
        Ok(&self.layout)
    }

    pub fn is_closed(&self) -> bool {
        self.guard().is_none()
    }

    /// Release the store. Closing an already closed handle is a no-op.
    pub fn close(&self) -> Result<(), StoreError> {
        let Some(file) = self.guard().take() else {
            return Ok(());
        };
        file.sync_all()?;
        file.unlock()
            .map_err(|e| StoreError::LockFailed(format!("unlock: {e}")))?;
        debug!("closed build store {}", self.layout.graph_root().display());
        Ok(())
    }
}

impl Drop for BuildStore {
    fn drop(&mut self) {
        if let Some(file) = self.guard().take() {
            let _ = file.unlock();
        }
    }
}
