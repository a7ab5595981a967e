//! Process-wide lock shared by file staging and child spawning
//!
//! A child forked while another thread still holds a staged file open for
//! writing inherits that descriptor until it execs, and executing the staged
//! file in that window fails with `ETXTBSY`. Every writer of to-be-executed
//! files and every spawner in the workspace takes this lock.

use std::sync::{Mutex, MutexGuard};

static SPAWN_LOCK: Mutex<()> = Mutex::new(());

/// Acquire the lock. A poisoned lock is still usable since it guards no data.
pub fn spawn_lock() -> MutexGuard<'static, ()> {
    SPAWN_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
