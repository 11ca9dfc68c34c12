//! Process environment overrides scoped to cluster bootstrap.

use std::env;
use std::sync::{Mutex, MutexGuard, PoisonError};

static ENV_LOCK: Mutex<()> = Mutex::new(());

/// Applies environment overrides until dropped, then restores prior values.
///
/// Holds a process-wide lock for its lifetime so concurrent bootstraps cannot
/// observe each other's overrides.
pub(super) struct ScopedEnv {
    restore: Vec<(String, Option<String>)>,
    _lock: MutexGuard<'static, ()>,
}

impl ScopedEnv {
    /// Sets (`Some`) or removes (`None`) each variable.
    pub(super) fn apply(overrides: &[(String, Option<String>)]) -> Self {
        let lock = ENV_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
        let restore = overrides
            .iter()
            .map(|(key, value)| {
                let prior = env::var(key).ok();
                write_var(key, value.as_deref());
                (key.clone(), prior)
            })
            .collect();
        Self {
            restore,
            _lock: lock,
        }
    }
}

impl Drop for ScopedEnv {
    fn drop(&mut self) {
        for (key, prior) in self.restore.drain(..).rev() {
            write_var(&key, prior.as_deref());
        }
    }
}

fn write_var(key: &str, value: Option<&str>) {
    // SAFETY: every mutation happens while ENV_LOCK is held.
    unsafe {
        match value {
            Some(present) => env::set_var(key, present),
            None => env::remove_var(key),
        }
    }
}
