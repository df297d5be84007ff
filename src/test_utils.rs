use std::sync::{Mutex, MutexGuard, OnceLock};

use tempfile::TempDir;

use crate::modules::system::config::DATA_DIR_ENV;

static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

/// Serializes tests that touch process environment variables.
pub(crate) fn lock_env() -> MutexGuard<'static, ()> {
    ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Sets or clears one variable and restores the previous value on drop.
pub(crate) struct ScopedEnvVar {
    key: &'static str,
    previous: Option<String>,
}

impl ScopedEnvVar {
    pub(crate) fn set(key: &'static str, value: &str) -> Self {
        let previous = std::env::var(key).ok();
        std::env::set_var(key, value);
        Self { key, previous }
    }

    pub(crate) fn unset(key: &'static str) -> Self {
        let previous = std::env::var(key).ok();
        std::env::remove_var(key);
        Self { key, previous }
    }
}

impl Drop for ScopedEnvVar {
    fn drop(&mut self) {
        match self.previous.take() {
            Some(value) => std::env::set_var(self.key, value),
            None => std::env::remove_var(self.key),
        }
    }
}

/// Points the data dir at a fresh temp directory for the guard's lifetime.
/// Hold [`lock_env`] while using it.
pub(crate) struct ScopedDataDir {
    pub(crate) dir: TempDir,
    _env: ScopedEnvVar,
}

impl ScopedDataDir {
    pub(crate) fn new() -> Self {
        let dir = tempfile::tempdir().expect("create temp data dir");
        let env = ScopedEnvVar::set(
            DATA_DIR_ENV,
            dir.path().to_str().expect("utf-8 temp path"),
        );
        Self { dir, _env: env }
    }
}
