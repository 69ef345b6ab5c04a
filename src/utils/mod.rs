// Utility functions

use std::sync::{Mutex, MutexGuard};

// =============================================================================
// URL Helpers
// =============================================================================

/// Join a service base URL and an endpoint path without doubling slashes.
///
/// # Example
/// ```ignore
/// use crate::utils::join_url;
///
/// assert_eq!(join_url("http://localhost:3000/", "/reset"), "http://localhost:3000/reset");
/// ```
pub fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

// =============================================================================
// Error Handling Helpers
// =============================================================================

/// Extension trait for Result types to simplify error conversion to String.
///
/// # Example
/// ```ignore
/// use crate::utils::ResultExt;
///
/// let text = std::fs::read_to_string("config.toml")
///     .with_context("Failed to read config file")?;
/// ```
pub trait ResultExt<T> {
    /// Converts the error to a String with context message.
    fn with_context(self, msg: &str) -> Result<T, String>;
}

impl<T, E: std::fmt::Display> ResultExt<T> for Result<T, E> {
    fn with_context(self, msg: &str) -> Result<T, String> {
        self.map_err(|e| format!("{}: {}", msg, e))
    }
}

/// Safely acquire a mutex lock, recovering from poisoning by returning the guard.
/// Mailbox operations are single assignments, so a panicked writer cannot leave
/// the state half-updated.
pub fn lock_mutex_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            log::warn!("Mutex was poisoned, recovering: {}", poisoned);
            poisoned.into_inner()
        }
    }
}
