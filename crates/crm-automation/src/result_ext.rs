//! Result extension trait for logging errors with context.
//!
//! Used at the points where the engine deliberately swallows an error
//! (scheduler submission after a committed write, best-effort audit writes)
//! so the failure still reaches the logs with its call site.

use std::fmt::Display;
use tracing::error;

/// Extension trait for logging errors with context.
pub trait ResultExt<T, E> {
    /// Log the error with context if this is an `Err` variant.
    ///
    /// Returns the original `Result` unchanged.
    ///
    /// ```ignore
    /// use crm_automation::result_ext::ResultExt;
    ///
    /// let result: Result<i32, &str> = Err("scheduler closed");
    /// let _ = result.log("submitting dispatch");
    /// ```
    fn log<S: ToString>(self, context: S) -> Result<T, E>;
}

impl<T, E: Display> ResultExt<T, E> for Result<T, E> {
    #[track_caller]
    fn log<S: ToString>(self, context: S) -> Result<T, E> {
        if let Err(ref e) = self {
            let caller_location = std::panic::Location::caller();
            error!(
                target: "crm_automation",
                error = %e,
                file = %format!("{}:{}", caller_location.file(), caller_location.line()),
                context = %context.to_string(),
                "Operation failed"
            );
        }
        self
    }
}
