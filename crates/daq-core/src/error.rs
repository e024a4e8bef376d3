//! Error types shared by every acquisition component.
//!
//! `DaqError` separates the failure classes an orchestrator has to treat
//! differently:
//!
//! - **`Precondition`**: lifecycle misuse such as `complete()` before
//!   `kickoff()`. Fatal, never retried.
//! - **`Timeout`**: a single hardware operation did not finish in time. Carries
//!   the operation identity so retry policy can be decided by the caller.
//! - **`Stalled`**: the writer stopped committing frames for longer than the
//!   stall budget. Fatal to the current session.
//!
//! "No new data yet" is not an error and has no variant here.

use std::time::Duration;
use thiserror::Error;

/// Convenience alias for results using the acquisition error type.
pub type DaqResult<T> = std::result::Result<T, DaqError>;

/// Primary error type for signals, devices and lifecycle operations.
#[derive(Error, Debug)]
pub enum DaqError {
    /// A lifecycle operation was called out of order.
    #[error("Precondition violated: {0}")]
    Precondition(String),

    /// A single hardware operation exceeded its timeout.
    #[error("Timeout after {timeout:?} waiting for {operation}")]
    Timeout {
        /// Signal name or operation that timed out.
        operation: String,
        /// The budget that elapsed.
        timeout: Duration,
    },

    /// No new frames were committed within the stall budget.
    #[error("{name}: writing stalled on frame {frame}")]
    Stalled {
        /// Artifact (data key) name.
        name: String,
        /// Frame index at which progress stopped.
        frame: u64,
    },

    /// A signal put or get failed in the backend.
    #[error("Signal error: {0}")]
    Signal(String),

    /// A pending status was cancelled before it finished.
    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    /// Filesystem errors, e.g. while allocating an output directory.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DaqError {
    /// Build a precondition error.
    pub fn precondition(msg: impl Into<String>) -> Self {
        DaqError::Precondition(msg.into())
    }

    /// True for failures caused by caller misuse.
    pub fn is_precondition(&self) -> bool {
        matches!(self, DaqError::Precondition(_))
    }

    /// True for single-operation timeouts.
    pub fn is_timeout(&self) -> bool {
        matches!(self, DaqError::Timeout { .. })
    }

    /// True when the writer stopped making progress.
    pub fn is_stall(&self) -> bool {
        matches!(self, DaqError::Stalled { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stall_display() {
        let err = DaqError::Stalled {
            name: "deta".into(),
            frame: 1,
        };
        assert_eq!(err.to_string(), "deta: writing stalled on frame 1");
        assert!(err.is_stall());
        assert!(!err.is_timeout());
    }

    #[test]
    fn test_timeout_carries_operation() {
        let err = DaqError::Timeout {
            operation: "det-drv-acquire".into(),
            timeout: Duration::from_secs(10),
        };
        assert!(err.to_string().contains("det-drv-acquire"));
        assert!(err.is_timeout());
    }

    #[test]
    fn test_precondition() {
        let err = DaqError::precondition("Kickoff not run");
        assert!(err.is_precondition());
        assert_eq!(err.to_string(), "Precondition violated: Kickoff not run");
    }
}
