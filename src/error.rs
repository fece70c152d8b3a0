//! Error types used by the clockvisor runtime.
//!
//! This module defines three error enums:
//!
//! - [`TaskError`] — failures raised by scheduled actions.
//! - [`TransportError`] — failures raised by the message-bus transport.
//! - [`ConfigError`] — failures while loading device configuration.
//!
//! All types provide an `as_label()` helper producing a short stable
//! snake_case name for logs.

use thiserror::Error;

/// # Errors produced by scheduled actions.
///
/// The scheduler catches these at the scheduling boundary: the failure is
/// logged and the task keeps its slot for the next due tick. Nothing here
/// ever propagates out of the tick loop.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum TaskError {
    /// Action returned an error for this run.
    #[error("action failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// Action panicked; the panic was caught at the scheduling boundary.
    #[error("action panicked: {info}")]
    Panicked {
        /// Payload recovered from the panic, if any.
        info: String,
    },
}

impl TaskError {
    /// Convenience constructor for [`TaskError::Fail`].
    pub fn fail(error: impl Into<String>) -> Self {
        TaskError::Fail {
            error: error.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            TaskError::Fail { .. } => "task_failed",
            TaskError::Panicked { .. } => "task_panicked",
        }
    }
}

/// # Errors produced by the message-bus transport.
///
/// Publish and ping failures are reported to the caller, logged, and the
/// operation is dropped: delivery is at-most-once, there is no retry queue.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum TransportError {
    /// The transport has no live connection to the broker.
    #[error("transport is not connected")]
    NotConnected,

    /// The broker refused the operation.
    #[error("broker rejected the operation: {reason}")]
    Rejected {
        /// Reason reported by the broker, if any.
        reason: String,
    },

    /// The underlying connection failed mid-operation.
    #[error("transport i/o failed: {error}")]
    Io {
        /// The underlying error message.
        error: String,
    },
}

impl TransportError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            TransportError::NotConnected => "transport_not_connected",
            TransportError::Rejected { .. } => "transport_rejected",
            TransportError::Io { .. } => "transport_io",
        }
    }
}

/// Errors raised while parsing device configuration.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration text is not valid TOML (or has wrong field types).
    #[error("configuration is not valid TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_are_stable() {
        assert_eq!(TaskError::fail("boom").as_label(), "task_failed");
        assert_eq!(
            TaskError::Panicked {
                info: "x".to_string()
            }
            .as_label(),
            "task_panicked"
        );
        assert_eq!(
            TransportError::NotConnected.as_label(),
            "transport_not_connected"
        );
    }

    #[test]
    fn test_display_includes_message() {
        let err = TaskError::fail("sensor read failed");
        assert!(err.to_string().contains("sensor read failed"));
    }
}
