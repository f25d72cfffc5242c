//! Outcome of a single command invocation.

use serde::{Deserialize, Serialize};

/// Numeric outcome plus an optional user-facing error message.
///
/// A result with an error message is still a *returned* result: the router
/// forwards the message to the invoking source instead of raising.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    outcome: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error_message: Option<String>,
}

impl CommandResult {
    /// Outcome `1`, no message.
    pub const fn success() -> Self {
        Self {
            outcome: 1,
            error_message: None,
        }
    }

    /// Outcome `0`, no message. Used when a dispatch was vetoed.
    pub const fn empty() -> Self {
        Self {
            outcome: 0,
            error_message: None,
        }
    }

    pub const fn with_outcome(outcome: i32) -> Self {
        Self {
            outcome,
            error_message: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            outcome: 0,
            error_message: Some(message.into()),
        }
    }

    pub fn outcome(&self) -> i32 {
        self.outcome
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn is_success(&self) -> bool {
        self.error_message.is_none()
    }
}
