//! Early-termination signals raised by test bodies.
//!
//! A body returns `Err(Signal)` (usually through `?`) to stop with a specific
//! outcome. The wrapper in [`crate::harness`] matches every variant; nothing
//! raised by a body escapes it.

use std::backtrace::Backtrace;
use std::fmt;

use crate::client::ClientError;
use crate::resource::ModelError;
use crate::result::{Message, Verdict};

/// What a test body produces: `Ok(None)` when it ran to completion,
/// `Ok(Some(verdict))` when it built its own outcome, `Err` to stop early.
pub type TestOutcome = Result<Option<Verdict>, Signal>;

/// A non-local test outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    /// An assertion the test author wrote was not satisfied.
    Fail {
        message: Message,
        data: Option<String>,
    },
    /// Preconditions were not met; the test should not be judged.
    Skip { reason: Option<String> },
    /// An unexpected failure (collaborator error, defect in the test).
    Error {
        message: String,
        data: Option<String>,
    },
}

impl Signal {
    pub fn fail(message: impl Into<Message>) -> Self {
        Signal::Fail {
            message: message.into(),
            data: None,
        }
    }

    pub fn fail_with(message: impl Into<Message>, data: impl Into<String>) -> Self {
        Signal::Fail {
            message: message.into(),
            data: Some(data.into()),
        }
    }

    pub fn skip(reason: impl Into<String>) -> Self {
        Signal::Skip {
            reason: Some(reason.into()),
        }
    }

    /// An error carrying a backtrace of the point where it was raised.
    pub fn error(message: impl Into<String>) -> Self {
        Signal::Error {
            message: message.into(),
            data: Some(Backtrace::force_capture().to_string()),
        }
    }

    pub fn is_fail(&self) -> bool {
        matches!(self, Signal::Fail { .. })
    }

    pub fn is_skip(&self) -> bool {
        matches!(self, Signal::Skip { .. })
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Fail { message, .. } => write!(f, "assertion failed: {}", message),
            Signal::Skip { reason: Some(reason) } => write!(f, "skipped: {}", reason),
            Signal::Skip { reason: None } => write!(f, "skipped"),
            Signal::Error { message, .. } => write!(f, "error: {}", message),
        }
    }
}

impl From<ClientError> for Signal {
    fn from(err: ClientError) -> Self {
        Signal::error(err.to_string())
    }
}

impl From<ModelError> for Signal {
    fn from(err: ModelError) -> Self {
        Signal::error(err.to_string())
    }
}
