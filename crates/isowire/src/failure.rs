//! # Remote Failures
//!
//! The throwable carried by a failing [`crate::RemoteReturn`].
//!
//! These are distinct from [`crate::Error`]: a `RemoteFailure` is something
//! the *remote call* produced (the invoked method failed, the target was not
//! exported, the connection went away), whereas `Error` is the wire layer
//! itself failing. Fidelity is a type tag, a message and an optional cause
//! chain.

use serde::Deserialize;
use serde::Serialize;

/// Generic failure of the remote machinery (not of the invoked method).
pub const REMOTE_EXCEPTION: &str = "RemoteException";
/// Synthesized for calls still pending when their channel closes.
pub const CONNECTION_CLOSED: &str = "ConnectionClosed";
/// Argument shape did not match what the method expected.
pub const ILLEGAL_ARGUMENT: &str = "IllegalArgumentException";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFailure {
    pub kind: String,
    pub message: String,
    pub cause: Option<Box<RemoteFailure>>,
}

impl RemoteFailure {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            cause: None,
        }
    }

    /// A failure of the remote machinery rather than of application code.
    pub fn remote(message: impl Into<String>) -> Self {
        Self::new(REMOTE_EXCEPTION, message)
    }

    pub fn connection_closed() -> Self {
        Self::new(CONNECTION_CLOSED, "Connection closed")
    }

    pub fn illegal_argument(message: impl Into<String>) -> Self {
        Self::new(ILLEGAL_ARGUMENT, message)
    }

    pub fn with_cause(mut self, cause: RemoteFailure) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    pub fn is_connection_closed(&self) -> bool {
        self.kind == CONNECTION_CLOSED
    }

    /// Innermost failure of the cause chain.
    pub fn root_cause(&self) -> &RemoteFailure {
        let mut current = self;
        while let Some(cause) = &current.cause {
            current = cause;
        }
        current
    }
}

impl std::fmt::Display for RemoteFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        if let Some(cause) = &self.cause {
            write!(f, " (caused by {})", cause)?;
        }
        Ok(())
    }
}

impl std::error::Error for RemoteFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause.as_deref().map(|c| c as &(dyn std::error::Error + 'static))
    }
}

impl From<crate::Error> for RemoteFailure {
    fn from(e: crate::Error) -> Self {
        match e {
            crate::Error::TypeMismatch { .. } => Self::illegal_argument(e.to_string()),
            other => Self::remote(other.to_string()),
        }
    }
}
