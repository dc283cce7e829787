//! # Call Errors
//!
//! What a caller of a remote method can observe besides a normal return.
//! Apart from the communication cases this is indistinguishable in shape
//! from a local call that returned `Err`.

use isowire::RemoteFailure;

use crate::marshal;
use crate::transport;

#[derive(Debug, Clone)]
pub enum Error {
    /// The remote method failed; carries the original failure.
    Remote(RemoteFailure),
    /// The channel closed before (or while) the call could complete.
    ConnectionClosed,
    /// The blocked caller was interrupted, see [`crate::Channel::interrupt`].
    Interrupted,
    /// Sending failed; the channel has been closed as a consequence.
    Transport(transport::Error),
    /// An argument could not be prepared for transmission.
    Marshal(marshal::Error),
    /// The peer violated the protocol; the channel has been closed.
    Protocol(String),
    /// The call could not be formed locally.
    Usage(String),
}

impl Error {
    /// True for failures caused by the connection rather than by the call.
    pub fn is_communication(&self) -> bool {
        matches!(self, Self::ConnectionClosed | Self::Transport(_) | Self::Protocol(_))
    }

    /// The remote failure, if the remote method itself failed.
    pub fn remote_failure(&self) -> Option<&RemoteFailure> {
        match self {
            Self::Remote(f) => Some(f),
            _ => None,
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Remote(failure) => write!(f, "Remote failure: {}", failure),
            Self::ConnectionClosed => write!(f, "Connection closed"),
            Self::Interrupted => write!(f, "Call interrupted"),
            Self::Transport(e) => write!(f, "Call failed: {}", e),
            Self::Marshal(e) => write!(f, "Marshal error: {}", e),
            Self::Protocol(msg) => write!(f, "Protocol violation: {}", msg),
            Self::Usage(msg) => write!(f, "Invalid call: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Remote(failure) => Some(failure),
            Self::Transport(e) => Some(e),
            Self::Marshal(e) => Some(e),
            _ => None,
        }
    }
}

impl From<transport::Error> for Error {
    fn from(e: transport::Error) -> Self {
        Self::Transport(e)
    }
}

impl From<marshal::Error> for Error {
    fn from(e: marshal::Error) -> Self {
        Self::Marshal(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
