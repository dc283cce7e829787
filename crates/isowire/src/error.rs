//! # Error Definitions
//!
//! Failures of the wire layer itself: encoding, decoding, framing and value
//! conversion. Failures of a *remote call* are [`crate::RemoteFailure`]s and
//! travel inside a [`crate::RemoteReturn`] instead.

/// Operational failures of the wire layer.
#[derive(Debug)]
pub enum Error {
    /// The message could not be serialized (e.g. a live local object was left in it).
    Encode(rmp_serde::encode::Error),
    /// The payload was not a well-formed message.
    Decode(rmp_serde::decode::Error),
    /// A frame header announced more bytes than the configured limit.
    FrameTooLarge { len: u64, max: u32 },
    /// The stream ended in the middle of a frame.
    TruncatedFrame,
    /// Underlying stream failure.
    Io(std::io::Error),
    /// A value did not have the shape the receiver asked for.
    TypeMismatch { expected: &'static str, found: &'static str },
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Encode(e) => write!(f, "Encode error: {}", e),
            Self::Decode(e) => write!(f, "Decode error: {}", e),
            Self::FrameTooLarge { len, max } => write!(f, "Frame too large: {} > {}", len, max),
            Self::TruncatedFrame => write!(f, "Stream ended inside a frame"),
            Self::Io(e) => write!(f, "I/O error: {}", e),
            Self::TypeMismatch { expected, found } => {
                write!(f, "Type mismatch: expected {}, found {}", expected, found)
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Encode(e) => Some(e),
            Self::Decode(e) => Some(e),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<rmp_serde::encode::Error> for Error {
    fn from(e: rmp_serde::encode::Error) -> Self {
        Self::Encode(e)
    }
}

impl From<rmp_serde::decode::Error> for Error {
    fn from(e: rmp_serde::decode::Error) -> Self {
        Self::Decode(e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

/// A specialized Result type for wire operations.
pub type Result<T> = std::result::Result<T, Error>;
