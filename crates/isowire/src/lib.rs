//! # isowire
//!
//! The message model spoken between two isolates, and the byte framing used
//! to carry it over a stream.
//!
//! ## Architecture
//!
//! The runtime above this crate never sees bytes. It works with
//! [`RemoteMessage`] values: a [`RemoteCall`] travels from the caller to the
//! isolate that owns the target object, and exactly one [`RemoteReturn`]
//! travels back. Everything that crosses the wire is a [`Value`] tree whose
//! object references have already been replaced by [`RemoteInstance`]
//! identities or named-bean references.
//!
//! Encoding is MessagePack via `rmp-serde`; framing is a little-endian `u32`
//! length prefix followed by the payload.

pub mod codec;
pub mod error;
pub mod failure;
pub mod frame;
pub mod message;
pub mod types;
pub mod value;

pub use codec::decode;
pub use codec::encode;
pub use error::Error;
pub use error::Result;
pub use failure::RemoteFailure;
pub use frame::FrameConfig;
pub use frame::read_frame;
pub use frame::write_frame;
pub use message::RemoteCall;
pub use message::RemoteInstance;
pub use message::RemoteMessage;
pub use message::RemoteMethodSignature;
pub use message::RemoteReturn;
pub use value::FromValue;
pub use value::ObjectRef;
pub use value::Value;
