//! # isormi
//!
//! Remote method invocation between isolates. A [`Channel`] sits on one end
//! of a connection and lets code call methods on objects living in the peer
//! isolate as if they were local: the caller's thread blocks until the
//! matching return arrives, while inbound calls from the peer run in parallel
//! on an [`Executor`].
//!
//! ## Architecture
//!
//! - **Resolver** ([`resolver`]): interface tables mapping a method
//!   signature to a handler closure, with a per-channel cache.
//! - **Registry** ([`registry`]): local object ↔ [`RemoteInstance`]
//!   identity, the stub cache for imported identities, and named beans.
//! - **Marshaling** ([`marshal`]): the pluggable hook deciding how values
//!   are replaced before sending and resolved after receiving.
//! - **Tracker** ([`tracker`]): call id allocation and the table of callers
//!   waiting for a return.
//! - **Dispatcher**: runs inbound calls on the executor and
//!   answers each with exactly one return.
//! - **Channel** ([`channel`]): the façade tying the above to a transport.
//!
//! The transport side is thin: a channel only needs a
//! synchronous [`MessageSink`] for output and someone calling
//! [`Channel::handle_message`] for input. [`Connection`] provides both over
//! any byte [`Transport`].

pub mod builder;
pub mod channel;
pub mod connection;
mod dispatch;
pub mod error;
pub mod executor;
pub mod log;
pub mod marshal;
pub mod mock;
pub mod registry;
pub mod resolver;
pub mod stub;
pub mod tracker;
pub mod transport;

pub use builder::ChannelBuilder;
pub use builder::ChannelConfig;
pub use channel::Channel;
pub use channel::WeakChannel;
pub use connection::Connection;
pub use error::Error;
pub use error::Result;
pub use executor::Executor;
pub use executor::ThreadPerCall;
pub use executor::TokioBlocking;
pub use log::CriticalLog;
pub use log::TracingLog;
pub use marshal::ExportByType;
pub use marshal::Exported;
pub use marshal::Marshaled;
pub use marshal::Marshaler;
pub use marshal::PassThrough;
pub use resolver::Args;
pub use resolver::Interface;
pub use resolver::InterfaceRegistry;
pub use stub::RemoteStub;
pub use transport::MessageSink;
pub use transport::StreamTransport;
pub use transport::Transport;

pub use isowire::ObjectRef;
pub use isowire::RemoteCall;
pub use isowire::RemoteFailure;
pub use isowire::RemoteInstance;
pub use isowire::RemoteMessage;
pub use isowire::RemoteMethodSignature;
pub use isowire::RemoteReturn;
pub use isowire::Value;
