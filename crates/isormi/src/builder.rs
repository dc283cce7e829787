//! Channel builder and settings.
//!
//! The [`ChannelBuilder`] provides a fluent API for wiring a channel to its
//! collaborators: the interfaces it can serve, the pool inbound calls run
//! on, the marshaling hook and the critical log.
//!
//! # Example
//!
//! ```rust,no_run
//! # use isormi::{ChannelBuilder, Interface, RemoteMessage};
//! let channel = ChannelBuilder::new()
//!     .name("left")
//!     .interface(Interface::new("Calc"))
//!     .build(|_msg: RemoteMessage| -> isormi::transport::Result<()> { Ok(()) });
//! ```

use std::sync::Arc;

use crate::channel::Channel;
use crate::executor::Executor;
use crate::executor::ThreadPerCall;
use crate::executor::TokioBlocking;
use crate::log::CriticalLog;
use crate::log::TracingLog;
use crate::marshal::Marshaler;
use crate::marshal::PassThrough;
use crate::resolver::Interface;
use crate::resolver::InterfaceRegistry;
use crate::resolver::MethodResolver;
use crate::transport::MessageSink;

/// Plain settings of a channel.
#[derive(Clone, Debug)]
pub struct ChannelConfig {
    /// Shows up in every log line the channel emits.
    pub name: String,
    /// Nesting limit when walking lists and maps during marshaling.
    pub max_marshal_depth: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            name: "channel".to_string(),
            max_marshal_depth: 64,
        }
    }
}

/// Fluent builder for a [`Channel`].
pub struct ChannelBuilder {
    config: ChannelConfig,
    executor: Option<Arc<dyn Executor>>,
    marshaler: Arc<dyn Marshaler>,
    interfaces: Arc<InterfaceRegistry>,
    log: Arc<dyn CriticalLog>,
}

impl ChannelBuilder {
    /// Starts with default settings, no interfaces and the pass-through hook.
    pub fn new() -> Self {
        Self {
            config: ChannelConfig::default(),
            executor: None,
            marshaler: Arc::new(PassThrough),
            interfaces: Arc::new(InterfaceRegistry::new()),
            log: Arc::new(TracingLog),
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    pub fn config(mut self, config: ChannelConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the pool inbound calls run on.
    ///
    /// Defaults to tokio's blocking pool when built inside a runtime, and to
    /// a thread per call otherwise.
    pub fn executor(mut self, executor: impl Executor) -> Self {
        self.executor = Some(Arc::new(executor));
        self
    }

    pub fn marshaler(mut self, marshaler: impl Marshaler) -> Self {
        self.marshaler = Arc::new(marshaler);
        self
    }

    /// Shares an existing interface registry.
    pub fn interfaces(mut self, interfaces: Arc<InterfaceRegistry>) -> Self {
        self.interfaces = interfaces;
        self
    }

    /// Adds one interface to this builder's registry.
    pub fn interface(mut self, interface: Interface) -> Self {
        Arc::make_mut(&mut self.interfaces).register(interface);
        self
    }

    pub fn critical_log(mut self, log: impl CriticalLog) -> Self {
        self.log = Arc::new(log);
        self
    }

    /// Builds a channel whose outbound messages go to `sink`.
    pub fn build(self, sink: impl MessageSink) -> Channel {
        self.build_boxed(Box::new(sink))
    }

    pub(crate) fn build_boxed(self, sink: Box<dyn MessageSink>) -> Channel {
        let executor = self.executor.unwrap_or_else(default_executor);
        Channel::from_parts(
            self.config,
            sink,
            executor,
            self.marshaler,
            MethodResolver::new(self.interfaces),
            self.log,
        )
    }
}

impl Default for ChannelBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn default_executor() -> Arc<dyn Executor> {
    match TokioBlocking::try_current() {
        Some(pool) => Arc::new(pool),
        None => Arc::new(ThreadPerCall::default()),
    }
}
