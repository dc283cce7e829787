//! # Channel
//!
//! One end of a connection: the façade over the registry, resolver,
//! marshaling, tracker and dispatcher, bound to one send primitive and one
//! execution pool.
//!
//! ## Lifecycle
//!
//! A channel is **open** from construction until [`Channel::close`], then
//! **closed** for good. Closing clears exports and stubs and fails every
//! pending outbound call exactly once; closing again does nothing. Dropping
//! the last handle closes the channel too.
//!
//! ## Failure policy
//!
//! Failures of a single call (unknown target or method, the method failing,
//! marshaling) are reported to that caller and leave the channel open.
//! Failures of the connection or the protocol (a send failing, a return
//! nobody waits for) close the channel.

use std::sync::Arc;
use std::sync::Weak;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use isowire::ObjectRef;
use isowire::RemoteCall;
use isowire::RemoteFailure;
use isowire::RemoteInstance;
use isowire::RemoteMessage;
use isowire::RemoteMethodSignature;
use isowire::RemoteReturn;
use isowire::Value;
use tokio::sync::watch;

use crate::builder::ChannelBuilder;
use crate::builder::ChannelConfig;
use crate::dispatch;
use crate::error::Error;
use crate::error::Result;
use crate::executor::Executor;
use crate::log::CriticalLog;
use crate::marshal;
use crate::marshal::Marshaler;
use crate::marshal::Walker;
use crate::registry::BeanTable;
use crate::registry::ObjectRegistry;
use crate::resolver::MethodResolver;
use crate::stub::RemoteStub;
use crate::tracker;
use crate::tracker::CallTracker;
use crate::tracker::Waiter;
use crate::transport::MessageSink;

pub(crate) struct Inner {
    config: ChannelConfig,
    sink: Box<dyn MessageSink>,
    executor: Arc<dyn Executor>,
    marshaler: Arc<dyn Marshaler>,
    resolver: MethodResolver,
    registry: ObjectRegistry,
    beans: BeanTable,
    tracker: CallTracker,
    log: Arc<dyn CriticalLog>,
    closed: AtomicBool,
    closed_tx: watch::Sender<bool>,
}

impl Inner {
    fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.registry.clear();
        let failed = self.tracker.drain_on_close();
        self.closed_tx.send_replace(true);
        tracing::info!(channel = %self.config.name, failed_calls = failed, "channel closed");
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// A cheaply cloneable handle to one end of a connection.
#[derive(Clone)]
pub struct Channel {
    inner: Arc<Inner>,
}

/// A handle that does not keep the channel alive.
#[derive(Clone)]
pub struct WeakChannel {
    inner: Weak<Inner>,
}

impl WeakChannel {
    pub fn upgrade(&self) -> Option<Channel> {
        self.inner.upgrade().map(|inner| Channel { inner })
    }
}

impl Channel {
    pub fn builder() -> ChannelBuilder {
        ChannelBuilder::new()
    }

    pub(crate) fn from_parts(
        config: ChannelConfig,
        sink: Box<dyn MessageSink>,
        executor: Arc<dyn Executor>,
        marshaler: Arc<dyn Marshaler>,
        resolver: MethodResolver,
        log: Arc<dyn CriticalLog>,
    ) -> Self {
        let (closed_tx, _) = watch::channel(false);
        tracing::debug!(channel = %config.name, "channel opened");
        Self {
            inner: Arc::new(Inner {
                config,
                sink,
                executor,
                marshaler,
                resolver,
                registry: ObjectRegistry::new(),
                beans: BeanTable::new(),
                tracker: CallTracker::new(),
                log,
                closed: AtomicBool::new(false),
                closed_tx,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    pub fn downgrade(&self) -> WeakChannel {
        WeakChannel {
            inner: Arc::downgrade(&self.inner),
        }
    }

    // ------------------------------------------------------------------
    // Publishing objects
    // ------------------------------------------------------------------

    /// Exports `obj` under `interfaces`, or returns its existing identity.
    ///
    /// Works on a closed channel too, but the identity can never be called.
    pub fn export_object<I, S>(&self, interfaces: I, obj: ObjectRef) -> RemoteInstance
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let interfaces: Vec<String> = interfaces.into_iter().map(Into::into).collect();
        self.inner.registry.export(&obj, &interfaces)
    }

    /// Binds `obj` under a well-known name; it is then marshaled as a bean
    /// reference instead of being exported.
    pub fn register_named_bean(&self, name: impl Into<String>, obj: ObjectRef) {
        self.inner.beans.bind(name, obj);
    }

    pub fn named_bean(&self, name: &str) -> Option<ObjectRef> {
        self.inner.beans.lookup(name)
    }

    /// The identity `obj` is known under on this channel, if any.
    pub fn remote_instance_of(&self, obj: &ObjectRef) -> Option<RemoteInstance> {
        self.inner.registry.identity_of(obj)
    }

    /// The local object exported under `instance`.
    pub fn resolve_local(&self, instance: &RemoteInstance) -> Option<ObjectRef> {
        self.inner.registry.resolve_local(instance)
    }

    /// Resolves an identity to the local original or the cached stub.
    pub fn import(&self, instance: &RemoteInstance) -> ObjectRef {
        let make_stub = self.stub_factory();
        self.inner.registry.resolve(instance, make_stub)
    }

    /// The stub for a peer's identity; `None` if the identity is local.
    pub fn stub(&self, instance: &RemoteInstance) -> Option<Arc<RemoteStub>> {
        RemoteStub::from_object(&self.import(instance))
    }

    fn stub_factory(&self) -> impl Fn(&RemoteInstance) -> ObjectRef + use<> {
        let channel = self.downgrade();
        move |instance: &RemoteInstance| ObjectRef::new(RemoteStub::new(instance.clone(), channel.clone()))
    }

    // ------------------------------------------------------------------
    // Outbound calls
    // ------------------------------------------------------------------

    /// Invokes `method` on the peer's `target` and blocks until it returns.
    ///
    /// # Panics
    ///
    /// Blocks the thread, so it must not be called from an async task; use
    /// [`Channel::invoke_remote_async`] there.
    pub fn invoke_remote(
        &self,
        target: &RemoteInstance,
        method: &RemoteMethodSignature,
        args: Vec<Value>,
    ) -> Result<Value> {
        let waiter = self.begin_call(target, method, args)?;
        let outcome = waiter.wait();
        self.finish_call(outcome)
    }

    /// Async form of [`Channel::invoke_remote`].
    ///
    /// Dropping the future abandons the call: its return, when it arrives,
    /// is absorbed silently.
    pub async fn invoke_remote_async(
        &self,
        target: &RemoteInstance,
        method: &RemoteMethodSignature,
        args: Vec<Value>,
    ) -> Result<Value> {
        let waiter = self.begin_call(target, method, args)?;
        let mut guard = AbandonOnDrop {
            tracker: &self.inner.tracker,
            id: waiter.id(),
            armed: true,
        };
        let outcome = waiter.wait_async().await;
        guard.armed = false;
        self.finish_call(outcome)
    }

    /// Wakes the caller blocked on `call_id` with [`Error::Interrupted`].
    pub fn interrupt(&self, call_id: u64) -> bool {
        self.inner.tracker.interrupt(call_id)
    }

    /// Ids of outbound calls still waiting for their return.
    pub fn pending_calls(&self) -> Vec<u64> {
        self.inner.tracker.pending()
    }

    fn begin_call(
        &self,
        target: &RemoteInstance,
        method: &RemoteMethodSignature,
        args: Vec<Value>,
    ) -> Result<Waiter> {
        if self.is_closed() {
            return Err(Error::ConnectionClosed);
        }

        let args = args
            .into_iter()
            .map(|arg| self.marshal_value(arg))
            .collect::<marshal::Result<Vec<_>>>()?;

        let tracker = &self.inner.tracker;
        let waiter = loop {
            let id = tracker.next_call_id().map_err(|_| Error::ConnectionClosed)?;
            match tracker.register(id) {
                Ok(waiter) => break waiter,
                Err(tracker::Error::IdInUse(_)) => continue,
                Err(_) => return Err(Error::ConnectionClosed),
            }
        };

        let id = waiter.id();
        let call = RemoteCall::new(target.clone(), method.clone(), args, id);
        tracing::debug!(channel = %self.name(), call = %call, "sending remote call");

        if let Err(e) = self.inner.sink.send(RemoteMessage::Call(call)) {
            tracker.forget(id);
            tracing::error!(channel = %self.name(), call_id = id, error = %e, "failed to send remote call, closing channel");
            self.close();
            return Err(Error::Transport(e));
        }

        Ok(waiter)
    }

    fn finish_call(&self, outcome: tracker::Result<RemoteReturn>) -> Result<Value> {
        match outcome {
            Ok(RemoteReturn { result: Ok(value), .. }) => Ok(value),
            Ok(RemoteReturn { result: Err(failure), .. }) => {
                if failure.is_connection_closed() && self.is_closed() {
                    Err(Error::ConnectionClosed)
                } else {
                    Err(Error::Remote(failure))
                }
            }
            Err(_) if self.is_closed() => Err(Error::ConnectionClosed),
            Err(_) => Err(Error::Interrupted),
        }
    }

    // ------------------------------------------------------------------
    // Inbound messages
    // ------------------------------------------------------------------

    /// Feeds one received message into the channel.
    ///
    /// Calls are dispatched to the executor; returns wake their caller. An
    /// `Err` means the message broke the protocol and the channel is now
    /// closed.
    pub fn handle_message(&self, message: RemoteMessage) -> Result<()> {
        if self.is_closed() {
            tracing::debug!(channel = %self.name(), message = %message, "channel closed, dropping message");
            return Ok(());
        }

        match message {
            RemoteMessage::Call(call) => {
                dispatch::dispatch(self, call);
                Ok(())
            }
            RemoteMessage::Return(ret) => self.accept_return(ret),
        }
    }

    fn accept_return(&self, ret: RemoteReturn) -> Result<()> {
        let RemoteReturn { call_id, result } = ret;
        let result = match result {
            Ok(value) => self.resolve_value(value).map_err(|e| {
                RemoteFailure::remote(format!("Cannot resolve return value: {}", e))
            }),
            Err(failure) => Err(failure),
        };

        match self.inner.tracker.resolve(RemoteReturn { call_id, result }) {
            Ok(()) => Ok(()),
            Err(_) if self.is_closed() => Ok(()),
            Err(e) => {
                tracing::error!(channel = %self.name(), call_id, error = %e, "protocol violation, closing channel");
                self.close();
                Err(Error::Protocol(e.to_string()))
            }
        }
    }

    pub(crate) fn send_return(&self, ret: RemoteReturn) {
        if self.is_closed() {
            tracing::debug!(channel = %self.name(), call_id = ret.call_id, "channel closed, dropping return");
            return;
        }
        let call_id = ret.call_id;
        if let Err(e) = self.inner.sink.send(RemoteMessage::Return(ret)) {
            tracing::error!(channel = %self.name(), call_id, error = %e, "failed to send remote return, closing channel");
            self.close();
        }
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Closes the channel. Idempotent and safe from any thread.
    pub fn close(&self) {
        self.inner.shutdown();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Completes once the channel is closed.
    pub async fn closed(&self) {
        let mut rx = self.inner.closed_tx.subscribe();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    // ------------------------------------------------------------------
    // Crate internals
    // ------------------------------------------------------------------

    fn walker(&self) -> Walker<'_> {
        Walker {
            registry: &self.inner.registry,
            beans: &self.inner.beans,
            hook: self.inner.marshaler.as_ref(),
            log: self.inner.log.as_ref(),
            max_depth: self.inner.config.max_marshal_depth,
        }
    }

    pub(crate) fn marshal_value(&self, value: Value) -> marshal::Result<Value> {
        self.walker().replace(value)
    }

    pub(crate) fn resolve_value(&self, value: Value) -> marshal::Result<Value> {
        let make_stub = self.stub_factory();
        self.walker().resolve(value, &make_stub)
    }

    pub(crate) fn executor(&self) -> &dyn Executor {
        self.inner.executor.as_ref()
    }

    pub(crate) fn resolver(&self) -> &MethodResolver {
        &self.inner.resolver
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("name", &self.name())
            .field("closed", &self.is_closed())
            .finish()
    }
}

struct AbandonOnDrop<'a> {
    tracker: &'a CallTracker,
    id: u64,
    armed: bool,
}

impl Drop for AbandonOnDrop<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.tracker.interrupt(self.id);
        }
    }
}
