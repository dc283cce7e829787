//! # Remote Stubs
//!
//! A [`RemoteStub`] is the local surrogate for an object living in the peer
//! isolate. It carries the remote identity and forwards every invocation to
//! its channel's outbound path. Stubs are cached per identity by the
//! registry, and hold their channel weakly so a cached stub never keeps a
//! channel alive.

use std::sync::Arc;

use isowire::ObjectRef;
use isowire::RemoteInstance;
use isowire::RemoteMethodSignature;
use isowire::Value;

use crate::channel::WeakChannel;
use crate::error::Error;
use crate::error::Result;

pub struct RemoteStub {
    instance: RemoteInstance,
    channel: WeakChannel,
}

impl RemoteStub {
    pub(crate) fn new(instance: RemoteInstance, channel: WeakChannel) -> Self {
        Self { instance, channel }
    }

    /// The stub for a value, if it is one.
    pub fn from_value(value: &Value) -> Option<Arc<RemoteStub>> {
        value.as_object().and_then(Self::from_object)
    }

    pub fn from_object(obj: &ObjectRef) -> Option<Arc<RemoteStub>> {
        obj.downcast::<RemoteStub>()
    }

    pub fn instance(&self) -> &RemoteInstance {
        &self.instance
    }

    pub fn implements(&self, interface: &str) -> bool {
        self.instance.implements(interface)
    }

    /// Invokes `method` remotely, blocking the current thread.
    pub fn invoke(&self, method: &RemoteMethodSignature, args: Vec<Value>) -> Result<Value> {
        let channel = self.channel.upgrade().ok_or(Error::ConnectionClosed)?;
        channel.invoke_remote(&self.instance, method, args)
    }

    pub async fn invoke_async(&self, method: &RemoteMethodSignature, args: Vec<Value>) -> Result<Value> {
        let channel = self.channel.upgrade().ok_or(Error::ConnectionClosed)?;
        channel.invoke_remote_async(&self.instance, method, args).await
    }

    /// Invokes a method of the first interface this stub claims.
    pub fn call<P, S>(&self, method: &str, params: P, args: Vec<Value>) -> Result<Value>
    where
        P: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let sig = self.signature(method, params)?;
        self.invoke(&sig, args)
    }

    pub async fn call_async<P, S>(&self, method: &str, params: P, args: Vec<Value>) -> Result<Value>
    where
        P: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let sig = self.signature(method, params)?;
        self.invoke_async(&sig, args).await
    }

    fn signature<P, S>(&self, method: &str, params: P) -> Result<RemoteMethodSignature>
    where
        P: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let interface = self.instance.interfaces().first().ok_or_else(|| {
            Error::Usage(format!("Remote instance {} declares no interface", self.instance))
        })?;
        Ok(RemoteMethodSignature::new(interface.clone(), method, params))
    }
}

impl std::fmt::Debug for RemoteStub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RemoteStub({})", self.instance)
    }
}
