//! # Method Resolution
//!
//! There is no runtime reflection to look a method up by name, so every
//! interface that can be invoked remotely is described up front by an
//! [`Interface`]: a table from (method name, canonical parameter types) to a
//! handler closure. The tables are collected in an [`InterfaceRegistry`],
//! built once at startup and shared by all channels.
//!
//! Each channel owns a [`MethodResolver`] that caches lookups by signature
//! value. The cache is unbounded; the signature space is bounded by the
//! registered interfaces.
//!
//! ## Polymorphism
//!
//! A typed handler downcasts the target object to one concrete type. To
//! serve an interface from several implementations, export trait objects
//! (`ObjectRef::from_shared(api)` with `api: Arc<dyn MyApi>`) and register
//! the handler against `Arc<dyn MyApi>`. Wrapping the same `Arc` again gives
//! the same identity.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use isowire::FromValue;
use isowire::ObjectRef;
use isowire::RemoteFailure;
use isowire::RemoteMethodSignature;
use isowire::Value;
use isowire::types::canonical_params;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// No interface of that name was registered.
    UnknownInterface(String),
    /// The interface has no method with that name and parameter list.
    NoSuchMethod(RemoteMethodSignature),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownInterface(name) => write!(f, "Interface '{}' is not registered", name),
            Self::NoSuchMethod(sig) => write!(f, "No method matches {}", sig),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// A resolved, invokable method.
pub type Handler = Arc<dyn Fn(&ObjectRef, Args) -> std::result::Result<Value, RemoteFailure> + Send + Sync>;

/// Positional call arguments handed to a handler.
#[derive(Debug, Clone, Default)]
pub struct Args(Vec<Value>);

impl Args {
    pub fn new(values: Vec<Value>) -> Self {
        Self(values)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Converts argument `index`, leaving `Value::Unit` in its place.
    pub fn take<T: FromValue>(&mut self, index: usize) -> std::result::Result<T, RemoteFailure> {
        let slot = self.0.get_mut(index).ok_or_else(|| {
            RemoteFailure::illegal_argument(format!("Missing argument {}", index))
        })?;
        let value = std::mem::replace(slot, Value::Unit);
        T::from_value(value).map_err(|e| {
            RemoteFailure::illegal_argument(format!("Argument {}: {}", index, e))
        })
    }

    /// Converts a copy of argument `index`.
    pub fn get<T: FromValue>(&self, index: usize) -> std::result::Result<T, RemoteFailure> {
        let value = self.0.get(index).cloned().ok_or_else(|| {
            RemoteFailure::illegal_argument(format!("Missing argument {}", index))
        })?;
        T::from_value(value).map_err(|e| {
            RemoteFailure::illegal_argument(format!("Argument {}: {}", index, e))
        })
    }

    pub fn into_vec(self) -> Vec<Value> {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct MethodKey {
    name: String,
    params: Vec<String>,
}

/// Dispatch table for one named interface.
#[derive(Clone)]
pub struct Interface {
    name: String,
    methods: HashMap<MethodKey, Handler>,
}

impl Interface {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Adds a method whose target must be a `T`.
    ///
    /// A target of any other type fails the call with a remote failure
    /// rather than invoking the handler.
    pub fn method<T, F, P, S>(self, name: impl Into<String>, params: P, f: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&T, Args) -> std::result::Result<Value, RemoteFailure> + Send + Sync + 'static,
        P: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let interface = self.name.clone();
        let handler: Handler = Arc::new(move |target: &ObjectRef, args: Args| {
            let Some(typed) = target.downcast_ref::<T>() else {
                return Err(RemoteFailure::remote(format!(
                    "Target {} does not implement {}",
                    target.type_name(),
                    interface
                )));
            };
            f(typed, args)
        });
        self.raw_method(name, params, handler)
    }

    /// Adds a method with an untyped handler.
    pub fn raw_method<P, S>(mut self, name: impl Into<String>, params: P, handler: Handler) -> Self
    where
        P: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let key = MethodKey {
            name: name.into(),
            params: canonical_params(params),
        };
        self.methods.insert(key, handler);
        self
    }

    /// Builds the signature of one of this interface's methods.
    pub fn signature<P, S>(&self, method: &str, params: P) -> RemoteMethodSignature
    where
        P: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        RemoteMethodSignature::new(self.name.clone(), method, params)
    }

    fn lookup(&self, sig: &RemoteMethodSignature) -> Option<Handler> {
        let key = MethodKey {
            name: sig.method().to_string(),
            params: sig.params().to_vec(),
        };
        self.methods.get(&key).cloned()
    }

    pub fn method_count(&self) -> usize {
        self.methods.len()
    }
}

impl std::fmt::Debug for Interface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interface")
            .field("name", &self.name)
            .field("methods", &self.methods.len())
            .finish()
    }
}

/// All interfaces known to this process.
#[derive(Clone, Debug, Default)]
pub struct InterfaceRegistry {
    interfaces: HashMap<String, Interface>,
}

impl InterfaceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an interface, merging its methods into an existing one of the
    /// same name.
    pub fn register(&mut self, interface: Interface) -> &mut Self {
        match self.interfaces.get_mut(&interface.name) {
            Some(existing) => existing.methods.extend(interface.methods),
            None => {
                self.interfaces.insert(interface.name.clone(), interface);
            }
        }
        self
    }

    pub fn with(mut self, interface: Interface) -> Self {
        self.register(interface);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Interface> {
        self.interfaces.get(name)
    }

    pub fn len(&self) -> usize {
        self.interfaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interfaces.is_empty()
    }
}

/// Per-channel signature → handler cache over a shared registry.
pub struct MethodResolver {
    registry: Arc<InterfaceRegistry>,
    cache: DashMap<RemoteMethodSignature, Handler>,
}

impl MethodResolver {
    pub fn new(registry: Arc<InterfaceRegistry>) -> Self {
        Self {
            registry,
            cache: DashMap::new(),
        }
    }

    pub fn resolve(&self, sig: &RemoteMethodSignature) -> Result<Handler> {
        if let Some(handler) = self.cache.get(sig) {
            return Ok(handler.value().clone());
        }

        let interface = self
            .registry
            .get(sig.interface())
            .ok_or_else(|| Error::UnknownInterface(sig.interface().to_string()))?;
        let handler = interface
            .lookup(sig)
            .ok_or_else(|| Error::NoSuchMethod(sig.clone()))?;

        self.cache.insert(sig.clone(), handler.clone());
        Ok(handler)
    }

    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    pub fn registry(&self) -> &Arc<InterfaceRegistry> {
        &self.registry
    }
}
