//! # Marshaling
//!
//! Values cross the channel in two steps that mirror each other.
//!
//! **Replace before send.** Walking the value tree, each live object is
//! replaced by:
//! 1. a bean reference, if it is bound under a name;
//! 2. its identity reference, if it already has one (an export or a stub);
//! 3. whatever the [`Marshaler`] hook decides; an [`Exported`] answer is
//!    exported on the spot and replaced by the fresh identity.
//!
//! A live object left over after the hook cannot be transmitted.
//!
//! **Resolve after receive.** A bean reference resolves through the name
//! table (an unknown name is logged and becomes `Value::Unit`), an identity
//! reference resolves to the local object if this side exported it and to a
//! stub otherwise, and everything else goes through the hook.
//!
//! ## Invariants
//! - Walks are bounded by the channel's configured depth.

use std::any::Any;
use std::any::TypeId;
use std::collections::BTreeMap;
use std::collections::HashMap;

use isowire::ObjectRef;
use isowire::RemoteInstance;
use isowire::Value;

use crate::log::CriticalLog;
use crate::registry::BeanTable;
use crate::registry::ObjectRegistry;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A live object that nothing knows how to transmit.
    NotExportable { type_name: &'static str },
    /// The value tree nests deeper than the configured limit.
    TooDeep { limit: usize },
    /// A marshaling hook rejected the value.
    Hook(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotExportable { type_name } => {
                write!(f, "Object of type {} is neither exported nor marshalable", type_name)
            }
            Self::TooDeep { limit } => write!(f, "Value nests deeper than {} levels", limit),
            Self::Hook(msg) => write!(f, "Marshaler rejected value: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// A request from the hook to export an object under the given interfaces.
#[derive(Debug, Clone)]
pub struct Exported {
    pub interfaces: Vec<String>,
    pub object: ObjectRef,
}

impl Exported {
    pub fn new<I, S>(interfaces: I, object: ObjectRef) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            interfaces: interfaces.into_iter().map(Into::into).collect(),
            object,
        }
    }
}

/// The hook's verdict on an outgoing value.
#[derive(Debug, Clone)]
pub enum Marshaled {
    /// Send this value (possibly the original, possibly a substitute).
    Value(Value),
    /// Export this object and send its identity.
    Export(Exported),
}

/// Pluggable policy applied to every node of every value crossing the channel.
pub trait Marshaler: Send + Sync + 'static {
    fn write_replace(&self, value: Value) -> Result<Marshaled> {
        Ok(Marshaled::Value(value))
    }

    fn read_resolve(&self, value: Value) -> Result<Value> {
        Ok(value)
    }
}

/// Leaves every value as it is.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassThrough;

impl Marshaler for PassThrough {}

/// Exports objects of registered concrete types automatically.
#[derive(Debug, Default, Clone)]
pub struct ExportByType {
    by_type: HashMap<TypeId, Vec<String>>,
}

impl ExportByType {
    pub fn new() -> Self {
        Self::default()
    }

    /// Objects of type `T` are exported under `interfaces` when sent.
    pub fn export<T, I, S>(mut self, interfaces: I) -> Self
    where
        T: Any,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.by_type
            .insert(TypeId::of::<T>(), interfaces.into_iter().map(Into::into).collect());
        self
    }
}

impl Marshaler for ExportByType {
    fn write_replace(&self, value: Value) -> Result<Marshaled> {
        if let Value::Object(obj) = &value {
            if let Some(interfaces) = self.by_type.get(&obj.type_id()) {
                return Ok(Marshaled::Export(Exported::new(interfaces.clone(), obj.clone())));
            }
        }
        Ok(Marshaled::Value(value))
    }
}

/// One channel's view of the state a walk needs.
pub(crate) struct Walker<'a> {
    pub registry: &'a ObjectRegistry,
    pub beans: &'a BeanTable,
    pub hook: &'a dyn Marshaler,
    pub log: &'a dyn CriticalLog,
    pub max_depth: usize,
}

impl Walker<'_> {
    /// Prepares a value for transmission.
    pub fn replace(&self, value: Value) -> Result<Value> {
        self.replace_at(value, 0)
    }

    fn replace_at(&self, value: Value, depth: usize) -> Result<Value> {
        if depth > self.max_depth {
            return Err(Error::TooDeep { limit: self.max_depth });
        }

        if let Value::Object(obj) = &value {
            if let Some(name) = self.beans.name_of(obj) {
                return Ok(Value::Bean(name));
            }
            if let Some(instance) = self.registry.identity_of(obj) {
                return Ok(Value::Remote(instance));
            }
        }

        match self.hook.write_replace(value)? {
            Marshaled::Export(exported) => {
                let instance = self.registry.export(&exported.object, &exported.interfaces);
                Ok(Value::Remote(instance))
            }
            Marshaled::Value(Value::Object(obj)) => Err(Error::NotExportable {
                type_name: obj.type_name(),
            }),
            Marshaled::Value(Value::List(items)) => items
                .into_iter()
                .map(|item| self.replace_at(item, depth + 1))
                .collect::<Result<Vec<_>>>()
                .map(Value::List),
            Marshaled::Value(Value::Map(entries)) => entries
                .into_iter()
                .map(|(k, v)| self.replace_at(v, depth + 1).map(|v| (k, v)))
                .collect::<Result<BTreeMap<_, _>>>()
                .map(Value::Map),
            Marshaled::Value(other) => Ok(other),
        }
    }

    /// Turns a received value back into local terms.
    pub fn resolve(&self, value: Value, make_stub: &dyn Fn(&RemoteInstance) -> ObjectRef) -> Result<Value> {
        self.resolve_at(value, make_stub, 0)
    }

    fn resolve_at(
        &self,
        value: Value,
        make_stub: &dyn Fn(&RemoteInstance) -> ObjectRef,
        depth: usize,
    ) -> Result<Value> {
        if depth > self.max_depth {
            return Err(Error::TooDeep { limit: self.max_depth });
        }

        match value {
            Value::Bean(name) => match self.beans.lookup(&name) {
                Some(bean) => Ok(Value::Object(bean)),
                None => {
                    self.log.critical(&format!("Cannot resolve bean named '{}'", name));
                    Ok(Value::Unit)
                }
            },
            Value::Remote(instance) => {
                Ok(Value::Object(self.registry.resolve(&instance, make_stub)))
            }
            other => match self.hook.read_resolve(other)? {
                Value::List(items) => items
                    .into_iter()
                    .map(|item| self.resolve_at(item, make_stub, depth + 1))
                    .collect::<Result<Vec<_>>>()
                    .map(Value::List),
                Value::Map(entries) => entries
                    .into_iter()
                    .map(|(k, v)| self.resolve_at(v, make_stub, depth + 1).map(|v| (k, v)))
                    .collect::<Result<BTreeMap<_, _>>>()
                    .map(Value::Map),
                resolved => Ok(resolved),
            },
        }
    }
}
