//! # Values
//!
//! The dynamic value tree carried as call arguments and return values.
//!
//! A `Value` exists in two forms. Before marshaling (and after resolution on
//! the receiving side) it may hold [`Value::Object`], a live local object.
//! On the wire it may only hold data and references: [`Value::Remote`] for an
//! exported identity and [`Value::Bean`] for a named bean. Serializing a tree
//! that still contains an `Object` fails.

use std::any::Any;
use std::any::TypeId;
use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;

use crate::error::Error;
use crate::error::Result;
use crate::message::RemoteInstance;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Unit,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    /// Reference to an object exported by one of the two peers.
    Remote(RemoteInstance),
    /// Reference to an object bound under a well-known name.
    Bean(String),
    /// A live local object. Never encoded.
    #[serde(skip)]
    Object(ObjectRef),
}

impl Value {
    /// Short name of the variant, used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unit => "unit",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "string",
            Self::Bytes(_) => "bytes",
            Self::List(_) => "list",
            Self::Map(_) => "map",
            Self::Remote(_) => "remote",
            Self::Bean(_) => "bean",
            Self::Object(_) => "object",
        }
    }

    pub fn is_unit(&self) -> bool {
        matches!(self, Self::Unit)
    }

    /// Borrows the live object, if this is one.
    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Self::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Converts into a concrete type, see [`FromValue`].
    pub fn into_typed<T: FromValue>(self) -> Result<T> {
        T::from_value(self)
    }
}

/// A shared handle to a live object.
///
/// Identity is the address of the shared allocation, so two handles cloned
/// from the same `Arc` are the same object and two equal-looking objects in
/// separate allocations are not.
///
/// Trait objects go through [`ObjectRef::from_shared`], which keys identity
/// on the pointee rather than on a fresh wrapper, so wrapping the same
/// `Arc<dyn Trait>` twice yields the same object.
#[derive(Clone)]
pub struct ObjectRef {
    inner: Arc<dyn Any + Send + Sync>,
    addr: usize,
    type_id: TypeId,
    type_name: &'static str,
}

impl ObjectRef {
    pub fn new<T: Any + Send + Sync>(obj: T) -> Self {
        Self::from_arc(Arc::new(obj))
    }

    pub fn from_arc<T: Any + Send + Sync>(obj: Arc<T>) -> Self {
        Self {
            addr: Arc::as_ptr(&obj) as *const () as usize,
            inner: obj,
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
        }
    }

    /// Wraps a possibly unsized shared object such as `Arc<dyn MyApi>`.
    ///
    /// The handle downcasts to `Arc<T>`. Identity is the pointee's address,
    /// the same one [`ObjectRef::from_arc`] gives the concrete `Arc`.
    pub fn from_shared<T>(obj: Arc<T>) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
    {
        Self {
            addr: Arc::as_ptr(&obj) as *const () as usize,
            inner: Arc::new(obj),
            type_id: TypeId::of::<Arc<T>>(),
            type_name: std::any::type_name::<Arc<T>>(),
        }
    }

    /// Address of the shared object; stable while any handle is alive.
    pub fn addr(&self) -> usize {
        self.addr
    }

    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        self.addr() == other.addr()
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Type of the shared object (not of the handle).
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn is<T: Any>(&self) -> bool {
        self.inner.is::<T>()
    }

    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.inner.clone().downcast::<T>().ok()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl std::fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ObjectRef({}@{:#x})", self.type_name, self.addr())
    }
}

/// Conversion out of a [`Value`] with a typed error.
pub trait FromValue: Sized {
    fn from_value(value: Value) -> Result<Self>;
}

fn mismatch<T>(expected: &'static str, found: &Value) -> Result<T> {
    Err(Error::TypeMismatch { expected, found: found.kind() })
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self> {
        Ok(value)
    }
}

impl FromValue for () {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Unit => Ok(()),
            other => mismatch("unit", &other),
        }
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Bool(b) => Ok(b),
            other => mismatch("bool", &other),
        }
    }
}

impl FromValue for i64 {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Int(v) => Ok(v),
            other => mismatch("int", &other),
        }
    }
}

impl FromValue for i32 {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Int(v) => i32::try_from(v).or_else(|_| mismatch("int (32-bit)", &Value::Int(v))),
            other => mismatch("int", &other),
        }
    }
}

/// Largest integer magnitude an `f64` represents exactly.
const MAX_EXACT_INT: u64 = 1 << 53;

impl FromValue for f64 {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Float(v) => Ok(v),
            Value::Int(v) if v.unsigned_abs() <= MAX_EXACT_INT => Ok(v as f64),
            other => mismatch("float", &other),
        }
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Str(s) => Ok(s),
            other => mismatch("string", &other),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Bytes(b) => Ok(b),
            other => mismatch("bytes", &other),
        }
    }
}

impl FromValue for Vec<Value> {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::List(items) => Ok(items),
            other => mismatch("list", &other),
        }
    }
}

impl FromValue for ObjectRef {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(obj) => Ok(obj),
            other => mismatch("object", &other),
        }
    }
}

impl FromValue for RemoteInstance {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Remote(ri) => Ok(ri),
            other => mismatch("remote", &other),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Unit => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Self::Unit
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(v.into())
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Self::Int(v.into())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Self::List(v)
    }
}

impl From<ObjectRef> for Value {
    fn from(v: ObjectRef) -> Self {
        Self::Object(v)
    }
}

impl From<RemoteInstance> for Value {
    fn from(v: RemoteInstance) -> Self {
        Self::Remote(v)
    }
}
