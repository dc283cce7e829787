//! # Protocol Messages
//!
//! Defines the envelope exchanged between two channels (Call vs Return).
//!
//! ## Invariants
//! - A `RemoteInstance` is equal to another iff their tokens are equal; the
//!   interface list is descriptive only.
//! - Signature parameter names are canonical (see [`crate::types`]), so a
//!   signature built on either side hashes identically.
//! - Exactly one `RemoteReturn` answers each `RemoteCall`, correlated by `call_id`.

use std::hash::Hash;
use std::hash::Hasher;

use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

use crate::failure::RemoteFailure;
use crate::types::canonical;
use crate::types::canonical_params;
use crate::value::Value;

/// Cross-process identity of an exported object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteInstance {
    token: String,
    interfaces: Vec<String>,
}

impl RemoteInstance {
    /// Mints a fresh identity with a random token.
    pub fn generate<I, S>(interfaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_token(Uuid::new_v4().to_string(), interfaces)
    }

    pub fn with_token<I, S>(token: impl Into<String>, interfaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            token: token.into(),
            interfaces: interfaces.into_iter().map(Into::into).collect(),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn interfaces(&self) -> &[String] {
        &self.interfaces
    }

    pub fn implements(&self, interface: &str) -> bool {
        self.interfaces.iter().any(|i| i == interface)
    }
}

impl PartialEq for RemoteInstance {
    fn eq(&self, other: &Self) -> bool {
        self.token == other.token
    }
}

impl Eq for RemoteInstance {}

impl Hash for RemoteInstance {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.token.hash(state);
    }
}

impl std::fmt::Display for RemoteInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[{}]", self.token, self.interfaces.join(","))
    }
}

/// Names the method to invoke: declaring interface, method name and
/// canonical parameter types.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoteMethodSignature {
    interface: String,
    method: String,
    params: Vec<String>,
}

impl RemoteMethodSignature {
    pub fn new<I, S>(interface: impl Into<String>, method: impl Into<String>, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            interface: interface.into(),
            method: method.into(),
            params: canonical_params(params),
        }
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Re-canonicalizes parameter names; used on signatures that arrived
    /// from a peer which may not have folded them.
    pub fn normalized(mut self) -> Self {
        for p in self.params.iter_mut() {
            *p = canonical(p);
        }
        self
    }
}

impl std::fmt::Display for RemoteMethodSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}({})", self.interface, self.method, self.params.join(","))
    }
}

/// A request to invoke `method` on `target` in the peer isolate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteCall {
    pub target: RemoteInstance,
    pub method: RemoteMethodSignature,
    pub args: Vec<Value>,
    pub call_id: u64,
}

impl RemoteCall {
    pub fn new(target: RemoteInstance, method: RemoteMethodSignature, args: Vec<Value>, call_id: u64) -> Self {
        Self { target, method, args, call_id }
    }
}

impl std::fmt::Display for RemoteCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{} {} on {}", self.call_id, self.method, self.target.token())
    }
}

/// The single answer to a [`RemoteCall`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteReturn {
    pub call_id: u64,
    pub result: Result<Value, RemoteFailure>,
}

impl RemoteReturn {
    pub fn success(call_id: u64, value: Value) -> Self {
        Self { call_id, result: Ok(value) }
    }

    pub fn failure(call_id: u64, failure: RemoteFailure) -> Self {
        Self { call_id, result: Err(failure) }
    }

    pub fn is_failure(&self) -> bool {
        self.result.is_err()
    }
}

impl std::fmt::Display for RemoteReturn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.result {
            Ok(v) => write!(f, "#{} -> {}", self.call_id, v.kind()),
            Err(e) => write!(f, "#{} !! {}", self.call_id, e),
        }
    }
}

/// Everything a channel sends or receives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RemoteMessage {
    Call(RemoteCall),
    Return(RemoteReturn),
}

impl RemoteMessage {
    pub fn call_id(&self) -> u64 {
        match self {
            Self::Call(c) => c.call_id,
            Self::Return(r) => r.call_id,
        }
    }
}

impl From<RemoteCall> for RemoteMessage {
    fn from(c: RemoteCall) -> Self {
        Self::Call(c)
    }
}

impl From<RemoteReturn> for RemoteMessage {
    fn from(r: RemoteReturn) -> Self {
        Self::Return(r)
    }
}

impl std::fmt::Display for RemoteMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Call(c) => write!(f, "Call {}", c),
            Self::Return(r) => write!(f, "Return {}", r),
        }
    }
}
