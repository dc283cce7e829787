//! # Object Registry
//!
//! Bidirectional mapping between live local objects and their cross-process
//! [`RemoteInstance`] identities, plus the stub cache for identities imported
//! from the peer and the table of named beans.
//!
//! ## Invariants
//!
//! - **One-to-one**: exporting the same object twice yields the same identity.
//! - **Stable stubs**: one stub per imported identity for the life of the
//!   channel, so repeated references compare identical.
//! - **Round trip**: an identity this side exported resolves back to the
//!   original object, never to a stub of itself.
//! - Entries hold a strong handle to their object, so an address used as a
//!   key cannot be reused while the entry exists.
//!
//! Export and stub creation are serialized through one mutex; stub lookups
//! on the hot path only touch the concurrent cache.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use dashmap::DashMap;
use isowire::ObjectRef;
use isowire::RemoteInstance;

#[derive(Default)]
struct ExportTable {
    /// Every object with an identity: exports and stubs alike.
    identities: HashMap<usize, RemoteInstance>,
    /// Objects exported by this side.
    exports: HashMap<RemoteInstance, ObjectRef>,
}

/// Identity registry owned by one channel.
#[derive(Default)]
pub struct ObjectRegistry {
    table: Mutex<ExportTable>,
    stubs: DashMap<RemoteInstance, ObjectRef>,
}

impl ObjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> MutexGuard<'_, ExportTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers `obj` under a fresh identity, or returns the identity it
    /// already has.
    pub fn export(&self, obj: &ObjectRef, interfaces: &[String]) -> RemoteInstance {
        let mut table = self.table();
        if let Some(existing) = table.identities.get(&obj.addr()) {
            return existing.clone();
        }

        let instance = RemoteInstance::generate(interfaces.iter().cloned());
        table.identities.insert(obj.addr(), instance.clone());
        table.exports.insert(instance.clone(), obj.clone());
        tracing::debug!(instance = %instance, object = ?obj, "exported object");
        instance
    }

    /// The identity of `obj`, if it was exported here or is a stub.
    pub fn identity_of(&self, obj: &ObjectRef) -> Option<RemoteInstance> {
        self.table().identities.get(&obj.addr()).cloned()
    }

    /// The local object exported under `instance`.
    pub fn resolve_local(&self, instance: &RemoteInstance) -> Option<ObjectRef> {
        self.table().exports.get(instance).cloned()
    }

    /// Returns the cached stub for `instance`, building one with `make_stub`
    /// if none exists yet.
    pub fn resolve_or_create_proxy<F>(&self, instance: &RemoteInstance, make_stub: F) -> ObjectRef
    where
        F: FnOnce(&RemoteInstance) -> ObjectRef,
    {
        if let Some(stub) = self.stubs.get(instance) {
            return stub.value().clone();
        }

        let mut table = self.table();
        let stub = self
            .stubs
            .entry(instance.clone())
            .or_insert_with(|| make_stub(instance))
            .value()
            .clone();
        table.identities.entry(stub.addr()).or_insert_with(|| instance.clone());
        stub
    }

    /// Resolves a received identity: the original object if this side
    /// exported it, otherwise the stub.
    pub fn resolve<F>(&self, instance: &RemoteInstance, make_stub: F) -> ObjectRef
    where
        F: FnOnce(&RemoteInstance) -> ObjectRef,
    {
        match self.resolve_local(instance) {
            Some(local) => local,
            None => self.resolve_or_create_proxy(instance, make_stub),
        }
    }

    pub fn export_count(&self) -> usize {
        self.table().exports.len()
    }

    pub fn stub_count(&self) -> usize {
        self.stubs.len()
    }

    /// Forgets every export and stub.
    pub fn clear(&self) {
        let mut table = self.table();
        table.identities.clear();
        table.exports.clear();
        self.stubs.clear();
    }
}

/// Well-known objects reachable by name instead of per-call export.
///
/// Bindings survive channel close; they describe the process, not the
/// connection.
#[derive(Default)]
pub struct BeanTable {
    by_name: DashMap<String, ObjectRef>,
    by_addr: DashMap<usize, String>,
}

impl BeanTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `obj` under `name`, replacing any previous binding of the name.
    pub fn bind(&self, name: impl Into<String>, obj: ObjectRef) {
        let name = name.into();
        if let Some(previous) = self.by_name.insert(name.clone(), obj.clone()) {
            self.by_addr.remove_if(&previous.addr(), |_, bound| bound == &name);
        }
        self.by_addr.insert(obj.addr(), name);
    }

    pub fn lookup(&self, name: &str) -> Option<ObjectRef> {
        self.by_name.get(name).map(|e| e.value().clone())
    }

    pub fn name_of(&self, obj: &ObjectRef) -> Option<String> {
        self.by_addr.get(&obj.addr()).map(|e| e.value().clone())
    }
}
