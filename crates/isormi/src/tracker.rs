//! # Call Tracker
//!
//! Allocates call ids and correlates each outbound call with the caller
//! waiting for its return.
//!
//! ## Invariants
//!
//! - An id is never handed out while a call with that id is still tracked.
//! - A waiter is registered before its call is sent, so a fast return can
//!   never arrive ahead of it.
//! - Once closed, no id is issued, no waiter is registered, and every waiter
//!   that was pending receives exactly one synthetic connection-closed return.
//! - A return with no tracked call is an [`Error::Orphaned`] protocol error.
//!
//! Each waiter is a one-shot slot, so closing wakes every blocked caller by
//! completing its slot rather than by having callers poll.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use isowire::RemoteFailure;
use isowire::RemoteReturn;
use tokio::sync::oneshot;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A return arrived for a call nobody is waiting for.
    Orphaned(u64),
    /// The tracker has been drained; no further calls are accepted.
    Closed,
    /// The id is already tracked.
    IdInUse(u64),
    /// The waiter was interrupted before a return arrived.
    Interrupted(u64),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Orphaned(id) => write!(f, "Orphaned remote return for call #{}", id),
            Self::Closed => write!(f, "Call tracker closed"),
            Self::IdInUse(id) => write!(f, "Call id #{} is already in flight", id),
            Self::Interrupted(id) => write!(f, "Call #{} interrupted", id),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

enum Slot {
    Waiting(oneshot::Sender<RemoteReturn>),
    /// The caller stopped waiting; the eventual return is absorbed.
    Abandoned,
}

/// Pending outbound calls of one channel.
pub struct CallTracker {
    next_id: AtomicU64,
    slots: DashMap<u64, Slot>,
    closed: AtomicBool,
}

impl CallTracker {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    /// A tracker whose first id is `first`.
    pub fn starting_at(first: u64) -> Self {
        Self {
            next_id: AtomicU64::new(first),
            slots: DashMap::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Yields an id that is not currently in flight.
    pub fn next_call_id(&self) -> Result<u64> {
        loop {
            if self.is_closed() {
                return Err(Error::Closed);
            }
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            if !self.slots.contains_key(&id) {
                return Ok(id);
            }
            tracing::debug!(call_id = id, "call id still in flight, skipping");
        }
    }

    /// Registers a waiter for `id`.
    pub fn register(&self, id: u64) -> Result<Waiter> {
        let (tx, rx) = oneshot::channel();
        match self.slots.entry(id) {
            Entry::Occupied(_) => return Err(Error::IdInUse(id)),
            Entry::Vacant(slot) => {
                slot.insert(Slot::Waiting(tx));
            }
        }

        // a concurrent drain may have swept the table just before the insert
        if self.is_closed() {
            self.slots.remove(&id);
            return Err(Error::Closed);
        }

        Ok(Waiter { id, rx })
    }

    /// Hands `ret` to its waiter.
    pub fn resolve(&self, ret: RemoteReturn) -> Result<()> {
        let id = ret.call_id;
        match self.slots.remove(&id) {
            None => Err(Error::Orphaned(id)),
            Some((_, Slot::Waiting(tx))) => {
                // the receiver may be gone if an async caller was dropped mid-flight
                let _ = tx.send(ret);
                Ok(())
            }
            Some((_, Slot::Abandoned)) => {
                tracing::debug!(call_id = id, "absorbed return of abandoned call");
                Ok(())
            }
        }
    }

    /// Wakes the caller waiting on `id` with [`Error::Interrupted`].
    ///
    /// The slot stays tracked so the eventual return is absorbed rather than
    /// treated as orphaned. Returns false if `id` had no live waiter.
    pub fn interrupt(&self, id: u64) -> bool {
        match self.slots.get_mut(&id) {
            Some(mut slot) if matches!(*slot, Slot::Waiting(_)) => {
                *slot = Slot::Abandoned;
                true
            }
            _ => false,
        }
    }

    /// Stops tracking `id` entirely; used when the call never left.
    pub fn forget(&self, id: u64) {
        self.slots.remove(&id);
    }

    /// Closes the tracker and fails every pending waiter with a
    /// connection-closed return. Returns how many waiters were failed; a
    /// second drain fails none.
    pub fn drain_on_close(&self) -> usize {
        if self.closed.swap(true, Ordering::SeqCst) {
            return 0;
        }

        let ids: Vec<u64> = self.slots.iter().map(|e| *e.key()).collect();
        let mut failed = 0;
        for id in ids {
            if let Some((_, Slot::Waiting(tx))) = self.slots.remove(&id) {
                let _ = tx.send(RemoteReturn::failure(id, RemoteFailure::connection_closed()));
                failed += 1;
            }
        }
        self.slots.clear();
        failed
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Ids of calls with a live waiter.
    pub fn pending(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self
            .slots
            .iter()
            .filter(|e| matches!(e.value(), Slot::Waiting(_)))
            .map(|e| *e.key())
            .collect();
        ids.sort_unstable();
        ids
    }
}

impl Default for CallTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// The receiving half of one registered call.
#[derive(Debug)]
pub struct Waiter {
    id: u64,
    rx: oneshot::Receiver<RemoteReturn>,
}

impl Waiter {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Blocks the current thread until the return arrives.
    ///
    /// # Panics
    ///
    /// Must not be called from an async task; use [`Waiter::wait_async`].
    pub fn wait(self) -> Result<RemoteReturn> {
        let id = self.id;
        self.rx.blocking_recv().map_err(|_| Error::Interrupted(id))
    }

    pub async fn wait_async(self) -> Result<RemoteReturn> {
        let id = self.id;
        self.rx.await.map_err(|_| Error::Interrupted(id))
    }
}
