//! # Execution Pools
//!
//! Inbound calls never run on the thread that received them; they are
//! submitted to an [`Executor`]. An invoked method may itself block on an
//! outbound call, so executors must tolerate blocking tasks.

use std::io;

use tokio::runtime::Handle;

/// A unit of work submitted by the dispatcher.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Submit-only execution pool.
pub trait Executor: Send + Sync + 'static {
    /// Schedules `task`. An `Err` means the task will never run.
    fn execute(&self, task: Task) -> io::Result<()>;
}

/// Runs tasks on tokio's blocking thread pool.
#[derive(Clone, Debug)]
pub struct TokioBlocking {
    handle: Handle,
}

impl TokioBlocking {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Uses the runtime the caller is running in, if any.
    pub fn try_current() -> Option<Self> {
        Handle::try_current().ok().map(Self::new)
    }
}

impl Executor for TokioBlocking {
    fn execute(&self, task: Task) -> io::Result<()> {
        // the JoinHandle is detached; the task reports through the channel
        drop(self.handle.spawn_blocking(task));
        Ok(())
    }
}

/// Spawns a named OS thread per task.
#[derive(Clone, Debug)]
pub struct ThreadPerCall {
    prefix: String,
}

impl ThreadPerCall {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }
}

impl Default for ThreadPerCall {
    fn default() -> Self {
        Self::new("remote-call")
    }
}

impl Executor for ThreadPerCall {
    fn execute(&self, task: Task) -> io::Result<()> {
        std::thread::Builder::new()
            .name(self.prefix.clone())
            .spawn(task)
            .map(|_| ())
    }
}
