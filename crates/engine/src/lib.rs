//! Task state machine, FIFO wait queue, and the dispatch channel that turns a
//! GPU release into the next queued task's reservation.
//!
//! The registry + task table form a process-wide state object initialized at
//! startup and torn down at shutdown (tests construct their own [`Scheduler`],
//! injecting a fake `Arc<dyn GpuRegistry>`). Dispatching the next queued task
//! is message passing rather than a callback from inside `release`:
//! [`Scheduler::release_and_dispatch`] computes the next dispatch decision
//! under its own lock and hands the result to whoever owns the
//! [`DispatchReceiver`] — that caller (the pipeline crate's driver loop), not
//! the scheduler, performs the `tokio::spawn`.

mod scheduler;
mod table;

pub use scheduler::{DispatchReceiver, DispatchedTask, Scheduler};
pub use table::TaskTable;
