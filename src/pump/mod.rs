//! Work channel and pump - serialize host interaction onto one thread.
//!
//! The host surface (output writer, progress display, confirmation prompts) is
//! not safe to call from arbitrary threads. Instead of sharing it behind a lock,
//! every interaction is sent as a closure through a [`WorkChannel`] and executed
//! by the thread that owns the host.
//!
//! # Components
//!
//! - [`WorkChannel`]: the MPSC queue plus the blocking `run` loop
//! - [`WorkSender`]: cloneable producer handle; `enqueue` returns a [`PendingWork`]
//! - [`Pump`]: spawns an async lifecycle on the runtime and runs the channel
//!   until the lifecycle completes, rethrowing lifecycle errors on the host thread
//!
//! # Threading
//!
//! ```text
//! engine threads ──┐
//! tokio tasks ─────┼──► WorkSender::enqueue ──► mpsc ──► WorkChannel::run (host thread)
//! lifecycle fault ─┘                                       executes FnOnce(&mut H)
//! ```

mod channel;
mod runner;

pub use channel::{PendingWork, RunExit, WorkChannel, WorkSender};
pub use runner::Pump;
