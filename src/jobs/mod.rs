//! Jobs - long-running work with a lifecycle, streams and children.
//!
//! # Components
//!
//! - [`Job`]: identity, [`JobState`] machine, cancellation token and the
//!   Output / Progress / Error (plus Verbose / Debug) [`JobStream`]s
//! - [`JobContext`]: what a job's work function writes through; starts children
//! - [`JobTask`]: awaitable result of a job's work function
//! - [`JobRegistry`]: background-mode registry of root jobs
//! - [`timeout_token`] / [`take_until_cancelled`]: deadline helpers
//!
//! # Cancellation tree
//!
//! Every child's token is a `child_token()` of its parent's, so stopping a
//! parent cancels all descendants. Cancellation is cooperative: a job reaches
//! `Stopped` only after its work function returns.
//!
//! # Usage Example
//!
//! ```ignore
//! let job = Job::<Update>::new(JobInfo::new("Install", "Install-Update -AsJob"));
//! let task = job.start(|ctx, token| async move {
//!     let (_child, child_task) = ctx.start_child(JobInfo::new("Download", "..."), download)?;
//!     child_task.await?;
//!     Ok(())
//! })?;
//! registry.add(job);
//! ```

mod cancel;
mod job;
mod registry;
mod state;
mod stream;

pub use cancel::{take_until_cancelled, timeout_token};
pub use job::{Job, JobContext, JobEvent, JobInfo, JobTask};
pub use registry::JobRegistry;
pub use state::JobState;
pub use stream::JobStream;
