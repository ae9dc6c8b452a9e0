//! Isolated workers.
//!
//! The orchestrator never talks to the engine directly. It asks a
//! [`WorkerLauncher`] for an [`IsolatedWorker`], posts one [`JobPayload`] to
//! it, and consumes the resulting message stream.
//!
//! # Launchers
//!
//! - **`ProcessLauncher`** - one `infomap-worker` child process per job. The
//!   engine image is loaded inside the child, so a crashing engine cannot
//!   take the host down, and termination kills the process.
//! - **`ThreadLauncher`** - runs an in-process [`Engine`](crate::Engine) on a
//!   dedicated thread. No termination capability: the thread runs to
//!   completion.
//!
//! ```text
//! Infomap (orchestrator task)
//!     │
//!     ├── WorkerLauncher::launch(&ExecutionContext)
//!     │       └── IsolatedWorker
//!     │
//!     ├── IsolatedWorker::post(JobPayload) ──► MessageStream
//!     │                                           │
//!     │       forwarding task (one per job) ◄─────┘
//!     │               │
//!     └── inbox ◄─────┘   data* then error | finished
//! ```

mod process;
mod thread;

use futures::stream::BoxStream;

use crate::context::ExecutionContext;
use crate::error::Result;
use crate::protocol::{JobPayload, WorkerMessage};

pub use process::{ProcessLauncher, ProcessWorker, find_worker_binary};
pub use thread::{ThreadLauncher, ThreadWorker};

/// Messages produced by a worker for its job, in send order.
///
/// An `Err` item means the channel to the worker broke; no further items
/// are read after it.
pub type MessageStream = BoxStream<'static, Result<WorkerMessage>>;

/// Creates isolated workers.
pub trait WorkerLauncher: Send + Sync {
    /// Start a worker bound to `context`.
    fn launch(&self, context: &ExecutionContext) -> Result<Box<dyn IsolatedWorker>>;
}

/// One isolated execution unit, running exactly one job.
pub trait IsolatedWorker: Send {
    /// Hand the job to the worker and return its message stream.
    ///
    /// Must not block: any I/O happens as the stream is polled.
    fn post(&mut self, payload: JobPayload) -> Result<MessageStream>;

    /// Stop the worker. Workers without a termination capability ignore it.
    fn terminate(&mut self) {}
}
