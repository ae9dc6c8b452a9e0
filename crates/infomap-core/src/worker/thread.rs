//! Thread-isolated workers for in-process engines.
//!
//! The engine runs on a dedicated OS thread and reports back only through a
//! channel, so the orchestrator sees the same message stream as with a
//! worker process. Threads cannot be killed: `terminate` is a no-op and a
//! running job always reaches its own end.

use std::fmt;
use std::sync::Arc;

use futures::StreamExt;
use futures::channel::mpsc;

use crate::context::ExecutionContext;
use crate::engine::{Engine, run_job};
use crate::error::{Error, Result};
use crate::protocol::JobPayload;

use super::{IsolatedWorker, MessageStream, WorkerLauncher};

/// Launches a thread per job running a shared [`Engine`].
#[derive(Clone)]
pub struct ThreadLauncher {
    engine: Arc<dyn Engine>,
}

impl ThreadLauncher {
    pub fn new(engine: impl Engine) -> Self {
        Self {
            engine: Arc::new(engine),
        }
    }
}

impl fmt::Debug for ThreadLauncher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadLauncher").finish_non_exhaustive()
    }
}

impl WorkerLauncher for ThreadLauncher {
    fn launch(&self, _context: &ExecutionContext) -> Result<Box<dyn IsolatedWorker>> {
        Ok(Box::new(ThreadWorker {
            engine: Some(Arc::clone(&self.engine)),
        }))
    }
}

/// A worker that runs its job on a dedicated thread.
pub struct ThreadWorker {
    /// Taken by the first `post`.
    engine: Option<Arc<dyn Engine>>,
}

impl IsolatedWorker for ThreadWorker {
    fn post(&mut self, payload: JobPayload) -> Result<MessageStream> {
        let engine = self
            .engine
            .take()
            .ok_or_else(|| Error::Ipc("Worker has already received a job".to_string()))?;

        let (tx, rx) = mpsc::unbounded();
        std::thread::Builder::new()
            .name(format!("infomap-{}", payload.id))
            .spawn(move || {
                run_job(engine.as_ref(), &payload, |message| {
                    // The receiver is gone once the orchestrator stops listening.
                    let _ = tx.unbounded_send(message);
                });
            })
            .map_err(|e| Error::WorkerStart(format!("Failed to spawn worker thread: {}", e)))?;

        Ok(rx.map(Ok::<_, Error>).boxed())
    }
}
