//! Process-isolated workers.
//!
//! Each job runs in its own `infomap-worker` child process. The payload is
//! written to the child's stdin as a single frame and stdin is then closed;
//! the child answers on stdout. Stderr passes through for debugging.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use futures::StreamExt;
use tokio::io::BufReader;
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

use crate::config::{OrchestratorConfig, WORKER_PATH_ENV};
use crate::context::ExecutionContext;
use crate::error::{Error, Result};
use crate::protocol::{JobPayload, WorkerMessage, read_message_async, write_message_async};

use super::{IsolatedWorker, MessageStream, WorkerLauncher};

const WORKER_BINARY: &str = if cfg!(windows) {
    "infomap-worker.exe"
} else {
    "infomap-worker"
};

/// Find the infomap-worker binary path.
///
/// Looks in the following order:
/// 1. The configured path (`--worker` or `INFOMAP_WORKER_PATH`)
/// 2. Same directory as the current executable
/// 3. System PATH
/// 4. `target/debug` or `target/release` of this workspace
pub fn find_worker_binary(configured: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = configured {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        return Err(Error::WorkerStart(format!(
            "Configured worker binary '{}' does not exist",
            path.display()
        )));
    }

    if let Ok(exe_path) = std::env::current_exe()
        && let Some(exe_dir) = exe_path.parent()
    {
        let worker_path = exe_dir.join(WORKER_BINARY);
        if worker_path.exists() {
            return Ok(worker_path);
        }
    }

    if let Ok(path) = which::which(WORKER_BINARY) {
        return Ok(path);
    }

    if let Ok(manifest_dir) = std::env::var("CARGO_MANIFEST_DIR") {
        for profile in &["debug", "release"] {
            let path = PathBuf::from(&manifest_dir)
                .join("..")
                .join("..")
                .join("target")
                .join(profile)
                .join(WORKER_BINARY);
            if path.exists() {
                return Ok(path.canonicalize().unwrap_or(path));
            }
        }
    }

    Err(Error::WorkerStart(format!(
        "Could not find {}. Set {} or ensure it's in PATH.",
        WORKER_BINARY, WORKER_PATH_ENV
    )))
}

/// Launches one worker process per job.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    program: PathBuf,
}

impl ProcessLauncher {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Locate the worker binary according to `config`.
    pub fn discover(config: &OrchestratorConfig) -> Result<Self> {
        find_worker_binary(config.worker_path.as_deref()).map(Self::new)
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl WorkerLauncher for ProcessLauncher {
    fn launch(&self, _context: &ExecutionContext) -> Result<Box<dyn IsolatedWorker>> {
        let mut child = Command::new(&self.program)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                Error::WorkerStart(format!(
                    "Failed to spawn worker process '{}': {}",
                    self.program.display(),
                    e
                ))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::WorkerStart("Failed to get worker stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::WorkerStart("Failed to get worker stdout".to_string()))?;

        tracing::debug!("Spawned worker process {:?}", child.id());

        Ok(Box::new(ProcessWorker {
            child,
            pipes: Some((stdin, stdout)),
            killed: false,
        }))
    }
}

/// Handle to a running worker process.
#[derive(Debug)]
pub struct ProcessWorker {
    child: Child,
    /// Taken by the first `post`.
    pipes: Option<(ChildStdin, ChildStdout)>,
    killed: bool,
}

impl ProcessWorker {
    /// Process ID of the worker, if it is still running.
    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }
}

impl IsolatedWorker for ProcessWorker {
    fn post(&mut self, payload: JobPayload) -> Result<MessageStream> {
        let (mut stdin, stdout) = self
            .pipes
            .take()
            .ok_or_else(|| Error::Ipc("Worker has already received a job".to_string()))?;

        let send = async move {
            write_message_async(&mut stdin, &payload).await?;
            // Closing stdin tells the worker no further input follows.
            drop(stdin);
            Ok::<_, Error>(BufReader::new(stdout))
        };

        let stream = futures::stream::once(send).flat_map(|sent| match sent {
            Ok(reader) => futures::stream::unfold(Some(reader), |state| async move {
                let Some(mut reader) = state else {
                    return None;
                };
                match read_message_async::<_, WorkerMessage>(&mut reader).await {
                    Ok(Some(message)) => Some((Ok(message), Some(reader))),
                    Ok(None) => None,
                    Err(e) => Some((Err(e), None)),
                }
            })
            .boxed(),
            Err(e) => futures::stream::once(async move { Err::<WorkerMessage, Error>(e) }).boxed(),
        });

        Ok(stream.boxed())
    }

    fn terminate(&mut self) {
        if self.killed {
            return;
        }
        self.killed = true;

        // The process has usually exited on its own after its terminal message.
        if let Err(e) = self.child.start_kill() {
            tracing::debug!("Worker process already gone: {}", e);
        }
    }
}
