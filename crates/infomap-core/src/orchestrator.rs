//! The `Infomap` orchestrator.
//!
//! Accepts job submissions, runs each job on its own isolated worker and
//! delivers the workers' messages to host callbacks. The orchestrator itself
//! is single-threaded: `submit` returns as soon as the job is handed off,
//! and callbacks only run while the host drives dispatch
//! ([`Infomap::dispatch_next`], [`Infomap::dispatch_pending`] or
//! [`Infomap::run_until_idle`]).
//!
//! # Example
//!
//! ```no_run
//! use std::collections::BTreeMap;
//! use infomap_core::{Infomap, OrchestratorConfig};
//!
//! # async fn example() -> infomap_core::Result<()> {
//! let mut infomap = Infomap::from_config(OrchestratorConfig::from_env()?)?;
//! infomap
//!     .on("data", |text, _| print!("{text}"))
//!     .on("error", |err, id| eprintln!("{id} failed: {err}"))
//!     .on("finished", |_, id| println!("{id} done"));
//!
//! infomap.submit("1 2\n2 3\n3 1", "--two-level", BTreeMap::new())?;
//! infomap.run_until_idle().await?;
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use futures::StreamExt;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::mpsc;

use crate::config::OrchestratorConfig;
use crate::context::{ContextProvisioner, EngineImage};
use crate::error::{Error, Result};
use crate::events::{EventDispatcher, EventKind};
use crate::job::{self, JobId, Network};
use crate::protocol::{JobPayload, MessageKind, WorkerMessage};
use crate::registry::{JobEntry, JobRegistry};
use crate::worker::{MessageStream, ProcessLauncher, WorkerLauncher};

/// Job id counter plus the registry of live jobs.
#[derive(Debug, Default)]
struct JobTable {
    next_id: u64,
    registry: JobRegistry,
}

impl JobTable {
    fn allocate(&mut self) -> JobId {
        let id = JobId(self.next_id);
        self.next_id += 1;
        id
    }
}

/// Orchestrates Infomap jobs on isolated workers.
pub struct Infomap {
    config: OrchestratorConfig,
    launcher: Box<dyn WorkerLauncher>,
    provisioner: ContextProvisioner,
    jobs: JobTable,
    events: EventDispatcher,
    inbox_tx: mpsc::UnboundedSender<WorkerMessage>,
    inbox_rx: mpsc::UnboundedReceiver<WorkerMessage>,
    runtime: Handle,
}

impl Infomap {
    /// Version tag of the engine this orchestrator drives.
    pub const VERSION: &'static str = crate::ENGINE_VERSION;

    /// Create an orchestrator with the default configuration.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(image: EngineImage, launcher: impl WorkerLauncher + 'static) -> Result<Self> {
        Self::with_config(OrchestratorConfig::default(), image, launcher)
    }

    /// Create an orchestrator with an explicit configuration.
    pub fn with_config(
        config: OrchestratorConfig,
        image: EngineImage,
        launcher: impl WorkerLauncher + 'static,
    ) -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| Error::Runtime(format!("Infomap must be created inside a Tokio runtime: {}", e)))?;
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();

        Ok(Self {
            config,
            launcher: Box::new(launcher),
            provisioner: ContextProvisioner::new(image),
            jobs: JobTable::default(),
            events: EventDispatcher::new(),
            inbox_tx,
            inbox_rx,
            runtime,
        })
    }

    /// Create an orchestrator running jobs in `infomap-worker` processes.
    ///
    /// Reads the engine image from `config.engine_path` and locates the
    /// worker binary.
    pub fn from_config(config: OrchestratorConfig) -> Result<Self> {
        let engine_path = config.engine_path.clone().ok_or_else(|| {
            Error::Config(format!(
                "No engine library configured. Set {} or pass --engine.",
                crate::config::ENGINE_PATH_ENV
            ))
        })?;
        let image = EngineImage::load(&engine_path, Self::VERSION)?;
        let launcher = ProcessLauncher::discover(&config)?;
        tracing::debug!("Using worker binary {}", launcher.program().display());
        Self::with_config(config, image, launcher)
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Submit a job. Returns its id without waiting for the worker.
    ///
    /// Fails only when the input is malformed, in which case no id is
    /// consumed. Problems starting the worker are reported through the
    /// job's `error` event.
    pub fn submit(
        &mut self,
        network: impl Into<Network>,
        args: &str,
        files: BTreeMap<String, String>,
    ) -> Result<JobId> {
        let network = network.into();
        network.validate()?;

        let out_name = job::derive_out_name(args, network.base_name());
        let context = self.provisioner.ensure().clone();
        let id = self.jobs.allocate();

        tracing::info!(
            "Submitting {} (input: {}, out name: {})",
            id,
            network.filename(),
            out_name
        );

        let payload = JobPayload {
            id,
            mem_buffer: context.image(),
            input_filename: network.filename().to_string(),
            input_data: network.content().to_string(),
            arguments: job::tokenize_args(args),
            out_name: out_name.clone(),
            files,
        };

        let mut worker = match self.launcher.launch(&context) {
            Ok(worker) => worker,
            Err(e) => {
                self.jobs.registry.insert(id, JobEntry::new(None, out_name));
                self.fail(id, e);
                return Ok(id);
            }
        };

        let posted = worker.post(payload);
        self.jobs.registry.insert(id, JobEntry::new(Some(worker), out_name));
        match posted {
            Ok(stream) => {
                self.runtime.spawn(forward_messages(
                    id,
                    stream,
                    self.inbox_tx.clone(),
                    self.config.job_timeout,
                ));
            }
            Err(e) => self.fail(id, e),
        }

        Ok(id)
    }

    /// Submit a job described by untyped values.
    ///
    /// `network` must be a string or an object with string `filename` and
    /// `content`; `args` a string; `files` an object of strings. Missing
    /// `args` and `files` default to empty.
    pub fn submit_value(
        &mut self,
        network: Value,
        args: Option<Value>,
        files: Option<Value>,
    ) -> Result<JobId> {
        let network = Network::from_value(&network)?;
        let args = job::args_from_value(args.as_ref())?;
        let files = job::files_from_value(files.as_ref())?;
        self.submit(network, &args, files)
    }

    /// Register the callback for an event by name.
    ///
    /// Unknown names are logged and ignored.
    pub fn on(
        &mut self,
        event: &str,
        callback: impl FnMut(&str, JobId) + Send + 'static,
    ) -> &mut Self {
        match event.parse::<EventKind>() {
            Ok(kind) => self.events.set(kind, Box::new(callback)),
            Err(e) => tracing::warn!("{}", e),
        }
        self
    }

    /// Register the callback for an event.
    pub fn on_event(
        &mut self,
        kind: EventKind,
        callback: impl FnMut(&str, JobId) + Send + 'static,
    ) -> &mut Self {
        self.events.set(kind, Box::new(callback));
        self
    }

    /// Provision the shared execution context now instead of on first submit.
    pub fn ensure_context(&mut self) {
        self.provisioner.ensure();
    }

    /// Release the shared execution context. Running jobs are unaffected.
    pub fn release_context(&mut self) {
        self.provisioner.release();
    }

    pub fn is_context_provisioned(&self) -> bool {
        self.provisioner.is_provisioned()
    }

    /// Whether `id` has been submitted and has not reached a terminal event.
    pub fn is_live(&self, id: JobId) -> bool {
        self.jobs.registry.contains(id)
    }

    /// Ids of all live jobs, ascending.
    pub fn live_jobs(&self) -> Vec<JobId> {
        self.jobs.registry.ids()
    }

    /// Output name derived for a live job.
    pub fn out_name(&self, id: JobId) -> Option<&str> {
        self.jobs.registry.get(id).map(|entry| entry.out_name.as_str())
    }

    /// Handle one worker message.
    ///
    /// Returns [`Error::Protocol`] for a message of unknown type; the
    /// orchestrator and worker disagree about the protocol and dispatch
    /// must not continue. The offending job is removed and its worker
    /// terminated without any event, so later dispatch does not wait on it.
    pub fn handle_message(&mut self, message: WorkerMessage) -> Result<()> {
        let id = message.id;
        let kind = match message.parse_kind() {
            Ok(kind) => kind,
            Err(e) => {
                tracing::error!("{}", e);
                self.cleanup(id);
                return Err(e);
            }
        };

        if !self.jobs.registry.contains(id) {
            tracing::debug!("Dropping {} message for {}: job is not live", kind.as_str(), id);
            return Ok(());
        }

        match kind {
            MessageKind::Data => self.events.emit(EventKind::Data, &message.content, id),
            MessageKind::Error => {
                self.cleanup(id);
                self.events.emit(EventKind::Error, &message.content, id);
            }
            MessageKind::Finished => {
                self.cleanup(id);
                self.events.emit(EventKind::Finished, &message.content, id);
            }
        }

        Ok(())
    }

    /// Wait for the next worker message and dispatch it.
    ///
    /// Waits indefinitely if no job is live.
    pub async fn dispatch_next(&mut self) -> Result<()> {
        match self.inbox_rx.recv().await {
            Some(message) => self.handle_message(message),
            None => Ok(()),
        }
    }

    /// Dispatch every message that has already arrived, without waiting.
    ///
    /// Returns the number of messages handled.
    pub fn dispatch_pending(&mut self) -> Result<usize> {
        let mut handled = 0;
        while let Ok(message) = self.inbox_rx.try_recv() {
            self.handle_message(message)?;
            handled += 1;
        }
        Ok(handled)
    }

    /// Dispatch messages until no job is live.
    pub async fn run_until_idle(&mut self) -> Result<()> {
        while !self.jobs.registry.is_empty() {
            self.dispatch_next().await?;
        }
        Ok(())
    }

    /// Report a job failure that did not come from the worker's own stream.
    fn fail(&mut self, id: JobId, error: Error) {
        tracing::warn!("{} failed to start: {}", id, error);
        // The receiver lives in `self`, so this cannot fail.
        let _ = self.inbox_tx.send(WorkerMessage::error(id, error.to_string()));
    }

    /// Remove a job and schedule its worker's termination.
    fn cleanup(&mut self, id: JobId) {
        let Some(entry) = self.jobs.registry.remove(id) else {
            return;
        };
        tracing::debug!("{} ended after {:?}", id, entry.submitted_at.elapsed());

        if let Some(mut worker) = entry.worker {
            let grace = self.config.termination_grace;
            self.runtime.spawn(async move {
                tokio::time::sleep(grace).await;
                worker.terminate();
                tracing::debug!("Terminated worker for {}", id);
            });
        }
    }
}

impl std::fmt::Debug for Infomap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Infomap")
            .field("config", &self.config)
            .field("provisioner", &self.provisioner)
            .field("jobs", &self.jobs)
            .finish_non_exhaustive()
    }
}

/// Pump one worker's messages into the orchestrator inbox.
///
/// Stops after the first terminal message. A broken stream, a stream that
/// ends early, a message carrying another job's id or an expired watchdog
/// becomes the job's error message.
async fn forward_messages(
    id: JobId,
    mut stream: MessageStream,
    inbox: mpsc::UnboundedSender<WorkerMessage>,
    timeout: Option<Duration>,
) {
    let deadline = timeout.map(|t| tokio::time::Instant::now() + t);

    loop {
        let next = match deadline {
            Some(deadline) => match tokio::time::timeout_at(deadline, stream.next()).await {
                Ok(next) => next,
                Err(_) => {
                    let limit = timeout.unwrap_or_default();
                    tracing::warn!("{} timed out after {:?}", id, limit);
                    let _ = inbox.send(WorkerMessage::error(
                        id,
                        format!("Job timed out after {:?}", limit),
                    ));
                    return;
                }
            },
            None => stream.next().await,
        };

        match next {
            Some(Ok(message)) if message.id != id => {
                tracing::error!("Worker for {} sent a message for {}", id, message.id);
                let _ = inbox.send(WorkerMessage::error(
                    id,
                    format!(
                        "Protocol violation: worker for {} reported a message for {}",
                        id, message.id
                    ),
                ));
                return;
            }
            Some(Ok(message)) => {
                // Unknown kinds stop forwarding too; dispatch aborts on them.
                let last = MessageKind::parse(&message.kind).is_none_or(|kind| kind.is_terminal());
                if inbox.send(message).is_err() || last {
                    return;
                }
            }
            Some(Err(e)) => {
                tracing::warn!("Lost connection to worker for {}: {}", id, e);
                let _ = inbox.send(WorkerMessage::error(id, e.to_string()));
                return;
            }
            None => {
                let _ = inbox.send(WorkerMessage::error(
                    id,
                    "Worker exited without reporting a result",
                ));
                return;
            }
        }
    }
}
