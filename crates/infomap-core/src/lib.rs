//! Job orchestration for the Infomap clustering engine.
//!
//! This crate provides:
//! - The `Infomap` orchestrator: submission, job ids and event callbacks
//! - Isolated workers (child processes or dedicated threads)
//! - The orchestrator/worker message protocol
//! - Lazy provisioning of the shared engine image
//!
//! The clustering algorithm itself is an opaque engine reached only through
//! the [`Engine`] trait or the `infomap-worker` process.

pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod events;
pub mod job;
pub mod orchestrator;
pub mod protocol;
pub mod registry;
pub mod worker;

pub use config::OrchestratorConfig;
pub use context::{ContextProvisioner, EngineImage, ExecutionContext};
pub use engine::{Engine, run_job};
pub use error::{Error, Result};
pub use events::{EventCallback, EventKind};
pub use job::{JobId, Network};
pub use orchestrator::Infomap;
pub use protocol::{JobPayload, MessageKind, WorkerMessage};
pub use registry::{JobEntry, JobRegistry};
pub use worker::{
    IsolatedWorker, MessageStream, ProcessLauncher, ThreadLauncher, WorkerLauncher,
};

/// Version tag of the engine image, set at build time through
/// `INFOMAP_ENGINE_VERSION` and defaulting to this crate's version.
pub const ENGINE_VERSION: &str = match option_env!("INFOMAP_ENGINE_VERSION") {
    Some(version) => version,
    None => env!("CARGO_PKG_VERSION"),
};
