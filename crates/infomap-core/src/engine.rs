//! The engine seam.
//!
//! An [`Engine`] runs one job to completion. Workers wrap an engine and turn
//! its outcome into protocol messages with [`run_job`], which guarantees the
//! message sequence: zero or more `data` messages, then exactly one terminal
//! message, even if the engine panics.

use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};

use crate::error::Result;
use crate::protocol::{JobPayload, WorkerMessage, encode_output_files};

/// A clustering engine.
pub trait Engine: Send + Sync + 'static {
    /// Run `job`, streaming textual output through `output`.
    ///
    /// Returns the output files the run produced, keyed by filename.
    fn execute(
        &self,
        job: &JobPayload,
        output: &mut dyn FnMut(&str),
    ) -> Result<BTreeMap<String, String>>;
}

/// Run `job` on `engine`, reporting every message through `send`.
pub fn run_job(engine: &dyn Engine, job: &JobPayload, mut send: impl FnMut(WorkerMessage)) {
    let id = job.id;
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        engine.execute(job, &mut |text| send(WorkerMessage::data(id, text)))
    }));

    let terminal = match outcome {
        Ok(Ok(files)) => match encode_output_files(&files) {
            Ok(content) => WorkerMessage::finished(id, content),
            Err(e) => WorkerMessage::error(id, e.to_string()),
        },
        Ok(Err(e)) => WorkerMessage::error(id, e.to_string()),
        Err(payload) => WorkerMessage::error(
            id,
            format!("Engine panicked: {}", panic_message(payload.as_ref())),
        ),
    };
    send(terminal);
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
