//! Infomap worker process.
//!
//! Reads one job payload frame from stdin, runs the engine shipped inside it
//! and answers with `data` frames followed by one terminal frame on stdout.
//! Stdout carries protocol frames only, so logs go to stderr.

mod engine;
mod scratch;

use std::io::{self, BufReader, BufWriter};

use anyhow::Context;
use infomap_core::protocol::{read_message, write_message};
use infomap_core::{JobPayload, WorkerMessage, run_job};
use tracing_subscriber::EnvFilter;

use crate::engine::DylibEngine;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    let mut stdin = BufReader::new(io::stdin().lock());
    let job: JobPayload =
        read_message(&mut stdin).context("Failed to read job payload from stdin")?;
    tracing::debug!(
        "Received {} ({} byte engine image, {} auxiliary files)",
        job.id,
        job.mem_buffer.len(),
        job.files.len()
    );

    let mut stdout = BufWriter::new(io::stdout().lock());
    let mut write_error = None;
    run_job(&DylibEngine, &job, |message: WorkerMessage| {
        if write_error.is_some() {
            return;
        }
        if let Err(e) = write_message(&mut stdout, &message) {
            write_error = Some(e);
        }
    });

    match write_error {
        Some(e) => Err(anyhow::Error::new(e).context("Failed to report job result")),
        None => Ok(()),
    }
}
