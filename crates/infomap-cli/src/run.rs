//! Run command implementation for the Infomap CLI.
//!
//! Submits one job per network, streams engine output to stdout and writes
//! each job's result files into the output directory.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{Context, bail};
use infomap_core::job::derive_out_name;
use infomap_core::protocol::decode_output_files;
use infomap_core::{EventKind, Infomap, JobId, Network, OrchestratorConfig};

pub struct RunOptions {
    pub networks: Vec<PathBuf>,
    pub args: String,
    pub files: Vec<PathBuf>,
    pub out_dir: PathBuf,
    pub engine: Option<PathBuf>,
    pub worker: Option<PathBuf>,
    pub timeout: Option<u64>,
}

/// Outcome of every job, filled in by the event callbacks.
#[derive(Default)]
struct Summary {
    finished: Vec<JobId>,
    failed: Vec<(JobId, String)>,
}

/// Execute the run command.
pub async fn execute(options: RunOptions) -> anyhow::Result<()> {
    let start = Instant::now();
    let config = build_config(&options)?;

    let inputs = options
        .networks
        .iter()
        .map(|path| read_network(path))
        .collect::<anyhow::Result<Vec<_>>>()?;
    let files = read_files(&options.files)?;
    check_out_names(&inputs, &options.args)?;

    fs::create_dir_all(&options.out_dir).with_context(|| {
        format!("Failed to create output directory {}", options.out_dir.display())
    })?;

    let mut infomap = Infomap::from_config(config)?;
    let summary = Arc::new(Mutex::new(Summary::default()));
    register_callbacks(&mut infomap, &summary, options.out_dir.clone());

    let mut names = HashMap::new();
    for network in inputs {
        let filename = network.filename().to_string();
        let id = infomap.submit(network, &options.args, files.clone())?;
        tracing::info!("Submitted {} as {}", filename, id);
        names.insert(id, filename);
    }

    infomap.run_until_idle().await?;

    let summary = summary
        .lock()
        .map_err(|_| anyhow::anyhow!("Job summary lock poisoned"))?;
    eprintln!(
        "Completed {} of {} jobs in {:.2}s",
        summary.finished.len(),
        names.len(),
        start.elapsed().as_secs_f64()
    );

    if !summary.failed.is_empty() {
        for (id, reason) in &summary.failed {
            let name = names.get(id).map(String::as_str).unwrap_or("<unknown>");
            eprintln!("  {} ({}): {}", name, id, reason);
        }
        bail!("{} of {} jobs failed", summary.failed.len(), names.len());
    }

    Ok(())
}

fn build_config(options: &RunOptions) -> anyhow::Result<OrchestratorConfig> {
    let mut config = OrchestratorConfig::from_env()?;
    if let Some(engine) = &options.engine {
        config = config.with_engine_path(engine.clone());
    }
    if let Some(worker) = &options.worker {
        config = config.with_worker_path(worker.clone());
    }
    if let Some(secs) = options.timeout {
        config = config.with_job_timeout((secs > 0).then(|| Duration::from_secs(secs)));
    }
    Ok(config)
}

fn register_callbacks(infomap: &mut Infomap, summary: &Arc<Mutex<Summary>>, out_dir: PathBuf) {
    infomap.on_event(EventKind::Data, |content, _id| {
        print!("{}", content);
    });

    let errors = Arc::clone(summary);
    infomap.on_event(EventKind::Error, move |content, id| {
        tracing::error!("{} failed: {}", id, content);
        if let Ok(mut summary) = errors.lock() {
            summary.failed.push((id, content.to_string()));
        }
    });

    let results = Arc::clone(summary);
    infomap.on_event(EventKind::Finished, move |content, id| {
        let outcome = write_outputs(&out_dir, content);
        let Ok(mut summary) = results.lock() else {
            return;
        };
        match outcome {
            Ok(written) => {
                tracing::info!("{} finished, wrote {} files", id, written);
                summary.finished.push(id);
            }
            Err(e) => summary.failed.push((id, format!("{:#}", e))),
        }
    });
}

/// Write a `finished` message's output files. Returns how many were written.
fn write_outputs(out_dir: &Path, content: &str) -> anyhow::Result<usize> {
    let outputs = decode_output_files(content)?;
    for (name, data) in &outputs {
        let plain = Path::new(name)
            .file_name()
            .is_some_and(|file_name| file_name == name.as_str());
        if !plain {
            bail!("Refusing to write output file with path '{}'", name);
        }
        let path = out_dir.join(name);
        fs::write(&path, data).with_context(|| format!("Failed to write {}", path.display()))?;
    }
    Ok(outputs.len())
}

/// Jobs write their results into one directory, so no two may share an
/// output name.
fn check_out_names(networks: &[Network], args: &str) -> anyhow::Result<()> {
    let mut seen: HashMap<String, &str> = HashMap::new();
    for network in networks {
        let out_name = derive_out_name(args, network.base_name());
        if let Some(previous) = seen.insert(out_name.clone(), network.filename()) {
            bail!(
                "Networks {} and {} would both write results named '{}'",
                previous,
                network.filename(),
                out_name
            );
        }
    }
    Ok(())
}

fn read_network(path: &Path) -> anyhow::Result<Network> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read network {}", path.display()))?;
    Ok(Network::file(file_name(path)?, content))
}

fn read_files(paths: &[PathBuf]) -> anyhow::Result<BTreeMap<String, String>> {
    let mut files = BTreeMap::new();
    for path in paths {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        files.insert(file_name(path)?, content);
    }
    Ok(files)
}

fn file_name(path: &Path) -> anyhow::Result<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .with_context(|| format!("{} has no usable file name", path.display()))
}
