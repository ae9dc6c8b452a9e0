//! Infomap CLI - run network clustering jobs on isolated workers.

mod run;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "infomap")]
#[command(about = "Run Infomap clustering jobs on isolated workers")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Cluster one or more networks, one job per network
    Run {
        /// Network files to cluster
        #[arg(required = true)]
        networks: Vec<PathBuf>,

        /// Arguments passed to Infomap, e.g. "--two-level -N 5"
        #[arg(short, long, default_value = "", allow_hyphen_values = true)]
        args: String,

        /// Auxiliary input file made available to every job
        #[arg(short, long = "file")]
        files: Vec<PathBuf>,

        /// Directory to write result files to
        #[arg(short, long, default_value = ".")]
        out_dir: PathBuf,

        /// Engine shared library (overrides INFOMAP_ENGINE_PATH)
        #[arg(long)]
        engine: Option<PathBuf>,

        /// Worker binary (overrides INFOMAP_WORKER_PATH)
        #[arg(long)]
        worker: Option<PathBuf>,

        /// Fail jobs still running after this many seconds
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Print the engine version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        tracing_subscriber::EnvFilter::from_default_env()
            .add_directive(tracing::Level::DEBUG.into())
    } else {
        tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    // Helper to format infomap-core errors with recovery hints
    let format_error = |err: anyhow::Error| -> anyhow::Error {
        if let Some(infomap_err) = err.downcast_ref::<infomap_core::Error>() {
            anyhow::anyhow!("{}", infomap_err.with_hint())
        } else {
            err
        }
    };

    match cli.command {
        Commands::Run {
            networks,
            args,
            files,
            out_dir,
            engine,
            worker,
            timeout,
        } => {
            let options = run::RunOptions {
                networks,
                args,
                files,
                out_dir,
                engine,
                worker,
                timeout,
            };
            run::execute(options).await.map_err(format_error)?;
        }

        Commands::Version => {
            println!("Infomap {}", infomap_core::Infomap::VERSION);
        }
    }

    Ok(())
}
