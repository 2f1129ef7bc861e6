use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tracing::{debug, error, info, trace};

use simworker::config::{WorkerConfig, DEFAULT_CONFIG_FILE};
use simworker::error::WorkerError;
use simworker::worker::Worker;

/// Pull simulation runs from an experiment and execute them until none are left
#[derive(Parser)]
#[command(name = "simworker")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace, -vvv for all)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Path to the worker configuration
    #[arg(short = 'c', long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Directory holding experiment data (defaults to the current directory)
    #[arg(short = 'w', long)]
    work_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        2 => "trace",
        _ => "trace,hyper=debug,reqwest=debug", // -vvv shows everything including dependencies
    };

    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_target(cli.verbose >= 2)
        .with_thread_ids(cli.verbose >= 3)
        .with_line_number(cli.verbose >= 3)
        .init();

    debug!("simworker started with verbosity level: {}", cli.verbose);
    trace!("Full CLI args: {:?}", std::env::args().collect::<Vec<_>>());

    let code = match run(cli).await {
        Ok(jobs) => {
            info!("Finished after {} simulation run(s)", jobs);
            0
        }
        Err(e) => report_failure(&e),
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> anyhow::Result<u32> {
    // Adapters run inside job directories, so every path handed to them must be absolute
    let root = match cli.work_dir {
        Some(dir) => std::path::absolute(&dir)
            .with_context(|| format!("Cannot resolve working directory {}", dir.display()))?,
        None => std::env::current_dir().context("Cannot determine the working directory")?,
    };

    let config = WorkerConfig::load(&cli.config).await?;
    let worker = Worker::new(config, root)?;
    let summary = worker.run().await?;
    Ok(summary.jobs_completed)
}

/// Print the diagnostic for a failed run and pick the exit code
fn report_failure(err: &anyhow::Error) -> i32 {
    let Some(worker_error) = err.downcast_ref::<WorkerError>() else {
        error!("Fatal error: {:#}", err);
        eprintln!("Error: {err:#}");
        return 1;
    };

    let code = worker_error.exit_code();
    if code == 0 {
        info!("{}", worker_error.user_message());
        return 0;
    }

    error!("Fatal error: {}", worker_error);
    eprintln!(
        "[Fatal error] [E{:04}] {}",
        worker_error.code(),
        worker_error.user_message()
    );
    let mut source = std::error::Error::source(worker_error);
    while let Some(cause) = source {
        eprintln!("  caused by: {}", cause);
        source = cause.source();
    }
    if let Some(tail) = worker_error.log_tail() {
        eprintln!("Last lines of _stdout.txt:");
        eprintln!("{}", tail);
    }
    code
}
