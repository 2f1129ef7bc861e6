//! Execution of a single simulation run.
//!
//! A job moves through `prepared -> input-transformed -> executing -> executed ->
//! output-transformed -> reported -> cleaned`. The progress monitor runs alongside the executor
//! and has always acknowledged its stop before the output transform starts, so directory
//! cleanup can never race with it.

pub mod adapter;
pub mod monitor;
pub mod pipeline;
pub mod reporter;
pub mod result;
pub mod workspace;


pub use monitor::{MonitorHandle, MonitorSummary, ProgressMonitor, DEFAULT_MONITOR_INTERVAL};
pub use pipeline::{JobOutcome, JobPipeline};
pub use reporter::ResultReporter;
pub use result::{read_result_file, RunStatus, SimulationRunResult};
pub use workspace::JobWorkingDirectory;
