//! # simworker
//!
//! Worker agent for a distributed experiment-execution platform. It pulls simulation runs from
//! a pool of redundant experiment managers, drives the experiment's adapter pipeline for each
//! run, reports intermediate progress while the run executes, and sends results and artifacts
//! back to the platform.
//!
//! ## Usage
//!
//! ```bash
//! simworker [--config config.json] [--work-dir DIR] [-v...]
//! ```
//!
//! ## Modules
//!
//! - `config` - Worker configuration loaded from `config.json`
//! - `dispatch` - Failover request dispatch over redundant service endpoints
//! - `services` - Typed clients for discovery, experiment managers and storage managers
//! - `codebase` - Download and installation of the experiment's adapters and binaries
//! - `job` - Execution of a single simulation run, with background progress monitoring
//! - `worker` - Job acquisition and the worker's primary flow
//! - `subprocess` - Subprocess abstraction used to run adapters, with a mock for testing
//! - `error` - Unified error type with numeric codes and exit-code classification
pub mod codebase;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod job;
pub mod services;
pub mod subprocess;
pub mod worker;
