//! Typed clients for the platform services the worker talks to.
//!
//! Each client pairs the shared [`Dispatcher`](crate::dispatch::Dispatcher) with the endpoint
//! pool of its role and knows the service paths of that role. Decoding problems in a response
//! body are reported as [`DecodeError`] so callers can decide whether they are recoverable.

pub mod coordinator;
pub mod discovery;
pub mod storage;

pub use coordinator::{
    decode_next_simulation, DecodeError, ExperimentManagerClient, NextSimulation, SimulationJob,
    PROGRESS_REPORT_TIMEOUT,
};
pub use discovery::{discover, ServiceDirectory};
pub use storage::StorageManagerClient;
