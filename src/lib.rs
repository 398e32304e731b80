//! Client-side orchestration of remote model conversion, benchmark and
//! quantization jobs.
//!
//! A [`TaskOrchestrator`](orchestrator::TaskOrchestrator) takes a local model
//! through upload, validation, start, polling and retrieval, checkpointing the
//! task record after every phase.

pub mod app;
pub mod artifact;
pub mod config;
pub mod error;
pub mod family;
pub mod orchestrator;
pub mod params;
pub mod polling;
pub mod quota;
pub mod remote;
pub mod state_machine;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;
