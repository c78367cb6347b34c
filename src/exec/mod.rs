// src/exec/mod.rs

//! Process execution layer.
//!
//! This module is responsible for actually running job commands, using
//! `tokio::process::Command`, and handing the raw result back to the worker
//! that asked for it.
//!
//! - [`runner`] runs one job process with timeout and cancellation.
//! - [`output`] trims oversized captured output.
//! - [`backend`] provides the `JobExecutor` trait and the production
//!   `ProcessExecutor`, which tests can replace with a fake implementation.

pub mod backend;
pub mod output;
pub mod runner;

pub use backend::{JobExecutor, JobFuture, ProcessExecutor};
pub use runner::{run_job, RawResult};
