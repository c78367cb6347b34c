// src/config/mod.rs

//! Configuration for testdag.
//!
//! Responsibilities:
//! - Define the TOML-backed job model (`model.rs`).
//! - Load a suite file from disk (`loader.rs`).
//! - Validate a job set before it runs (`validate.rs`).
//! - Hold run-level settings derived from the CLI (`run.rs`).

pub mod loader;
pub mod model;
pub mod run;
pub mod validate;

pub use loader::{load_from_path, load_suite, Suite};
pub use model::{DefaultsSection, JobSpec, SuiteFile};
pub use run::{HaltMode, RunConfig};
pub use validate::validate_jobs;
