// src/capability/mod.rs

//! Capability predicates.
//!
//! - [`set`] holds the named features a run offers (`petsc = 3.18.1`,
//!   `mpi_procs = 4`, ...).
//! - [`expr`] parses and evaluates the expressions jobs declare against
//!   that set (`"petsc>=3.18 & !slepc"`).

pub mod expr;
pub mod set;

pub use expr::{CapabilityExpr, CapabilityParseError, CompareOp};
pub use set::{Capabilities, CapabilityValue};

/// Capability holding the job's resolved process count.
pub const MPI_PROCS: &str = "mpi_procs";

/// Capability holding the job's resolved threads per process.
pub const NUM_THREADS: &str = "num_threads";

/// Parse `expr` and evaluate it against `caps`.
pub fn check(expr: &str, caps: &Capabilities) -> Result<bool, CapabilityParseError> {
    Ok(CapabilityExpr::parse(expr)?.eval(caps))
}
