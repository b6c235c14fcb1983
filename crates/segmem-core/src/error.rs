//! Error surface of the memory core.
//!
//! Only conditions the executor can recover from are `Err` values: a write
//! through a read-only binding, or a solver failure while concretizing.
//! Contract violations (width mismatches, out-of-range concrete offsets,
//! binding a state to a symbolic-size object) are fatal assertions at the
//! call site.

use thiserror::Error;

use crate::solver::SolverError;

/// Recoverable memory-core errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    /// A write reached an object marked read-only. The planes are untouched.
    #[error("write to read-only object '{name}' (id {id})")]
    ReadOnlyWrite {
        /// Name of the object at the time of the write.
        name: String,
        /// Object id.
        id: u64,
    },

    /// The solver failed while concretizing plane contents.
    #[error(transparent)]
    Solver(#[from] SolverError),
}

/// Result alias for memory-core operations.
pub type MemResult<T> = Result<T, MemoryError>;
