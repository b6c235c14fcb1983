//! The solver seam.
//!
//! The core talks to a solver in exactly one place, `flush_to_concrete_store`,
//! and asks exactly one question: a satisfying concrete value for a term
//! under the current path condition. The path condition lives behind the
//! trait implementor; the core never names an execution-state type it does
//! not own.

use thiserror::Error;

use segmem_expr::{Assignment, BitVector, EvalError, Term};

/// Solver failure during a `get_value` query.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SolverError {
    /// The solver could not decide the query.
    #[error("solver returned unknown")]
    Unknown,

    /// The solver gave up on a time or resource budget.
    #[error("solver timed out")]
    Timeout,

    /// No model is available for the queried term.
    #[error("no model available: {0}")]
    NoModel(#[from] EvalError),
}

/// A solver capable of producing one satisfying concrete value for a term.
pub trait TimingSolver {
    /// A concrete value for `term` consistent with the implementor's path
    /// condition.
    fn get_value(&mut self, term: &Term) -> Result<BitVector, SolverError>;
}

/// A [`TimingSolver`] backed by a fixed [`Assignment`] model. The in-tree
/// implementation used by tests and by callers that already hold a full
/// model of their symbolic inputs.
#[derive(Debug, Default)]
pub struct AssignmentSolver {
    model: Assignment,
}

impl AssignmentSolver {
    /// Wrap a model.
    pub fn new(model: Assignment) -> Self {
        AssignmentSolver { model }
    }

    /// The underlying model.
    pub fn model(&self) -> &Assignment {
        &self.model
    }

    /// Mutable access to the underlying model.
    pub fn model_mut(&mut self) -> &mut Assignment {
        &mut self.model
    }
}

impl TimingSolver for AssignmentSolver {
    fn get_value(&mut self, term: &Term) -> Result<BitVector, SolverError> {
        Ok(self.model.evaluate(term)?)
    }
}
