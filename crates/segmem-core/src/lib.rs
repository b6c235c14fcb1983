//! Two-plane segmented memory model for a bitcode-level symbolic VM.
//!
//! Every first-class value is a [`KValue`]: a `(segment, offset)` pair of
//! equal-width terms. Scalars carry segment zero; pointers carry the segment
//! of the allocation they were derived from, so provenance survives pointer
//! arithmetic and a bounds check never has to materialize the heap as one
//! flat array. Each allocation is described by a [`MemoryObject`] and its
//! live contents by an [`ObjectState`] holding two byte-addressable planes:
//! the offset plane (values) and a lazily materialized segment plane
//! (provenance bytes).

mod context;
mod error;
mod kvalue;
mod manager;
mod object;
mod plane;
mod solver;
mod state;

pub use context::{ByteOrder, Context};
pub use error::{MemResult, MemoryError};
pub use kvalue::KValue;
pub use manager::MemoryManager;
pub use object::{AllocSite, MemoryObject};
pub use plane::ObjectStatePlane;
pub use solver::{AssignmentSolver, SolverError, TimingSolver};
pub use state::{ObjectState, UNOWNED};
