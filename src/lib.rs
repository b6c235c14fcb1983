//! segmem - segmented symbolic memory core
//!
//! This is the main library crate that re-exports all components.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub use segmem_core as core;
pub use segmem_expr as expr;
