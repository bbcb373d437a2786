//! Operators module - sparse states, local estimators and operator queues.

mod linop;
mod sstate;

pub use linop::{local_energy, scalar_value, vector_value, Derived, LinOp, LocalValue, OpQueue};
pub use sstate::{soverlap, vec2sstate, SparseState};
