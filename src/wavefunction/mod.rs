//! Wavefunction module - RBM and DBM ansatzes, hidden-unit kernels and the optimizable-ansatz trait.

mod dbm;
mod kernel;
mod rbm;
mod traits;

pub use dbm::Dbm;
pub use kernel::{log2cosh, log2sinh, logcosh, HiddenKernel, OVERFLOW_THRESHOLD};
pub use rbm::{Dtype, Rbm};
pub use traits::OptimizableAnsatz;
