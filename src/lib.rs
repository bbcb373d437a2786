//! Neural-network quantum states in Rust
//!
//! This crate provides Variational Monte Carlo (VMC) for spin-1/2 lattice models with a
//! Restricted Boltzmann Machine (RBM) ansatz, optimized by Stochastic Reconfiguration (SR).

pub mod error;
pub mod io;
pub mod lattice;
pub mod operators;
pub mod sampling;
pub mod systems;
pub mod wavefunction;

// Re-export commonly used types at crate root
pub use error::{Result, VmcError};
pub use io::{load_carleo_wf, RunConfig};
pub use lattice::{Group, Lattice, SpinSpace};
pub use operators::{LinOp, OpQueue, SparseState};
pub use sampling::{
    Bin, ConfigGenerator, ExactMeasurer, FlipMove, Measurement, Measurer, Optimizer, RbmConfigGenerator, Regularization,
    SrResult, StochasticReconfiguration, Vmc, VmcParams,
};
pub use systems::{Heisenberg, Model, SpinHamiltonian, TransverseIsing};
pub use wavefunction::{Dbm, Dtype, OptimizableAnsatz, Rbm};
