//! Systems module - spin-1/2 lattice Hamiltonians.
//!
//! Every model is described by the list of its non-zero matrix elements in a
//! given ±1 configuration: a diagonal term (no flips) plus one term per allowed
//! spin flip. Both the local estimators and the dense reference matrix are built
//! from that list.

mod heisenberg;
mod tfi;

pub use heisenberg::Heisenberg;
pub use tfi::TransverseIsing;

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::lattice::{Lattice, SpinSpace};
use crate::operators::SparseState;

/// A real symmetric spin Hamiltonian in the σ^z basis.
pub trait SpinHamiltonian {
    fn nsite(&self) -> usize;

    /// Non-zero elements `<σ'|H|σ>` as `(weight, flipped sites)`; `σ'` is `config`
    /// with those sites flipped. An empty flip list is the diagonal element.
    fn terms(&self, config: &[i8]) -> Vec<(f64, Vec<usize>)>;

    /// `H|state>` as a sparse state.
    fn rmatmul(&self, state: &SparseState) -> SparseState {
        let mut ws = Vec::new();
        let mut configs = Vec::new();
        for (w, config) in state.iter() {
            for (h, flips) in self.terms(config) {
                if h == 0.0 {
                    continue;
                }
                let mut flipped = config.clone();
                for &k in &flips {
                    flipped[k] = -flipped[k];
                }
                ws.push(*w * h);
                configs.push(flipped);
            }
        }
        SparseState::compact(ws, configs)
    }

    /// Dense matrix over the full Hilbert space, for exact diagonalization.
    fn matrix(&self, space: &SpinSpace) -> DMatrix<f64> {
        let n = space.hndim();
        let mut mat = DMatrix::zeros(n, n);
        for (col, config) in space.configs().enumerate() {
            for (h, flips) in self.terms(&config) {
                let mut flipped = config.clone();
                for &k in &flips {
                    flipped[k] = -flipped[k];
                }
                mat[(space.config2ind(&flipped), col)] += h;
            }
        }
        mat
    }

    /// Lowest eigenvalue of the dense matrix.
    fn ground_state_energy(&self) -> f64 {
        let space = SpinSpace::new(self.nsite());
        self.matrix(&space)
            .symmetric_eigenvalues()
            .iter()
            .copied()
            .fold(f64::INFINITY, f64::min)
    }
}

/// Tagged selection of the reference models.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Model {
    Heisenberg(Heisenberg),
    Tfi(TransverseIsing),
}

impl Model {
    pub fn lattice(&self) -> &Lattice {
        match self {
            Model::Heisenberg(h) => &h.lattice,
            Model::Tfi(h) => &h.lattice,
        }
    }

    /// Whether the model conserves total magnetization, so that pair flips suffice.
    pub fn conserves_magnetization(&self) -> bool {
        matches!(self, Model::Heisenberg(_))
    }

    /// `H|σ>` for a single basis configuration.
    pub fn apply_to(&self, config: &[i8]) -> SparseState {
        self.rmatmul(&SparseState::basis(config.to_vec()))
    }
}

impl SpinHamiltonian for Model {
    fn nsite(&self) -> usize {
        match self {
            Model::Heisenberg(h) => h.nsite(),
            Model::Tfi(h) => h.nsite(),
        }
    }

    fn terms(&self, config: &[i8]) -> Vec<(f64, Vec<usize>)> {
        match self {
            Model::Heisenberg(h) => h.terms(config),
            Model::Tfi(h) => h.terms(config),
        }
    }
}

impl std::fmt::Display for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Model::Heisenberg(h) => write!(
                f,
                "Heisenberg J={} Jz={} on {:?} (periodic: {})",
                h.j, h.jz, h.lattice.shape, h.lattice.periodic
            ),
            Model::Tfi(h) => write!(
                f,
                "TFI Jz={} h={} on {:?} (periodic: {})",
                h.jz, h.h, h.lattice.shape, h.lattice.periodic
            ),
        }
    }
}
