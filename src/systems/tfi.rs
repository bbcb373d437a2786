//! Transverse-field Ising model.

use serde::{Deserialize, Serialize};

use super::SpinHamiltonian;
use crate::lattice::Lattice;

/// `H = Jz Σ_<ij> S^z_i S^z_j + h Σ_i S^x_i` with spin-1/2 operators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransverseIsing {
    pub jz: f64,
    pub h: f64,
    pub lattice: Lattice,
}

impl TransverseIsing {
    pub fn new(jz: f64, h: f64, lattice: Lattice) -> Self {
        Self { jz, h, lattice }
    }
}

impl SpinHamiltonian for TransverseIsing {
    fn nsite(&self) -> usize {
        self.lattice.nsite()
    }

    fn terms(&self, config: &[i8]) -> Vec<(f64, Vec<usize>)> {
        let parity: i32 = self
            .lattice
            .bonds()
            .iter()
            .map(|&(i, j)| i32::from(config[i] * config[j]))
            .sum();

        let mut terms = Vec::with_capacity(config.len() + 1);
        terms.push((self.jz / 4.0 * f64::from(parity), Vec::new()));
        terms.extend((0..config.len()).map(|i| (self.h / 2.0, vec![i])));
        terms
    }
}
