//! Spin-1/2 Heisenberg model on a hypercubic lattice.

use serde::{Deserialize, Serialize};

use super::SpinHamiltonian;
use crate::lattice::Lattice;

/// `H = Σ_<ij> J (S^x_i S^x_j + S^y_i S^y_j) + Jz S^z_i S^z_j`.
///
/// In the σ^z basis the exchange part becomes `J/2 (S^+_i S^-_j + S^-_i S^+_j)`,
/// which flips each antiparallel bond with weight `J/2`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Heisenberg {
    #[serde(default = "unit_coupling")]
    pub j: f64,
    #[serde(default = "unit_coupling")]
    pub jz: f64,
    pub lattice: Lattice,
}

fn unit_coupling() -> f64 {
    1.0
}

impl Heisenberg {
    pub fn new(j: f64, jz: f64, lattice: Lattice) -> Self {
        Self { j, jz, lattice }
    }

    /// Isotropic antiferromagnetic chain with `J = Jz = 1`.
    pub fn chain(nsite: usize, periodic: bool) -> Self {
        Self::new(1.0, 1.0, Lattice::chain(nsite, periodic))
    }
}

impl SpinHamiltonian for Heisenberg {
    fn nsite(&self) -> usize {
        self.lattice.nsite()
    }

    fn terms(&self, config: &[i8]) -> Vec<(f64, Vec<usize>)> {
        let bonds = self.lattice.bonds();
        let parity: i32 = bonds
            .iter()
            .map(|&(i, j)| i32::from(config[i] * config[j]))
            .sum();

        let mut terms = Vec::with_capacity(bonds.len() + 1);
        terms.push((self.jz / 4.0 * f64::from(parity), Vec::new()));
        for &(i, j) in &bonds {
            if config[i] != config[j] {
                terms.push((self.j / 2.0, vec![i, j]));
            }
        }
        terms
    }
}
