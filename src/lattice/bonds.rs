//! Hypercubic lattices and their nearest-neighbour bonds.

use serde::{Deserialize, Serialize};

use super::group::Group;

/// Hypercubic lattice with row-major site numbering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lattice {
    pub shape: Vec<usize>,
    #[serde(default)]
    pub periodic: bool,
}

impl Lattice {
    pub fn chain(n: usize, periodic: bool) -> Self {
        Self { shape: vec![n], periodic }
    }

    pub fn square(n1: usize, n2: usize, periodic: bool) -> Self {
        Self { shape: vec![n1, n2], periodic }
    }

    pub fn nsite(&self) -> usize {
        self.shape.iter().product()
    }

    /// Nearest-neighbour pairs `(i, j)`. Wrap-around bonds are only added for axes
    /// longer than two sites so that no bond is counted twice.
    pub fn bonds(&self) -> Vec<(usize, usize)> {
        let ndim = self.shape.len();
        let mut strides = vec![1; ndim];
        for axis in (0..ndim.saturating_sub(1)).rev() {
            strides[axis] = strides[axis + 1] * self.shape[axis + 1];
        }

        let mut bonds = Vec::new();
        for site in 0..self.nsite() {
            for axis in 0..ndim {
                let len = self.shape[axis];
                let coord = (site / strides[axis]) % len;
                if coord + 1 < len {
                    bonds.push((site, site + strides[axis]));
                } else if self.periodic && len > 2 {
                    bonds.push((site, site - coord * strides[axis]));
                }
            }
        }
        bonds
    }

    /// Translation group of the lattice when periodic, trivial group otherwise.
    pub fn symmetry_group(&self) -> Group {
        if self.periodic {
            Group::translation(self.shape.clone())
        } else {
            Group::Trivial
        }
    }
}
