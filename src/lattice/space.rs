//! Full Hilbert space of `nsite` spin-1/2 sites.
//!
//! Basis index `ind` maps to a ±1 configuration with site 0 as the most significant
//! bit; bit 0 is spin up (+1), matching the ordering of Kronecker products.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpinSpace {
    pub nsite: usize,
}

impl SpinSpace {
    pub fn new(nsite: usize) -> Self {
        Self { nsite }
    }

    /// Hilbert space dimension, `None` when `2^nsite` does not fit in `usize`.
    pub fn checked_hndim(&self) -> Option<usize> {
        u32::try_from(self.nsite).ok().and_then(|n| 1usize.checked_shl(n))
    }

    /// Hilbert space dimension. Callers must keep `nsite` below `usize::BITS`.
    pub fn hndim(&self) -> usize {
        1 << self.nsite
    }

    pub fn ind2config(&self, ind: usize) -> Vec<i8> {
        (0..self.nsite)
            .map(|k| {
                let bit = (ind >> (self.nsite - 1 - k)) & 1;
                1 - 2 * bit as i8
            })
            .collect()
    }

    pub fn config2ind(&self, config: &[i8]) -> usize {
        config
            .iter()
            .fold(0, |ind, &c| (ind << 1) | usize::from(c < 0))
    }

    /// Iterate over all basis configurations in index order.
    pub fn configs(&self) -> impl Iterator<Item = Vec<i8>> + '_ {
        (0..self.hndim()).map(move |ind| self.ind2config(ind))
    }
}

/// Total magnetization `Σ c_i` of a configuration.
pub fn magnetization(config: &[i8]) -> i32 {
    config.iter().map(|&c| i32::from(c)).sum()
}
