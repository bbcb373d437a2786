//! Traits for Monte Carlo sampling.

use nalgebra::DVector;
use num_complex::Complex64;
use rand::Rng;

use crate::error::Result;
use crate::operators::{LocalValue, OpQueue};
use crate::wavefunction::Rbm;

/// Markov-chain move proposer holding one configuration and its theta table.
///
/// The ansatz is passed to every call instead of being stored: the generator
/// only caches data derived from it, refreshed by `set_state` at the start of
/// each sampling pass.
pub trait ConfigGenerator {
    /// Bind to `rbm`: pick the starting configuration if none exists yet and
    /// compute the full theta table.
    fn set_state<R: Rng + ?Sized>(&mut self, rbm: &Rbm, rng: &mut R) -> Result<()>;

    /// Propose a move. Returns the flipped sites and `|Ψ(σ')/Ψ(σ)|²`; only a
    /// shadow theta table is written.
    fn fire<R: Rng + ?Sized>(&mut self, rbm: &Rbm, rng: &mut R) -> Result<(Vec<usize>, f64)>;

    /// Drop the pending proposal.
    fn reject(&mut self);

    /// Commit the pending proposal.
    fn confirm(&mut self, flips: &[usize]) -> Result<()>;

    fn config(&self) -> &[i8];

    /// Theta table of the committed configuration, `None` before `set_state`.
    fn theta(&self) -> Option<&DVector<Complex64>>;
}

/// Expectation values of an operator queue together with their statistics.
#[derive(Debug, Clone)]
pub struct Measurement {
    /// One value per queue entry, base operators first.
    pub values: Vec<LocalValue>,
    /// Largest elementwise standard error per entry, `None` when too few blocks exist.
    pub std_err: Vec<Option<f64>>,
    pub accept_rate: f64,
    pub nsample: usize,
}

impl Measurement {
    /// Scalar entry `index`, e.g. the energy of an SR queue.
    pub fn scalar(&self, index: usize) -> Option<Complex64> {
        self.values
            .get(index)
            .filter(|v| v.shape() == (1, 1))
            .map(|v| v[(0, 0)])
    }
}

/// Anything that can estimate the expectation values of an [`OpQueue`] for an ansatz.
pub trait Measurer {
    fn measure(&mut self, rbm: &Rbm, queue: &OpQueue) -> Result<Measurement>;
}
