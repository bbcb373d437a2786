//! Spin-flip move proposer for RBM amplitudes.

use nalgebra::DVector;
use num_complex::Complex64;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::traits::ConfigGenerator;
use crate::error::{Result, VmcError};
use crate::wavefunction::Rbm;

/// Move type, fixed when the generator is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlipMove {
    /// Flip one uniformly chosen site.
    #[default]
    Single,
    /// Flip one up and one down site, conserving total magnetization.
    Pair,
}

impl FlipMove {
    pub fn nflip(&self) -> usize {
        match self {
            FlipMove::Single => 1,
            FlipMove::Pair => 2,
        }
    }
}

/// Config generator with an incrementally updated theta table.
#[derive(Debug, Clone, Default)]
pub struct RbmConfigGenerator {
    pub moves: FlipMove,
    config: Vec<i8>,
    theta: Option<DVector<Complex64>>,
    shadow: Option<DVector<Complex64>>,
}

impl RbmConfigGenerator {
    pub fn new(moves: FlipMove) -> Self {
        Self {
            moves,
            ..Self::default()
        }
    }

    /// Start the chain from `config` instead of a random configuration.
    pub fn with_initial_config(mut self, config: Vec<i8>) -> Self {
        self.config = config;
        self
    }

    /// Uniform ±1 configuration for single flips; a shuffled configuration with
    /// magnetization 0 (or 1 for odd `nsite`) for pair flips.
    pub fn random_config<R: Rng + ?Sized>(&self, nsite: usize, rng: &mut R) -> Vec<i8> {
        match self.moves {
            FlipMove::Single => (0..nsite)
                .map(|_| if rng.gen::<bool>() { 1 } else { -1 })
                .collect(),
            FlipMove::Pair => {
                let mut config: Vec<i8> = (0..nsite).map(|i| if i % 2 == 0 { 1 } else { -1 }).collect();
                config.shuffle(rng);
                config
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.config.iter().any(|&c| c != 1 && c != -1) {
            return Err(VmcError::InvalidConfiguration(format!(
                "entries must be +1 or -1, got {:?}",
                self.config
            )));
        }
        if self.moves == FlipMove::Pair {
            let up = self.config.iter().filter(|&&c| c == 1).count();
            if up == 0 || up == self.config.len() {
                return Err(VmcError::InvalidConfiguration(
                    "pair flips need at least one up and one down spin".to_string(),
                ));
            }
        }
        Ok(())
    }

    fn propose<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Vec<usize>> {
        match self.moves {
            FlipMove::Single => Ok(vec![rng.gen_range(0..self.config.len())]),
            FlipMove::Pair => {
                let (up, down): (Vec<usize>, Vec<usize>) =
                    (0..self.config.len()).partition(|&i| self.config[i] == 1);
                match (up.choose(rng), down.choose(rng)) {
                    (Some(&i), Some(&j)) => Ok(vec![i, j]),
                    _ => Err(VmcError::InvalidConfiguration(
                        "pair flips need at least one up and one down spin".to_string(),
                    )),
                }
            }
        }
    }
}

impl ConfigGenerator for RbmConfigGenerator {
    fn set_state<R: Rng + ?Sized>(&mut self, rbm: &Rbm, rng: &mut R) -> Result<()> {
        if self.config.is_empty() {
            self.config = self.random_config(rbm.nin(), rng);
        }
        rbm.check_config(&self.config)?;
        self.validate()?;
        self.theta = Some(rbm.feed_input(&self.config));
        self.shadow = None;
        Ok(())
    }

    fn fire<R: Rng + ?Sized>(&mut self, rbm: &Rbm, rng: &mut R) -> Result<(Vec<usize>, f64)> {
        let theta = self.theta.as_ref().ok_or(VmcError::NotBound)?;
        rbm.check_config(&self.config)?;
        let flips = self.propose(rng)?;
        let (new_theta, ratio) = rbm.pop(&self.config, theta, &flips);
        self.shadow = Some(new_theta);
        Ok((flips, ratio.norm_sqr()))
    }

    fn reject(&mut self) {
        self.shadow = None;
    }

    fn confirm(&mut self, flips: &[usize]) -> Result<()> {
        let shadow = self.shadow.take().ok_or_else(|| {
            VmcError::InvalidConfiguration("confirm called without a pending proposal".to_string())
        })?;
        for &k in flips {
            self.config[k] = -self.config[k];
        }
        self.theta = Some(shadow);
        Ok(())
    }

    fn config(&self) -> &[i8] {
        &self.config
    }

    fn theta(&self) -> Option<&DVector<Complex64>> {
        self.theta.as_ref()
    }
}
