//! Exact reference measurement by summation over the full Hilbert space.

use num_complex::Complex64;

use super::traits::{Measurement, Measurer};
use crate::error::{Result, VmcError};
use crate::lattice::{magnetization, SpinSpace};
use crate::operators::{LocalValue, OpQueue};
use crate::wavefunction::Rbm;

/// Born-weighted averages `Σ_σ |Ψ(σ)|² O_loc(σ) / Σ_σ |Ψ(σ)|²`, optionally
/// restricted to one magnetization sector.
#[derive(Debug, Clone)]
pub struct ExactMeasurer {
    pub space: SpinSpace,
    pub magnetization: Option<i32>,
}

impl ExactMeasurer {
    pub fn new(space: SpinSpace) -> Self {
        Self {
            space,
            magnetization: None,
        }
    }

    pub fn with_magnetization(mut self, m: i32) -> Self {
        self.magnetization = Some(m);
        self
    }

    /// Basis configurations included in the sum.
    pub fn configs(&self) -> Vec<Vec<i8>> {
        self.space
            .configs()
            .filter(|c| self.magnetization.map_or(true, |m| magnetization(c) == m))
            .collect()
    }
}

impl Measurer for ExactMeasurer {
    fn measure(&mut self, rbm: &Rbm, queue: &OpQueue) -> Result<Measurement> {
        if rbm.nin() != self.space.nsite {
            return Err(VmcError::ConfigLength {
                expected: rbm.nin(),
                found: self.space.nsite,
            });
        }
        if self.space.checked_hndim().is_none() {
            return Err(VmcError::InvalidParameter(format!(
                "{} sites exceed the Hilbert space an exact sum can index",
                self.space.nsite
            )));
        }
        let configs = self.configs();
        if configs.is_empty() {
            return Err(VmcError::NoSamples);
        }

        let thetas: Vec<_> = configs.iter().map(|c| rbm.feed_input(c)).collect();
        let log_weights: Vec<f64> = configs
            .iter()
            .zip(thetas.iter())
            .map(|(c, t)| 2.0 * rbm.log_weight(c, Some(t)).re)
            .collect();
        let shift = log_weights.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        let mut acc: Vec<LocalValue> = Vec::new();
        let mut norm = 0.0;
        for ((config, theta), lw) in configs.iter().zip(thetas.iter()).zip(log_weights) {
            let p = Complex64::new((lw - shift).exp(), 0.0);
            norm += p.re;
            let values = queue.evaluate(rbm, config, theta);
            if acc.is_empty() {
                acc = values.into_iter().map(|v| v * p).collect();
            } else {
                for (a, v) in acc.iter_mut().zip(values) {
                    *a += v * p;
                }
            }
        }

        let values: Vec<LocalValue> = acc
            .into_iter()
            .map(|v| v / Complex64::new(norm, 0.0))
            .collect();
        Ok(Measurement {
            std_err: vec![Some(0.0); values.len()],
            values,
            accept_rate: 1.0,
            nsample: configs.len(),
        })
    }
}
