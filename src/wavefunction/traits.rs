//! Ansatz traits for variational optimization.

use nalgebra::DVector;
use num_complex::Complex64;

use crate::error::{Result, VmcError};

/// Trait for wavefunctions with optimizable variational parameters.
///
/// Used by Stochastic Reconfiguration. Provides the log-derivatives
/// O_k = ∂ ln Ψ(σ) / ∂p_k that enter both the geometric tensor and the force.
pub trait OptimizableAnsatz {
    /// Number of trainable parameters.
    fn num_params(&self) -> usize;

    /// Current trainable parameters as one flat vector.
    fn get_params(&self) -> DVector<Complex64>;

    /// Overwrite the trainable parameters from a flat vector.
    fn set_params(&mut self, params: &DVector<Complex64>) -> Result<()>;

    /// Compute O_k for configuration `config` with pre-activations `theta`.
    fn log_derivatives(&self, config: &[i8], theta: &DVector<Complex64>) -> DVector<Complex64>;

    /// Add `delta` to the trainable parameters in place.
    fn apply_update(&mut self, delta: &DVector<Complex64>) -> Result<()> {
        if delta.len() != self.num_params() {
            return Err(VmcError::DimensionMismatch(format!(
                "update has {} entries, ansatz has {} parameters",
                delta.len(),
                self.num_params()
            )));
        }
        let params = self.get_params() + delta;
        self.set_params(&params)
    }
}
