//! Stochastic Reconfiguration (SR) wavefunction optimizer.
//!
//! Each iteration measures the moments of an SR operator queue and builds
//!
//!   S_kk' = ⟨O_k* O_k'⟩ - ⟨O_k⟩*⟨O_k'⟩   (quantum geometric tensor)
//!   F_k   = ⟨O_k* H⟩ - ⟨O_k⟩*⟨H⟩       (force)
//!
//! where O_k = ∂ ln Ψ / ∂p_k. The natural gradient `g = S⁻¹ F`, with S
//! regularized by one of the [`Regularization`] rules, is handed to a step
//! [`Optimizer`] whose output is added to the parameters.

use nalgebra::{DMatrix, DVector};
use num_complex::Complex64;

use super::optimizer::Optimizer;
use super::traits::{Measurement, Measurer};
use crate::error::{Result, VmcError};
use crate::operators::OpQueue;
use crate::systems::Model;
use crate::wavefunction::{OptimizableAnsatz, Rbm};

/// Regularization of the S matrix before inversion.
#[derive(Debug, Clone, PartialEq)]
pub enum Regularization {
    /// `S + λ I`.
    Delta { lambda: f64 },
    /// `S_kk *= 1 + λ(p)`, `λ(p) = max(λ0 bᵖ, λ_min)`.
    Carleo { lambda0: f64, b: f64, lambda_min: f64 },
    /// `S_kk *= 1 + λ0`, then eigenvalues with `s_i / s_max < eps` are discarded.
    Trunc { lambda0: f64, eps: f64 },
    /// Moore-Penrose pseudo-inverse.
    Pinv,
    /// `S⁻¹ = I`, plain steepest descent.
    Identity,
}

impl Default for Regularization {
    fn default() -> Self {
        Regularization::Delta { lambda: 1e-4 }
    }
}

/// Singular values below this are treated as zero by the pseudo-inverse.
const PINV_EPS: f64 = 1e-12;

impl Regularization {
    pub fn carleo() -> Self {
        Regularization::Carleo {
            lambda0: 100.0,
            b: 0.9,
            lambda_min: 1e-4,
        }
    }

    pub fn trunc() -> Self {
        Regularization::Trunc {
            lambda0: 0.2,
            eps: 1e-3,
        }
    }

    /// Rule by name with default parameters; `lambda` overrides `λ` / `λ0`.
    pub fn from_config(method: &str, lambda: Option<f64>) -> Result<Self> {
        let mut reg = match method {
            "delta" => Regularization::default(),
            "carleo" => Regularization::carleo(),
            "trunc" => Regularization::trunc(),
            "pinv" => Regularization::Pinv,
            "identity" => Regularization::Identity,
            other => return Err(VmcError::UnknownRegularization(other.to_string())),
        };
        if let Some(value) = lambda {
            match &mut reg {
                Regularization::Delta { lambda } => *lambda = value,
                Regularization::Carleo { lambda0, .. } | Regularization::Trunc { lambda0, .. } => {
                    *lambda0 = value
                }
                Regularization::Pinv | Regularization::Identity => {}
            }
        }
        Ok(reg)
    }

    /// Diagonal shift at outer iteration `p`.
    pub fn lambda(&self, p: usize) -> f64 {
        match self {
            Regularization::Delta { lambda } => *lambda,
            Regularization::Carleo { lambda0, b, lambda_min } => {
                let decayed = lambda0 * b.powi(i32::try_from(p).unwrap_or(i32::MAX));
                decayed.max(*lambda_min)
            }
            Regularization::Trunc { lambda0, .. } => *lambda0,
            Regularization::Pinv | Regularization::Identity => 0.0,
        }
    }

    /// Regularized inverse of the Hermitian matrix `s` at outer iteration `p`.
    pub fn inverse(&self, s: &DMatrix<Complex64>, p: usize) -> Result<DMatrix<Complex64>> {
        let n = s.nrows();
        match self {
            Regularization::Delta { lambda } => {
                let shifted = s + DMatrix::<Complex64>::identity(n, n) * Complex64::new(*lambda, 0.0);
                shifted
                    .try_inverse()
                    .ok_or_else(|| VmcError::SingularMatrix(format!("S + {:e} I", lambda)))
            }
            Regularization::Carleo { .. } => {
                let lambda = self.lambda(p);
                scale_diagonal(s, 1.0 + lambda)
                    .try_inverse()
                    .ok_or_else(|| VmcError::SingularMatrix(format!("diagonal scaled by 1 + {:e}", lambda)))
            }
            Regularization::Trunc { lambda0, eps } => Ok(truncated_inverse(&scale_diagonal(s, 1.0 + lambda0), *eps)),
            Regularization::Pinv => s
                .clone()
                .pseudo_inverse(PINV_EPS)
                .map_err(|e| VmcError::SingularMatrix(e.to_string())),
            Regularization::Identity => Ok(DMatrix::identity(n, n)),
        }
    }
}

fn scale_diagonal(s: &DMatrix<Complex64>, factor: f64) -> DMatrix<Complex64> {
    let mut out = s.clone();
    for k in 0..out.nrows().min(out.ncols()) {
        out[(k, k)] *= factor;
    }
    out
}

/// Inverse from the eigenpairs with `s_i / s_max >= eps`.
fn truncated_inverse(s: &DMatrix<Complex64>, eps: f64) -> DMatrix<Complex64> {
    let n = s.nrows();
    let eigen = s.clone().symmetric_eigen();
    let s_max = eigen.eigenvalues.iter().copied().fold(0.0_f64, f64::max);
    let mut inv = DMatrix::<Complex64>::zeros(n, n);
    if s_max <= 0.0 {
        return inv;
    }
    for (i, &value) in eigen.eigenvalues.iter().enumerate() {
        if value / s_max < eps {
            continue;
        }
        let v = eigen.eigenvectors.column(i);
        inv += (&v * v.adjoint()) * Complex64::new(1.0 / value, 0.0);
    }
    inv
}

/// Summary of one SR iteration.
#[derive(Debug, Clone)]
pub struct SrStep {
    pub energy: f64,
    pub std_err: Option<f64>,
    pub accept_rate: f64,
    pub grad_norm: f64,
}

/// Results from SR optimization.
#[derive(Clone, Debug)]
pub struct SrResult {
    /// Optimized parameter values
    pub final_params: DVector<Complex64>,
    /// Energy of the last iteration
    pub final_energy: f64,
    /// Energy at each iteration
    pub energy_history: Vec<f64>,
    /// Standard error of the energy at each iteration
    pub error_history: Vec<Option<f64>>,
    /// Acceptance rate at each iteration
    pub accept_history: Vec<f64>,
    pub converged: bool,
}

/// SR driver over an RBM ansatz.
pub struct StochasticReconfiguration<O: Optimizer> {
    pub queue: OpQueue,
    pub regularization: Regularization,
    pub optimizer: O,
    /// Stop once `|ΔE|` between iterations falls below this.
    pub tolerance: Option<f64>,
    /// Iterations run before the tolerance is checked.
    pub min_iterations: usize,
}

impl<O: Optimizer> StochasticReconfiguration<O> {
    pub fn new(model: Model, regularization: Regularization, optimizer: O) -> Self {
        Self {
            queue: OpQueue::sr(model),
            regularization,
            optimizer,
            tolerance: None,
            min_iterations: 5,
        }
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = Some(tolerance);
        self
    }

    pub fn with_min_iterations(mut self, n: usize) -> Self {
        self.min_iterations = n;
        self
    }

    /// Energy and natural gradient `S⁻¹ F` from the measured SR moments.
    pub fn compute_gradient(&self, m: &Measurement, p: usize) -> Result<(f64, DVector<Complex64>)> {
        if m.values.len() < 4 {
            return Err(VmcError::DimensionMismatch(format!(
                "SR needs [O, H, O*O, O*H], got {} values",
                m.values.len()
            )));
        }
        let o: DVector<Complex64> = m.values[0].column(0).into_owned();
        let energy = m.values[1][(0, 0)];
        let oh: DVector<Complex64> = m.values[3].column(0).into_owned();
        let oc = o.conjugate();

        let s = &m.values[2] - &oc * o.transpose();
        let f = oh - oc * energy;
        let sinv = self.regularization.inverse(&s, p)?;
        Ok((energy.re, sinv * f))
    }

    /// Measure, compute the natural gradient and update `rbm` in place.
    pub fn step<M: Measurer>(&mut self, rbm: &mut Rbm, measurer: &mut M, p: usize) -> Result<SrStep> {
        let m = measurer.measure(rbm, &self.queue)?;
        let (energy, grad) = self.compute_gradient(&m, p)?;
        let delta = self.optimizer.step(energy, &grad, p);
        rbm.apply_update(&delta)?;
        Ok(SrStep {
            energy,
            std_err: m.std_err.get(1).copied().flatten(),
            accept_rate: m.accept_rate,
            grad_norm: grad.norm(),
        })
    }

    /// Run up to `niter` SR iterations.
    pub fn optimize<M: Measurer>(&mut self, rbm: &mut Rbm, measurer: &mut M, niter: usize) -> Result<SrResult> {
        log::info!("Stochastic Reconfiguration");
        log::info!("  Ansatz:          {}", rbm);
        log::info!("  Parameters:      {}", rbm.num_params());
        log::info!("  Regularization:  {:?}", self.regularization);
        log::info!("  Iterations:      {}", niter);

        let nsite = rbm.nin() as f64;
        let mut energy_history = Vec::with_capacity(niter);
        let mut error_history = Vec::with_capacity(niter);
        let mut accept_history = Vec::with_capacity(niter);
        let mut converged = false;
        let mut prev_energy = f64::MAX;

        for p in 0..niter {
            let step = self.step(rbm, measurer, p)?;
            log::info!(
                "  Iter {:4}: E = {:12.6} ± {:.2e}, E/site = {:10.6}, |g| = {:.3e}, accept = {:.3}",
                p,
                step.energy,
                step.std_err.unwrap_or(f64::NAN),
                step.energy / nsite,
                step.grad_norm,
                step.accept_rate
            );
            energy_history.push(step.energy);
            error_history.push(step.std_err);
            accept_history.push(step.accept_rate);

            if let Some(tol) = self.tolerance {
                let change = (step.energy - prev_energy).abs();
                if p + 1 >= self.min_iterations && change < tol {
                    log::info!("  Converged after {} iterations (|dE| = {:.2e} < {:.2e})", p + 1, change, tol);
                    converged = true;
                    break;
                }
            }
            prev_energy = step.energy;
        }

        Ok(SrResult {
            final_params: rbm.get_params(),
            final_energy: energy_history.last().copied().unwrap_or(f64::NAN),
            energy_history,
            error_history,
            accept_history,
            converged,
        })
    }
}
