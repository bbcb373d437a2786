//! Restricted Boltzmann Machine ansatz with optional translation symmetry.
//!
//! The amplitude of a ±1 configuration σ is
//!
//!   Ψ(σ) = exp(Σ_g T_g(σ)·a) · Π_{g,j} f(θ_{g,j}),   θ_{g,j} = T_g(σ)·W_{:,j} + b_j
//!
//! where T_g runs over the `ng` images of σ under the group and f is the hidden
//! kernel (`2 cosh` by default). The theta table is stored flat with index
//! `g * nb + j`, `nb` being the number of hidden units per unit cell.

use std::str::FromStr;

use nalgebra::{DMatrix, DVector};
use num_complex::Complex64;
use rand::Rng;
use rand_distr::{Distribution, Uniform};
use serde::{Deserialize, Serialize};

use super::kernel::HiddenKernel;
use super::traits::OptimizableAnsatz;
use crate::error::{Result, VmcError};
use crate::lattice::{Group, SpinSpace};

/// Numeric type of randomly initialised parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Dtype {
    #[default]
    Complex128,
    Float64,
}

impl FromStr for Dtype {
    type Err = VmcError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "complex128" => Ok(Dtype::Complex128),
            "float64" => Ok(Dtype::Float64),
            other => Err(VmcError::UnsupportedDtype(other.to_string())),
        }
    }
}

impl TryFrom<String> for Dtype {
    type Error = VmcError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<Dtype> for String {
    fn from(d: Dtype) -> Self {
        match d {
            Dtype::Complex128 => "complex128".to_string(),
            Dtype::Float64 => "float64".to_string(),
        }
    }
}

/// Uniform distribution on `[-magnitude, magnitude]`.
pub(crate) fn uniform_range(magnitude: f64) -> Result<Uniform<f64>> {
    if !magnitude.is_finite() || magnitude < 0.0 {
        return Err(VmcError::InvalidParameter(format!(
            "initialisation magnitude must be finite and non-negative, got {}",
            magnitude
        )));
    }
    Ok(Uniform::new_inclusive(-magnitude, magnitude))
}

/// Restricted Boltzmann Machine.
#[derive(Debug, Clone)]
pub struct Rbm {
    /// Visible bias, length `nin`.
    pub a: DVector<Complex64>,
    /// Hidden bias of one unit cell, length `nb`.
    pub b: DVector<Complex64>,
    /// Weights, `nin × nb`.
    pub w: DMatrix<Complex64>,
    pub group: Group,
    /// Trainable blocks, in order `[a, b, W]`.
    pub var_mask: [bool; 3],
    pub kernel: HiddenKernel,
}

impl Rbm {
    pub fn new(
        a: DVector<Complex64>,
        b: DVector<Complex64>,
        w: DMatrix<Complex64>,
        group: Group,
    ) -> Result<Self> {
        if w.shape() != (a.len(), b.len()) {
            return Err(VmcError::DimensionMismatch(format!(
                "W has shape {:?}, expected ({}, {}) from a and b",
                w.shape(),
                a.len(),
                b.len()
            )));
        }
        if let Some(n) = group.n_sites() {
            if n != a.len() {
                return Err(VmcError::DimensionMismatch(format!(
                    "group acts on {} sites but the visible layer has {}",
                    n,
                    a.len()
                )));
            }
        }
        Ok(Self {
            a,
            b,
            w,
            group,
            var_mask: [true; 3],
            kernel: HiddenKernel::Cosh,
        })
    }

    /// Random RBM with entries uniform in `[-magnitude, magnitude]`, plus an
    /// independent imaginary part of the same range for complex dtype.
    pub fn random<R: Rng + ?Sized>(
        nin: usize,
        nb: usize,
        group: Group,
        dtype: Dtype,
        magnitude: f64,
        rng: &mut R,
    ) -> Result<Self> {
        let dist = uniform_range(magnitude)?;
        let mut sample = || match dtype {
            Dtype::Complex128 => Complex64::new(dist.sample(rng), dist.sample(rng)),
            Dtype::Float64 => Complex64::new(dist.sample(rng), 0.0),
        };
        let a = DVector::from_fn(nin, |_, _| sample());
        let b = DVector::from_fn(nb, |_, _| sample());
        let w = DMatrix::from_fn(nin, nb, |_, _| sample());
        Self::new(a, b, w, group)
    }

    pub fn with_kernel(mut self, kernel: HiddenKernel) -> Self {
        self.kernel = kernel;
        self
    }

    pub fn with_var_mask(mut self, var_mask: [bool; 3]) -> Self {
        self.var_mask = var_mask;
        self
    }

    /// Number of visible units.
    pub fn nin(&self) -> usize {
        self.a.len()
    }

    /// Hidden units per unit cell.
    pub fn nb(&self) -> usize {
        self.b.len()
    }

    /// Total number of hidden units, `nb * ng`.
    pub fn nhid(&self) -> usize {
        self.nb() * self.group.ng()
    }

    pub fn check_config(&self, config: &[i8]) -> Result<()> {
        if config.len() != self.nin() {
            return Err(VmcError::ConfigLength {
                expected: self.nin(),
                found: config.len(),
            });
        }
        Ok(())
    }

    /// Pre-activations of all `ng * nb` hidden units.
    pub fn feed_input(&self, config: &[i8]) -> DVector<Complex64> {
        let nb = self.nb();
        let mut theta = DVector::zeros(self.nhid());
        for g in 0..self.group.ng() {
            for j in 0..nb {
                theta[g * nb + j] = self.b[j];
            }
            for (k, &c) in config.iter().enumerate() {
                let row = self.group.dest(k, g);
                let c = f64::from(c);
                for j in 0..nb {
                    theta[g * nb + j] += self.w[(row, j)] * c;
                }
            }
        }
        theta
    }

    /// Visible bias folded over the group images.
    pub fn folded_visible_bias(&self) -> DVector<Complex64> {
        self.group.fold_visible(&self.a)
    }

    fn folded_bias_at(&self, site: usize) -> Complex64 {
        (0..self.group.ng())
            .map(|g| self.a[self.group.dest(site, g)])
            .sum()
    }

    /// `log Ψ(σ)`; `theta` may be passed to skip the forward pass.
    pub fn log_weight(&self, config: &[i8], theta: Option<&DVector<Complex64>>) -> Complex64 {
        let owned;
        let theta = match theta {
            Some(t) => t,
            None => {
                owned = self.feed_input(config);
                &owned
            }
        };
        let visible: Complex64 = self
            .folded_visible_bias()
            .iter()
            .zip(config.iter())
            .map(|(a, &c)| a * f64::from(c))
            .sum();
        let hidden: Complex64 = theta.iter().map(|&t| self.kernel.log_f(t)).sum();
        visible + hidden
    }

    /// Unnormalised amplitude `Ψ(σ)`.
    pub fn get_weight(&self, config: &[i8], theta: Option<&DVector<Complex64>>) -> Complex64 {
        self.log_weight(config, theta).exp()
    }

    /// Dense state vector over the full Hilbert space.
    pub fn tovec(&self, space: &SpinSpace) -> DVector<Complex64> {
        DVector::from_iterator(space.hndim(), space.configs().map(|c| self.get_weight(&c, None)))
    }

    /// Theta table after flipping `flips` of `config`, updated in place of a full
    /// forward pass: each flipped site k shifts block g by `-2 c_k W[dest(k, g)]`.
    pub fn update_theta(
        &self,
        config: &[i8],
        theta: &DVector<Complex64>,
        flips: &[usize],
    ) -> DVector<Complex64> {
        let nb = self.nb();
        let mut new_theta = theta.clone();
        for g in 0..self.group.ng() {
            for &k in flips {
                let row = self.group.dest(k, g);
                let shift = -2.0 * f64::from(config[k]);
                for j in 0..nb {
                    new_theta[g * nb + j] += self.w[(row, j)] * shift;
                }
            }
        }
        new_theta
    }

    /// Flip `flips` of `config` incrementally.
    ///
    /// Returns the new theta table and the amplitude ratio `Ψ(σ')/Ψ(σ)`, with
    /// `log ratio = 2 Σ_{k∈S} (-c_k a_eff[k]) + Σ [log f(θ') - log f(θ)]`.
    pub fn pop(
        &self,
        config: &[i8],
        theta: &DVector<Complex64>,
        flips: &[usize],
    ) -> (DVector<Complex64>, Complex64) {
        if flips.is_empty() {
            return (theta.clone(), Complex64::new(1.0, 0.0));
        }
        let new_theta = self.update_theta(config, theta, flips);
        let visible: Complex64 = flips
            .iter()
            .map(|&k| -2.0 * f64::from(config[k]) * self.folded_bias_at(k))
            .sum();
        let hidden: Complex64 = new_theta
            .iter()
            .zip(theta.iter())
            .map(|(&new, &old)| self.kernel.log_f(new) - self.kernel.log_f(old))
            .sum();
        (new_theta, (visible + hidden).exp())
    }

    fn block_sizes(&self) -> [usize; 3] {
        [self.nin(), self.nb(), self.nin() * self.nb()]
    }
}

impl OptimizableAnsatz for Rbm {
    fn num_params(&self) -> usize {
        self.block_sizes()
            .iter()
            .zip(self.var_mask.iter())
            .filter_map(|(n, m)| m.then_some(*n))
            .sum()
    }

    fn get_params(&self) -> DVector<Complex64> {
        let mut params = Vec::with_capacity(self.num_params());
        if self.var_mask[0] {
            params.extend(self.a.iter().copied());
        }
        if self.var_mask[1] {
            params.extend(self.b.iter().copied());
        }
        if self.var_mask[2] {
            for i in 0..self.nin() {
                params.extend(self.w.row(i).iter().copied());
            }
        }
        DVector::from_vec(params)
    }

    fn set_params(&mut self, params: &DVector<Complex64>) -> Result<()> {
        if params.len() != self.num_params() {
            return Err(VmcError::DimensionMismatch(format!(
                "got {} parameters, ansatz has {}",
                params.len(),
                self.num_params()
            )));
        }
        let mut offset = 0;
        if self.var_mask[0] {
            let n = self.nin();
            self.a.copy_from(&params.rows(offset, n));
            offset += n;
        }
        if self.var_mask[1] {
            let n = self.nb();
            self.b.copy_from(&params.rows(offset, n));
            offset += n;
        }
        if self.var_mask[2] {
            let nb = self.nb();
            for i in 0..self.nin() {
                for j in 0..nb {
                    self.w[(i, j)] = params[offset + i * nb + j];
                }
            }
        }
        Ok(())
    }

    /// ∂ln Ψ/∂a_i = Σ_g T_g(σ)_i, ∂ln Ψ/∂b_j = Σ_g f'/f(θ_{g,j}),
    /// ∂ln Ψ/∂W_ij = Σ_g T_g(σ)_i f'/f(θ_{g,j}).
    fn log_derivatives(&self, config: &[i8], theta: &DVector<Complex64>) -> DVector<Complex64> {
        let (nin, nb) = (self.nin(), self.nb());
        let dtheta = theta.map(|t| self.kernel.dlog_f(t));

        let mut oa = DVector::<Complex64>::zeros(nin);
        let mut ob = DVector::<Complex64>::zeros(nb);
        let mut ow = DMatrix::<Complex64>::zeros(nin, nb);
        for g in 0..self.group.ng() {
            for j in 0..nb {
                ob[j] += dtheta[g * nb + j];
            }
            for (k, &c) in config.iter().enumerate() {
                let row = self.group.dest(k, g);
                let c = f64::from(c);
                oa[row] += c;
                for j in 0..nb {
                    ow[(row, j)] += dtheta[g * nb + j] * c;
                }
            }
        }

        let mut out = Vec::with_capacity(self.num_params());
        if self.var_mask[0] {
            out.extend(oa.iter().copied());
        }
        if self.var_mask[1] {
            out.extend(ob.iter().copied());
        }
        if self.var_mask[2] {
            for i in 0..nin {
                out.extend(ow.row(i).iter().copied());
            }
        }
        DVector::from_vec(out)
    }
}

impl std::fmt::Display for Rbm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "<RBM> in[{}] hid[{} x {}] kernel={:?} group={}",
            self.nin(),
            self.group.ng(),
            self.nb(),
            self.kernel,
            self.group
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn c(re: f64, im: f64) -> Complex64 {
        Complex64::new(re, im)
    }

    fn small_rbm(group: Group, b: &[Complex64]) -> Rbm {
        let a = DVector::from_vec(vec![c(0.0, 0.1), c(0.2, 0.0)]);
        let b = DVector::from_vec(b.to_vec());
        let w = DMatrix::from_row_slice(
            2,
            3,
            &[c(0.1, 0.0), c(-0.1, 0.0), c(0.1, 0.0), c(0.0, -0.1), c(0.1, 0.0), c(0.0, 0.1)],
        );
        Rbm::new(a, b, w, group).unwrap()
    }

    /// Amplitude by explicit summation over hidden spins h = ±1.
    fn brute_force(rbm: &Rbm, s: &[i8]) -> Complex64 {
        let images = rbm.group.apply_all(s);
        let nb = rbm.nb();
        let nh = nb * images.len();
        let mut total = c(0.0, 0.0);
        for hind in 0..(1usize << nh) {
            let h: Vec<f64> = (0..nh).map(|j| if (hind >> j) & 1 == 0 { 1.0 } else { -1.0 }).collect();
            let mut exponent = c(0.0, 0.0);
            for (g, image) in images.iter().enumerate() {
                for i in 0..image.len() {
                    exponent += rbm.a[i] * f64::from(image[i]);
                    for j in 0..nb {
                        exponent += rbm.w[(i, j)] * f64::from(image[i]) * h[g * nb + j];
                    }
                }
                for j in 0..nb {
                    exponent += rbm.b[j] * h[g * nb + j];
                }
            }
            total += exponent.exp();
        }
        total
    }

    #[test]
    fn test_weight_matches_hidden_sum() {
        let rbm = small_rbm(Group::Trivial, &[c(0.0, 0.1), c(0.2, 0.0), c(0.3, 0.0)]);
        let space = SpinSpace::new(2);
        let vec = rbm.tovec(&space);
        for (ind, s) in space.configs().enumerate() {
            let expected = brute_force(&rbm, &s);
            assert_relative_eq!(vec[ind].re, expected.re, epsilon = 1e-10);
            assert_relative_eq!(vec[ind].im, expected.im, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_translation_weight_matches_hidden_sum() {
        let rbm = small_rbm(Group::translation(vec![2]), &[c(0.0, -0.1), c(0.2, 0.0), c(-0.3, 0.0)]);
        assert_eq!(rbm.nhid(), 6);
        let space = SpinSpace::new(2);
        for s in space.configs() {
            let expected = brute_force(&rbm, &s);
            let got = rbm.get_weight(&s, None);
            assert_relative_eq!(got.re, expected.re, epsilon = 1e-10);
            assert_relative_eq!(got.im, expected.im, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_shape_validation() {
        let a = DVector::zeros(3);
        let b = DVector::zeros(2);
        let w = DMatrix::zeros(2, 3);
        assert!(matches!(
            Rbm::new(a.clone(), b.clone(), w, Group::Trivial),
            Err(VmcError::DimensionMismatch(_))
        ));
        let w = DMatrix::zeros(3, 2);
        assert!(Rbm::new(a.clone(), b.clone(), w.clone(), Group::translation(vec![4])).is_err());
        assert!(Rbm::new(a, b, w, Group::translation(vec![3])).is_ok());
    }

    #[test]
    fn test_dtype_parsing() {
        assert_eq!("complex128".parse::<Dtype>().unwrap(), Dtype::Complex128);
        assert_eq!("float64".parse::<Dtype>().unwrap(), Dtype::Float64);
        assert!(matches!("float32".parse::<Dtype>(), Err(VmcError::UnsupportedDtype(_))));

        let mut rng = StdRng::seed_from_u64(3);
        let rbm = Rbm::random(4, 2, Group::Trivial, Dtype::Float64, 0.1, &mut rng).unwrap();
        assert!(rbm.w.iter().all(|z| z.im == 0.0 && z.re.abs() <= 0.1));
    }

    #[test]
    fn test_random_rejects_bad_magnitude() {
        let mut rng = StdRng::seed_from_u64(4);
        for magnitude in [-0.1, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                Rbm::random(4, 2, Group::Trivial, Dtype::Complex128, magnitude, &mut rng),
                Err(VmcError::InvalidParameter(_))
            ));
        }
        let zero = Rbm::random(4, 2, Group::Trivial, Dtype::Complex128, 0.0, &mut rng).unwrap();
        assert!(zero.get_params().iter().all(|p| p.norm() == 0.0));
    }

    #[test]
    fn test_incremental_theta_and_ratio() {
        let mut rng = StdRng::seed_from_u64(11);
        let rbm = Rbm::random(6, 3, Group::translation(vec![6]), Dtype::Complex128, 0.3, &mut rng).unwrap();
        let config: Vec<i8> = vec![1, -1, -1, 1, 1, -1];
        let theta = rbm.feed_input(&config);
        for flips in [vec![0], vec![4], vec![1, 3], vec![2, 5]] {
            let (new_theta, ratio) = rbm.pop(&config, &theta, &flips);
            let mut flipped = config.clone();
            for &k in &flips {
                flipped[k] = -flipped[k];
            }
            let exact_theta = rbm.feed_input(&flipped);
            assert!((new_theta - exact_theta).norm() < 1e-10);

            let exact = rbm.get_weight(&flipped, None) / rbm.get_weight(&config, None);
            assert_relative_eq!(ratio.re, exact.re, epsilon = 1e-10);
            assert_relative_eq!(ratio.im, exact.im, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_log_derivatives_match_finite_difference() {
        let mut rng = StdRng::seed_from_u64(5);
        for group in [Group::Trivial, Group::translation(vec![4])] {
            let rbm = Rbm::random(4, 2, group, Dtype::Complex128, 0.4, &mut rng).unwrap();
            let config: Vec<i8> = vec![1, 1, -1, 1];
            let theta = rbm.feed_input(&config);
            let analytic = rbm.log_derivatives(&config, &theta);
            let params = rbm.get_params();
            let h = 1e-6;
            for k in 0..params.len() {
                let mut plus = rbm.clone();
                let mut minus = rbm.clone();
                let mut p = params.clone();
                p[k] += h;
                plus.set_params(&p).unwrap();
                p[k] -= 2.0 * h;
                minus.set_params(&p).unwrap();
                let numeric = (plus.log_weight(&config, None) - minus.log_weight(&config, None)) / (2.0 * h);
                assert_relative_eq!(analytic[k].re, numeric.re, epsilon = 1e-6);
                assert_relative_eq!(analytic[k].im, numeric.im, epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn test_params_roundtrip_with_mask() {
        let mut rng = StdRng::seed_from_u64(9);
        let rbm = Rbm::random(3, 2, Group::Trivial, Dtype::Complex128, 0.1, &mut rng).unwrap();
        assert_eq!(rbm.num_params(), 3 + 2 + 6);

        let mut other = Rbm::random(3, 2, Group::Trivial, Dtype::Complex128, 0.1, &mut rng).unwrap();
        other.set_params(&rbm.get_params()).unwrap();
        assert_eq!(other.w, rbm.w);
        assert_eq!(other.a, rbm.a);

        let masked = rbm.clone().with_var_mask([false, true, false]);
        assert_eq!(masked.num_params(), 2);
        let mut target = Rbm::random(3, 2, Group::Trivial, Dtype::Complex128, 0.1, &mut rng)
            .unwrap()
            .with_var_mask([false, true, false]);
        let untouched = target.w.clone();
        target.set_params(&masked.get_params()).unwrap();
        assert_eq!(target.b, rbm.b);
        assert_eq!(target.w, untouched);
        assert!(target.set_params(&rbm.get_params()).is_err());
    }
}
