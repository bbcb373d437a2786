//! Deep Boltzmann Machine ansatz.
//!
//! A stack of linear layers maps every group image of σ to the pre-activations
//! of the last layer,
//!
//!   h_0 = T_g(σ),   h_{l+1} = W_lᵀ h_l + b_{l+1},   θ_g = h_{L-1},
//!
//! and the amplitude is `exp(Σ_g T_g(σ)·b_0) · Π_{g,j} f(θ_{g,j})`. With two
//! layers this is exactly the [`Rbm`](super::Rbm) amplitude.

use nalgebra::{DMatrix, DVector};
use num_complex::Complex64;
use rand::Rng;
use rand_distr::Distribution;

use super::kernel::HiddenKernel;
use super::rbm::{uniform_range, Dtype};
use super::traits::OptimizableAnsatz;
use crate::error::{Result, VmcError};
use crate::lattice::{Group, SpinSpace};

#[derive(Debug, Clone)]
pub struct Dbm {
    /// Bias of every layer, visible layer first.
    pub biases: Vec<DVector<Complex64>>,
    /// `weights[l]` connects layer `l` to `l + 1`, shape `dim(l) × dim(l + 1)`.
    pub weights: Vec<DMatrix<Complex64>>,
    pub group: Group,
    pub kernel: HiddenKernel,
    /// Trainable flags: one per bias, then one per weight matrix.
    var_mask: Vec<bool>,
}

impl Dbm {
    pub fn new(biases: Vec<DVector<Complex64>>, weights: Vec<DMatrix<Complex64>>, group: Group) -> Result<Self> {
        if biases.len() < 2 || biases.len() != weights.len() + 1 {
            return Err(VmcError::DimensionMismatch(format!(
                "{} biases and {} weight matrices, expected one more bias than weights and at least two layers",
                biases.len(),
                weights.len()
            )));
        }
        for (l, w) in weights.iter().enumerate() {
            let expected = (biases[l].len(), biases[l + 1].len());
            if w.shape() != expected {
                return Err(VmcError::DimensionMismatch(format!(
                    "W({},{}) has shape {:?}, expected {:?}",
                    l,
                    l + 1,
                    w.shape(),
                    expected
                )));
            }
        }
        if let Some(n) = group.n_sites() {
            if n != biases[0].len() {
                return Err(VmcError::DimensionMismatch(format!(
                    "group acts on {} sites but the visible layer has {}",
                    n,
                    biases[0].len()
                )));
            }
        }
        let var_mask = vec![true; biases.len() + weights.len()];
        Ok(Self {
            biases,
            weights,
            group,
            kernel: HiddenKernel::Cosh,
            var_mask,
        })
    }

    /// Random DBM with layer sizes `dims`, visible layer first.
    pub fn random<R: Rng + ?Sized>(
        dims: &[usize],
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
        let mut biases = Vec::with_capacity(dims.len());
        let mut weights = Vec::with_capacity(dims.len().saturating_sub(1));
        for (l, &dim) in dims.iter().enumerate() {
            biases.push(DVector::from_fn(dim, |_, _| sample()));
            if l > 0 {
                weights.push(DMatrix::from_fn(dims[l - 1], dim, |_, _| sample()));
            }
        }
        Self::new(biases, weights, group)
    }

    pub fn with_kernel(mut self, kernel: HiddenKernel) -> Self {
        self.kernel = kernel;
        self
    }

    /// Set the trainable flags, biases first then weights.
    pub fn with_var_mask(mut self, var_mask: Vec<bool>) -> Result<Self> {
        if var_mask.len() != self.biases.len() + self.weights.len() {
            return Err(VmcError::DimensionMismatch(format!(
                "variable mask has {} entries, the network has {} parameter blocks",
                var_mask.len(),
                self.biases.len() + self.weights.len()
            )));
        }
        self.var_mask = var_mask;
        Ok(self)
    }

    pub fn var_mask(&self) -> &[bool] {
        &self.var_mask
    }

    pub fn num_layers(&self) -> usize {
        self.biases.len()
    }

    pub fn layer_dim(&self, layer: usize) -> usize {
        self.biases[layer].len()
    }

    pub fn nin(&self) -> usize {
        self.layer_dim(0)
    }

    /// Units of the last layer over all group images.
    pub fn nhid(&self) -> usize {
        self.layer_dim(self.num_layers() - 1) * self.group.ng()
    }

    /// Image `g` of `config` as a visible vector.
    fn image(&self, config: &[i8], g: usize) -> DVector<Complex64> {
        let mut x = DVector::zeros(self.nin());
        for (k, &c) in config.iter().enumerate() {
            x[self.group.dest(k, g)] = Complex64::new(f64::from(c), 0.0);
        }
        x
    }

    /// Activations of every layer for one visible vector, input included.
    fn forward(&self, x: DVector<Complex64>) -> Vec<DVector<Complex64>> {
        let mut acts = Vec::with_capacity(self.num_layers());
        acts.push(x);
        for (w, b) in self.weights.iter().zip(self.biases.iter().skip(1)) {
            let next = w.tr_mul(&acts[acts.len() - 1]) + b;
            acts.push(next);
        }
        acts
    }

    /// Last-layer pre-activations of all group images, index `g * dim(L-1) + j`.
    pub fn feed_input(&self, config: &[i8]) -> DVector<Complex64> {
        let nl = self.layer_dim(self.num_layers() - 1);
        let mut theta = DVector::zeros(self.nhid());
        for g in 0..self.group.ng() {
            let acts = self.forward(self.image(config, g));
            if let Some(last) = acts.last() {
                theta.rows_mut(g * nl, nl).copy_from(last);
            }
        }
        theta
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
            .group
            .fold_visible(&self.biases[0])
            .iter()
            .zip(config.iter())
            .map(|(a, &c)| a * f64::from(c))
            .sum();
        let hidden: Complex64 = theta.iter().map(|&t| self.kernel.log_f(t)).sum();
        visible + hidden
    }

    pub fn get_weight(&self, config: &[i8], theta: Option<&DVector<Complex64>>) -> Complex64 {
        self.log_weight(config, theta).exp()
    }

    pub fn tovec(&self, space: &SpinSpace) -> DVector<Complex64> {
        DVector::from_iterator(space.hndim(), space.configs().map(|c| self.get_weight(&c, None)))
    }

    fn block_sizes(&self) -> Vec<usize> {
        self.biases
            .iter()
            .map(|b| b.len())
            .chain(self.weights.iter().map(|w| w.len()))
            .collect()
    }

    /// Flatten per-layer blocks in parameter order, skipping masked ones.
    fn flatten(&self, biases: &[DVector<Complex64>], weights: &[DMatrix<Complex64>]) -> DVector<Complex64> {
        let nb = biases.len();
        let mut out = Vec::with_capacity(self.num_params());
        for (b, _) in biases.iter().zip(&self.var_mask[..nb]).filter(|(_, m)| **m) {
            out.extend(b.iter().copied());
        }
        for (w, _) in weights.iter().zip(&self.var_mask[nb..]).filter(|(_, m)| **m) {
            for i in 0..w.nrows() {
                out.extend(w.row(i).iter().copied());
            }
        }
        DVector::from_vec(out)
    }
}

impl OptimizableAnsatz for Dbm {
    fn num_params(&self) -> usize {
        self.block_sizes()
            .iter()
            .zip(self.var_mask.iter())
            .filter_map(|(n, m)| m.then_some(*n))
            .sum()
    }

    fn get_params(&self) -> DVector<Complex64> {
        self.flatten(&self.biases, &self.weights)
    }

    fn set_params(&mut self, params: &DVector<Complex64>) -> Result<()> {
        if params.len() != self.num_params() {
            return Err(VmcError::DimensionMismatch(format!(
                "got {} parameters, ansatz has {}",
                params.len(),
                self.num_params()
            )));
        }
        let nb = self.biases.len();
        let mut offset = 0;
        for (b, _) in self.biases.iter_mut().zip(&self.var_mask[..nb]).filter(|(_, m)| **m) {
            let n = b.len();
            b.copy_from(&params.rows(offset, n));
            offset += n;
        }
        for (w, _) in self.weights.iter_mut().zip(&self.var_mask[nb..]).filter(|(_, m)| **m) {
            let ncols = w.ncols();
            for i in 0..w.nrows() {
                for j in 0..ncols {
                    w[(i, j)] = params[offset + i * ncols + j];
                }
            }
            offset += w.len();
        }
        Ok(())
    }

    /// Back-propagates `f'/f(θ)` through the linear layers of every image.
    fn log_derivatives(&self, config: &[i8], theta: &DVector<Complex64>) -> DVector<Complex64> {
        let nlayer = self.num_layers();
        let nl = self.layer_dim(nlayer - 1);
        let mut gb: Vec<DVector<Complex64>> = self.biases.iter().map(|b| DVector::zeros(b.len())).collect();
        let mut gw: Vec<DMatrix<Complex64>> = self
            .weights
            .iter()
            .map(|w| DMatrix::zeros(w.nrows(), w.ncols()))
            .collect();

        for g in 0..self.group.ng() {
            let acts = self.forward(self.image(config, g));
            let mut delta = theta.rows(g * nl, nl).map(|t| self.kernel.dlog_f(t));
            for l in (1..nlayer).rev() {
                gb[l] += &delta;
                gw[l - 1] += &acts[l - 1] * delta.transpose();
                delta = &self.weights[l - 1] * delta;
            }
            gb[0] += &acts[0];
        }
        self.flatten(&gb, &gw)
    }
}

impl std::fmt::Display for Dbm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let hidden: Vec<String> = self.biases[1..].iter().map(|b| b.len().to_string()).collect();
        write!(
            f,
            "<DBM> in[{}] hid[{}] kernel={:?} group={}",
            self.nin(),
            hidden.join(" x "),
            self.kernel,
            self.group
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wavefunction::Rbm;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn random_dbm(dims: &[usize], seed: u64) -> Dbm {
        let mut rng = StdRng::seed_from_u64(seed);
        Dbm::random(dims, Group::Trivial, Dtype::Complex128, 0.3, &mut rng).unwrap()
    }

    /// Amplitude by explicit summation over the spins of the last layer, with
    /// the intermediate layers evaluated element by element.
    fn brute_force(dbm: &Dbm, s: &[i8]) -> Complex64 {
        let mut h: Vec<Complex64> = s.iter().map(|&c| Complex64::new(f64::from(c), 0.0)).collect();
        for (w, b) in dbm.weights.iter().zip(dbm.biases.iter().skip(1)) {
            h = (0..b.len())
                .map(|j| b[j] + (0..h.len()).map(|i| h[i] * w[(i, j)]).sum::<Complex64>())
                .collect();
        }
        let visible: Complex64 = s.iter().zip(dbm.biases[0].iter()).map(|(&c, a)| a * f64::from(c)).sum();
        let nh = h.len();
        let mut total = Complex64::new(0.0, 0.0);
        for hind in 0..(1usize << nh) {
            let exponent: Complex64 = (0..nh)
                .map(|j| h[j] * if (hind >> j) & 1 == 0 { 1.0 } else { -1.0 })
                .sum();
            total += (visible + exponent).exp();
        }
        total
    }

    #[test]
    fn test_weight_matches_explicit_sum() {
        let dbm = random_dbm(&[3, 4, 2], 1);
        let space = SpinSpace::new(3);
        let vec = dbm.tovec(&space);
        for (ind, s) in space.configs().enumerate() {
            let expected = brute_force(&dbm, &s);
            assert_relative_eq!(vec[ind].re, expected.re, epsilon = 1e-10);
            assert_relative_eq!(vec[ind].im, expected.im, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_two_layers_match_rbm() {
        let mut rng = StdRng::seed_from_u64(2);
        let group = Group::translation(vec![4]);
        let rbm = Rbm::random(4, 2, group.clone(), Dtype::Complex128, 0.3, &mut rng).unwrap();
        let dbm = Dbm::new(vec![rbm.a.clone(), rbm.b.clone()], vec![rbm.w.clone()], group).unwrap();
        assert_eq!(dbm.nhid(), rbm.nhid());
        assert_eq!(dbm.get_params(), rbm.get_params());

        let config: Vec<i8> = vec![1, -1, -1, 1];
        let theta = dbm.feed_input(&config);
        assert!((&theta - rbm.feed_input(&config)).norm() < 1e-12);
        let (wd, wr) = (dbm.get_weight(&config, None), rbm.get_weight(&config, None));
        assert_relative_eq!(wd.re, wr.re, epsilon = 1e-12);
        assert_relative_eq!(wd.im, wr.im, epsilon = 1e-12);
        assert!((dbm.log_derivatives(&config, &theta) - rbm.log_derivatives(&config, &theta)).norm() < 1e-12);
    }

    #[test]
    fn test_log_derivatives_match_finite_difference() {
        let dbm = random_dbm(&[3, 3, 2], 3);
        let config: Vec<i8> = vec![1, -1, 1];
        let analytic = dbm.log_derivatives(&config, &dbm.feed_input(&config));
        let params = dbm.get_params();
        assert_eq!(analytic.len(), 3 + 3 + 2 + 9 + 6);
        let h = 1e-6;
        for k in 0..params.len() {
            let mut plus = dbm.clone();
            let mut minus = dbm.clone();
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

    #[test]
    fn test_params_roundtrip_with_mask() {
        let dims = [2, 3, 4, 2];
        let dbm = random_dbm(&dims, 4);
        let mut other = random_dbm(&dims, 5);
        other.set_params(&dbm.get_params()).unwrap();
        assert_eq!(other.biases, dbm.biases);
        assert_eq!(other.weights, dbm.weights);

        let mask = vec![true, true, false, false, true, false, false];
        let masked = dbm.clone().with_var_mask(mask.clone()).unwrap();
        assert_eq!(masked.num_params(), 2 + 3 + 2 * 3);
        let mut target = random_dbm(&dims, 6).with_var_mask(mask).unwrap();
        let before = target.clone();
        target.set_params(&masked.get_params()).unwrap();

        assert_eq!(target.weights[0], dbm.weights[0]);
        assert_eq!(target.biases[0], dbm.biases[0]);
        assert_eq!(target.biases[1], dbm.biases[1]);
        assert_eq!(target.weights[1], before.weights[1]);
        assert_eq!(target.weights[2], before.weights[2]);
        assert_eq!(target.biases[2], before.biases[2]);
        assert_eq!(target.biases[3], before.biases[3]);
        assert!((&target.weights[1] - &dbm.weights[1]).norm() > 1e-3);
        assert!(target.set_params(&dbm.get_params()).is_err());
    }

    #[test]
    fn test_shape_and_mask_errors() {
        let b = |n: usize| DVector::<Complex64>::zeros(n);
        let w = |r: usize, c: usize| DMatrix::<Complex64>::zeros(r, c);

        assert!(matches!(
            Dbm::new(vec![b(2), b(3)], vec![w(3, 2)], Group::Trivial),
            Err(VmcError::DimensionMismatch(_))
        ));
        assert!(matches!(
            Dbm::new(vec![b(2), b(3), b(1)], vec![w(2, 3)], Group::Trivial),
            Err(VmcError::DimensionMismatch(_))
        ));
        assert!(Dbm::new(vec![b(2)], Vec::new(), Group::Trivial).is_err());
        assert!(Dbm::new(vec![b(2), b(3)], vec![w(2, 3)], Group::translation(vec![3])).is_err());

        let dbm = Dbm::new(vec![b(2), b(3), b(1)], vec![w(2, 3), w(3, 1)], Group::Trivial).unwrap();
        assert_eq!(dbm.nhid(), 1);
        assert_eq!(dbm.to_string(), "<DBM> in[2] hid[3 x 1] kernel=Cosh group=NoGroup");
        assert!(matches!(
            dbm.clone().with_var_mask(vec![true; 4]),
            Err(VmcError::DimensionMismatch(_))
        ));
        assert_eq!(dbm.with_var_mask(vec![false; 5]).unwrap().num_params(), 0);

        let mut rng = StdRng::seed_from_u64(0);
        assert!(matches!(
            Dbm::random(&[2, 3], Group::Trivial, Dtype::Float64, f64::NAN, &mut rng),
            Err(VmcError::InvalidParameter(_))
        ));
        let real = Dbm::random(&[2, 3], Group::Trivial, Dtype::Float64, 0.1, &mut rng).unwrap();
        assert!(real.get_params().iter().all(|p| p.im == 0.0 && p.re.abs() <= 0.1));
    }
}
