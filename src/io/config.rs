//! YAML run configuration.
//!
//! ```yaml
//! seed: 42
//! model:
//!   kind: heisenberg
//!   j: 1.0
//!   jz: 1.0
//!   lattice: { shape: [10], periodic: true }
//! ansatz:
//!   alpha: 2
//!   dtype: complex128
//! sampler:
//!   nbath: 1000
//!   nsample: 20000
//!   nmeasure: 10
//! sr:
//!   regularization: carleo
//!   niter: 200
//!   optimizer: { kind: sgd, rate: 0.05 }
//! ```

use std::path::{Path, PathBuf};

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::legacy::load_carleo_wf;
use crate::error::{Result, VmcError};
use crate::lattice::Group;
use crate::sampling::{
    Adam, FlipMove, GradientStep, MannKendall, Momentum, Optimizer, RbmConfigGenerator, Regularization, RmsProp,
    StochasticReconfiguration, Vmc, VmcParams, DEFAULT_MOMENTUM,
};
use crate::systems::{Model, SpinHamiltonian};
use crate::wavefunction::{Dtype, HiddenKernel, Rbm};

fn default_seed() -> u64 {
    42
}

fn default_alpha() -> usize {
    1
}

fn default_magnitude() -> f64 {
    2e-2
}

fn default_var_mask() -> [bool; 3] {
    [true; 3]
}

fn default_true() -> bool {
    true
}

fn default_regularization() -> String {
    "delta".to_string()
}

fn default_niter() -> usize {
    100
}

fn default_rho() -> f64 {
    0.9
}

fn default_momentum() -> f64 {
    DEFAULT_MOMENTUM
}

fn default_window() -> usize {
    50
}

/// Ansatz section: random initialisation or a legacy dump.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnsatzConfig {
    /// Hidden density: `alpha` hidden units per site.
    #[serde(default = "default_alpha")]
    pub alpha: usize,
    #[serde(default)]
    pub dtype: Dtype,
    #[serde(default = "default_magnitude")]
    pub magnitude: f64,
    #[serde(default)]
    pub kernel: HiddenKernel,
    #[serde(default = "default_var_mask")]
    pub var_mask: [bool; 3],
    /// Use the lattice translation group when the model is periodic.
    #[serde(default = "default_true")]
    pub symmetric: bool,
    /// Legacy dump to start from instead of random parameters.
    #[serde(default)]
    pub load: Option<PathBuf>,
}

impl Default for AnsatzConfig {
    fn default() -> Self {
        Self {
            alpha: default_alpha(),
            dtype: Dtype::default(),
            magnitude: default_magnitude(),
            kernel: HiddenKernel::default(),
            var_mask: default_var_mask(),
            symmetric: true,
            load: None,
        }
    }
}

/// Sampler section: engine parameters plus the move type.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SamplerConfig {
    #[serde(flatten)]
    pub vmc: VmcParams,
    /// Defaults to pair flips for magnetization-conserving models.
    #[serde(default)]
    pub moves: Option<FlipMove>,
    #[serde(default)]
    pub initial_config: Option<Vec<i8>>,
}

/// Step rule applied to the natural gradient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OptimizerConfig {
    Sgd {
        rate: f64,
    },
    Momentum {
        rate: f64,
        #[serde(default = "default_momentum")]
        mu: f64,
    },
    Rmsprop {
        rate: f64,
        #[serde(default = "default_rho")]
        rho: f64,
    },
    Adam {
        rate: f64,
    },
    MannKendall {
        rate: f64,
        #[serde(default = "default_window")]
        size: usize,
    },
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        OptimizerConfig::Sgd { rate: 0.1 }
    }
}

impl OptimizerConfig {
    pub fn build(&self) -> Box<dyn Optimizer> {
        match *self {
            OptimizerConfig::Sgd { rate } => Box::new(GradientStep::new(rate)),
            OptimizerConfig::Momentum { rate, mu } => Box::new(Momentum::new(rate, mu)),
            OptimizerConfig::Rmsprop { rate, rho } => Box::new(RmsProp::new(rate, rho)),
            OptimizerConfig::Adam { rate } => Box::new(Adam::new(rate)),
            OptimizerConfig::MannKendall { rate, size } => Box::new(MannKendall::new(rate, size)),
        }
    }
}

/// SR section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SrConfig {
    /// One of `delta`, `carleo`, `trunc`, `pinv`, `identity`.
    #[serde(default = "default_regularization")]
    pub regularization: String,
    /// Overrides the default `λ` (delta) or `λ0` (carleo, trunc).
    #[serde(default)]
    pub lambda: Option<f64>,
    #[serde(default)]
    pub optimizer: OptimizerConfig,
    #[serde(default = "default_niter")]
    pub niter: usize,
    #[serde(default)]
    pub tolerance: Option<f64>,
}

impl Default for SrConfig {
    fn default() -> Self {
        Self {
            regularization: default_regularization(),
            lambda: None,
            optimizer: OptimizerConfig::default(),
            niter: default_niter(),
            tolerance: None,
        }
    }
}

impl SrConfig {
    pub fn regularization(&self) -> Result<Regularization> {
        Regularization::from_config(&self.regularization, self.lambda)
    }
}

/// Complete run description.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub model: Model,
    #[serde(default)]
    pub ansatz: AnsatzConfig,
    #[serde(default)]
    pub sampler: SamplerConfig,
    #[serde(default)]
    pub sr: SrConfig,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl RunConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        Ok(serde_yaml::from_reader(reader)?)
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn nsite(&self) -> usize {
        self.model.nsite()
    }

    pub fn group(&self) -> Group {
        if self.ansatz.symmetric {
            self.model.lattice().symmetry_group()
        } else {
            Group::Trivial
        }
    }

    /// Hidden units per unit cell: `alpha` with a translation group, `alpha * nsite` without.
    pub fn nb(&self) -> usize {
        match self.group() {
            Group::Trivial => self.ansatz.alpha * self.nsite(),
            Group::Translation(_) => self.ansatz.alpha,
        }
    }

    pub fn build_rbm<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Rbm> {
        let rbm = match &self.ansatz.load {
            Some(path) => load_carleo_wf(path, self.group())?,
            None => Rbm::random(
                self.nsite(),
                self.nb(),
                self.group(),
                self.ansatz.dtype,
                self.ansatz.magnitude,
                rng,
            )?,
        };
        if rbm.nin() != self.nsite() {
            return Err(VmcError::ConfigLength {
                expected: self.nsite(),
                found: rbm.nin(),
            });
        }
        Ok(rbm
            .with_kernel(self.ansatz.kernel)
            .with_var_mask(self.ansatz.var_mask))
    }

    pub fn moves(&self) -> FlipMove {
        self.sampler.moves.unwrap_or(if self.model.conserves_magnetization() {
            FlipMove::Pair
        } else {
            FlipMove::Single
        })
    }

    pub fn build_generator(&self) -> RbmConfigGenerator {
        let cgen = RbmConfigGenerator::new(self.moves());
        match &self.sampler.initial_config {
            Some(config) => cgen.with_initial_config(config.clone()),
            None => cgen,
        }
    }

    pub fn build_vmc(&self) -> Vmc<RbmConfigGenerator> {
        Vmc::new(self.build_generator(), self.sampler.vmc.clone(), self.seed)
    }

    pub fn build_sr(&self) -> Result<StochasticReconfiguration<Box<dyn Optimizer>>> {
        let sr = StochasticReconfiguration::new(
            self.model.clone(),
            self.sr.regularization()?,
            self.sr.optimizer.build(),
        );
        Ok(match self.sr.tolerance {
            Some(tol) => sr.with_tolerance(tol),
            None => sr,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampling::SamplingMethod;
    use crate::wavefunction::OptimizableAnsatz;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const HEISENBERG: &str = "
seed: 7
model:
  kind: heisenberg
  lattice: { shape: [6], periodic: true }
ansatz:
  alpha: 2
sampler:
  nbath: 100
  nsample: 2000
  sampling_method: heat-bath
sr:
  regularization: carleo
  lambda: 10.0
  optimizer: { kind: rmsprop, rate: 0.002 }
";

    #[test]
    fn test_heisenberg_run_config() {
        let cfg = RunConfig::from_yaml(HEISENBERG).unwrap();
        assert_eq!(cfg.seed, 7);
        assert_eq!(cfg.nsite(), 6);
        assert_eq!(cfg.nb(), 2);
        assert_eq!(cfg.moves(), FlipMove::Pair);
        assert_eq!(cfg.sampler.vmc.nbath, 100);
        assert_eq!(cfg.sampler.vmc.nmeasure, 1);
        assert_eq!(cfg.sampler.vmc.sampling_method, SamplingMethod::HeatBath);
        assert_eq!(
            cfg.sr.optimizer,
            OptimizerConfig::Rmsprop {
                rate: 0.002,
                rho: 0.9
            }
        );
        assert_eq!(
            cfg.sr.regularization().unwrap(),
            Regularization::Carleo {
                lambda0: 10.0,
                b: 0.9,
                lambda_min: 1e-4
            }
        );

        let mut rng = StdRng::seed_from_u64(cfg.seed);
        let rbm = cfg.build_rbm(&mut rng).unwrap();
        assert_eq!(rbm.nhid(), 12);
        assert_eq!(rbm.num_params(), 6 + 2 + 12);
        assert!(rbm.w.iter().all(|w| w.re.abs() <= 2e-2 && w.im.abs() <= 2e-2));
    }

    #[test]
    fn test_tfi_defaults() {
        let cfg = RunConfig::from_yaml(
            "model: { kind: tfi, jz: -4.0, h: -1.0, lattice: { shape: [4] } }\nansatz: { dtype: float64 }\n",
        )
        .unwrap();
        assert_eq!(cfg.seed, 42);
        assert_eq!(cfg.group(), Group::Trivial);
        assert_eq!(cfg.nb(), 4);
        assert_eq!(cfg.moves(), FlipMove::Single);
        assert_eq!(cfg.sr.niter, 100);
        let rbm = cfg.build_rbm(&mut StdRng::seed_from_u64(0)).unwrap();
        assert!(rbm.get_params().iter().all(|p| p.im == 0.0));
    }

    #[test]
    fn test_invalid_settings() {
        let bad_reg = HEISENBERG.replace("carleo", "ridge");
        let cfg = RunConfig::from_yaml(&bad_reg).unwrap();
        assert!(matches!(cfg.build_sr(), Err(VmcError::UnknownRegularization(_))));

        let bad_dtype = "model: { kind: tfi, jz: 1.0, h: 1.0, lattice: { shape: [4] } }\nansatz: { dtype: int32 }\n";
        assert!(matches!(RunConfig::from_yaml(bad_dtype), Err(VmcError::Yaml(_))));

        let bad_optimizer = HEISENBERG.replace("rmsprop", "lbfgs");
        assert!(matches!(RunConfig::from_yaml(&bad_optimizer), Err(VmcError::Yaml(_))));

        let bad_magnitude = HEISENBERG.replace("alpha: 2", "alpha: 2\n  magnitude: -0.5");
        let cfg = RunConfig::from_yaml(&bad_magnitude).unwrap();
        assert!(matches!(
            cfg.build_rbm(&mut StdRng::seed_from_u64(0)),
            Err(VmcError::InvalidParameter(_))
        ));
    }
}
