//! Local estimators `<σ|O|ψ>/<σ|ψ>` and operator queues.
//!
//! A [`LinOp`] is measured directly from a configuration and its cached theta
//! table. An [`OpQueue`] bundles several of them together with [`Derived`]
//! quantities built per sample from the base values, so one Markov chain yields
//! every moment the SR solver needs.

use nalgebra::{DMatrix, DVector};
use num_complex::Complex64;

use super::sstate::SparseState;
use crate::systems::{Model, SpinHamiltonian};
use crate::wavefunction::{OptimizableAnsatz, Rbm};

/// A local value: `1 × 1` for scalar operators, `n × 1` for vectors, `n × m` for
/// outer products.
pub type LocalValue = DMatrix<Complex64>;

pub fn scalar_value(x: Complex64) -> LocalValue {
    DMatrix::from_element(1, 1, x)
}

pub fn vector_value(v: DVector<Complex64>) -> LocalValue {
    let n = v.len();
    DMatrix::from_column_slice(n, 1, v.as_slice())
}

/// Operators with a local estimator.
#[derive(Debug, Clone)]
pub enum LinOp {
    Hamiltonian(Model),
    /// Log-derivatives of the amplitude with respect to the trainable parameters.
    PartialW,
}

impl LinOp {
    pub fn local_value(&self, rbm: &Rbm, config: &[i8], theta: &DVector<Complex64>) -> LocalValue {
        match self {
            LinOp::Hamiltonian(model) => scalar_value(local_energy(model, rbm, config, theta)),
            LinOp::PartialW => vector_value(rbm.log_derivatives(config, theta)),
        }
    }

    /// Exact expectation `<ψ|O|ψ>/<ψ|ψ>` over the given basis configurations.
    pub fn exact_value(&self, rbm: &Rbm, configs: &[Vec<i8>]) -> LocalValue {
        match self {
            LinOp::Hamiltonian(model) => {
                let ws = configs.iter().map(|c| rbm.get_weight(c, None)).collect();
                let ket = SparseState::compact(ws, configs.to_vec());
                let hket = model.rmatmul(&ket);
                scalar_value(ket.overlap(&hket) / ket.overlap(&ket))
            }
            LinOp::PartialW => {
                let mut acc: LocalValue = DMatrix::zeros(rbm.num_params(), 1);
                let mut norm = 0.0;
                for config in configs {
                    let theta = rbm.feed_input(config);
                    let p = rbm.get_weight(config, Some(&theta)).norm_sqr();
                    acc += self.local_value(rbm, config, &theta) * Complex64::new(p, 0.0);
                    norm += p;
                }
                acc / Complex64::new(norm, 0.0)
            }
        }
    }
}

/// `E_loc(σ) = Σ_σ' H_σσ' Ψ(σ')/Ψ(σ)`, reusing the incremental amplitude ratio.
pub fn local_energy(model: &Model, rbm: &Rbm, config: &[i8], theta: &DVector<Complex64>) -> Complex64 {
    model
        .terms(config)
        .into_iter()
        .map(|(w, flips)| {
            if flips.is_empty() {
                Complex64::new(w, 0.0)
            } else {
                let (_, ratio) = rbm.pop(config, theta, &flips);
                ratio * w
            }
        })
        .sum()
}

/// Quantities computed per sample from the base values of an [`OpQueue`].
pub enum Derived {
    /// `conj(v_left) v_right^T`, the second moment of a vector operator.
    OuterConj { left: usize, right: usize },
    /// `conj(v_left) * s_right` for a vector and a scalar operator.
    ConjScale { left: usize, right: usize },
    Custom(Box<dyn Fn(&[LocalValue]) -> LocalValue>),
}

impl Derived {
    pub fn evaluate(&self, base: &[LocalValue]) -> LocalValue {
        match self {
            Derived::OuterConj { left, right } => base[*left].conjugate() * base[*right].transpose(),
            Derived::ConjScale { left, right } => base[*left].conjugate() * base[*right][(0, 0)],
            Derived::Custom(f) => f(base),
        }
    }
}

impl std::fmt::Debug for Derived {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Derived::OuterConj { left, right } => write!(f, "OuterConj({}, {})", left, right),
            Derived::ConjScale { left, right } => write!(f, "ConjScale({}, {})", left, right),
            Derived::Custom(_) => write!(f, "Custom"),
        }
    }
}

/// Base operators measured on the chain plus derived quantities.
#[derive(Debug)]
pub struct OpQueue {
    pub ops: Vec<LinOp>,
    pub derived: Vec<Derived>,
}

impl OpQueue {
    pub fn new(ops: Vec<LinOp>) -> Self {
        Self {
            ops,
            derived: Vec::new(),
        }
    }

    pub fn with_derived(mut self, derived: Derived) -> Self {
        self.derived.push(derived);
        self
    }

    /// `[O, H, O* O^T, O* H]`, the moments of Stochastic Reconfiguration.
    pub fn sr(model: Model) -> Self {
        Self::new(vec![LinOp::PartialW, LinOp::Hamiltonian(model)])
            .with_derived(Derived::OuterConj { left: 0, right: 0 })
            .with_derived(Derived::ConjScale { left: 0, right: 1 })
    }

    /// Number of values produced per sample.
    pub fn len(&self) -> usize {
        self.ops.len() + self.derived.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Base values followed by derived values for one configuration.
    pub fn evaluate(&self, rbm: &Rbm, config: &[i8], theta: &DVector<Complex64>) -> Vec<LocalValue> {
        let mut values: Vec<LocalValue> = self
            .ops
            .iter()
            .map(|op| op.local_value(rbm, config, theta))
            .collect();
        let derived: Vec<LocalValue> = self.derived.iter().map(|d| d.evaluate(&values)).collect();
        values.extend(derived);
        values
    }
}
