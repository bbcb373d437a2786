//! Hidden-unit kernels `f(θ)` of the RBM amplitude and their overflow-safe logs.

use std::f64::consts::{LN_2, PI};

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

/// Above this |Re θ| the hyperbolic functions are replaced by their exponential tail.
pub const OVERFLOW_THRESHOLD: f64 = 12.0;

/// `log(2 cosh θ)`.
pub fn log2cosh(theta: Complex64) -> Complex64 {
    if theta.re > OVERFLOW_THRESHOLD {
        theta
    } else if theta.re < -OVERFLOW_THRESHOLD {
        -theta
    } else {
        (2.0 * theta.cosh()).ln()
    }
}

/// `log(cosh θ)`, asymptotically `|θ| - log 2`.
pub fn logcosh(theta: Complex64) -> Complex64 {
    log2cosh(theta) - LN_2
}

/// `log(2 sinh θ)`. The negative tail carries the phase `iπ` of `-e^{-θ}`.
pub fn log2sinh(theta: Complex64) -> Complex64 {
    if theta.re > OVERFLOW_THRESHOLD {
        theta
    } else if theta.re < -OVERFLOW_THRESHOLD {
        -theta + Complex64::new(0.0, PI)
    } else {
        (2.0 * theta.sinh()).ln()
    }
}

/// Hidden-layer factor of the amplitude, fixed per deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HiddenKernel {
    /// `f(θ) = 2 cosh θ`, spins traced out with h = ±1.
    #[default]
    Cosh,
    /// `f(θ) = 2 sinh θ`.
    Sinh,
}

impl HiddenKernel {
    /// `log f(θ)`.
    #[inline]
    pub fn log_f(&self, theta: Complex64) -> Complex64 {
        match self {
            HiddenKernel::Cosh => log2cosh(theta),
            HiddenKernel::Sinh => log2sinh(theta),
        }
    }

    /// `d log f / dθ`: `tanh θ` for cosh, `coth θ` for sinh.
    #[inline]
    pub fn dlog_f(&self, theta: Complex64) -> Complex64 {
        match self {
            HiddenKernel::Cosh => theta.tanh(),
            HiddenKernel::Sinh => theta.tanh().inv(),
        }
    }
}
