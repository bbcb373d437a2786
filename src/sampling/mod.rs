//! Sampling module - Metropolis sampling, exact reference sums and SR optimization.

mod binner;
mod cgen;
mod exact;
mod optimizer;
mod sr_optimize;
mod traits;
mod vmc;

pub use binner::Bin;
pub use cgen::{FlipMove, RbmConfigGenerator};
pub use exact::ExactMeasurer;
pub use optimizer::{
    Adam, GradientStep, MannKendall, Momentum, Optimizer, RmsProp, DEFAULT_BETA1, DEFAULT_BETA2, DEFAULT_EPSILON,
    DEFAULT_MOMENTUM,
};
pub use sr_optimize::{Regularization, SrResult, SrStep, StochasticReconfiguration};
pub use traits::{ConfigGenerator, Measurement, Measurer};
pub use vmc::{LogObserver, SamplingEvent, SamplingMethod, SamplingObserver, Vmc, VmcParams, MIN_BINS_FOR_EARLY_STOP};
