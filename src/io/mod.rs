//! IO module - YAML run configuration and legacy wavefunction import.

mod config;
mod legacy;

pub use config::{AnsatzConfig, OptimizerConfig, RunConfig, SamplerConfig, SrConfig};
pub use legacy::{load_carleo_wf, parse_carleo_wf};
