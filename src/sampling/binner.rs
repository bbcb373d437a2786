//! Streaming block averages for correlated Monte Carlo data.
//!
//! Each pushed batch is reduced to its size, mean and mean of `|x|²`; raw samples
//! are never stored. Values are complex matrices, statistics are elementwise.

use nalgebra::DMatrix;
use num_complex::Complex64;

use crate::error::{Result, VmcError};
use crate::operators::LocalValue;

#[derive(Debug, Clone, Default)]
pub struct Bin {
    n: Vec<usize>,
    m: Vec<LocalValue>,
    sqm: Vec<DMatrix<f64>>,
}

impl Bin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of blocks pushed so far.
    pub fn nbin(&self) -> usize {
        self.m.len()
    }

    /// Total number of samples.
    pub fn nsample(&self) -> usize {
        self.n.iter().sum()
    }

    /// Reduce one batch to a block. Empty batches are ignored.
    pub fn push(&mut self, vals: &[LocalValue]) -> Result<()> {
        let Some(first) = vals.first() else {
            return Ok(());
        };
        let shape = first.shape();
        if let Some(expected) = self.m.first().map(|m| m.shape()) {
            if expected != shape {
                return Err(VmcError::DimensionMismatch(format!(
                    "block of shape {:?} pushed to a bin of shape {:?}",
                    shape, expected
                )));
            }
        }
        if let Some(bad) = vals.iter().find(|v| v.shape() != shape) {
            return Err(VmcError::DimensionMismatch(format!(
                "batch mixes shapes {:?} and {:?}",
                shape,
                bad.shape()
            )));
        }

        let count = vals.len() as f64;
        let mut mean = DMatrix::<Complex64>::zeros(shape.0, shape.1);
        let mut sq_mean = DMatrix::<f64>::zeros(shape.0, shape.1);
        for v in vals {
            mean += v;
            sq_mean += v.map(|x| x.norm_sqr());
        }
        self.n.push(vals.len());
        self.m.push(mean / Complex64::new(count, 0.0));
        self.sqm.push(sq_mean / count);
        Ok(())
    }

    /// Sample-weighted mean over all blocks.
    pub fn mean(&self) -> Option<LocalValue> {
        let total = self.nsample();
        if total == 0 {
            return None;
        }
        let mut acc = self.m[0].map(|_| Complex64::new(0.0, 0.0));
        for (n, m) in self.n.iter().zip(self.m.iter()) {
            acc += m * Complex64::new(*n as f64, 0.0);
        }
        Some(acc / Complex64::new(total as f64, 0.0))
    }

    /// Variance of the block means (ddof = 1).
    pub fn var(&self) -> Option<DMatrix<f64>> {
        let nbin = self.nbin();
        if nbin < 2 {
            return None;
        }
        let mut center = self.m[0].map(|_| Complex64::new(0.0, 0.0));
        for m in &self.m {
            center += m;
        }
        center /= Complex64::new(nbin as f64, 0.0);

        let mut acc = DMatrix::<f64>::zeros(center.nrows(), center.ncols());
        for m in &self.m {
            acc += (m - &center).map(|x| x.norm_sqr());
        }
        Some(acc / (nbin - 1) as f64)
    }

    /// Variance of the individual samples (ddof = 1), rebuilt from the block moments.
    pub fn var_unbinned(&self) -> Option<DMatrix<f64>> {
        let total = self.nsample();
        if total < 2 {
            return None;
        }
        let big_n = total as f64;
        let mean = self.mean()?;
        let mut sq = DMatrix::<f64>::zeros(mean.nrows(), mean.ncols());
        for (n, s) in self.n.iter().zip(self.sqm.iter()) {
            sq += s * (*n as f64);
        }
        let var = (sq / big_n - mean.map(|x| x.norm_sqr())) * (big_n / (big_n - 1.0));
        Some(var.map(|x| x.max(0.0)))
    }

    /// Standard error of the mean, `sqrt(var / nbin)`.
    pub fn std_err(&self) -> Option<DMatrix<f64>> {
        let nbin = self.nbin() as f64;
        self.var().map(|v| v.map(|x| (x / nbin).sqrt()))
    }

    /// Largest elementwise standard error.
    pub fn max_std_err(&self) -> Option<f64> {
        self.std_err().map(|e| e.max())
    }

    /// Integrated autocorrelation time estimated from the ratio of binned to
    /// unbinned variance.
    pub fn t_auto(&self) -> Option<f64> {
        let var = self.var()?;
        let unbinned = self.var_unbinned()?;
        let denom = unbinned.mean();
        if denom == 0.0 {
            return None;
        }
        let mean_n = self.nsample() as f64 / self.nbin() as f64;
        Some(0.5 * mean_n * var.mean() / denom)
    }
}

impl std::fmt::Display for Bin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "> Binning statistics ({} blocks, {} samples):", self.nbin(), self.nsample())?;
        match (self.t_auto(), self.std_err()) {
            (Some(t), Some(err)) => {
                writeln!(f, "  Autocorrelation Time: {:.4}", t)?;
                write!(f, "  Standard Error: {:.4}", err.mean())
            }
            _ => write!(f, "  not enough blocks"),
        }
    }
}
