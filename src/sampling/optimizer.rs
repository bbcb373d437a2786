//! Step rules turning a (natural) gradient into a parameter change.
//!
//! | Optimizer | Rule |
//! |-----------|------|
//! | `GradientStep` | `-rate * g` |
//! | `Momentum` | `v = mu v - rate g` |
//! | `RmsProp` | `-rate g / sqrt(r + delta)`, `r` a running mean of `|g|²` |
//! | `Adam` | bias-corrected first and second moments |
//! | `MannKendall` | `-trend * rate * g`, trend from the Mann-Kendall statistic of recent losses |
//!
//! Gradients are complex; second moments use `|g|²`.

use std::collections::VecDeque;

use nalgebra::DVector;
use num_complex::Complex64;

pub const DEFAULT_MOMENTUM: f64 = 0.9;
pub const DEFAULT_BETA1: f64 = 0.9;
pub const DEFAULT_BETA2: f64 = 0.999;
pub const DEFAULT_EPSILON: f64 = 1e-8;

/// Maps `(loss, gradient, iteration)` to a parameter change.
pub trait Optimizer {
    fn step(&mut self, loss: f64, grad: &DVector<Complex64>, iter: usize) -> DVector<Complex64>;
}

impl<F> Optimizer for F
where
    F: FnMut(f64, &DVector<Complex64>, usize) -> DVector<Complex64>,
{
    fn step(&mut self, loss: f64, grad: &DVector<Complex64>, iter: usize) -> DVector<Complex64> {
        self(loss, grad, iter)
    }
}

impl Optimizer for Box<dyn Optimizer> {
    fn step(&mut self, loss: f64, grad: &DVector<Complex64>, iter: usize) -> DVector<Complex64> {
        self.as_mut().step(loss, grad, iter)
    }
}

/// Plain scaled step.
#[derive(Debug, Clone)]
pub struct GradientStep {
    pub rate: f64,
}

impl GradientStep {
    pub fn new(rate: f64) -> Self {
        Self { rate }
    }
}

impl Optimizer for GradientStep {
    fn step(&mut self, _loss: f64, grad: &DVector<Complex64>, _iter: usize) -> DVector<Complex64> {
        grad * Complex64::new(-self.rate, 0.0)
    }
}

#[derive(Debug, Clone)]
pub struct Momentum {
    pub rate: f64,
    pub mu: f64,
    velocity: Option<DVector<Complex64>>,
}

impl Momentum {
    pub fn new(rate: f64, mu: f64) -> Self {
        Self {
            rate,
            mu,
            velocity: None,
        }
    }
}

impl Optimizer for Momentum {
    fn step(&mut self, _loss: f64, grad: &DVector<Complex64>, _iter: usize) -> DVector<Complex64> {
        let v = match self.velocity.take() {
            Some(v) if v.len() == grad.len() => {
                v * Complex64::new(self.mu, 0.0) - grad * Complex64::new(self.rate, 0.0)
            }
            _ => grad * Complex64::new(-self.rate, 0.0),
        };
        self.velocity = Some(v.clone());
        v
    }
}

#[derive(Debug, Clone)]
pub struct RmsProp {
    pub rate: f64,
    /// Decay of the running mean.
    pub rho: f64,
    pub delta: f64,
    r: Option<DVector<f64>>,
}

impl RmsProp {
    pub fn new(rate: f64, rho: f64) -> Self {
        Self {
            rate,
            rho,
            delta: 1e-6,
            r: None,
        }
    }
}

impl Optimizer for RmsProp {
    fn step(&mut self, _loss: f64, grad: &DVector<Complex64>, _iter: usize) -> DVector<Complex64> {
        let sq = grad.map(|g| g.norm_sqr());
        let r = match self.r.take() {
            Some(r) if r.len() == grad.len() => r * self.rho + sq * (1.0 - self.rho),
            _ => sq * (1.0 - self.rho),
        };
        let update = grad.zip_map(&r, |g, r| g * (-self.rate / (r + self.delta).sqrt()));
        self.r = Some(r);
        update
    }
}

#[derive(Debug, Clone)]
pub struct Adam {
    pub rate: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub epsilon: f64,
    m: Option<DVector<Complex64>>,
    v: Option<DVector<f64>>,
    t: i32,
}

impl Adam {
    pub fn new(rate: f64) -> Self {
        Self {
            rate,
            beta1: DEFAULT_BETA1,
            beta2: DEFAULT_BETA2,
            epsilon: DEFAULT_EPSILON,
            m: None,
            v: None,
            t: 0,
        }
    }
}

impl Optimizer for Adam {
    fn step(&mut self, _loss: f64, grad: &DVector<Complex64>, _iter: usize) -> DVector<Complex64> {
        let n = grad.len();
        if self.m.as_ref().map_or(true, |m| m.len() != n) {
            self.m = Some(DVector::zeros(n));
            self.v = Some(DVector::zeros(n));
            self.t = 0;
        }
        self.t += 1;
        let bias_correction1 = 1.0 - self.beta1.powi(self.t);
        let bias_correction2 = 1.0 - self.beta2.powi(self.t);

        let m = self.m.take().unwrap_or_else(|| DVector::zeros(n)) * Complex64::new(self.beta1, 0.0)
            + grad * Complex64::new(1.0 - self.beta1, 0.0);
        let v = self.v.take().unwrap_or_else(|| DVector::zeros(n)) * self.beta2
            + grad.map(|g| g.norm_sqr()) * (1.0 - self.beta2);

        let update = m.zip_map(&v, |m, v| {
            let m_hat = m / bias_correction1;
            let v_hat = v / bias_correction2;
            m_hat * (-self.rate / (v_hat.sqrt() + self.epsilon))
        });
        self.m = Some(m);
        self.v = Some(v);
        update
    }
}

/// Step scaled by the strength of the recent trend in the loss.
#[derive(Debug, Clone)]
pub struct MannKendall {
    pub rate: f64,
    /// Window of remembered losses.
    pub size: usize,
    history: VecDeque<f64>,
    zeta: f64,
}

impl MannKendall {
    pub fn new(rate: f64, size: usize) -> Self {
        Self {
            rate,
            size: size.max(2),
            history: VecDeque::new(),
            zeta: 0.0,
        }
    }

    /// Normalised Mann-Kendall statistic `2|ζ| / (N (N-1))` of the window, 1 for short windows.
    pub fn trend(&self) -> f64 {
        let n = self.history.len() as f64;
        if n > 1.0 {
            2.0 * self.zeta.abs() / n / (n - 1.0)
        } else {
            1.0
        }
    }

    fn sign(x: f64) -> f64 {
        if x > 0.0 {
            1.0
        } else if x < 0.0 {
            -1.0
        } else {
            0.0
        }
    }
}

impl Optimizer for MannKendall {
    fn step(&mut self, loss: f64, grad: &DVector<Complex64>, _iter: usize) -> DVector<Complex64> {
        self.zeta += self.history.iter().map(|&f| Self::sign(loss - f)).sum::<f64>();
        self.history.push_back(loss);
        if self.history.len() > self.size {
            if let Some(f0) = self.history.pop_front() {
                self.zeta -= self.history.iter().map(|&f| Self::sign(f - f0)).sum::<f64>();
            }
        }
        let trend = self.trend();
        log::debug!("Mann-Kendall trend = {:.4}", trend);
        grad * Complex64::new(-trend * self.rate, 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn grad() -> DVector<Complex64> {
        DVector::from_vec(vec![Complex64::new(1.0, 0.0), Complex64::new(0.0, -2.0)])
    }

    #[test]
    fn test_gradient_step() {
        let mut opt = GradientStep::new(0.1);
        let d = opt.step(0.0, &grad(), 0);
        assert_relative_eq!(d[0].re, -0.1);
        assert_relative_eq!(d[1].im, 0.2);
    }

    #[test]
    fn test_closure_optimizer() {
        let mut calls = 0;
        let mut opt = |_loss: f64, g: &DVector<Complex64>, _iter: usize| {
            calls += 1;
            g * Complex64::new(-0.5, 0.0)
        };
        let d = opt.step(1.0, &grad(), 3);
        assert_relative_eq!(d[0].re, -0.5);
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_rmsprop_normalises_step() {
        let mut opt = RmsProp::new(0.01, 0.0);
        let d = opt.step(0.0, &grad(), 0);
        // rho = 0: r = |g|^2, so each step has modulus close to rate
        assert_relative_eq!(d[0].norm(), 0.01, max_relative = 1e-5);
        assert_relative_eq!(d[1].norm(), 0.01, max_relative = 1e-5);
    }

    #[test]
    fn test_adam_first_step() {
        let mut opt = Adam::new(0.1);
        let d = opt.step(0.0, &grad(), 0);
        // bias-corrected first step is -rate * g / |g|
        assert_relative_eq!(d[0].re, -0.1, max_relative = 1e-6);
        assert_relative_eq!(d[1].im, 0.1, max_relative = 1e-6);
        let d2 = opt.step(0.0, &grad(), 1);
        assert_relative_eq!(d2[0].re, -0.1, max_relative = 1e-6);
    }

    #[test]
    fn test_momentum_accumulates() {
        let mut opt = Momentum::new(0.1, DEFAULT_MOMENTUM);
        let d1 = opt.step(0.0, &grad(), 0);
        let d2 = opt.step(0.0, &grad(), 1);
        assert_relative_eq!(d1[0].re, -0.1, epsilon = 1e-12);
        assert_relative_eq!(d2[0].re, -0.19, epsilon = 1e-12);
    }

    #[test]
    fn test_mann_kendall_trend() {
        let mut opt = MannKendall::new(1.0, 4);
        for (i, loss) in [4.0, 3.0, 2.0, 1.0].iter().enumerate() {
            opt.step(*loss, &grad(), i);
        }
        // monotonic decrease: full trend
        assert_relative_eq!(opt.trend(), 1.0);

        let mut flat = MannKendall::new(1.0, 4);
        for (i, loss) in [1.0, 2.0, 1.0, 2.0].iter().enumerate() {
            flat.step(*loss, &grad(), i);
        }
        assert!(flat.trend() < 0.5);

        // window slides: zeta stays consistent with the kept losses
        opt.step(0.0, &grad(), 4);
        assert_eq!(opt.history.len(), 4);
        assert_relative_eq!(opt.trend(), 1.0);
    }
}
