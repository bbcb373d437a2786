//! Variational Monte Carlo engine.
//!
//! One sampling pass runs `nbath` warm-up steps, then up to `nsample` steps that
//! record the local values of an [`OpQueue`] every `nmeasure` steps. Recorded
//! samples are grouped into blocks and pushed into one [`Bin`] per queue entry.
//! With a tolerance set, the pass stops early once at least
//! [`MIN_BINS_FOR_EARLY_STOP`] blocks exist and every standard error is below it.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::binner::Bin;
use super::traits::{ConfigGenerator, Measurement, Measurer};
use crate::error::{Result, VmcError};
use crate::operators::{LocalValue, OpQueue};
use crate::wavefunction::Rbm;

pub const MIN_BINS_FOR_EARLY_STOP: usize = 100;

/// Acceptance rule of the Markov chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SamplingMethod {
    /// Accept with probability `min(1, p)`.
    #[default]
    Metropolis,
    /// Accept with probability `p / (1 + p)`.
    HeatBath,
    /// Heat-bath while warming up, Metropolis while sampling.
    Auto,
}

/// Parameters of one sampling pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VmcParams {
    /// Warm-up steps.
    pub nbath: usize,
    /// Sampling steps.
    pub nsample: usize,
    /// Record one sample every `nmeasure` steps.
    pub nmeasure: usize,
    /// Target number of blocks.
    pub nbin: usize,
    /// Fixed block size in recorded samples, overrides `nbin`.
    pub nstat: Option<usize>,
    /// Early-stop threshold on the standard error.
    pub tol: Option<f64>,
    pub sampling_method: SamplingMethod,
}

impl Default for VmcParams {
    fn default() -> Self {
        Self {
            nbath: 500,
            nsample: 10_000,
            nmeasure: 1,
            nbin: 50,
            nstat: None,
            tol: None,
            sampling_method: SamplingMethod::Metropolis,
        }
    }
}

impl VmcParams {
    pub fn with_nbath(mut self, nbath: usize) -> Self {
        self.nbath = nbath;
        self
    }

    pub fn with_nsample(mut self, nsample: usize) -> Self {
        self.nsample = nsample;
        self
    }

    pub fn with_nmeasure(mut self, nmeasure: usize) -> Self {
        self.nmeasure = nmeasure.max(1);
        self
    }

    pub fn with_nbin(mut self, nbin: usize) -> Self {
        self.nbin = nbin.max(1);
        self
    }

    pub fn with_nstat(mut self, nstat: usize) -> Self {
        self.nstat = Some(nstat.max(1));
        self
    }

    pub fn with_tol(mut self, tol: f64) -> Self {
        self.tol = Some(tol);
        self
    }

    pub fn with_sampling_method(mut self, method: SamplingMethod) -> Self {
        self.sampling_method = method;
        self
    }

    /// Recorded samples per block: `nstat`, or `ceil((nsample / nmeasure) / nbin)`.
    pub fn block_size(&self) -> usize {
        match self.nstat {
            Some(n) => n.max(1),
            None => {
                let recorded = self.nsample / self.nmeasure.max(1);
                recorded.div_ceil(self.nbin.max(1)).max(1)
            }
        }
    }
}

/// Progress of a sampling pass.
#[derive(Debug, Clone, PartialEq)]
pub enum SamplingEvent {
    WarmupFinished { steps: usize, accept_rate: f64 },
    BlockPushed { nbin: usize, max_std_err: Option<f64> },
    EarlyStop { step: usize, nbin: usize },
    Finished { nsample: usize, accept_rate: f64 },
}

/// Receives [`SamplingEvent`]s from the engine.
pub trait SamplingObserver {
    fn notify(&mut self, event: &SamplingEvent);
}

/// Forwards every event to `log::debug!`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogObserver;

impl SamplingObserver for LogObserver {
    fn notify(&mut self, event: &SamplingEvent) {
        log::debug!("{:?}", event);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Warmup,
    Sampling,
}

/// VMC engine driving a [`ConfigGenerator`] with its own seeded RNG.
pub struct Vmc<G: ConfigGenerator> {
    pub params: VmcParams,
    pub cgen: G,
    rng: StdRng,
    observer: Box<dyn SamplingObserver>,
}

impl<G: ConfigGenerator> Vmc<G> {
    pub fn new(cgen: G, params: VmcParams, seed: u64) -> Self {
        Self {
            params,
            cgen,
            rng: StdRng::seed_from_u64(seed),
            observer: Box::new(LogObserver),
        }
    }

    pub fn with_observer(mut self, observer: Box<dyn SamplingObserver>) -> Self {
        self.observer = observer;
        self
    }

    fn accept(&mut self, pratio: f64, phase: Phase) -> bool {
        let method = match (self.params.sampling_method, phase) {
            (SamplingMethod::Auto, Phase::Warmup) => SamplingMethod::HeatBath,
            (SamplingMethod::Auto, Phase::Sampling) => SamplingMethod::Metropolis,
            (method, _) => method,
        };
        // p / (1 + p) written so that an overflowing ratio still gives 1
        let threshold = match method {
            SamplingMethod::HeatBath => 1.0 / (1.0 + pratio.recip()),
            _ => pratio,
        };
        self.rng.gen::<f64>() < threshold
    }

    /// One Markov step; returns whether the proposal was accepted.
    fn step(&mut self, rbm: &Rbm, phase: Phase) -> Result<bool> {
        let (flips, pratio) = self.cgen.fire(rbm, &mut self.rng)?;
        if self.accept(pratio, phase) {
            self.cgen.confirm(&flips)?;
            Ok(true)
        } else {
            self.cgen.reject();
            Ok(false)
        }
    }

    fn push_block(bins: &mut [Bin], block: &mut [Vec<LocalValue>]) -> Result<()> {
        for (bin, samples) in bins.iter_mut().zip(block.iter_mut()) {
            bin.push(samples)?;
            samples.clear();
        }
        Ok(())
    }

    /// Run one sampling pass and return the binned expectation values.
    pub fn run(&mut self, rbm: &Rbm, queue: &OpQueue) -> Result<Measurement> {
        self.cgen.set_state(rbm, &mut self.rng)?;

        let mut accepted = 0;
        for _ in 0..self.params.nbath {
            if self.step(rbm, Phase::Warmup)? {
                accepted += 1;
            }
        }
        if self.params.nbath > 0 {
            self.observer.notify(&SamplingEvent::WarmupFinished {
                steps: self.params.nbath,
                accept_rate: accepted as f64 / self.params.nbath as f64,
            });
        }

        let nmeasure = self.params.nmeasure.max(1);
        let block_size = self.params.block_size();
        let mut bins: Vec<Bin> = (0..queue.len()).map(|_| Bin::new()).collect();
        let mut block: Vec<Vec<LocalValue>> = vec![Vec::with_capacity(block_size); queue.len()];
        let mut cached: Option<Vec<LocalValue>> = None;
        let mut accepted = 0;
        let mut steps = 0;

        for step in 0..self.params.nsample {
            steps += 1;
            if self.step(rbm, Phase::Sampling)? {
                accepted += 1;
                cached = None;
            }
            if (step + 1) % nmeasure != 0 {
                continue;
            }

            let values = match cached.take() {
                Some(values) => values,
                None => {
                    let theta = self.cgen.theta().ok_or(VmcError::NotBound)?;
                    queue.evaluate(rbm, self.cgen.config(), theta)
                }
            };
            for (samples, v) in block.iter_mut().zip(values.iter()) {
                samples.push(v.clone());
            }
            cached = Some(values);

            if block.first().map_or(0, |b| b.len()) >= block_size {
                Self::push_block(&mut bins, &mut block)?;
                let max_std_err = max_std_err(&bins);
                self.observer.notify(&SamplingEvent::BlockPushed {
                    nbin: bins.first().map_or(0, |b| b.nbin()),
                    max_std_err,
                });
                if let (Some(tol), Some(err)) = (self.params.tol, max_std_err) {
                    let nbin = bins.first().map_or(0, |b| b.nbin());
                    if nbin >= MIN_BINS_FOR_EARLY_STOP && err < tol {
                        self.observer.notify(&SamplingEvent::EarlyStop { step, nbin });
                        break;
                    }
                }
            }
        }
        Self::push_block(&mut bins, &mut block)?;

        let accept_rate = if steps > 0 { accepted as f64 / steps as f64 } else { 0.0 };
        let values = bins
            .iter()
            .map(|b| b.mean().ok_or(VmcError::NoSamples))
            .collect::<Result<Vec<_>>>()?;
        let nsample = bins.first().map_or(0, |b| b.nsample());
        self.observer.notify(&SamplingEvent::Finished { nsample, accept_rate });

        Ok(Measurement {
            values,
            std_err: bins.iter().map(|b| b.max_std_err()).collect(),
            accept_rate,
            nsample,
        })
    }
}

/// Largest standard error over all bins, `None` until every bin has two blocks.
fn max_std_err(bins: &[Bin]) -> Option<f64> {
    bins.iter()
        .map(|b| b.max_std_err())
        .try_fold(0.0_f64, |acc, e| e.map(|e| acc.max(e)))
}

impl<G: ConfigGenerator> Measurer for Vmc<G> {
    fn measure(&mut self, rbm: &Rbm, queue: &OpQueue) -> Result<Measurement> {
        self.run(rbm, queue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lattice::{Group, SpinSpace};
    use crate::operators::{scalar_value, Derived, LinOp};
    use crate::sampling::{ExactMeasurer, FlipMove, RbmConfigGenerator};
    use crate::systems::testing::{embed, splus, sz};
    use crate::systems::{Heisenberg, Model};
    use crate::wavefunction::Dtype;
    use approx::assert_abs_diff_eq;
    use nalgebra::{DMatrix, DVector};
    use num_complex::Complex64;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    fn relative_error(estimate: f64, exact: f64) -> f64 {
        ((estimate - exact) / exact).abs()
    }

    fn rbm(seed: u64) -> Rbm {
        let mut rng = StdRng::seed_from_u64(seed);
        Rbm::random(4, 2, Group::Trivial, Dtype::Complex128, 0.5, &mut rng).unwrap()
    }

    #[test]
    fn test_block_size() {
        let p = VmcParams::default().with_nsample(1000).with_nmeasure(3).with_nbin(7);
        assert_eq!(p.block_size(), 48);
        assert_eq!(p.clone().with_nstat(5).block_size(), 5);
    }

    #[test]
    fn test_energy_matches_exact_sum() {
        let model = Model::Heisenberg(Heisenberg::chain(4, false));
        let queue = OpQueue::new(vec![LinOp::Hamiltonian(model)]);
        let rbm = rbm(7);

        let exact = ExactMeasurer::new(SpinSpace::new(4)).measure(&rbm, &queue).unwrap();
        let e_exact = exact.values[0][(0, 0)].re;

        for method in [SamplingMethod::Metropolis, SamplingMethod::HeatBath, SamplingMethod::Auto] {
            let params = VmcParams::default()
                .with_nbath(200)
                .with_nsample(20_000)
                .with_nbin(50)
                .with_sampling_method(method);
            let mut vmc = Vmc::new(RbmConfigGenerator::new(FlipMove::Single), params, 42);
            let m = vmc.measure(&rbm, &queue).unwrap();
            assert_eq!(m.nsample, 20_000);
            assert!(m.accept_rate > 0.0 && m.accept_rate <= 1.0);
            let err = relative_error(m.values[0][(0, 0)].re, e_exact);
            assert!(err < 0.05, "{:?}: relative error {}", method, err);
        }
    }

    /// `H = Σ_bonds S_i·S_{i+1}` of an open chain from Pauli Kronecker products.
    fn kronecker_heisenberg(n: usize) -> DMatrix<f64> {
        let sm = splus().transpose();
        let dim = 1 << n;
        let mut h = DMatrix::zeros(dim, dim);
        for i in 0..n - 1 {
            h += embed(n, &[(i, splus()), (i + 1, sm.clone())]) * 0.5;
            h += embed(n, &[(i, sm.clone()), (i + 1, splus())]) * 0.5;
            h += embed(n, &[(i, sz()), (i + 1, sz())]);
        }
        h
    }

    #[test]
    fn test_open_chain_energy_against_dense_hamiltonian() {
        let space = SpinSpace::new(4);
        let h = kronecker_heisenberg(4).map(|x| Complex64::new(x, 0.0));
        let queue = OpQueue::new(vec![LinOp::Hamiltonian(Model::Heisenberg(Heisenberg::chain(4, false)))]);

        for seed in [1, 2, 3] {
            let mut rng = StdRng::seed_from_u64(seed);
            let rbm = Rbm::random(4, 4, Group::Trivial, Dtype::Complex128, 0.1, &mut rng).unwrap();
            let psi: DVector<Complex64> = rbm.tovec(&space);
            let e_exact = (psi.adjoint() * &h * &psi)[(0, 0)].re / psi.norm_squared();

            let params = VmcParams::default().with_nbath(50).with_nsample(10_000);
            let mut vmc = Vmc::new(RbmConfigGenerator::new(FlipMove::Single), params, 100 + seed);
            let m = vmc.measure(&rbm, &queue).unwrap();
            let err = relative_error(m.values[0][(0, 0)].re, e_exact);
            assert!(err < 0.05, "seed {}: vmc {} vs exact {}", seed, m.values[0][(0, 0)].re, e_exact);
        }
    }

    #[test]
    fn test_heat_bath_accepts_overflowing_ratio() {
        for method in [SamplingMethod::HeatBath, SamplingMethod::Auto, SamplingMethod::Metropolis] {
            let params = VmcParams::default().with_sampling_method(method);
            let mut vmc = Vmc::new(RbmConfigGenerator::new(FlipMove::Single), params, 3);
            for phase in [Phase::Warmup, Phase::Sampling] {
                assert!((0..100).all(|_| vmc.accept(f64::INFINITY, phase)), "{:?} {:?}", method, phase);
                assert!((0..100).all(|_| !vmc.accept(0.0, phase)), "{:?} {:?}", method, phase);
            }
        }

        let params = VmcParams::default().with_sampling_method(SamplingMethod::HeatBath);
        let mut vmc = Vmc::new(RbmConfigGenerator::new(FlipMove::Single), params, 4);
        let accepted = (0..4000).filter(|_| vmc.accept(1.0, Phase::Sampling)).count();
        assert_abs_diff_eq!(accepted as f64 / 4000.0, 0.5, epsilon = 0.05);
    }

    /// Generator whose proposals are accepted or rejected on a fixed schedule:
    /// an infinite ratio always passes Metropolis, a zero ratio never does.
    struct Scripted {
        config: Vec<i8>,
        theta: Option<DVector<Complex64>>,
        ratios: Vec<f64>,
        step: usize,
    }

    impl ConfigGenerator for Scripted {
        fn set_state<R: Rng + ?Sized>(&mut self, rbm: &Rbm, _rng: &mut R) -> Result<()> {
            self.config = vec![1; rbm.nin()];
            self.theta = Some(rbm.feed_input(&self.config));
            Ok(())
        }

        fn fire<R: Rng + ?Sized>(&mut self, _rbm: &Rbm, _rng: &mut R) -> Result<(Vec<usize>, f64)> {
            let ratio = self.ratios[self.step % self.ratios.len()];
            self.step += 1;
            Ok((vec![0], ratio))
        }

        fn reject(&mut self) {}

        fn confirm(&mut self, flips: &[usize]) -> Result<()> {
            for &k in flips {
                self.config[k] = -self.config[k];
            }
            Ok(())
        }

        fn config(&self) -> &[i8] {
            &self.config
        }

        fn theta(&self) -> Option<&DVector<Complex64>> {
            self.theta.as_ref()
        }
    }

    #[test]
    fn test_rejected_steps_reuse_cached_values() {
        let inf = f64::INFINITY;
        // accepted on steps 0, 3, 5 and 8
        let ratios = vec![inf, 0.0, 0.0, inf, 0.0, inf, 0.0, 0.0, inf, 0.0];

        // (nmeasure, recorded values): each evaluation returns the running count
        let cases = [
            (1, vec![1.0, 1.0, 1.0, 2.0, 2.0, 3.0, 3.0, 3.0, 4.0, 4.0]),
            (2, vec![1.0, 2.0, 3.0, 3.0, 4.0]),
        ];
        for (nmeasure, recorded) in cases {
            let evaluations = Rc::new(Cell::new(0usize));
            let counter = evaluations.clone();
            let count = Derived::Custom(Box::new(move |_: &[LocalValue]| {
                counter.set(counter.get() + 1);
                scalar_value(Complex64::new(counter.get() as f64, 0.0))
            }));
            let queue = OpQueue::new(Vec::new()).with_derived(count);
            let cgen = Scripted {
                config: Vec::new(),
                theta: None,
                ratios: ratios.clone(),
                step: 0,
            };
            let params = VmcParams::default()
                .with_nbath(0)
                .with_nsample(10)
                .with_nmeasure(nmeasure)
                .with_nstat(10);
            let mut vmc = Vmc::new(cgen, params, 8);
            let m = vmc.measure(&rbm(2), &queue).unwrap();

            assert_eq!(evaluations.get(), 4);
            assert_eq!(m.nsample, recorded.len());
            assert_abs_diff_eq!(m.accept_rate, 0.4);
            let mean = recorded.iter().sum::<f64>() / recorded.len() as f64;
            assert_abs_diff_eq!(m.values[0][(0, 0)].re, mean, epsilon = 1e-12);
            assert_eq!(vmc.cgen.config(), &[1, 1, 1, 1]);
        }
    }

    #[test]
    fn test_pair_flips_match_sector() {
        let model = Model::Heisenberg(Heisenberg::chain(4, true));
        let queue = OpQueue::new(vec![LinOp::Hamiltonian(model)]);
        let rbm = rbm(8);
        let exact = ExactMeasurer::new(SpinSpace::new(4))
            .with_magnetization(0)
            .measure(&rbm, &queue)
            .unwrap();

        let params = VmcParams::default().with_nbath(200).with_nsample(20_000);
        let mut vmc = Vmc::new(RbmConfigGenerator::new(FlipMove::Pair), params, 43);
        let m = vmc.measure(&rbm, &queue).unwrap();
        assert_abs_diff_eq!(m.values[0][(0, 0)].re, exact.values[0][(0, 0)].re, epsilon = 0.05);
    }

    struct Recorder(Rc<RefCell<Vec<SamplingEvent>>>);

    impl SamplingObserver for Recorder {
        fn notify(&mut self, event: &SamplingEvent) {
            self.0.borrow_mut().push(event.clone());
        }
    }

    #[test]
    fn test_early_stop_and_events() {
        let queue = OpQueue::new(vec![LinOp::Hamiltonian(Model::Heisenberg(Heisenberg::chain(4, false)))]);
        let events = Rc::new(RefCell::new(Vec::new()));
        let params = VmcParams::default()
            .with_nbath(10)
            .with_nsample(100_000)
            .with_nstat(10)
            .with_tol(1e3);
        let mut vmc = Vmc::new(RbmConfigGenerator::new(FlipMove::Single), params, 5)
            .with_observer(Box::new(Recorder(events.clone())));
        let m = vmc.measure(&rbm(9), &queue).unwrap();

        // stops at the first check with 100 blocks of 10 samples
        assert_eq!(m.nsample, 1000);
        let events = events.borrow();
        assert!(matches!(events[0], SamplingEvent::WarmupFinished { steps: 10, .. }));
        assert!(events.iter().any(|e| matches!(e, SamplingEvent::EarlyStop { nbin: 100, .. })));
        assert!(matches!(events.last(), Some(SamplingEvent::Finished { nsample: 1000, .. })));
    }

    #[test]
    fn test_no_samples_is_an_error() {
        let queue = OpQueue::new(vec![LinOp::PartialW]);
        let params = VmcParams::default().with_nbath(0).with_nsample(2).with_nmeasure(5);
        let mut vmc = Vmc::new(RbmConfigGenerator::new(FlipMove::Single), params, 1);
        assert!(matches!(vmc.measure(&rbm(1), &queue), Err(VmcError::NoSamples)));
    }
}
