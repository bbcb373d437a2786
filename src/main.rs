use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;

use nqs_vmc::io::RunConfig;
use nqs_vmc::lattice::SpinSpace;
use nqs_vmc::sampling::{ExactMeasurer, FlipMove, Measurer, SrResult};
use nqs_vmc::systems::SpinHamiltonian;
use nqs_vmc::Result;

/// Largest lattice for which the summary runs exact diagonalization.
const MAX_EXACT_SITES: usize = 14;

#[derive(Parser, Debug)]
#[command(version, about = "Variational Monte Carlo with an RBM ansatz, optimized by Stochastic Reconfiguration", long_about = None)]
struct Args {
    /// YAML run file
    #[arg(short, long, default_value = "config.yml")]
    config: String,

    /// Override the seed of the run file
    #[arg(short, long)]
    seed: Option<u64>,

    /// Sum over the full Hilbert space instead of sampling
    #[arg(long)]
    exact: bool,
}

fn optimize<M: Measurer>(cfg: &RunConfig, measurer: &mut M) -> Result<SrResult> {
    let mut rng = StdRng::seed_from_u64(cfg.seed);
    let mut rbm = cfg.build_rbm(&mut rng)?;
    let mut sr = cfg.build_sr()?;
    sr.optimize(&mut rbm, measurer, cfg.sr.niter)
}

fn run(args: Args) -> Result<()> {
    let mut cfg = RunConfig::from_file(&args.config)?;
    if let Some(seed) = args.seed {
        cfg.seed = seed;
    }
    log::info!("Model: {}", cfg.model);

    let result = if args.exact {
        let mut exact = ExactMeasurer::new(SpinSpace::new(cfg.nsite()));
        if cfg.moves() == FlipMove::Pair {
            exact = exact.with_magnetization((cfg.nsite() % 2) as i32);
        }
        optimize(&cfg, &mut exact)?
    } else {
        let mut vmc = cfg.build_vmc();
        optimize(&cfg, &mut vmc)?
    };

    let nsite = cfg.nsite() as f64;
    println!("SR Optimization Results");
    println!("----------------------------------------");
    println!("Model: {}", cfg.model);
    println!("Iterations: {}", result.energy_history.len());
    println!("Converged: {}", result.converged);
    match result.error_history.last().copied().flatten() {
        Some(err) => println!("Final energy: {:.6} ± {:.6}", result.final_energy, err),
        None => println!("Final energy: {:.6}", result.final_energy),
    }
    println!("Energy per site: {:.6}", result.final_energy / nsite);
    if let Some(rate) = result.accept_history.last() {
        println!("Acceptance rate: {:.3}", rate);
    }
    if cfg.nsite() <= MAX_EXACT_SITES {
        let e0 = cfg.model.ground_state_energy();
        println!("Exact ground state: {:.6} ({:.6} per site)", e0, e0 / nsite);
        println!("Relative error: {:.4}", ((result.final_energy - e0) / e0).abs());
    }
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    if let Err(e) = run(args) {
        log::error!("{}", e);
        std::process::exit(1);
    }
}
