//! Benchmarking CLI for learned strategies on the portfolio family.
//!
//! Samples expected returns around the nominal value, trains the selected
//! learner on exact strategies and compares predicted solves with exact ones
//! on a held-out set.

mod learner_choice;
mod report;

use std::fs;
use std::path::PathBuf;

use anyhow::{ensure, Context, Result};
use clap::Parser;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use strategy_learn::{OptimizerSettings, StrategyOptimizer};
use strategy_qp::{portfolio, uniform_ball, QpOracle, QpSettings};

use crate::learner_choice::LearnerChoice;
use crate::report::{BenchReport, ProblemInfo};

#[derive(Parser, Debug)]
#[command(name = "strategy-bench")]
#[command(about = "Train and evaluate strategy learners on random portfolio problems")]
struct Args {
    /// Number of risk factors (10 assets per factor)
    #[arg(long, default_value_t = 2)]
    factors: usize,

    /// Risk aversion
    #[arg(long, default_value_t = 1.0)]
    gamma: f64,

    /// Training samples
    #[arg(long, default_value_t = 200)]
    n_train: usize,

    /// Held-out test samples
    #[arg(long, default_value_t = 50)]
    n_test: usize,

    /// Learner backend (overrides the settings file)
    #[arg(long, value_enum)]
    learner: Option<LearnerChoice>,

    /// Candidates tried per prediction (overrides the settings file)
    #[arg(long)]
    n_best: Option<usize>,

    /// Optimizer settings as JSON
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Skip strategy filtering
    #[arg(long, default_value_t = false)]
    no_filter: bool,

    /// Evaluate samples on a single thread
    #[arg(long, default_value_t = false)]
    serial: bool,

    /// Random seed for the problem and the samples
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Write the report here as JSON
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Save the trained model under this path prefix
    #[arg(long)]
    save_model: Option<PathBuf>,

    /// Log filter progress
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

fn optimizer_settings(args: &Args) -> Result<OptimizerSettings> {
    let mut settings = match &args.settings {
        Some(path) => {
            let json = fs::read_to_string(path)
                .with_context(|| format!("Failed to read settings {}", path.display()))?;
            serde_json::from_str::<OptimizerSettings>(&json)
                .with_context(|| format!("Failed to parse settings {}", path.display()))?
        }
        None => OptimizerSettings::default(),
    };

    if let Some(choice) = args.learner {
        let n_best = settings.learner.n_best();
        settings.learner = choice.config(n_best);
    }
    if let Some(n_best) = args.n_best {
        settings.learner = settings.learner.with_n_best(n_best);
    }
    if args.no_filter {
        settings.run_filter = false;
    }
    if args.serial {
        settings.filter.parallel = false;
    }
    if args.verbose {
        settings.filter.verbose = true;
    }
    Ok(settings)
}

fn run(args: &Args) -> Result<BenchReport> {
    ensure!(args.n_train > 0, "--n-train must be positive");
    ensure!(args.n_test > 0, "--n-test must be positive");

    let settings = optimizer_settings(args)?;
    let pf = portfolio(args.factors, args.gamma, args.seed);
    log::info!(
        "Portfolio with {} assets, sampling radius {}",
        pf.num_assets(),
        pf.radius
    );

    let mut rng = ChaCha8Rng::seed_from_u64(args.seed.wrapping_add(1));
    let thetas = uniform_ball(&pf.theta_bar, pf.radius, args.n_train + args.n_test, &mut rng);
    let (train, test) = thetas.split_at(args.n_train);

    let oracle = QpOracle::new(pf.problem.clone(), QpSettings::default())
        .context("Invalid portfolio problem")?;
    let mut optimizer = StrategyOptimizer::new(oracle, settings.clone())?;

    let train_summary = optimizer.train(train).context("Training failed")?;
    let performance = optimizer.performance(test).context("Evaluation failed")?;

    if let Some(path) = &args.save_model {
        optimizer
            .save(path)
            .with_context(|| format!("Failed to save model to {}", path.display()))?;
        log::info!("Model saved to {}.json", path.display());
    }

    Ok(BenchReport {
        problem: ProblemInfo {
            n_factors: args.factors,
            n_assets: pf.num_assets(),
            gamma: args.gamma,
            seed: args.seed,
            n_train: args.n_train,
            n_test: args.n_test,
        },
        settings,
        train: train_summary,
        performance,
    })
}

fn main() -> Result<()> {
    let args = Args::parse();
    let level = if args.verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let report = run(&args)?;
    report.print_summary();

    if let Some(path) = &args.output {
        report.save_json(path)?;
        println!("Report written to {}", path.display());
    }
    Ok(())
}
