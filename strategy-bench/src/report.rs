//! Benchmark report and its JSON persistence.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use strategy_learn::{OptimizerSettings, PerformanceReport, TrainSummary};

/// Portfolio instance the benchmark ran on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProblemInfo {
    pub n_factors: usize,
    pub n_assets: usize,
    pub gamma: f64,
    pub seed: u64,
    pub n_train: usize,
    pub n_test: usize,
}

/// Everything one benchmark run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchReport {
    pub problem: ProblemInfo,
    pub settings: OptimizerSettings,
    pub train: TrainSummary,
    pub performance: PerformanceReport,
}

impl BenchReport {
    /// Save to JSON file
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path.as_ref())
            .with_context(|| format!("Failed to create file {}", path.as_ref().display()))?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)
            .with_context(|| format!("Failed to write JSON to {}", path.as_ref().display()))?;
        Ok(())
    }

    /// Load from JSON file
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())
            .with_context(|| format!("Failed to open file {}", path.as_ref().display()))?;
        let reader = BufReader::new(file);
        serde_json::from_reader(reader)
            .with_context(|| format!("Failed to parse JSON from {}", path.as_ref().display()))
    }

    pub fn print_summary(&self) {
        let p = &self.problem;
        let t = &self.train;
        let r = &self.performance;

        println!("\n{}", "=".repeat(60));
        println!(
            "Portfolio (factors={}, assets={}, gamma={})",
            p.n_factors, p.n_assets, p.gamma
        );
        println!("{}", "=".repeat(60));
        println!("Learner:            {}", r.learner);
        println!("Train / test:       {} / {}", p.n_train, p.n_test);
        println!(
            "Strategies:         {} -> {}",
            t.n_strategies_full, t.n_strategies
        );
        if let Some(status) = &t.filter_status {
            println!(
                "Filter:             {} ({} iterations, {:.1} ms)",
                status, t.filter_iterations, t.filter_time_ms
            );
        }
        println!("Exact solves:       {:.1} ms", t.exact_time_ms);
        println!("Learner training:   {:.1} ms", t.learn_time_ms);
        println!();
        println!("Accuracy:           {:.2}%", 100.0 * r.accuracy);
        println!("Strategy accuracy:  {:.2}%", 100.0 * r.strategy_accuracy);
        println!(
            "Suboptimality:      mean {:.3e}, max {:.3e}",
            r.mean_suboptimality, r.max_suboptimality
        );
        println!(
            "Infeasibility:      mean {:.3e}, max {:.3e} ({} infeasible)",
            r.mean_infeasibility, r.max_infeasibility, r.n_infeasible
        );
        println!(
            "Time per solve:     {:.3} ms (exact {:.3} ms)",
            r.mean_time_ms, r.mean_exact_time_ms
        );
        println!("{}", "=".repeat(60));
    }
}
