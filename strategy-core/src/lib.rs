//! Strategy filtering for parametric convex optimization.
//!
//! Samples of a parametric problem are labeled with the exact strategy
//! (tight-constraint pattern) that is optimal for them. Many of those
//! strategies are rare. This crate reduces the label space to the frequent
//! strategies and reassigns every other sample to the surviving strategy with
//! the least cost degradation, relaxing the coverage target until the mean
//! degradation is acceptable.
//!
//! # Example
//!
//! ```ignore
//! use strategy_core::{filter_strategies, FilterSettings, SampleSet, StrategyEncoding};
//!
//! let settings = FilterSettings::default();
//! let (samples, raw) = SampleSet::solve(&oracle, &parameters, &settings)?;
//! let (encoding, labels) = StrategyEncoding::encode(&raw);
//! let outcome = filter_strategies(&samples, labels, encoding, &oracle, &settings)?;
//!
//! println!("{} strategies after filtering", outcome.encoding.len());
//! ```

#![warn(missing_docs)]

pub mod degradation;
pub mod dispatch;
pub mod encoding;
pub mod error;
pub mod filter;
pub mod oracle;
pub mod sample;
pub mod select;
pub mod settings;

pub use degradation::{degradation, best_strategy, DegradationEvaluator, DegradationStats, Reassignment};
pub use encoding::{LabelAssignment, StrategyEncoding};
pub use error::{CoreError, CoreResult};
pub use filter::{
    filter_strategies, FilterIteration, FilterOutcome, FilterPhase, FilterStatus, StrategyFilter,
};
pub use oracle::{ExactSolve, ProblemOracle, StrategySolve};
pub use sample::{ParameterSample, SampleSet};
pub use select::{covered_samples, select_strategies};
pub use settings::FilterSettings;
