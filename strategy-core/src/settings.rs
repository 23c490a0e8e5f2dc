//! Configuration settings for the strategy filter.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Strategy filter settings.
///
/// One value is built per filter run and passed by reference to the
/// selector, the degradation evaluator and the controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSettings {
    // === Tolerances ===
    /// Infeasibility above which a strategy solve is treated as `+inf` cost.
    pub infeas_tol: f64,

    /// Minimum `|obj|` used to normalize degradation.
    /// Below it the absolute cost gap is reported.
    pub division_tol: f64,

    // === Filter loop ===
    /// Initial fraction of samples whose strategy must be kept.
    pub samples_fraction: f64,

    /// Maximum number of select/evaluate iterations.
    pub max_iter: usize,

    /// Acceptable mean degradation over reassigned samples.
    pub subopt: f64,

    // === Parallel dispatch ===
    /// Evaluate samples on the rayon pool.
    pub parallel: bool,

    /// Minimum number of samples handed to one worker (None = rayon default).
    pub batch_size: Option<usize>,

    /// Dedicated pool size (None = global rayon pool).
    pub num_threads: Option<usize>,

    // === Output ===
    /// Log per-iteration progress at info level.
    pub verbose: bool,
}

impl Default for FilterSettings {
    /// Built-in values with `STRATEGY_FILTER_*` environment overrides.
    fn default() -> Self {
        Self::builtin().with_env_overrides()
    }
}

/// Parsed value of an environment variable, if set and well formed.
fn env_value<T: FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.parse::<T>().ok())
}

impl FilterSettings {
    /// Built-in values, ignoring the environment.
    pub fn builtin() -> Self {
        Self {
            infeas_tol: 1e-4,
            division_tol: 1e-8,
            samples_fraction: 0.8,
            max_iter: 5,
            subopt: 1e-1,
            parallel: true,
            batch_size: None,
            num_threads: None,
            verbose: false,
        }
    }

    /// Apply overrides for batch experiments from the environment.
    fn with_env_overrides(mut self) -> Self {
        if let Some(max_iter) = env_value("STRATEGY_FILTER_MAX_ITER") {
            self.max_iter = max_iter;
        }
        if let Some(subopt) = env_value("STRATEGY_FILTER_SUBOPT") {
            self.subopt = subopt;
        }
        if let Some(fraction) = env_value("STRATEGY_FILTER_FRACTION") {
            self.samples_fraction = fraction;
        }
        if let Some(batch_size) = env_value("STRATEGY_BATCH_SIZE") {
            self.batch_size = Some(batch_size);
        }
        self
    }

    /// Create settings with verbose output enabled.
    pub fn verbose() -> Self {
        let mut s = Self::default();
        s.verbose = true;
        s
    }

    /// Set the initial coverage fraction.
    pub fn with_samples_fraction(mut self, fraction: f64) -> Self {
        self.samples_fraction = fraction;
        self
    }

    /// Set the iteration cap.
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Set the acceptable mean degradation.
    pub fn with_subopt(mut self, subopt: f64) -> Self {
        self.subopt = subopt;
        self
    }

    /// Disable the worker pool.
    pub fn serial(mut self) -> Self {
        self.parallel = false;
        self
    }

    /// Set the dispatch batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    /// Validate ranges. Called by every component that takes settings.
    pub fn validate(&self) -> CoreResult<()> {
        if !(self.samples_fraction > 0.0 && self.samples_fraction <= 1.0) {
            return Err(CoreError::InvalidSettings(format!(
                "samples_fraction must be in (0, 1], got {}",
                self.samples_fraction
            )));
        }
        if !(self.infeas_tol >= 0.0) {
            return Err(CoreError::InvalidSettings(format!(
                "infeas_tol must be nonnegative, got {}",
                self.infeas_tol
            )));
        }
        if !(self.division_tol >= 0.0) {
            return Err(CoreError::InvalidSettings(format!(
                "division_tol must be nonnegative, got {}",
                self.division_tol
            )));
        }
        if !(self.subopt >= 0.0) {
            return Err(CoreError::InvalidSettings(format!(
                "subopt must be nonnegative, got {}",
                self.subopt
            )));
        }
        if self.batch_size == Some(0) {
            return Err(CoreError::InvalidSettings(
                "batch_size must be positive".to_string(),
            ));
        }
        if self.num_threads == Some(0) {
            return Err(CoreError::InvalidSettings(
                "num_threads must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
