//! Parametric quadratic programs as strategy oracles.
//!
//! [`QpOracle`] implements [`strategy_core::ProblemOracle`] for
//!
//! ```text
//! minimize    (1/2) x^T P x + (q + Q θ)^T x
//! subject to  A x <= b + B θ
//!             E x  = f + F θ
//! ```
//!
//! A strategy is the set of tight inequality rows ([`ActiveSet`]).

#![warn(missing_docs)]

pub mod admm;
pub mod error;
pub mod kkt;
pub mod oracle;
pub mod portfolio;
pub mod problem;
pub mod sampling;
pub mod sparse;

pub use error::{QpError, QpResult};
pub use oracle::{ActiveSet, QpOracle, StrategyPoint};
pub use portfolio::{portfolio, Portfolio};
pub use problem::{ParametricQp, QpSettings};
pub use sampling::uniform_ball;
