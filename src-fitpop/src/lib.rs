//! fitpop - fit parameters of an expensive error function with a distributed
//! differential-evolution population
//!
//! It integrates the workspace crates:
//!
//! - `fitpop_de`: population, operators, checkpoint and resume
//! - `fitpop_dist`: coordinator and workers over message passing
//! - `fitpop_env`: signals and environment
//! - `fitpop_testfunctions`: benchmark objectives

pub use fitpop_de as de;
pub use fitpop_dist as dist;

/// Command-line arguments and configuration merging
pub mod cli;
/// Driver errors
pub mod errors;
/// Search space, worker threads and the run itself
pub mod workflow;

pub use cli::Args;
pub use errors::FitpopError;
pub use workflow::{RunOutcome, run};
