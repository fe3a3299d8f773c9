//! Asynchronous differential-evolution population for expensive black-box
//! error functions
//!
//! The population keeps a bounded set of evaluated candidates sorted by
//! fitness and breeds new candidates either at random (while bootstrapping) or
//! by differential crossover of three members. Fitness evaluation itself is
//! delegated to a [`PopulationEvaluator`], in-process ([`SerialEvaluator`]) or
//! distributed over workers (see the `fitpop-dist` crate).
//!
//! Supported features:
//! - Box constraints with per-parameter log or uniform distribution families
//! - Adaptive crossover scale derived from parent fitness
//! - Convergence on population spread (`tol`) and fitness spread (`f_tol`)
//! - Crash-safe checkpoint and resume, results file, CSV history export
//! - Cooperative cancellation through [`fitpop_env::SignalHandler`]

#![allow(missing_docs)]
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use fitpop_env::constants::{RESULTS_FILE, RESUME_FILE};

pub mod checkpoint;
pub mod errors;
pub mod generation;
pub mod parameter_description;
pub mod parameter_set;
pub mod population;
pub mod serial;

pub mod clip_allowed;
pub mod cross_differential;
pub mod distinct_parents;
pub mod init_random;

pub use errors::{DescriptionError, PopulationError, Result};
pub use generation::{GenerationSummary, Stopwatch};
pub use parameter_description::{
	ParameterDescription, ParameterDescriptionList, ParameterType, Slot, compatible,
	lists_compatible, slot,
};
pub use parameter_set::{ParameterSet, max_distance};
pub use population::{OptimizationReport, Population};
pub use serial::{PopulationEvaluator, SerialEvaluator};

/// Population settings
///
/// Relative file paths are resolved under `FITPOP_DIR` when it is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PopulationConfig {
	/// Number of members kept in the population
	pub population_size: usize,
	/// Evaluations per generation, defaults to the population size
	pub generation_size: Option<usize>,
	/// Convergence tolerance on parameter spread
	pub tol: f64,
	/// Convergence tolerance on fitness spread
	pub f_tol: f64,
	/// Generation cap, defaults to 1000 per fit parameter
	pub max_generation_num: Option<usize>,
	pub log_to_disk: bool,
	pub log_to_terminal: bool,
	pub resume_file: PathBuf,
	pub results_file: PathBuf,
	/// Seed for candidate generation, random when unset
	pub seed: Option<u64>,
	/// Write the generation history as CSV after every generation
	pub history_csv: Option<PathBuf>,
}

impl Default for PopulationConfig {
	fn default() -> Self {
		Self {
			population_size: 40,
			generation_size: None,
			tol: 1e-3,
			f_tol: 1e-4,
			max_generation_num: None,
			log_to_disk: true,
			log_to_terminal: true,
			resume_file: PathBuf::from(RESUME_FILE),
			results_file: PathBuf::from(RESULTS_FILE),
			seed: None,
			history_csv: None,
		}
	}
}

impl PopulationConfig {
	/// Load a JSON config; missing fields keep their defaults
	pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
		let path = path.as_ref();
		let text = std::fs::read_to_string(path).map_err(|e| PopulationError::io(path, e))?;
		serde_json::from_str(&text)
			.map_err(|e| PopulationError::Config(format!("{}: {e}", path.display())))
	}
}

/// Fluent builder for PopulationConfig
pub struct PopulationConfigBuilder {
	cfg: PopulationConfig,
}
impl Default for PopulationConfigBuilder {
	fn default() -> Self {
		Self::new()
	}
}
impl PopulationConfigBuilder {
	pub fn new() -> Self {
		Self { cfg: PopulationConfig::default() }
	}
	pub fn from_config(cfg: PopulationConfig) -> Self {
		Self { cfg }
	}
	pub fn population_size(mut self, v: usize) -> Self {
		self.cfg.population_size = v;
		self
	}
	pub fn generation_size(mut self, v: usize) -> Self {
		self.cfg.generation_size = Some(v);
		self
	}
	pub fn tol(mut self, v: f64) -> Self {
		self.cfg.tol = v;
		self
	}
	pub fn f_tol(mut self, v: f64) -> Self {
		self.cfg.f_tol = v;
		self
	}
	pub fn max_generation_num(mut self, v: usize) -> Self {
		self.cfg.max_generation_num = Some(v);
		self
	}
	pub fn log_to_disk(mut self, v: bool) -> Self {
		self.cfg.log_to_disk = v;
		self
	}
	pub fn log_to_terminal(mut self, v: bool) -> Self {
		self.cfg.log_to_terminal = v;
		self
	}
	pub fn resume_file(mut self, v: impl Into<PathBuf>) -> Self {
		self.cfg.resume_file = v.into();
		self
	}
	pub fn results_file(mut self, v: impl Into<PathBuf>) -> Self {
		self.cfg.results_file = v.into();
		self
	}
	pub fn seed(mut self, v: u64) -> Self {
		self.cfg.seed = Some(v);
		self
	}
	pub fn history_csv(mut self, v: impl Into<PathBuf>) -> Self {
		self.cfg.history_csv = Some(v.into());
		self
	}
	pub fn build(self) -> PopulationConfig {
		self.cfg
	}
}

#[cfg(test)]
mod tests;
