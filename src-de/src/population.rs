//! The sorted, bounded population and the generation loop
//!
//! Members are kept ascending by fitness after every insertion, the best
//! member is mirrored in `best` (and in the results file) and every finished
//! generation is summarized, tested for convergence and checkpointed.

use std::collections::VecDeque;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use log::Level;
use rand::Rng;
use serde::Serialize;

use fitpop_env::SignalHandler;
use fitpop_env::env_utils::{resolve_path, timing_enabled};

use crate::PopulationConfig;
use crate::checkpoint::fmt_f64;
use crate::cross_differential::{MAX_DIFF_SCALE, cross_differential};
use crate::errors::{PopulationError, Result};
use crate::generation::{GenerationSummary, Stopwatch, write_history_csv};
use crate::init_random::init_random;
use crate::parameter_description::ParameterDescriptionList;
use crate::parameter_set::ParameterSet;
use crate::serial::PopulationEvaluator;

/// Outcome of [`Population::genetic_algorithm`]
#[derive(Debug, Clone, Serialize)]
pub struct OptimizationReport {
    pub best: ParameterSet,
    pub generations: usize,
    pub evaluations: usize,
    pub optimal: bool,
    pub resumed: bool,
    /// Some worker did not acknowledge shutdown; the caller must abort the job
    pub needs_abort: bool,
}

pub struct Population {
    pub(crate) config: PopulationConfig,
    pub(crate) descriptions: ParameterDescriptionList,
    pub(crate) members: Vec<ParameterSet>,
    pub(crate) best: ParameterSet,
    pub(crate) population_size: usize,
    pub(crate) generation_size: usize,
    pub(crate) max_generation_num: usize,
    pub(crate) generation_num: usize,
    pub(crate) num_evaluations: usize,
    pub(crate) num_gen_evaluations: usize,
    pub(crate) num_sent: usize,
    pub(crate) history: Vec<GenerationSummary>,
    pub(crate) total_time: Stopwatch,
    pub(crate) generation_time: Stopwatch,
    pub(crate) f_range: f64,
    pub(crate) max_log_range: f64,
    pub(crate) max_uniform_range: f64,
    pub(crate) max_diff_scale: f64,
    pub(crate) resume_path: PathBuf,
    pub(crate) results_path: PathBuf,
    pub(crate) history_path: Option<PathBuf>,
    pub(crate) initialized: bool,
    pub(crate) resumed: bool,
    pub(crate) optimal: bool,
    pub(crate) first_eval: bool,
    pub(crate) needs_abort: bool,
    timing: bool,
    seeds: VecDeque<ParameterSet>,
    signals: SignalHandler,
}

impl Population {
    pub fn new(config: PopulationConfig) -> Self {
        Self {
            population_size: config.population_size,
            resume_path: config.resume_file.clone(),
            results_path: config.results_file.clone(),
            history_path: config.history_csv.clone(),
            config,
            descriptions: ParameterDescriptionList::new(),
            members: Vec::new(),
            best: ParameterSet::from_values(Vec::new(), f64::INFINITY),
            generation_size: 0,
            max_generation_num: 0,
            generation_num: 1,
            num_evaluations: 0,
            num_gen_evaluations: 0,
            num_sent: 0,
            history: Vec::new(),
            total_time: Stopwatch::new(),
            generation_time: Stopwatch::new(),
            f_range: f64::NAN,
            max_log_range: 1.0,
            max_uniform_range: 0.0,
            max_diff_scale: MAX_DIFF_SCALE,
            initialized: false,
            resumed: false,
            optimal: false,
            first_eval: true,
            needs_abort: false,
            timing: false,
            seeds: VecDeque::new(),
            signals: SignalHandler::detached(),
        }
    }

    /// Replace the (detached) signal handler polled during evaluation
    pub fn with_signal_handler(mut self, signals: SignalHandler) -> Self {
        self.signals = signals;
        self
    }

    pub fn signals(&self) -> &SignalHandler {
        &self.signals
    }

    /// Turn a pending signal into an error
    pub fn check_signals(&self) -> Result<()> {
        Ok(self.signals.check()?)
    }

    pub fn set_parameter_descriptions(&mut self, descriptions: ParameterDescriptionList) {
        self.best = ParameterSet::from_values(vec![0.0; descriptions.len()], f64::INFINITY);
        self.descriptions = descriptions;
    }

    pub fn set_population_size(&mut self, size: usize) {
        self.population_size = size;
        self.members.truncate(size);
    }

    /// Queue a candidate to be evaluated before any generated one
    pub fn add_seed(&mut self, mut set: ParameterSet) {
        set.value = f64::NAN;
        self.seeds.push_back(set);
    }

    pub fn config(&self) -> &PopulationConfig {
        &self.config
    }
    pub fn parameter_descriptions(&self) -> &ParameterDescriptionList {
        &self.descriptions
    }
    pub fn members(&self) -> &[ParameterSet] {
        &self.members
    }
    pub fn best_parameters(&self) -> &ParameterSet {
        &self.best
    }
    pub fn population_size(&self) -> usize {
        self.population_size
    }
    pub fn generation_size(&self) -> usize {
        self.generation_size
    }
    pub fn generation_num(&self) -> usize {
        self.generation_num
    }
    pub fn num_evaluations(&self) -> usize {
        self.num_evaluations
    }
    pub fn num_gen_evaluations(&self) -> usize {
        self.num_gen_evaluations
    }
    pub fn max_generation_num(&self) -> usize {
        self.max_generation_num
    }
    pub fn history(&self) -> &[GenerationSummary] {
        &self.history
    }
    pub fn is_optimal(&self) -> bool {
        self.optimal
    }
    pub fn is_resumed(&self) -> bool {
        self.resumed
    }
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }
    /// Set when an evaluator cleanup reported unresponsive workers
    pub fn needs_abort(&self) -> bool {
        self.needs_abort
    }
    pub fn f_range(&self) -> f64 {
        self.f_range
    }
    pub fn max_log_range(&self) -> f64 {
        self.max_log_range
    }
    pub fn max_uniform_range(&self) -> f64 {
        self.max_uniform_range
    }
    pub fn resume_path(&self) -> &Path {
        &self.resume_path
    }
    pub fn results_path(&self) -> &Path {
        &self.results_path
    }

    pub(crate) fn progress_level(&self) -> Level {
        if self.config.log_to_terminal {
            Level::Info
        } else {
            Level::Debug
        }
    }

    /// Validate settings and resolve run files; later calls do nothing
    pub fn initialize(&mut self) -> Result<()> {
        if self.initialized {
            return Ok(());
        }
        if self.descriptions.is_empty() {
            return Err(PopulationError::Config("no parameter descriptions loaded".into()));
        }
        if self.population_size == 0 {
            return Err(PopulationError::Config("population size not set".into()));
        }
        if let Some(desc) = self.descriptions.iter().find(|d| !d.is_valid()) {
            return Err(PopulationError::Config(format!(
                "invalid parameter description: {desc}"
            )));
        }
        let resolve = |p: &Path| resolve_path(p).map_err(|e| PopulationError::Config(e.to_string()));
        self.resume_path = resolve(self.config.resume_file.as_path())?;
        self.results_path = resolve(self.config.results_file.as_path())?;
        self.history_path = match &self.config.history_csv {
            Some(p) => Some(resolve(p.as_path())?),
            None => None,
        };
        self.generation_size = self.config.generation_size.unwrap_or(self.population_size);
        self.max_generation_num = self
            .config
            .max_generation_num
            .unwrap_or(1000 * self.descriptions.num_fit_parameters());
        if self.best.len() != self.descriptions.len() {
            self.best = ParameterSet::from_values(vec![0.0; self.descriptions.len()], f64::INFINITY);
        }
        self.timing = timing_enabled();
        self.initialized = true;
        log::debug!(
            "population initialized: {} parameters ({} fit), size {}, generation size {}",
            self.descriptions.len(),
            self.descriptions.num_fit_parameters(),
            self.population_size,
            self.generation_size
        );
        Ok(())
    }

    /// Pending set sized for the descriptions
    pub fn new_parameter_set(&self) -> ParameterSet {
        ParameterSet::new(self.descriptions.len())
    }

    /// Fill `set` with random values drawn from the current ranges
    pub fn random_pset<R: Rng + ?Sized>(&self, set: &mut ParameterSet, rng: &mut R) -> Result<()> {
        init_random(set, &self.descriptions, self.max_diff_scale, rng)?;
        Ok(())
    }

    /// Breed `set` from three members by differential crossover
    pub fn differential_cross<R: Rng + ?Sized>(&self, set: &mut ParameterSet, rng: &mut R) -> Result<()> {
        cross_differential(set, &self.members, &self.descriptions, rng)
    }

    /// Whether the next candidate should be random rather than bred
    pub fn needs_random(&self) -> bool {
        let bootstrapping =
            self.num_evaluations < self.population_size && self.members.len() < self.population_size;
        self.members.len() < 3 || (bootstrapping && self.num_sent < self.population_size)
    }

    /// Next candidate to send out: a queued seed, a random set while
    /// bootstrapping, otherwise a crossover child
    pub fn next_candidate<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<ParameterSet> {
        let set = match self.seeds.pop_front() {
            Some(seed) => seed,
            None => {
                let mut set = self.new_parameter_set();
                if self.needs_random() {
                    self.random_pset(&mut set, rng)?;
                } else {
                    self.differential_cross(&mut set, rng)?;
                }
                set
            }
        };
        self.num_sent += 1;
        Ok(set)
    }

    /// Reset per-generation counters at the start of an evaluation pass
    ///
    /// The first pass of a session keeps the counters restored from a
    /// checkpoint.
    pub fn begin_generation(&mut self) {
        if self.first_eval {
            self.num_sent = self.num_gen_evaluations;
            self.first_eval = false;
        } else {
            self.num_gen_evaluations = 0;
            self.num_sent = 0;
        }
    }

    /// Whether the current generation still needs evaluations
    pub fn generation_pending(&self) -> bool {
        self.num_gen_evaluations < self.generation_size
    }

    /// Count an evaluated candidate and fold it into the population
    ///
    /// While the population grows, rejected (`+inf`) candidates are dropped;
    /// once full, only improvements on the worst member get in. Returns
    /// whether the candidate joined.
    pub fn fold_in(&mut self, set: ParameterSet) -> Result<bool> {
        if set.value.is_nan() {
            return Err(PopulationError::Evaluator(format!(
                "NaN value for parameters: {set}"
            )));
        }
        self.num_evaluations += 1;
        self.num_gen_evaluations += 1;
        if self.members.len() < self.population_size {
            if set.value == f64::INFINITY {
                return Ok(false);
            }
            self.append_in(set)?;
            Ok(true)
        } else {
            self.swap_in(set)
        }
    }

    /// Insert an evaluated set, growing the population
    pub fn append_in(&mut self, set: ParameterSet) -> Result<()> {
        self.members.push(set);
        let at = self.sift_up(self.members.len() - 1);
        if at == 0 {
            self.set_best_parameters(0)?;
        }
        Ok(())
    }

    /// Replace the worst member if `set` is strictly better
    ///
    /// Returns whether the population changed.
    pub fn swap_in(&mut self, set: ParameterSet) -> Result<bool> {
        let Some(worst) = self.members.last_mut() else {
            self.append_in(set)?;
            return Ok(true);
        };
        if !(set.value < worst.value) {
            return Ok(false);
        }
        *worst = set;
        let at = self.sift_up(self.members.len() - 1);
        if at == 0 {
            self.set_best_parameters(0)?;
        }
        Ok(true)
    }

    /// Move the member at `index` towards the front until ordered
    fn sift_up(&mut self, mut index: usize) -> usize {
        while index > 0 && self.members[index].value < self.members[index - 1].value {
            self.members.swap(index, index - 1);
            index -= 1;
        }
        index
    }

    fn set_best_parameters(&mut self, index: usize) -> Result<()> {
        self.best = self.members[index].clone();
        self.save_best_parameters()
    }

    /// Results file text: the best value then one `name value` line per
    /// parameter
    pub fn results_text(&self) -> String {
        let width = self
            .descriptions
            .iter()
            .map(|d| d.name().len())
            .max()
            .unwrap_or(0)
            .max(5)
            + 1;
        let mut out = String::new();
        let _ = writeln!(out, "{:<width$}{}", "value", fmt_f64(self.best.value));
        for (desc, value) in self.descriptions.iter().zip(self.best.parameters.iter()) {
            let _ = writeln!(out, "{:<width$}{}", desc.name(), fmt_f64(*value));
        }
        out
    }

    /// Overwrite the results file with the best parameters
    pub fn save_best_parameters(&self) -> Result<()> {
        if !self.initialized || !self.config.log_to_disk {
            return Ok(());
        }
        std::fs::write(&self.results_path, self.results_text())
            .map_err(|e| PopulationError::io(&self.results_path, e))
    }

    /// Re-derive ranges from the members and decide whether the search is over
    ///
    /// Optimal when nothing is fit, when a full population has converged in
    /// both parameters and fitness, or when the generation cap is passed.
    pub fn test_optimal(&mut self) -> Result<()> {
        self.max_log_range = 1.0;
        self.max_uniform_range = 0.0;
        let num_fit = self.descriptions.num_fit_parameters();

        let Some(front) = self.members.first() else {
            self.f_range = f64::NAN;
            self.optimal = num_fit == 0 || self.generation_num > self.max_generation_num;
            return Ok(());
        };

        for (desc, &value) in self.descriptions.iter_mut().zip(front.parameters.iter()) {
            desc.reset_range(value);
        }

        let mut evaluated = self.members.len() >= self.population_size;
        let mut max_diff_scale: f64 = 0.0;
        for set in &self.members {
            if set.is_pending() {
                evaluated = false;
            } else {
                max_diff_scale = max_diff_scale.max(set.diff_scale);
            }
            for (desc, &value) in self.descriptions.iter_mut().zip(set.parameters.iter()) {
                if !desc.is_constant() {
                    desc.update_range(value)?;
                }
            }
        }
        if max_diff_scale > 0.0 {
            self.max_diff_scale = max_diff_scale;
        }

        for desc in self.descriptions.iter() {
            let range = desc.range()?;
            if desc.is_log_distributed() {
                self.max_log_range = self.max_log_range.max(range);
            } else {
                self.max_uniform_range = self.max_uniform_range.max(range);
            }
        }

        let back = &self.members[self.members.len() - 1];
        self.f_range = back.value - self.members[0].value;

        self.optimal = num_fit == 0
            || (evaluated
                && self.f_range < self.config.f_tol
                && self.max_uniform_range < self.config.tol
                && self.max_log_range - 1.0 < self.config.tol)
            || self.generation_num > self.max_generation_num;
        Ok(())
    }

    /// Record the summary of the current generation
    ///
    /// May run more than once per generation; the entry for the current
    /// generation is replaced.
    pub fn save_history(&mut self) {
        let summary = GenerationSummary {
            best: self.best.clone(),
            generation_secs: self.generation_time.elapsed_secs(),
            total_secs: self.total_time.elapsed_secs(),
            f_range: self.f_range,
            max_log_range: self.max_log_range,
            max_uniform_range: self.max_uniform_range,
        };
        self.history.truncate(self.generation_num.saturating_sub(1));
        while self.history.len() + 1 < self.generation_num {
            self.history.push(summary.clone());
        }
        self.history.push(summary);
    }

    /// Write the generation history CSV, if configured
    pub fn export_history(&self) -> Result<()> {
        let Some(path) = &self.history_path else {
            return Ok(());
        };
        if !self.config.log_to_disk {
            return Ok(());
        }
        write_history_csv(path, &self.descriptions.names(), &self.history)
    }

    /// Log the progress line of generation `generation` (1-based)
    pub fn summarize_generation(&self, generation: usize) {
        let Some(summary) = generation
            .checked_sub(1)
            .and_then(|i| self.history.get(i))
        else {
            return;
        };
        let level = self.progress_level();
        log::log!(
            level,
            "####### Generation {generation} ####### best value = {} | evaluation time: {:.3}s | total elapsed time: {:.3}s",
            summary.best.value,
            summary.generation_secs,
            summary.total_secs
        );
        if self.timing && generation == self.generation_num && summary.generation_secs > 0.0 {
            log::debug!(
                "generation {generation}: {} evaluations in {:.3}s ({:.1}/s), f_range {}, max log range {}, max uniform range {}",
                self.num_gen_evaluations,
                summary.generation_secs,
                self.num_gen_evaluations as f64 / summary.generation_secs,
                summary.f_range,
                summary.max_log_range,
                summary.max_uniform_range
            );
        }
        if self.optimal && generation == self.generation_num {
            log::log!(level, "Finished optimizing.");
        }
    }

    /// One generation: evaluate, test convergence, record and checkpoint
    ///
    /// An interruption checkpoints before propagating; any error runs the
    /// evaluator cleanup first.
    pub fn evaluate_generation<E: PopulationEvaluator + ?Sized>(&mut self, evaluator: &mut E) -> Result<()> {
        match self.run_generation(evaluator) {
            Ok(()) => {
                self.summarize_generation(self.generation_num);
                Ok(())
            }
            Err(e) => {
                if e.is_interrupted() {
                    log::info!("{e}, saving progress");
                    if let Err(save) = self.save_progress() {
                        log::error!("could not save progress: {save}");
                    }
                }
                self.cleanup(evaluator);
                Err(e)
            }
        }
    }

    fn run_generation<E: PopulationEvaluator + ?Sized>(&mut self, evaluator: &mut E) -> Result<()> {
        self.check_signals()?;
        evaluator.evaluate_population(self)?;
        self.check_signals()?;
        self.test_optimal()?;
        self.save_history();
        self.export_history()?;
        self.check_signals()?;
        self.save_progress()
    }

    /// Shut the evaluator down, remembering whether it asked for an abort
    pub fn cleanup<E: PopulationEvaluator + ?Sized>(&mut self, evaluator: &mut E) {
        if evaluator.cleanup() {
            self.needs_abort = true;
        }
    }

    /// Full run: initialize, resume if possible, evaluate generations until
    /// optimal, clean up
    pub fn genetic_algorithm<E: PopulationEvaluator + ?Sized>(
        &mut self,
        evaluator: &mut E,
    ) -> Result<OptimizationReport> {
        self.total_time.start();
        if let Err(e) = self.prepare_run() {
            self.cleanup(evaluator);
            return Err(e);
        }

        if !(self.resumed && self.optimal) {
            self.evaluate_generation(evaluator)?;
            while !self.optimal {
                self.generation_time.start();
                self.generation_num += 1;
                self.evaluate_generation(evaluator)?;
            }
        } else {
            log::log!(self.progress_level(), "Resumed population is already optimal");
        }
        self.cleanup(evaluator);

        Ok(OptimizationReport {
            best: self.best.clone(),
            generations: self.generation_num,
            evaluations: self.num_evaluations,
            optimal: self.optimal,
            resumed: self.resumed,
            needs_abort: self.needs_abort,
        })
    }

    fn prepare_run(&mut self) -> Result<()> {
        self.initialize()?;
        if self.population_size < 3 {
            return Err(PopulationError::Config("population size must be >= 3".into()));
        }
        if self.resume()? {
            if self.num_gen_evaluations >= self.generation_size {
                self.num_gen_evaluations = 0;
                if self.generation_num == self.history.len() {
                    self.generation_num += 1;
                }
                self.generation_time.start();
            }
        } else {
            self.optimal = false;
            self.num_evaluations = 0;
            self.num_gen_evaluations = 0;
            self.generation_time.start();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PopulationConfigBuilder;
    use crate::parameter_description::ParameterDescription;

    fn in_memory(size: usize) -> Population {
        let cfg = PopulationConfigBuilder::new()
            .population_size(size)
            .log_to_disk(false)
            .log_to_terminal(false)
            .build();
        let mut pop = Population::new(cfg);
        pop.set_parameter_descriptions(
            ParameterDescriptionList::from_descriptions([
                ParameterDescription::ranged("x", -1.0, 1.0).unwrap(),
            ])
            .unwrap(),
        );
        pop.initialize().unwrap();
        pop
    }

    fn set(x: f64, value: f64) -> ParameterSet {
        ParameterSet::from_values(vec![x], value)
    }

    #[test]
    fn test_initialize_requires_descriptions_and_size() {
        let mut empty = Population::new(PopulationConfig::default());
        assert!(matches!(empty.initialize(), Err(PopulationError::Config(_))));

        let mut zero = Population::new(PopulationConfigBuilder::new().population_size(0).build());
        zero.set_parameter_descriptions(
            ParameterDescriptionList::from_descriptions([ParameterDescription::ranged("x", 0.0, 1.0).unwrap()])
                .unwrap(),
        );
        assert!(zero.initialize().is_err());
        zero.set_population_size(5);
        zero.initialize().unwrap();
        zero.initialize().unwrap();
        assert_eq!(zero.generation_size(), 5);
        assert_eq!(zero.max_generation_num(), 1000);
    }

    #[test]
    fn test_fold_in_discards_rejected_while_growing() {
        let mut pop = in_memory(3);
        assert!(!pop.fold_in(set(0.0, f64::INFINITY)).unwrap());
        assert!(pop.fold_in(set(0.1, 2.0)).unwrap());
        assert_eq!(pop.members().len(), 1);
        assert_eq!(pop.num_evaluations(), 2);
        assert_eq!(pop.num_gen_evaluations(), 2);
        assert!(pop.fold_in(set(0.0, f64::NAN)).is_err());
    }

    #[test]
    fn test_swap_in_on_empty_population_appends() {
        let mut pop = in_memory(3);
        assert!(pop.swap_in(set(0.0, 4.0)).unwrap());
        assert_eq!(pop.best_parameters().value, 4.0);
    }

    #[test]
    fn test_needs_random_phases() {
        let mut pop = in_memory(3);
        pop.begin_generation();
        assert!(pop.needs_random());
        for (i, v) in [3.0, 1.0, 2.0].into_iter().enumerate() {
            let mut rng = rand::rng();
            let _ = pop.next_candidate(&mut rng).unwrap();
            pop.fold_in(set(i as f64 * 0.1, v)).unwrap();
        }
        assert!(!pop.needs_random());
        assert_eq!(pop.members()[0].value, 1.0);
    }

    #[test]
    fn test_seeds_go_first() {
        let mut pop = in_memory(3);
        pop.add_seed(set(0.25, 7.0));
        let mut rng = rand::rng();
        let first = pop.next_candidate(&mut rng).unwrap();
        assert_eq!(first.parameters[0], 0.25);
        assert!(first.is_pending());
    }

    #[test]
    fn test_empty_population_convergence_test() {
        let mut pop = in_memory(3);
        pop.test_optimal().unwrap();
        assert!(!pop.is_optimal());
        assert!(pop.f_range().is_nan());
    }

    #[test]
    fn test_history_replaces_current_generation() {
        let mut pop = in_memory(3);
        pop.fold_in(set(0.1, 1.0)).unwrap();
        pop.save_history();
        pop.save_history();
        assert_eq!(pop.history().len(), 1);
        pop.generation_num = 3;
        pop.save_history();
        assert_eq!(pop.history().len(), 3);
    }

    #[test]
    fn test_results_text() {
        let mut pop = in_memory(3);
        pop.fold_in(set(0.5, 0.125)).unwrap();
        assert_eq!(pop.results_text(), "value 0.125\nx     0.5\n");
    }
}
