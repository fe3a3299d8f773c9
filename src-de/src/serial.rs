use ndarray::Array1;
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::errors::{PopulationError, Result};
use crate::population::Population;

/// Computes the fitness of one generation's worth of candidates
pub trait PopulationEvaluator {
    /// Evaluate candidates and fold them into `population` until the
    /// generation quota is met
    fn evaluate_population(&mut self, population: &mut Population) -> Result<()>;

    /// Release evaluation resources
    ///
    /// Returns true when the caller must hard-abort the whole job. Repeated
    /// calls must be harmless.
    fn cleanup(&mut self) -> bool {
        false
    }
}

/// Evaluates candidates one at a time in the calling thread
///
/// Uses the same candidate and folding rules as the distributed coordinator.
pub struct SerialEvaluator<F>
where
    F: FnMut(&Array1<f64>) -> f64,
{
    objective: F,
    rng: StdRng,
}

impl<F> SerialEvaluator<F>
where
    F: FnMut(&Array1<f64>) -> f64,
{
    pub fn new(objective: F, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_rng(&mut rand::rng()),
        };
        Self { objective, rng }
    }
}

impl<F> PopulationEvaluator for SerialEvaluator<F>
where
    F: FnMut(&Array1<f64>) -> f64,
{
    fn evaluate_population(&mut self, population: &mut Population) -> Result<()> {
        population.initialize()?;
        population.begin_generation();
        while population.generation_pending() {
            population.check_signals()?;
            let mut set = population.next_candidate(&mut self.rng)?;
            set.value = (self.objective)(&set.parameters);
            if set.value.is_nan() {
                return Err(PopulationError::Evaluator(format!(
                    "Computed NaN value from parameters: {}",
                    set.parameters
                        .iter()
                        .map(|p| p.to_string())
                        .collect::<Vec<_>>()
                        .join(" ")
                )));
            }
            population.fold_in(set)?;
        }
        Ok(())
    }
}
