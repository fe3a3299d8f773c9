use std::path::Path;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::checkpoint::backup_path;
use crate::{
    ParameterDescription, ParameterDescriptionList, ParameterSet, Population, PopulationConfig,
    PopulationConfigBuilder, PopulationError, PopulationEvaluator,
};

fn descriptions() -> ParameterDescriptionList {
    ParameterDescriptionList::from_descriptions([
        ParameterDescription::ranged("gbar", 1e-3, 10.0).unwrap(),
        ParameterDescription::ranged("v_half", -60.0, 0.0).unwrap(),
        ParameterDescription::constant("temperature", 6.3).unwrap(),
    ])
    .unwrap()
}

fn on_disk(dir: &Path, size: usize) -> PopulationConfig {
    PopulationConfigBuilder::new()
        .population_size(size)
        .log_to_terminal(false)
        .resume_file(dir.join("resume.txt"))
        .results_file(dir.join("results.txt"))
        .seed(17)
        .build()
}

fn in_memory(size: usize) -> Population {
    let cfg = PopulationConfigBuilder::new()
        .population_size(size)
        .log_to_disk(false)
        .log_to_terminal(false)
        .build();
    let mut pop = Population::new(cfg);
    pop.set_parameter_descriptions(descriptions());
    pop.initialize().unwrap();
    pop
}

fn member(value: f64) -> ParameterSet {
    ParameterSet::from_values(vec![1.0, -30.0, 6.3], value)
}

fn values(pop: &Population) -> Vec<f64> {
    pop.members().iter().map(|s| s.value).collect()
}

#[test]
fn test_append_then_swap_keeps_order() {
    let mut pop = in_memory(3);
    for v in [5.0, 3.0, 8.0] {
        pop.append_in(member(v)).unwrap();
    }
    assert_eq!(values(&pop), vec![3.0, 5.0, 8.0]);
    assert_eq!(pop.best_parameters().value, 3.0);

    assert!(pop.swap_in(member(1.0)).unwrap());
    assert_eq!(values(&pop), vec![1.0, 3.0, 5.0]);
    assert_eq!(pop.best_parameters().value, 1.0);

    assert!(!pop.swap_in(member(9.0)).unwrap());
    assert_eq!(values(&pop), vec![1.0, 3.0, 5.0]);
    assert_eq!(pop.best_parameters().value, 1.0);

    // equal to the worst is not an improvement
    assert!(!pop.swap_in(member(5.0)).unwrap());
}

#[test]
fn test_random_folds_stay_sorted() {
    let mut rng = StdRng::seed_from_u64(99);
    let mut pop = in_memory(10);
    for _ in 0..500 {
        let v: f64 = rng.random_range(-100.0..100.0);
        pop.fold_in(member(v)).unwrap();
        let vs = values(&pop);
        assert!(vs.windows(2).all(|w| w[0] <= w[1]));
        assert!(vs.len() <= 10);
        assert_eq!(pop.best_parameters().value, vs[0]);
    }
    assert_eq!(pop.num_evaluations(), 500);
}

#[test]
fn test_all_constant_is_immediately_optimal() {
    let cfg = PopulationConfigBuilder::new()
        .population_size(5)
        .log_to_disk(false)
        .build();
    let mut pop = Population::new(cfg);
    pop.set_parameter_descriptions(
        ParameterDescriptionList::from_descriptions([
            ParameterDescription::constant("a", 1.0).unwrap(),
            ParameterDescription::constant("b", 2.0).unwrap(),
        ])
        .unwrap(),
    );
    pop.initialize().unwrap();
    assert_eq!(pop.parameter_descriptions().num_fit_parameters(), 0);
    pop.test_optimal().unwrap();
    assert!(pop.is_optimal());
}

#[test]
fn test_converged_population_is_optimal() {
    let mut pop = in_memory(4);
    for v in [1.0, 1.00001, 1.00002, 1.00003] {
        pop.append_in(member(v)).unwrap();
    }
    pop.test_optimal().unwrap();
    assert!(pop.is_optimal());
    assert_eq!(pop.max_uniform_range(), 0.0);
    assert_eq!(pop.max_log_range(), 1.0);

    // spread in a uniform parameter blocks convergence
    let mut wide = member(1.000005);
    wide.parameters[1] = -20.0;
    assert!(pop.swap_in(wide).unwrap());
    pop.test_optimal().unwrap();
    assert!(pop.max_uniform_range() >= 10.0);
    assert!(!pop.is_optimal());
}

#[test]
fn test_ranges_are_recomputed_each_test() {
    let mut pop = in_memory(3);
    let mut far = member(3.0);
    far.parameters[0] = 9.0;
    for set in [member(1.0), member(2.0), far] {
        pop.append_in(set).unwrap();
    }
    pop.test_optimal().unwrap();
    assert!((pop.max_log_range() - 9.0).abs() < 1e-12);

    // the outlier is evicted; the spread shrinks again
    pop.swap_in(member(0.5)).unwrap();
    pop.test_optimal().unwrap();
    assert_eq!(pop.max_log_range(), 1.0);
    assert_eq!(pop.parameter_descriptions()[0].max_range(), 1.0);
}

#[test]
fn test_generation_cap_ends_search() {
    let cfg = PopulationConfigBuilder::new()
        .population_size(3)
        .max_generation_num(2)
        .log_to_disk(false)
        .build();
    let mut pop = Population::new(cfg);
    pop.set_parameter_descriptions(descriptions());
    pop.initialize().unwrap();
    for v in [1.0, 50.0, 100.0] {
        pop.append_in(member(v)).unwrap();
    }
    pop.test_optimal().unwrap();
    assert!(!pop.is_optimal());
    pop.generation_num = 3;
    pop.test_optimal().unwrap();
    assert!(pop.is_optimal());
}

#[test]
fn test_save_and_resume_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let mut pop = Population::new(on_disk(dir.path(), 4));
    pop.set_parameter_descriptions(descriptions());
    pop.initialize().unwrap();
    let mut rng = StdRng::seed_from_u64(1);
    for i in 0..6 {
        let mut set = pop.new_parameter_set();
        pop.random_pset(&mut set, &mut rng).unwrap();
        set.value = 10.0 / (i as f64 + 1.0);
        pop.fold_in(set).unwrap();
    }
    pop.test_optimal().unwrap();
    pop.save_history();
    pop.save_progress().unwrap();
    assert!(dir.path().join("resume.txt").exists());
    assert!(dir.path().join("results.txt").exists());

    let mut back = Population::new(on_disk(dir.path(), 4));
    back.set_parameter_descriptions(descriptions());
    back.initialize().unwrap();
    assert!(back.resume().unwrap());
    assert!(back.is_resumed());
    assert_eq!(back.num_evaluations(), pop.num_evaluations());
    assert_eq!(back.num_gen_evaluations(), pop.num_gen_evaluations());
    assert_eq!(back.generation_num(), pop.generation_num());
    // the crossover scale is not persisted
    let same = |a: &ParameterSet, b: &ParameterSet| a.value == b.value && a.parameters == b.parameters;
    assert!(same(back.best_parameters(), pop.best_parameters()));
    assert_eq!(back.members().len(), pop.members().len());
    assert!(back.members().iter().zip(pop.members()).all(|(a, b)| same(a, b)));
    assert_eq!(back.history().len(), 1);
    assert!(same(&back.history()[0].best, &pop.history()[0].best));
    assert_eq!(
        back.parameter_descriptions()[0].min_range(),
        pop.parameter_descriptions()[0].min_range()
    );
}

#[test]
fn test_resume_without_file_starts_fresh() {
    let dir = tempfile::tempdir().unwrap();
    let mut pop = Population::new(on_disk(dir.path(), 4));
    pop.set_parameter_descriptions(descriptions());
    pop.initialize().unwrap();
    assert!(!pop.resume().unwrap());
    assert!(!pop.is_resumed());
}

#[test]
fn test_resume_repairs_interrupted_save() {
    let dir = tempfile::tempdir().unwrap();
    let mut pop = Population::new(on_disk(dir.path(), 3));
    pop.set_parameter_descriptions(descriptions());
    pop.initialize().unwrap();
    for v in [1.0, 2.0, 3.0] {
        pop.fold_in(member(v)).unwrap();
    }
    pop.save_progress().unwrap();

    let resume = dir.path().join("resume.txt");
    std::fs::rename(&resume, backup_path(&resume)).unwrap();
    std::fs::write(&resume, "3 # parameter descriptions\ngbar 0.001").unwrap();

    let mut back = Population::new(on_disk(dir.path(), 3));
    back.set_parameter_descriptions(descriptions());
    back.initialize().unwrap();
    assert!(back.resume().unwrap());
    assert_eq!(values(&back), vec![1.0, 2.0, 3.0]);
    assert!(!backup_path(&resume).exists());
}

#[test]
fn test_resume_rejects_incompatible_descriptions() {
    let dir = tempfile::tempdir().unwrap();
    let mut pop = Population::new(on_disk(dir.path(), 3));
    pop.set_parameter_descriptions(descriptions());
    pop.initialize().unwrap();
    for v in [1.0, 2.0, 3.0] {
        pop.fold_in(member(v)).unwrap();
    }
    pop.save_progress().unwrap();

    let mut changed = Population::new(on_disk(dir.path(), 3));
    changed.set_parameter_descriptions(
        ParameterDescriptionList::from_descriptions([
            ParameterDescription::ranged("gbar", 1e-3, 10.0).unwrap(),
            ParameterDescription::ranged("v_half", -60.0, 0.0).unwrap(),
            ParameterDescription::constant("temperature", 37.0).unwrap(),
        ])
        .unwrap(),
    );
    changed.initialize().unwrap();
    assert!(matches!(
        changed.resume(),
        Err(PopulationError::Incompatible(_))
    ));
}

#[test]
fn test_corrupt_checkpoint_reports_line() {
    let dir = tempfile::tempdir().unwrap();
    let mut pop = Population::new(on_disk(dir.path(), 3));
    pop.set_parameter_descriptions(descriptions());
    pop.initialize().unwrap();
    for v in [1.0, 2.0, 3.0] {
        pop.fold_in(member(v)).unwrap();
    }
    let text = pop.checkpoint_text().replace("# number of parameter sets evaluated", "extra # x");
    let err = pop.load_checkpoint(Path::new("bad.txt"), &text).unwrap_err();
    match err {
        PopulationError::Checkpoint { line, .. } => assert!(line > 4),
        other => panic!("unexpected error {other}"),
    }
    // nothing was applied
    assert_eq!(values(&pop), vec![1.0, 2.0, 3.0]);
}

/// Evaluator that raises a signal in the middle of a generation
struct InterruptingEvaluator {
    cleanups: usize,
}

impl PopulationEvaluator for InterruptingEvaluator {
    fn evaluate_population(&mut self, population: &mut Population) -> crate::Result<()> {
        population.begin_generation();
        for v in [4.0, 2.0, 6.0] {
            population.fold_in(member(v))?;
        }
        population.signals().interrupter().raise(15);
        population.check_signals()
    }

    fn cleanup(&mut self) -> bool {
        self.cleanups += 1;
        true
    }
}

#[test]
fn test_interrupt_saves_progress_and_cleans_up() {
    let dir = tempfile::tempdir().unwrap();
    let mut pop = Population::new(on_disk(dir.path(), 3));
    pop.set_parameter_descriptions(descriptions());
    let mut evaluator = InterruptingEvaluator { cleanups: 0 };
    let err = pop.genetic_algorithm(&mut evaluator).unwrap_err();
    assert!(err.is_interrupted());
    assert_eq!(evaluator.cleanups, 1);
    assert!(pop.needs_abort());

    let text = std::fs::read_to_string(dir.path().join("resume.txt")).unwrap();
    assert!(text.contains("3 # population"));
    let results = std::fs::read_to_string(dir.path().join("results.txt")).unwrap();
    assert!(results.starts_with("value"));
    assert!(results.contains("2.0"));
}

#[test]
fn test_population_size_below_three_is_rejected() {
    let cfg = PopulationConfigBuilder::new()
        .population_size(2)
        .log_to_disk(false)
        .build();
    let mut pop = Population::new(cfg);
    pop.set_parameter_descriptions(descriptions());
    let mut evaluator = InterruptingEvaluator { cleanups: 0 };
    assert!(matches!(
        pop.genetic_algorithm(&mut evaluator),
        Err(PopulationError::Config(_))
    ));
    assert_eq!(evaluator.cleanups, 1);
}
