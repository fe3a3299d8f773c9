use std::cell::Cell;
use std::path::Path;

use fitpop_de::{
    ParameterDescription, ParameterDescriptionList, Population, PopulationConfig,
    PopulationConfigBuilder, SerialEvaluator,
};
use fitpop_env::SignalHandler;
use fitpop_env::signals::SIGINT;
use fitpop_testfunctions::sphere;
use ndarray::Array1;

fn search_space() -> ParameterDescriptionList {
    ParameterDescriptionList::from_descriptions([
        ParameterDescription::ranged("x", -5.0, 5.0).unwrap(),
        ParameterDescription::ranged("y", -5.0, 5.0).unwrap(),
        ParameterDescription::ranged("scale", 0.01, 100.0).unwrap(),
    ])
    .unwrap()
}

fn objective(p: &Array1<f64>) -> f64 {
    sphere(&p.slice(ndarray::s![0..2]).to_owned()) + p[2].ln().powi(2)
}

fn config(dir: &Path, max_generations: usize) -> PopulationConfig {
    PopulationConfigBuilder::new()
        .population_size(12)
        .max_generation_num(max_generations)
        .log_to_terminal(false)
        .resume_file(dir.join("resume.txt"))
        .results_file(dir.join("results.txt"))
        .history_csv(dir.join("history.csv"))
        .build()
}

#[test]
fn test_resumed_run_continues_counting() {
    let dir = tempfile::tempdir().unwrap();

    let mut first = Population::new(config(dir.path(), 3));
    first.set_parameter_descriptions(search_space());
    let report = first
        .genetic_algorithm(&mut SerialEvaluator::new(objective, Some(3)))
        .unwrap();
    assert!(report.optimal);
    assert_eq!(report.generations, 4);
    assert_eq!(report.evaluations, 48);

    let mut second = Population::new(config(dir.path(), 6));
    second.set_parameter_descriptions(search_space());
    let resumed = second
        .genetic_algorithm(&mut SerialEvaluator::new(objective, Some(4)))
        .unwrap();
    assert!(resumed.resumed);
    assert_eq!(resumed.generations, 7);
    assert_eq!(resumed.evaluations, 84);
    assert!(resumed.best.value <= report.best.value);
    assert_eq!(second.history().len(), 7);

    let csv = std::fs::read_to_string(dir.path().join("history.csv")).unwrap();
    let mut lines = csv.lines();
    assert!(lines.next().unwrap().starts_with("generation,best_value"));
    assert_eq!(lines.count(), 7);

    let results = std::fs::read_to_string(dir.path().join("results.txt")).unwrap();
    assert!(results.lines().next().unwrap().starts_with("value"));
    assert_eq!(results.lines().count(), 4);
}

#[test]
fn test_finished_run_resumes_as_optimal() {
    let dir = tempfile::tempdir().unwrap();
    let mut first = Population::new(config(dir.path(), 2));
    first.set_parameter_descriptions(search_space());
    first
        .genetic_algorithm(&mut SerialEvaluator::new(objective, Some(5)))
        .unwrap();

    let calls = Cell::new(0usize);
    let mut again = Population::new(config(dir.path(), 2));
    again.set_parameter_descriptions(search_space());
    let counting = |p: &Array1<f64>| {
        calls.set(calls.get() + 1);
        objective(p)
    };
    let report = again
        .genetic_algorithm(&mut SerialEvaluator::new(counting, Some(5)))
        .unwrap();
    assert!(report.resumed);
    assert!(report.optimal);
    assert_eq!(calls.get(), 0);
}

#[test]
fn test_interrupted_run_resumes_mid_generation() {
    let dir = tempfile::tempdir().unwrap();
    let signals = SignalHandler::detached();
    let interrupter = signals.interrupter();

    let mut first = Population::new(config(dir.path(), 4)).with_signal_handler(signals);
    first.set_parameter_descriptions(search_space());
    let calls = Cell::new(0usize);
    let interrupting = |p: &Array1<f64>| {
        calls.set(calls.get() + 1);
        if calls.get() == 30 {
            interrupter.raise(SIGINT);
        }
        objective(p)
    };
    let err = first
        .genetic_algorithm(&mut SerialEvaluator::new(interrupting, Some(8)))
        .unwrap_err();
    assert!(err.is_interrupted());
    assert_eq!(first.num_evaluations(), 30);
    assert_eq!(first.generation_num(), 3);
    assert_eq!(first.num_gen_evaluations(), 6);

    let mut second = Population::new(config(dir.path(), 4));
    second.set_parameter_descriptions(search_space());
    let report = second
        .genetic_algorithm(&mut SerialEvaluator::new(objective, Some(9)))
        .unwrap();
    assert!(report.resumed);
    assert!(report.optimal);
    // the interrupted generation is finished, not restarted
    assert_eq!(report.evaluations, 5 * 12);
    assert_eq!(report.generations, 5);
}
