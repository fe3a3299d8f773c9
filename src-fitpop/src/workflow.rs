use std::thread::{self, JoinHandle};

use fitpop_de::{
    OptimizationReport, ParameterDescription, ParameterDescriptionList, ParameterSet, Population,
    PopulationEvaluator, SerialEvaluator,
};
use fitpop_dist::{Comm, Coordinator, CoordinatorConfig, LocalComm, Worker, WorkerConfig, WorkerExit, world};
use fitpop_env::SignalHandler;
use fitpop_env::env_utils::check_fitpop_env;
use fitpop_testfunctions::{TestFunction, get_function, get_function_bounds_vec};

use crate::cli::Args;
use crate::errors::FitpopError;

/// How a run ended without an error
#[derive(Debug)]
pub enum RunOutcome {
    Finished(OptimizationReport),
    /// A signal stopped the run after progress was checkpointed
    Interrupted { needs_abort: bool },
}

impl RunOutcome {
    /// Process exit status: 2 when workers must be killed, 0 otherwise
    pub fn exit_code(&self) -> i32 {
        let needs_abort = match self {
            RunOutcome::Finished(report) => report.needs_abort,
            RunOutcome::Interrupted { needs_abort } => *needs_abort,
        };
        if needs_abort { 2 } else { 0 }
    }
}

/// Parameters to fit: the `--search-space` file, or `x0..x{dims}` over the
/// function's bounds
pub fn search_space(args: &Args) -> Result<ParameterDescriptionList, FitpopError> {
    if let Some(path) = &args.search_space {
        let text = std::fs::read_to_string(path).map_err(|source| FitpopError::Io {
            path: path.clone(),
            source,
        })?;
        return ParameterDescriptionList::parse(&text).map_err(|source| FitpopError::SearchSpace {
            path: path.clone(),
            source,
        });
    }
    let bounds = get_function_bounds_vec(&args.function, args.dims).ok_or_else(|| {
        FitpopError::Args(format!(
            "function '{}' does not support {} dimensions",
            args.function, args.dims
        ))
    })?;
    let descriptions = bounds
        .into_iter()
        .enumerate()
        .map(|(i, (min, max))| ParameterDescription::ranged(format!("x{i}"), min, max));
    let mut list = ParameterDescriptionList::new();
    for description in descriptions {
        list.push_back(description.map_err(|e| FitpopError::Args(e.to_string()))?)
            .map_err(|e| FitpopError::Args(e.to_string()))?;
    }
    Ok(list)
}

/// Run the search described by `args` until it converges or a signal stops it
pub fn run(args: &Args) -> Result<RunOutcome, FitpopError> {
    check_fitpop_env()?;
    let config = args.population_config()?;
    let objective =
        get_function(&args.function).ok_or_else(|| FitpopError::UnknownFunction(args.function.clone()))?;
    let descriptions = search_space(args)?;
    let num_parameters = descriptions.len();
    let seed = config.seed;

    let signals = SignalHandler::install().map_err(FitpopError::Signals)?;
    let mut population = Population::new(config).with_signal_handler(signals);
    population.set_parameter_descriptions(descriptions);
    if let Some(path) = &args.initial_parameters {
        population.add_seed(ParameterSet::read_file(path, num_parameters)?);
        log::info!("evaluating {} first", path.display());
    }

    let workers = args.effective_workers();
    if workers == 0 {
        log::info!("evaluating '{}' in-process", args.function);
        let mut evaluator = SerialEvaluator::new(objective, seed);
        let result = optimize(&mut population, &mut evaluator);
        return finish(result, population.needs_abort());
    }

    log::info!("evaluating '{}' on {} workers", args.function, workers);
    let mut ranks = world(workers + 1);
    let coordinator_comm = ranks.remove(0);
    let handles = spawn_workers(ranks, objective)?;
    let mut coordinator = Coordinator::new(coordinator_comm, CoordinatorConfig::default(), seed);
    let result = optimize(&mut population, &mut coordinator);
    drop(coordinator);

    let needs_abort = population.needs_abort();
    if needs_abort {
        log::error!("some workers did not shut down, not waiting for them");
    } else {
        join_workers(handles);
    }
    finish(result, needs_abort)
}

fn optimize<E: PopulationEvaluator>(
    population: &mut Population,
    evaluator: &mut E,
) -> Result<OptimizationReport, FitpopError> {
    population
        .genetic_algorithm(evaluator)
        .map_err(FitpopError::from)
}

fn finish(
    result: Result<OptimizationReport, FitpopError>,
    needs_abort: bool,
) -> Result<RunOutcome, FitpopError> {
    match result {
        Ok(report) => Ok(RunOutcome::Finished(report)),
        Err(FitpopError::Population(e)) if e.is_interrupted() => {
            log::warn!("{e}");
            Ok(RunOutcome::Interrupted { needs_abort })
        }
        Err(e) => Err(e),
    }
}

fn spawn_workers(
    ranks: Vec<LocalComm>,
    objective: TestFunction,
) -> Result<Vec<JoinHandle<WorkerExit>>, FitpopError> {
    ranks
        .into_iter()
        .map(|comm| {
            let name = format!("worker-{}", comm.rank());
            thread::Builder::new()
                .name(name)
                .spawn(move || Worker::new(comm, objective, WorkerConfig::default()).run())
                .map_err(FitpopError::Spawn)
        })
        .collect()
}

fn join_workers(handles: Vec<JoinHandle<WorkerExit>>) {
    for handle in handles {
        let name = handle.thread().name().unwrap_or("worker").to_string();
        match handle.join() {
            Ok(WorkerExit::Shutdown) => log::debug!("{name} finished"),
            Ok(WorkerExit::Failed(reason)) => log::warn!("{name} failed: {reason}"),
            Err(_) => log::error!("{name} panicked"),
        }
    }
}

/// Best parameters as `name = value` lines
pub fn describe_best(descriptions: &ParameterDescriptionList, best: &ParameterSet) -> Vec<String> {
    descriptions
        .iter()
        .zip(best.parameters.iter())
        .map(|(d, v)| format!("{} = {}", d.name(), v))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn args(dir: &std::path::Path, extra: &[&str]) -> Args {
        let resume = dir.join("resume.txt");
        let results = dir.join("results.txt");
        let mut argv = vec![
            "fitpop-test".to_string(),
            "--function".into(),
            "sphere".into(),
            "--population-size".into(),
            "12".into(),
            "--seed".into(),
            "7".into(),
            "--quiet".into(),
            "--resume-file".into(),
            resume.display().to_string(),
            "--results-file".into(),
            results.display().to_string(),
        ];
        argv.extend(extra.iter().map(|s| s.to_string()));
        Args::parse_from(argv)
    }

    #[test]
    fn default_search_space_follows_bounds() {
        let args = Args::parse_from(["fitpop-test", "--function", "sphere", "--dims", "3"]);
        let space = search_space(&args).unwrap();
        assert_eq!(space.names(), vec!["x0", "x1", "x2"]);
        assert!(space.iter().all(|d| d.min_range() == -5.0 && d.max_range() == 5.0));
    }

    #[test]
    fn search_space_file_is_parsed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("space.txt");
        std::fs::write(&path, "a -1 1\nb 2.5\n").unwrap();
        let args = Args::parse_from(["fitpop-test", "--search-space", path.to_str().unwrap()]);
        let space = search_space(&args).unwrap();
        assert_eq!(space.len(), 2);
        assert!(space.get("b").unwrap().is_constant());

        std::fs::write(&path, "a 1 x\n").unwrap();
        assert!(matches!(search_space(&args), Err(FitpopError::SearchSpace { .. })));
    }

    #[test]
    fn serial_run_converges_and_writes_results() {
        let dir = tempfile::tempdir().unwrap();
        let args = args(dir.path(), &["--workers", "0"]);
        let RunOutcome::Finished(report) = run(&args).unwrap() else {
            panic!("run was interrupted");
        };
        assert!(report.optimal);
        assert!(report.best.value < 1e-2);
        assert!(dir.path().join("resume.txt").exists());
        assert!(dir.path().join("results.txt").exists());

        let space = search_space(&args).unwrap();
        let lines = describe_best(&space, &report.best);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("x0 = "));
    }

    #[test]
    fn threaded_run_converges() {
        let dir = tempfile::tempdir().unwrap();
        let args = args(dir.path(), &["--workers", "2", "--no-log-to-disk"]);
        let RunOutcome::Finished(report) = run(&args).unwrap() else {
            panic!("run was interrupted");
        };
        assert!(report.optimal);
        assert!(!report.needs_abort);
        assert!(!dir.path().join("resume.txt").exists());
    }

    #[test]
    fn exit_codes() {
        assert_eq!(RunOutcome::Interrupted { needs_abort: false }.exit_code(), 0);
        assert_eq!(RunOutcome::Interrupted { needs_abort: true }.exit_code(), 2);
        let mut report = OptimizationReport {
            best: ParameterSet::from_values(vec![0.0], 1.0),
            generations: 1,
            evaluations: 3,
            optimal: true,
            resumed: false,
            needs_abort: false,
        };
        assert_eq!(RunOutcome::Finished(report.clone()).exit_code(), 0);
        report.needs_abort = true;
        assert_eq!(RunOutcome::Finished(report).exit_code(), 2);
    }

    #[test]
    fn unknown_function_is_an_error() {
        let mut args = Args::parse_from(["fitpop-test", "--workers", "0", "--no-log-to-disk"]);
        args.function = "nope".to_string();
        assert!(matches!(run(&args), Err(FitpopError::UnknownFunction(_))));
    }
}
