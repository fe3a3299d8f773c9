//! Command-line interface of the fitpop binary
//!
//! Population settings come from `--config` (a JSON `PopulationConfig`) when
//! given, and individual flags override it.

use std::path::PathBuf;
use std::process;

use clap::Parser;

use fitpop_de::{PopulationConfig, PopulationConfigBuilder};
use fitpop_testfunctions::{function_names, get_function_bounds_vec, get_function_metadata};

use crate::errors::FitpopError;

/// Fit a benchmark objective with a distributed differential-evolution
/// population.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Number of parameter sets kept in the population (at least 3).
    #[arg(short, long)]
    pub population_size: Option<usize>,

    /// Evaluations per generation, defaults to the population size.
    #[arg(long)]
    pub generation_size: Option<usize>,

    /// Convergence tolerance on the spread of each parameter.
    #[arg(long, value_parser = parse_strictly_positive_f64)]
    pub tol: Option<f64>,

    /// Convergence tolerance on the spread of fitness values.
    #[arg(long, value_parser = parse_strictly_positive_f64)]
    pub f_tol: Option<f64>,

    /// Stop after this many generations (default 1000 per fit parameter).
    #[arg(long)]
    pub max_generations: Option<usize>,

    /// Worker threads; 0 evaluates in the coordinator thread.
    /// Defaults to one less than the number of CPUs.
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Objective to minimize.
    #[arg(short, long, default_value = "rosenbrock")]
    pub function: String,

    /// Number of parameters when the search space comes from the function
    /// bounds.
    #[arg(short, long, default_value_t = 2)]
    pub dims: usize,

    /// Search-space file: one `name value`, `name min max` or
    /// `name min max min_range max_range` line per parameter.
    #[arg(long)]
    pub search_space: Option<PathBuf>,

    /// Parameter file evaluated before any generated candidate.
    #[arg(long)]
    pub initial_parameters: Option<PathBuf>,

    /// Seed for candidate generation.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Checkpoint file used to save and resume progress.
    #[arg(long)]
    pub resume_file: Option<PathBuf>,

    /// File receiving the best parameters found so far.
    #[arg(long)]
    pub results_file: Option<PathBuf>,

    /// Export the generation history as CSV.
    #[arg(long)]
    pub history_csv: Option<PathBuf>,

    /// Do not write checkpoint, results or history files.
    #[arg(long, default_value_t = false)]
    pub no_log_to_disk: bool,

    /// Only log generation summaries at debug level.
    #[arg(short, long, default_value_t = false)]
    pub quiet: bool,

    /// JSON file holding population settings.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Print the final report as JSON on stdout.
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// List available functions and exit.
    #[arg(long, default_value_t = false)]
    pub function_list: bool,
}

impl Args {
    /// Worker threads to start
    pub fn effective_workers(&self) -> usize {
        self.workers
            .unwrap_or_else(|| num_cpus::get().saturating_sub(1).max(1))
    }

    /// Population settings: the config file (or defaults) with flags applied
    pub fn population_config(&self) -> Result<PopulationConfig, FitpopError> {
        let base = match &self.config {
            Some(path) => PopulationConfig::from_json_file(path)?,
            None => PopulationConfig::default(),
        };
        let mut builder = PopulationConfigBuilder::from_config(base);
        if let Some(v) = self.population_size {
            builder = builder.population_size(v);
        }
        if let Some(v) = self.generation_size {
            builder = builder.generation_size(v);
        }
        if let Some(v) = self.tol {
            builder = builder.tol(v);
        }
        if let Some(v) = self.f_tol {
            builder = builder.f_tol(v);
        }
        if let Some(v) = self.max_generations {
            builder = builder.max_generation_num(v);
        }
        if let Some(v) = self.seed {
            builder = builder.seed(v);
        }
        if let Some(v) = &self.resume_file {
            builder = builder.resume_file(v.clone());
        }
        if let Some(v) = &self.results_file {
            builder = builder.results_file(v.clone());
        }
        if let Some(v) = &self.history_csv {
            builder = builder.history_csv(v.clone());
        }
        if self.no_log_to_disk {
            builder = builder.log_to_disk(false);
        }
        if self.quiet {
            builder = builder.log_to_terminal(false);
        }
        Ok(builder.build())
    }
}

pub fn validate_args(args: &Args) -> Result<(), String> {
    let metadata = get_function_metadata();
    let Some(meta) = metadata.get(&args.function) else {
        return Err(format!(
            "Unknown function: '{}'. Use --function-list to see available functions.",
            args.function
        ));
    };
    if args.search_space.is_none() && get_function_bounds_vec(&args.function, args.dims).is_none() {
        return Err(format!(
            "Function '{}' needs at least {} dimensions, got {}",
            args.function, meta.min_dims, args.dims
        ));
    }
    if let Some(size) = args.population_size {
        if size < 3 {
            return Err(format!("Population size must be at least 3, got {size}"));
        }
    }
    if args.generation_size == Some(0) {
        return Err("Generation size must be positive".to_string());
    }
    Ok(())
}

pub fn validate_args_or_exit(args: &Args) {
    if let Err(error) = validate_args(args) {
        eprintln!("❌ Validation Error: {}", error);
        process::exit(1);
    }
}

pub fn display_function_list() -> ! {
    println!("Available Functions");
    println!("===================\n");
    let metadata = get_function_metadata();
    for name in function_names() {
        if let Some(meta) = metadata.get(&name) {
            let kind = if meta.multimodal { "multimodal" } else { "unimodal" };
            let scale = if meta.log_scale { ", log scale" } else { "" };
            println!(
                "   - {:<12} | [{}, {}]{} | {} | {}",
                name, meta.bounds.0, meta.bounds.1, scale, kind, meta.description
            );
        }
    }
    process::exit(0);
}

fn parse_strictly_positive_f64(s: &str) -> Result<f64, String> {
    let v: f64 = s.parse().map_err(|_| format!("invalid float: {s}"))?;
    if v > 0.0 {
        Ok(v)
    } else {
        Err("value must be strictly positive (> 0)".to_string())
    }
}
