//! Benchmark objectives for the population fitter
//!
//! Each function maps a parameter vector to an error value, lower is better.
//! The registry pairs every function with its per-dimension search bounds and
//! whether the bounds span orders of magnitude (log-distributed parameters).
//!
//! # Example
//!
//! ```rust
//! use ndarray::Array1;
//! use fitpop_testfunctions::*;
//!
//! let x = Array1::from_vec(vec![0.0, 0.0]);
//! assert_eq!(sphere(&x), 0.0);
//!
//! let f = get_function("sphere").unwrap();
//! let bounds = get_function_bounds_vec("sphere", 3).unwrap();
//! assert_eq!(bounds.len(), 3);
//! assert_eq!(f(&x), 0.0);
//! ```

use ndarray::Array1;
use std::collections::HashMap;

pub mod functions;
pub use functions::*;

/// Objective signature shared by every registered function
pub type TestFunction = fn(&Array1<f64>) -> f64;

/// Metadata for a test function
#[derive(Debug, Clone)]
pub struct FunctionMetadata {
    /// Function name
    pub name: String,
    /// The objective itself
    pub function: TestFunction,
    /// Bounds of every dimension (min, max)
    pub bounds: (f64, f64),
    /// Location of the global minimum, same in every dimension
    pub minimum_at: f64,
    /// Value at the global minimum
    pub minimum: f64,
    /// Bounds span orders of magnitude and should be searched in log space
    pub log_scale: bool,
    pub multimodal: bool,
    pub description: String,
    /// Smallest supported dimension
    pub min_dims: usize,
}

#[allow(clippy::too_many_arguments)]
fn entry(
    name: &str,
    function: TestFunction,
    bounds: (f64, f64),
    minimum_at: f64,
    log_scale: bool,
    multimodal: bool,
    min_dims: usize,
    description: &str,
) -> (String, FunctionMetadata) {
    (
        name.to_string(),
        FunctionMetadata {
            name: name.to_string(),
            function,
            bounds,
            minimum_at,
            minimum: 0.0,
            log_scale,
            multimodal,
            description: description.to_string(),
            min_dims,
        },
    )
}

/// Get metadata for all available test functions
pub fn get_function_metadata() -> HashMap<String, FunctionMetadata> {
    HashMap::from([
        entry("sphere", sphere, (-5.0, 5.0), 0.0, false, false, 1, "N-dimensional bowl"),
        entry(
            "rosenbrock",
            rosenbrock,
            (-2.048, 2.048),
            1.0,
            false,
            false,
            2,
            "N-dimensional curved valley",
        ),
        entry(
            "log_sphere",
            log_sphere,
            (1e-3, 1e3),
            1.0,
            true,
            false,
            1,
            "bowl in log coordinates over positive scales",
        ),
        entry(
            "rastrigin",
            rastrigin,
            (-5.12, 5.12),
            0.0,
            false,
            true,
            1,
            "N-dimensional grid of local minima",
        ),
        entry(
            "ackley",
            ackley,
            (-32.768, 32.768),
            0.0,
            false,
            true,
            1,
            "N-dimensional flat plateau with a central hole",
        ),
        entry(
            "griewank",
            griewank,
            (-600.0, 600.0),
            0.0,
            false,
            true,
            1,
            "N-dimensional product of cosines over a wide bowl",
        ),
    ])
}

/// Sorted names of the registered functions
pub fn function_names() -> Vec<String> {
    let mut names: Vec<String> = get_function_metadata().into_keys().collect();
    names.sort();
    names
}

/// Look up a function by name
pub fn get_function(function_name: &str) -> Option<TestFunction> {
    get_function_metadata()
        .get(function_name)
        .map(|meta| meta.function)
}

/// Bounds of every dimension for a `dims`-dimensional search, if the function
/// exists and supports that many dimensions
pub fn get_function_bounds_vec(function_name: &str, dims: usize) -> Option<Vec<(f64, f64)>> {
    let metadata = get_function_metadata();
    let meta = metadata.get(function_name)?;
    if dims < meta.min_dims {
        return None;
    }
    Some(vec![meta.bounds; dims])
}
