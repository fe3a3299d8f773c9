//! Unimodal test functions
//!
//! One global minimum and no local traps; they check that a search
//! converges, not that it explores.

use ndarray::Array1;

/// Sphere function - the simplest bowl
/// Global minimum: f(x) = 0 at x = (0, 0, ..., 0)
/// Bounds: x_i in [-5, 5]
pub fn sphere(x: &Array1<f64>) -> f64 {
    x.iter().map(|&xi| xi.powi(2)).sum()
}

/// Rosenbrock function - narrow curved valley
/// Global minimum: f(x) = 0 at x = (1, 1, ..., 1)
/// Bounds: x_i in [-2.048, 2.048]
pub fn rosenbrock(x: &Array1<f64>) -> f64 {
    x.iter()
        .zip(x.iter().skip(1))
        .map(|(&a, &b)| 100.0 * (b - a * a).powi(2) + (1.0 - a).powi(2))
        .sum()
}

/// Sphere in log coordinates, for strictly positive scale parameters
/// Global minimum: f(x) = 0 at x = (1, 1, ..., 1)
/// Bounds: x_i in [1e-3, 1e3]
pub fn log_sphere(x: &Array1<f64>) -> f64 {
    x.iter().map(|&xi| xi.ln().powi(2)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minima() {
        assert_eq!(sphere(&Array1::zeros(4)), 0.0);
        assert_eq!(rosenbrock(&Array1::ones(3)), 0.0);
        assert_eq!(log_sphere(&Array1::ones(2)), 0.0);
        assert_eq!(sphere(&Array1::from(vec![1.0, -2.0])), 5.0);
        assert!(log_sphere(&Array1::from(vec![0.0])).is_infinite());
    }
}
