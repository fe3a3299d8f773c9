//! Objectives with many local minima

use ndarray::Array1;
use std::f64::consts::{E, PI};

/// Rastrigin: `10n + sum(x^2 - 10 cos(2 pi x))`, minimum 0 at the origin
pub fn rastrigin(x: &Array1<f64>) -> f64 {
    x.mapv(|v| v * v - 10.0 * (2.0 * PI * v).cos()).sum() + 10.0 * x.len() as f64
}

/// Ackley: flat plateau around a deep hole at the origin
pub fn ackley(x: &Array1<f64>) -> f64 {
    let n = x.len() as f64;
    let rms = (x.dot(x) / n).sqrt();
    let mean_cos = x.mapv(|v| (2.0 * PI * v).cos()).sum() / n;
    E + 20.0 - 20.0 * (-0.2 * rms).exp() - mean_cos.exp()
}

/// Griewank: `1 + |x|^2/4000 - prod(cos(x_i / sqrt(i)))`
pub fn griewank(x: &Array1<f64>) -> f64 {
    let mut product = 1.0;
    for (i, v) in x.iter().enumerate() {
        product *= (v / ((i + 1) as f64).sqrt()).cos();
    }
    1.0 + x.dot(x) / 4000.0 - product
}
