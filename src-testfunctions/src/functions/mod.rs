//! Test function implementations organized by category
//!
//! - `unimodal`: single-optimum functions
//! - `multimodal`: functions with many local minima

pub mod multimodal;
pub mod unimodal;

pub use multimodal::*;
pub use unimodal::*;
