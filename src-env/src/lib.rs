//! Environment utilities for fitpop
//!
//! - `env_utils`: resolution of the `FITPOP_DIR` working directory and
//!   environment toggles
//! - `signals`: conversion of asynchronous OS signals into a polled
//!   [`Interrupted`] error
//! - `constants`: shared defaults (file names, environment variable names)

pub mod constants;
pub mod env_utils;
pub mod signals;

pub use env_utils::EnvError;
pub use signals::{Interrupted, Interrupter, SignalHandler};
