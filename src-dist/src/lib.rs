//! Distributed evaluation for fitpop populations
//!
//! A [`Coordinator`] owns the [`fitpop_de::Population`] and keeps every
//! [`Worker`] busy over a [`Comm`] substrate. [`local::world`] provides an
//! in-process substrate where every rank is a thread.

pub mod comm;
pub mod coordinator;
pub mod errors;
pub mod local;
pub mod worker;

pub use comm::{Channel, Comm, Message};
pub use coordinator::{CleanupReport, Coordinator, CoordinatorConfig};
pub use errors::{CommError, WorkerError};
pub use local::{LocalComm, world};
pub use worker::{COORDINATOR, Worker, WorkerConfig, WorkerExit};
