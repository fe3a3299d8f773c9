use std::io;
use std::path::PathBuf;

use fitpop_de::{DescriptionError, PopulationError};
use fitpop_env::EnvError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FitpopError {
    #[error(transparent)]
    Population(#[from] PopulationError),

    #[error(transparent)]
    Env(#[from] EnvError),

    #[error("search space {}: {source}", path.display())]
    SearchSpace {
        path: PathBuf,
        source: DescriptionError,
    },

    #[error("{}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },

    #[error("unknown function '{0}', use --function-list to see available functions")]
    UnknownFunction(String),

    #[error("invalid arguments: {0}")]
    Args(String),

    #[error("could not install signal handlers: {0}")]
    Signals(io::Error),

    #[error("could not start worker thread: {0}")]
    Spawn(io::Error),
}
