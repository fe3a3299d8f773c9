use std::path::PathBuf;

use fitpop_env::Interrupted;

/// Errors raised by a parameter description or a list of them
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DescriptionError {
    #[error(
        "inconsistent bounds for parameter {name}: allowed [{min_allowed}, {max_allowed}], range [{min_range}, {max_range}]"
    )]
    InvalidBounds {
        name: String,
        min_allowed: f64,
        max_allowed: f64,
        min_range: f64,
        max_range: f64,
    },

    #[error("tried to add duplicate parameter: {0}")]
    Duplicate(String),

    #[error("no default value: parameter {0} is not constant")]
    NoDefault(String),

    #[error("can't update range of constant \"{0}\"")]
    ConstantRange(String),

    #[error("invalid range for parameter {0}")]
    InvalidRange(String),

    #[error("bad line reading parameter description: {0}")]
    BadLine(String),

    #[error("bad number \"{word}\" in line: {line}")]
    BadNumber { word: String, line: String },
}

/// Errors raised while running or persisting a population
#[derive(Debug, thiserror::Error)]
pub enum PopulationError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Description(#[from] DescriptionError),

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}:{line}: {message}", path.display())]
    Checkpoint {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("parameter descriptions in {} are inconsistent with start up", .0.display())]
    Incompatible(PathBuf),

    #[error("parameter file {}: {message}", path.display())]
    ParameterFile { path: PathBuf, message: String },

    #[error(transparent)]
    Interrupted(#[from] Interrupted),

    #[error("evaluation failed: {0}")]
    Evaluator(String),

    #[error("history export to {}: {source}", path.display())]
    History {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

impl PopulationError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted(_))
    }
}

/// Result alias used across the population code
pub type Result<T> = std::result::Result<T, PopulationError>;
