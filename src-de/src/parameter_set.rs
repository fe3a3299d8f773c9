use std::cmp::Ordering;
use std::fmt;
use std::path::Path;

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::checkpoint::{fmt_f64, parse_f64, split_words};
use crate::errors::PopulationError;
use crate::parameter_description::{ParameterDescriptionList, ParameterType};

/// One candidate solution: parameter values, fitness and the crossover scale
/// that produced it
///
/// `value` is NaN while the set is pending, `+inf` when the evaluator
/// rejected it. Equality and ordering look at `value` only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterSet {
    pub parameters: Array1<f64>,
    pub value: f64,
    pub diff_scale: f64,
}

impl ParameterSet {
    /// Pending set of `n` zeros
    pub fn new(n: usize) -> Self {
        Self {
            parameters: Array1::zeros(n),
            value: f64::NAN,
            diff_scale: 0.0,
        }
    }

    pub fn from_values(parameters: Vec<f64>, value: f64) -> Self {
        Self {
            parameters: Array1::from(parameters),
            value,
            diff_scale: 0.0,
        }
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    pub fn is_pending(&self) -> bool {
        self.value.is_nan()
    }

    pub fn swap(&mut self, other: &mut ParameterSet) {
        std::mem::swap(self, other);
    }

    /// Parse `value p1 p2 ...`
    ///
    /// When `expected` is given the line must hold exactly that many
    /// parameters. NaN parameters are rejected.
    pub fn parse_line(line: &str, expected: Option<usize>) -> Result<Self, String> {
        let words = split_words(line);
        let (first, rest) = words
            .split_first()
            .ok_or_else(|| "empty parameter set line".to_string())?;
        if let Some(n) = expected.filter(|&n| n != rest.len()) {
            return Err(format!(
                "expected {n} parameters, found {}",
                rest.len()
            ));
        }
        let value = parse_f64(first).ok_or_else(|| format!("bad value \"{first}\""))?;
        let mut parameters = Vec::with_capacity(rest.len());
        for word in rest {
            let p = parse_f64(word).ok_or_else(|| format!("bad parameter \"{word}\""))?;
            if p.is_nan() {
                return Err("NaN parameter value".to_string());
            }
            parameters.push(p);
        }
        Ok(Self::from_values(parameters, value))
    }

    /// Read a standalone parameter file
    ///
    /// Either `name value` lines (a line named `value`, any case, gives the
    /// fitness) assigned in order, or one line holding all `num_params`
    /// numbers.
    pub fn read_text(text: &str, num_params: usize) -> Result<Self, String> {
        let mut set = Self::new(num_params);
        let mut assigned = 0usize;
        for (index, line) in text.lines().enumerate() {
            let line_num = index + 1;
            let words = split_words(line);
            if words.is_empty() {
                continue;
            }
            if words.len() != 2 {
                if words.len() == num_params && assigned == 0 {
                    for (slot, word) in set.parameters.iter_mut().zip(&words) {
                        *slot = parse_f64(word)
                            .ok_or_else(|| format!("line {line_num}: bad number \"{word}\""))?;
                    }
                    return Ok(set);
                }
                return Err(format!(
                    "line {line_num}: line not of form \"paramName paramValue\""
                ));
            }
            let number = parse_f64(words[1])
                .ok_or_else(|| format!("line {line_num}: bad number \"{}\"", words[1]))?;
            if words[0].eq_ignore_ascii_case("value") {
                set.value = number;
            } else {
                if assigned == num_params {
                    return Err(format!("line {line_num}: too many parameters"));
                }
                set.parameters[assigned] = number;
                assigned += 1;
            }
        }
        if assigned != num_params {
            return Err(format!(
                "not all parameters assigned ({assigned}/{num_params})"
            ));
        }
        Ok(set)
    }

    pub fn read_file(path: impl AsRef<Path>, num_params: usize) -> crate::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| PopulationError::io(path, e))?;
        Self::read_text(&text, num_params).map_err(|message| PopulationError::ParameterFile {
            path: path.to_path_buf(),
            message,
        })
    }
}

/// `value p1 p2 ...` with shortest round-trip formatting
impl fmt::Display for ParameterSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", fmt_f64(self.value))?;
        for p in self.parameters.iter() {
            write!(f, " {}", fmt_f64(*p))?;
        }
        Ok(())
    }
}

/// Sets compare by fitness only, in agreement with the ordering
impl PartialEq for ParameterSet {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

/// Sets order by fitness only
impl PartialOrd for ParameterSet {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.value.partial_cmp(&other.value)
    }
}

/// Largest per-parameter distance between two sets
///
/// Uniform parameters contribute their absolute difference, log parameters
/// the absolute log ratio. Constants are ignored.
pub fn max_distance(a: &ParameterSet, b: &ParameterSet, descriptions: &ParameterDescriptionList) -> f64 {
    descriptions
        .iter()
        .zip(a.parameters.iter().zip(b.parameters.iter()))
        .map(|(desc, (&x, &y))| match desc.kind() {
            ParameterType::UniformDistributed => (x - y).abs(),
            ParameterType::LogDistributed => (x / y).ln().abs(),
            _ => 0.0,
        })
        .fold(0.0, f64::max)
}
