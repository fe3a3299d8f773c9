//! Per-generation bookkeeping: elapsed-time stopwatches, generation summaries
//! and the CSV export of the generation history

use std::fmt;
use std::path::Path;
use std::time::{Duration, Instant};

use crate::checkpoint::{fmt_f64, parse_f64, split_words};
use crate::errors::PopulationError;
use crate::parameter_set::ParameterSet;

/// Elapsed wall time that survives a checkpoint
///
/// Persisted as `<seconds>s`. A restored stopwatch keeps counting from the
/// saved value.
#[derive(Debug, Clone, Copy)]
pub struct Stopwatch {
    offset: Duration,
    started: Instant,
}

impl Stopwatch {
    pub fn new() -> Self {
        Self {
            offset: Duration::ZERO,
            started: Instant::now(),
        }
    }

    /// Restart from zero
    pub fn start(&mut self) {
        *self = Self::new();
    }

    /// Continue counting from `secs`
    pub fn resume_from(&mut self, secs: f64) {
        self.offset = Duration::from_secs_f64(secs.max(0.0));
        self.started = Instant::now();
    }

    pub fn elapsed(&self) -> Duration {
        self.offset + self.started.elapsed()
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed().as_secs_f64()
    }

    /// Parse a `<seconds>s` time string
    pub fn parse_secs(text: &str) -> Option<f64> {
        let secs = parse_f64(text.trim().strip_suffix('s')?)?;
        (secs.is_finite() && secs >= 0.0).then_some(secs)
    }
}

impl Default for Stopwatch {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Stopwatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", format_secs(self.elapsed_secs()))
    }
}

pub fn format_secs(secs: f64) -> String {
    format!("{secs:.6}s")
}

/// Snapshot of one finished generation
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationSummary {
    pub best: ParameterSet,
    pub generation_secs: f64,
    pub total_secs: f64,
    pub f_range: f64,
    pub max_log_range: f64,
    pub max_uniform_range: f64,
}

impl GenerationSummary {
    /// Parse a history line
    ///
    /// Older checkpoints omit the three range diagnostics; they come back as
    /// NaN.
    pub fn parse_line(line: &str, num_params: usize) -> Result<Self, String> {
        let words = split_words(line);
        if words.len() < 2 {
            return Err("invalid parameter history line".to_string());
        }
        let generation_secs = Stopwatch::parse_secs(words[0])
            .ok_or_else(|| format!("bad generation time \"{}\"", words[0]))?;
        let total_secs = Stopwatch::parse_secs(words[1])
            .ok_or_else(|| format!("bad total time \"{}\"", words[1]))?;
        let rest = &words[2..];
        let set_words = 1 + num_params;
        let (ranges, set) = if rest.len() == set_words {
            ([f64::NAN; 3], rest)
        } else if rest.len() == set_words + 3 {
            let mut ranges = [0.0; 3];
            for (r, word) in ranges.iter_mut().zip(rest) {
                *r = parse_f64(word).ok_or_else(|| format!("bad range \"{word}\""))?;
            }
            (ranges, &rest[3..])
        } else {
            return Err("invalid parameter history line".to_string());
        };
        let best = ParameterSet::parse_line(&set.join(" "), Some(num_params))?;
        Ok(Self {
            best,
            generation_secs,
            total_secs,
            f_range: ranges[0],
            max_log_range: ranges[1],
            max_uniform_range: ranges[2],
        })
    }
}

impl fmt::Display for GenerationSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<24}{:<24}{} {} {} {}",
            format_secs(self.generation_secs),
            format_secs(self.total_secs),
            fmt_f64(self.f_range),
            fmt_f64(self.max_log_range),
            fmt_f64(self.max_uniform_range),
            self.best
        )
    }
}

/// Write one CSV row per generation
pub fn write_history_csv(
    path: &Path,
    names: &[&str],
    history: &[GenerationSummary],
) -> Result<(), PopulationError> {
    let wrap = |source: csv::Error| PopulationError::History {
        path: path.to_path_buf(),
        source,
    };
    let mut writer = csv::Writer::from_path(path).map_err(wrap)?;
    let mut header = vec![
        "generation",
        "best_value",
        "generation_time_s",
        "total_time_s",
        "f_range",
        "max_log_range",
        "max_uniform_range",
    ];
    header.extend_from_slice(names);
    writer.write_record(&header).map_err(wrap)?;
    for (index, summary) in history.iter().enumerate() {
        let mut row = vec![
            (index + 1).to_string(),
            fmt_f64(summary.best.value),
            summary.generation_secs.to_string(),
            summary.total_secs.to_string(),
            fmt_f64(summary.f_range),
            fmt_f64(summary.max_log_range),
            fmt_f64(summary.max_uniform_range),
        ];
        row.extend(summary.best.parameters.iter().map(|p| fmt_f64(*p)));
        writer.write_record(&row).map_err(wrap)?;
    }
    writer
        .flush()
        .map_err(|e| PopulationError::io(path, e))?;
    Ok(())
}
