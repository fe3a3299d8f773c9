//! Line-oriented checkpoint text and crash-safe persistence
//!
//! A checkpoint holds, in order: the parameter descriptions, the best
//! parameters, the two stopwatches, three counters, the generation history and
//! the population. `#` starts a comment. Files are replaced by renaming a
//! temporary file from the same directory over them. A `<file>.temp` backup
//! left behind by a save that never completed is restored on the next resume.

use std::fmt::Write as _;
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use fitpop_env::constants::BACKUP_SUFFIX;

use crate::errors::{PopulationError, Result};
use crate::generation::{GenerationSummary, Stopwatch};
use crate::parameter_description::{ParameterDescriptionList, lists_compatible};
use crate::parameter_set::ParameterSet;
use crate::population::Population;

/// Shortest text that parses back to the same float
pub fn fmt_f64(x: f64) -> String {
    format!("{x:?}")
}

pub fn parse_f64(word: &str) -> Option<f64> {
    word.parse().ok()
}

/// Line content before any `#` comment
pub fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(i) => &line[..i],
        None => line,
    }
}

/// Whitespace separated words of a line, comments removed
pub fn split_words(line: &str) -> Vec<&str> {
    strip_comment(line).split_whitespace().collect()
}

/// Backup kept while `path` is being replaced
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(BACKUP_SUFFIX);
    PathBuf::from(name)
}

/// Cursor over the content lines of a checkpoint, tracking line numbers
pub struct LineReader<'a> {
    path: &'a Path,
    lines: std::iter::Enumerate<std::str::Lines<'a>>,
    line: usize,
}

impl<'a> LineReader<'a> {
    pub fn new(path: &'a Path, text: &'a str) -> Self {
        Self {
            path,
            lines: text.lines().enumerate(),
            line: 0,
        }
    }

    /// Next line with content, comment removed
    pub fn next_content(&mut self) -> Result<&'a str> {
        for (index, line) in self.lines.by_ref() {
            self.line = index + 1;
            let content = strip_comment(line);
            if !content.trim().is_empty() {
                return Ok(content);
            }
        }
        self.line += 1;
        Err(self.error("unexpected end of file"))
    }

    /// A line holding a single unsigned integer
    pub fn count(&mut self) -> Result<usize> {
        let line = self.next_content()?;
        match split_words(line).as_slice() {
            [word] => word
                .parse()
                .map_err(|_| self.error(format!("expected a count, found \"{word}\""))),
            _ => Err(self.error(format!("expected a count, found \"{}\"", line.trim()))),
        }
    }

    pub fn parameter_set(&mut self, num_params: usize) -> Result<ParameterSet> {
        let line = self.next_content()?;
        ParameterSet::parse_line(line, Some(num_params)).map_err(|m| self.error(m))
    }

    pub fn stopwatch_secs(&mut self) -> Result<f64> {
        let line = self.next_content()?;
        Stopwatch::parse_secs(line).ok_or_else(|| self.error(format!("bad time \"{}\"", line.trim())))
    }

    pub fn error(&self, message: impl Into<String>) -> PopulationError {
        PopulationError::Checkpoint {
            path: self.path.to_path_buf(),
            line: self.line,
            message: message.into(),
        }
    }
}

/// Replace `path` with `text`
///
/// The text goes to a temporary file in the same directory which is then
/// renamed over `path`, so readers see either the old or the new checkpoint.
pub fn write_atomically(path: &Path, text: &str) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let io = |e| PopulationError::io(path, e);
    let mut temp = tempfile::NamedTempFile::new_in(dir).map_err(io)?;
    temp.write_all(text.as_bytes()).map_err(io)?;
    temp.as_file().sync_all().map_err(io)?;
    temp.persist(path).map_err(|e| io(e.error))?;

    // the new checkpoint supersedes any leftover backup
    let backup = backup_path(path);
    match fs::remove_file(&backup) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(PopulationError::io(&backup, e)),
        _ => Ok(()),
    }
}

/// Restore the backup left by a save that never completed
///
/// Returns whether a repair happened.
pub fn repair_interrupted_save(path: &Path) -> Result<bool> {
    let backup = backup_path(path);
    if !backup.exists() {
        return Ok(false);
    }
    if path.exists() {
        fs::remove_file(path).map_err(|e| PopulationError::io(path, e))?;
    }
    fs::rename(&backup, path).map_err(|e| PopulationError::io(&backup, e))?;
    Ok(true)
}

/// Everything a checkpoint restores, parsed before being applied
struct CheckpointState {
    descriptions: ParameterDescriptionList,
    best: ParameterSet,
    total_secs: f64,
    generation_secs: f64,
    num_evaluations: usize,
    num_gen_evaluations: usize,
    generation_num: usize,
    history: Vec<GenerationSummary>,
    members: Vec<ParameterSet>,
}

impl Population {
    /// Full checkpoint text
    pub fn checkpoint_text(&self) -> String {
        let mut out = String::new();
        // writing to a String cannot fail
        let _ = self.write_checkpoint(&mut out);
        out
    }

    fn write_checkpoint(&self, out: &mut String) -> std::fmt::Result {
        write!(out, "{}", self.descriptions)?;
        writeln!(out, "# Current best parameters:")?;
        writeln!(out, "{}", self.best)?;
        writeln!(out)?;
        writeln!(out, "# Total time:")?;
        writeln!(out, "{}", self.total_time)?;
        writeln!(out, "# Current generation time:")?;
        writeln!(out, "{}", self.generation_time)?;
        writeln!(out)?;
        writeln!(out, "{} # number of parameter sets evaluated", self.num_evaluations)?;
        writeln!(out, "{} # number of evaluations this generation", self.num_gen_evaluations)?;
        writeln!(out, "{} # current generation number", self.generation_num)?;
        writeln!(out)?;
        writeln!(out, "{} # generation history", self.history.len())?;
        for summary in &self.history {
            writeln!(out, "{summary}")?;
        }
        writeln!(out)?;
        writeln!(out, "{} # population", self.members.len())?;
        for set in &self.members {
            writeln!(out, "{set}")?;
        }
        Ok(())
    }

    /// Persist the full state to the resume file
    ///
    /// Does nothing before initialization, when logging to disk is off or
    /// while the population is still empty.
    pub fn save_progress(&self) -> Result<()> {
        if !self.initialized || !self.config.log_to_disk || self.members.is_empty() {
            return Ok(());
        }
        write_atomically(&self.resume_path, &self.checkpoint_text())?;
        log::log!(
            self.progress_level(),
            "Progress saved to {}",
            self.resume_path.display()
        );
        Ok(())
    }

    /// Restore state from the resume file, if there is one
    ///
    /// A backup left by an interrupted save replaces the resume file first.
    /// Returns whether a previous session was resumed.
    pub fn resume(&mut self) -> Result<bool> {
        let path = self.resume_path.clone();
        if repair_interrupted_save(&path)? {
            log::log!(
                self.progress_level(),
                "Restored {} from an interrupted save",
                path.display()
            );
        }
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.resumed = false;
                return Ok(false);
            }
            Err(e) => return Err(PopulationError::io(&path, e)),
        };
        log::log!(
            self.progress_level(),
            "Resuming previous session from {}",
            path.display()
        );
        self.load_checkpoint(&path, &text)?;
        self.resumed = true;
        self.test_optimal()?;
        for generation in 1..=self.history.len() {
            self.summarize_generation(generation);
        }
        Ok(true)
    }

    /// Replace the state with the checkpoint in `text`
    ///
    /// `path` is only used in error messages. Nothing changes on error.
    pub fn load_checkpoint(&mut self, path: &Path, text: &str) -> Result<()> {
        let state = self.parse_checkpoint(path, text)?;

        if self.population_size == 0 {
            self.population_size = state.members.len();
        }
        self.descriptions = state.descriptions;
        self.best = state.best;
        self.total_time.resume_from(state.total_secs);
        self.generation_time.resume_from(state.generation_secs);
        self.num_evaluations = state.num_evaluations;
        self.num_gen_evaluations = state.num_gen_evaluations;
        self.generation_num = state.generation_num;
        self.history = state.history;
        self.members = state.members;
        self.members.truncate(self.population_size);
        Ok(())
    }

    fn parse_checkpoint(&self, path: &Path, text: &str) -> Result<CheckpointState> {
        let mut reader = LineReader::new(path, text);

        let mut descriptions = ParameterDescriptionList::read_counted(&mut reader)?;
        if !self.descriptions.is_empty() {
            if !lists_compatible(&self.descriptions, &descriptions) {
                return Err(PopulationError::Incompatible(path.to_path_buf()));
            }
            for (resumed, startup) in descriptions.iter_mut().zip(self.descriptions.iter()) {
                resumed.adopt_bindings(startup);
            }
        }
        let n = descriptions.len();

        let best = reader.parameter_set(n)?;
        let total_secs = reader.stopwatch_secs()?;
        let generation_secs = reader.stopwatch_secs()?;
        let num_evaluations = reader.count()?;
        let num_gen_evaluations = reader.count()?;
        let generation_num = reader.count()?;

        let history_len = reader.count()?;
        let mut history = Vec::with_capacity(history_len);
        for _ in 0..history_len {
            let line = reader.next_content()?;
            let summary = GenerationSummary::parse_line(line, n).map_err(|m| reader.error(m))?;
            history.push(summary);
        }

        let population_len = reader.count()?;
        let mut members = Vec::with_capacity(population_len);
        for _ in 0..population_len {
            let set = reader.parameter_set(n)?;
            if set.value.is_nan() {
                return Err(reader.error("population member without a value"));
            }
            members.push(set);
        }
        members.sort_by(|a, b| a.value.total_cmp(&b.value));

        Ok(CheckpointState {
            descriptions,
            best,
            total_secs,
            generation_secs,
            num_evaluations,
            num_gen_evaluations,
            generation_num: generation_num.max(1),
            history,
            members,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_helpers() {
        assert_eq!(split_words("  a 1.5  # trailing"), vec!["a", "1.5"]);
        assert!(split_words("# only a comment").is_empty());
        assert_eq!(parse_f64(&fmt_f64(0.1)), Some(0.1));
        assert_eq!(parse_f64(&fmt_f64(f64::INFINITY)), Some(f64::INFINITY));
        assert!(parse_f64(&fmt_f64(f64::NAN)).unwrap().is_nan());
        assert_eq!(
            backup_path(Path::new("run/resume.txt")),
            PathBuf::from("run/resume.txt.temp")
        );
    }

    #[test]
    fn test_line_reader_reports_line_numbers() {
        let text = "# header\n\n3 # count\nnot a count\n";
        let mut reader = LineReader::new(Path::new("r.txt"), text);
        assert_eq!(reader.count().unwrap(), 3);
        match reader.count().unwrap_err() {
            PopulationError::Checkpoint { line, path, .. } => {
                assert_eq!(line, 4);
                assert_eq!(path, PathBuf::from("r.txt"));
            }
            other => panic!("unexpected error {other}"),
        }
        assert!(reader.next_content().is_err());
    }

    #[test]
    fn test_write_atomically_replaces_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resume.txt");
        write_atomically(&path, "first\n").unwrap();
        write_atomically(&path, "second\n").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "second\n");
        assert!(!backup_path(&path).exists());
        // only the checkpoint is left in the directory
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_write_atomically_drops_a_stale_backup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resume.txt");
        fs::write(backup_path(&path), "older").unwrap();
        write_atomically(&path, "newest\n").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "newest\n");
        assert!(!backup_path(&path).exists());
        assert!(!repair_interrupted_save(&path).unwrap());
        assert_eq!(fs::read_to_string(&path).unwrap(), "newest\n");
    }

    #[test]
    fn test_repair_interrupted_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resume.txt");
        assert!(!repair_interrupted_save(&path).unwrap());

        fs::write(&path, "torn").unwrap();
        fs::write(backup_path(&path), "good").unwrap();
        assert!(repair_interrupted_save(&path).unwrap());
        assert_eq!(fs::read_to_string(&path).unwrap(), "good");
        assert!(!backup_path(&path).exists());
    }
}
