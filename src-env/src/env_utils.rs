//! Environment variable utilities for fitpop
//!
//! `FITPOP_DIR` optionally names the directory under which relative run files
//! (checkpoint, results, history) are placed. `FITPOP_TIMING` enables
//! per-generation timing output.

use crate::constants::{FITPOP_DIR, FITPOP_TIMING};
use std::env;
use std::path::{Path, PathBuf};

/// Error type for environment variable issues
#[derive(Debug, thiserror::Error)]
pub enum EnvError {
    #[error("FITPOP_DIR points to a non-existent directory: {0}")]
    FitpopDirNotFound(PathBuf),

    #[error("FITPOP_DIR is not a directory: {0}")]
    FitpopDirNotADirectory(PathBuf),

    #[error("FITPOP_DIR is not valid unicode")]
    FitpopDirNotUnicode,
}

/// Get the FITPOP_DIR environment variable, if set, and validate it
///
/// Returns `Ok(None)` when the variable is unset or empty.
///
/// # Errors
///
/// Returns an error if FITPOP_DIR is set but does not name an existing
/// directory.
///
/// # Example
///
/// ```no_run
/// use fitpop_env::env_utils::get_fitpop_dir;
///
/// if let Some(dir) = get_fitpop_dir()? {
///     println!("run directory: {}", dir.display());
/// }
/// # Ok::<(), fitpop_env::EnvError>(())
/// ```
pub fn get_fitpop_dir() -> Result<Option<PathBuf>, EnvError> {
    let raw = match env::var(FITPOP_DIR) {
        Ok(v) if v.is_empty() => return Ok(None),
        Ok(v) => v,
        Err(env::VarError::NotPresent) => return Ok(None),
        Err(env::VarError::NotUnicode(_)) => return Err(EnvError::FitpopDirNotUnicode),
    };
    let path = PathBuf::from(raw);
    if !path.exists() {
        return Err(EnvError::FitpopDirNotFound(path));
    }
    if !path.is_dir() {
        return Err(EnvError::FitpopDirNotADirectory(path));
    }
    Ok(Some(path))
}

/// Join `path` onto `base` unless `path` is absolute or there is no base
pub fn resolve_under(base: Option<&Path>, path: &Path) -> PathBuf {
    match base {
        Some(dir) if path.is_relative() => dir.join(path),
        _ => path.to_path_buf(),
    }
}

/// Resolve a run file path against FITPOP_DIR
///
/// # Errors
///
/// Propagates the validation error of [`get_fitpop_dir`].
pub fn resolve_path<P: AsRef<Path>>(path: P) -> Result<PathBuf, EnvError> {
    let base = get_fitpop_dir()?;
    Ok(resolve_under(base.as_deref(), path.as_ref()))
}

/// Whether per-generation timing output was requested
pub fn timing_enabled() -> bool {
    matches!(
        env::var(FITPOP_TIMING).as_deref(),
        Ok("1") | Ok("true") | Ok("yes") | Ok("on")
    )
}

/// Check the fitpop environment and log what will be used
///
/// Call this at startup to fail early on a misconfigured FITPOP_DIR.
pub fn check_fitpop_env() -> Result<(), EnvError> {
    match get_fitpop_dir()? {
        Some(dir) => log::info!("FITPOP_DIR: {}", dir.display()),
        None => log::debug!("FITPOP_DIR not set, run files are relative to the working directory"),
    }
    if timing_enabled() {
        log::debug!("per-generation timing enabled");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_under() {
        let base = Path::new("/tmp/run");
        assert_eq!(
            resolve_under(Some(base), Path::new("resume.txt")),
            PathBuf::from("/tmp/run/resume.txt")
        );
        assert_eq!(
            resolve_under(Some(base), Path::new("/abs/resume.txt")),
            PathBuf::from("/abs/resume.txt")
        );
        assert_eq!(
            resolve_under(None, Path::new("resume.txt")),
            PathBuf::from("resume.txt")
        );
    }

    // all FITPOP_DIR mutations live in one test: the environment is shared
    // between test threads
    #[test]
    fn test_fitpop_dir_validation() {
        let original = env::var(FITPOP_DIR).ok();
        let dir = tempfile::tempdir().unwrap();

        unsafe { env::remove_var(FITPOP_DIR) };
        assert!(get_fitpop_dir().unwrap().is_none());
        assert_eq!(
            resolve_path("results.txt").unwrap(),
            PathBuf::from("results.txt")
        );

        unsafe { env::set_var(FITPOP_DIR, dir.path()) };
        assert_eq!(get_fitpop_dir().unwrap(), Some(dir.path().to_path_buf()));
        assert_eq!(
            resolve_path("results.txt").unwrap(),
            dir.path().join("results.txt")
        );
        assert!(check_fitpop_env().is_ok());

        let file = dir.path().join("plain");
        std::fs::write(&file, "x").unwrap();
        unsafe { env::set_var(FITPOP_DIR, &file) };
        assert!(matches!(
            get_fitpop_dir(),
            Err(EnvError::FitpopDirNotADirectory(_))
        ));

        unsafe { env::set_var(FITPOP_DIR, "/this/path/should/not/exist/fitpop") };
        let err = get_fitpop_dir().unwrap_err();
        assert!(matches!(err, EnvError::FitpopDirNotFound(_)));
        assert!(err.to_string().contains("non-existent"));

        match original {
            Some(v) => unsafe { env::set_var(FITPOP_DIR, v) },
            None => unsafe { env::remove_var(FITPOP_DIR) },
        }
    }
}
