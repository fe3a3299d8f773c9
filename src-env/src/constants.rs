/// Environment variable pointing at the directory used for run files
pub const FITPOP_DIR: &str = "FITPOP_DIR";

/// Environment variable enabling per-generation timing output
pub const FITPOP_TIMING: &str = "FITPOP_TIMING";

/// Default checkpoint file name
pub const RESUME_FILE: &str = "resume.txt";

/// Default best-parameters file name
pub const RESULTS_FILE: &str = "results.txt";

/// Suffix of the backup kept while a checkpoint is being replaced
pub const BACKUP_SUFFIX: &str = ".temp";
