//! Line-oriented transcript of a run, and its serializable summary

use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;

/// Human-readable output of a run
///
/// Discovered modules and copy operations go to `out`, unresolved modules to `err`, one per line.
pub struct Transcript {
    out: Box<dyn Write>,
    err: Box<dyn Write>,
}

impl Transcript {
    pub fn new(out: Box<dyn Write>, err: Box<dyn Write>) -> Self {
        Self { out, err }
    }

    pub fn stdio() -> Self {
        Self::new(Box::new(std::io::stdout()), Box::new(std::io::stderr()))
    }

    pub fn sink() -> Self {
        Self::new(Box::new(std::io::sink()), Box::new(std::io::sink()))
    }

    // a closed stdout must not interrupt the run
    pub fn out(&mut self, line: &str) {
        let _ = writeln!(self.out, "{}", line);
    }

    pub fn err(&mut self, line: &str) {
        let _ = writeln!(self.err, "{}", line);
    }
}

impl std::fmt::Debug for Transcript {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Transcript")
    }
}

/// What happened to one resolved file in the copy phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CopyOutcome {
    Copied,
    /// Destination existed and the overwrite policy said to keep it
    Skipped,
    /// Dry run
    Planned,
    Failed { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CopiedFile {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub outcome: CopyOutcome,
}

/// Summary of a complete run
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    /// Binaries the walk started from
    pub candidates: Vec<PathBuf>,
    /// Files making up the dependency closure
    pub resolved: Vec<PathBuf>,
    /// Module names not found on the search path, in discovery order
    pub unresolved: Vec<String>,
    /// Unresolved module names that are present in one of the system directories
    pub system_modules: Vec<String>,
    pub copied: Vec<CopiedFile>,
}

impl RunReport {
    /// Unresolved modules that are not provided by the system either
    pub fn missing_modules(&self) -> Vec<&str> {
        self.unresolved
            .iter()
            .filter(|u| !self.system_modules.contains(u))
            .map(String::as_str)
            .collect()
    }

    pub fn failed_copies(&self) -> usize {
        self.copied
            .iter()
            .filter(|c| matches!(c.outcome, CopyOutcome::Failed { .. }))
            .count()
    }
}
