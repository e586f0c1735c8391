use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CopyDepsError {
    #[error("Target \"{}\" does not exist", .0.display())]
    TargetNotFound(PathBuf),

    #[error("Scan error: {0}")]
    ScanError(String),

    #[error(transparent)]
    IOError(#[from] std::io::Error),
    #[error(transparent)]
    GoblinError(#[from] goblin::error::Error),
    #[error(transparent)]
    PEError(#[from] pelite::Error),
    #[error(transparent)]
    JsonError(#[from] serde_json::Error),
}

pub fn path_to_string<P: AsRef<Path>>(p: P) -> String {
    p.as_ref()
        .to_str()
        .map(str::to_owned)
        .unwrap_or_else(|| format!("{:?}", p.as_ref()))
}

/// Absolute version of the path, suitable for printing
///
/// Falls back to joining with the current directory when the file does not exist (yet)
pub fn readable_absolute_path<P: AsRef<Path>>(p: P) -> Result<String, CopyDepsError> {
    let p = p.as_ref();
    let abs = match fs_err::canonicalize(p) {
        Ok(c) => c,
        Err(_) if p.is_absolute() => p.to_owned(),
        Err(_) => std::env::current_dir()?.join(p),
    };
    Ok(decanonicalize(&path_to_string(abs)))
}

/// Strip the verbatim prefix Windows puts in front of canonicalized paths
pub fn decanonicalize(s: &str) -> String {
    s.strip_prefix(r"\\?\").unwrap_or(s).to_owned()
}
