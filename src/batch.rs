//! Runs the dependency walk over one binary or a whole directory tree, then copies the result

use crate::binary::ImportReader;
use crate::common::{decanonicalize, path_to_string, CopyDepsError};
use crate::copy::{copy_files, CopyOptions};
use crate::report::{RunReport, Transcript};
use crate::search_path::{SearchPath, SearchPathEntry};
use crate::walker::{DependencyWalker, ResolutionState, WalkParameters};
use fs_err as fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Everything a run needs besides target and destination
#[derive(Clone, Debug, Default)]
pub struct BatchOptions {
    /// Directories to search, after those of the binaries found in a target directory
    pub search_path: Vec<PathBuf>,
    /// Directories holding the libraries provided by the operating system
    pub system_dirs: Vec<PathBuf>,
    pub case_insensitive: bool,
    pub walk: WalkParameters,
    pub copy: CopyOptions,
}

/// Find the binaries to start from
///
/// A file is taken as is. In a directory every native binary becomes a candidate, and the
/// directory containing it is appended to `search_path` so that the binaries can find each other.
pub fn discover_candidates<R: ImportReader>(
    reader: &R,
    target: &Path,
    search_path: &mut SearchPath,
) -> Result<Vec<PathBuf>, CopyDepsError> {
    if target.is_file() {
        return Ok(vec![target.to_owned()]);
    }
    if !target.is_dir() {
        return Err(CopyDepsError::TargetNotFound(target.to_owned()));
    }

    let pattern = scan_pattern(target)?;
    let entries = glob::glob(&pattern)
        .map_err(|e| CopyDepsError::ScanError(format!("Invalid pattern {}: {}", pattern, e)))?;

    let mut candidates = Vec::new();
    for entry in entries {
        let path = match entry {
            Ok(p) => p,
            Err(e) => {
                warn!("skipping {}", e);
                continue;
            }
        };
        if !path.is_file() {
            continue;
        }
        if reader.is_binary(&path) {
            if let Some(dir) = path.parent() {
                search_path.push(SearchPathEntry::ScannedDir(dir.to_owned()));
            }
            candidates.push(path);
        } else {
            debug!("skipping {}, not a native binary", path.display());
        }
    }

    Ok(candidates)
}

/// Glob pattern matching everything below `dir`
///
/// The verbatim prefix of a canonicalized Windows path is dropped, as glob cannot match it.
fn scan_pattern(dir: &Path) -> Result<String, CopyDepsError> {
    let dir_str = dir
        .to_str()
        .ok_or_else(|| CopyDepsError::ScanError(format!("Could not scan directory {:?}", dir)))?;
    Ok(format!(
        "{}/**/*",
        glob::Pattern::escape(&decanonicalize(dir_str))
    ))
}

/// Resolve the dependencies of `target` and copy them to `destination`
pub fn run<R: ImportReader>(
    reader: &R,
    target: &Path,
    destination: &Path,
    options: &BatchOptions,
    transcript: &mut Transcript,
) -> Result<RunReport, CopyDepsError> {
    if !target.exists() {
        return Err(CopyDepsError::TargetNotFound(target.to_owned()));
    }
    let target = fs::canonicalize(target)?;

    let mut search_path = SearchPath::new().case_insensitive(options.case_insensitive);
    let candidates = discover_candidates(reader, &target, &mut search_path)?;
    info!("{} binaries to process", candidates.len());

    for dir in &options.search_path {
        if dir.is_dir() {
            search_path.push(SearchPathEntry::UserDir(fs::canonicalize(dir)?));
        } else {
            warn!("Skipping non-existing path entry {}", dir.display());
        }
    }
    debug!(
        "Search path: {}",
        search_path
            .dirs()
            .iter()
            .map(path_to_string)
            .collect::<Vec<_>>()
            .join(", ")
    );

    let mut state = ResolutionState::new(search_path, options.walk);
    {
        let mut walker = DependencyWalker::new(reader, &mut state, transcript);
        for c in &candidates {
            walker.walk(c);
        }
    }

    let copied = copy_files(&state.resolved_files, destination, &options.copy, transcript)?;

    let system_path =
        SearchPath::from_dirs(options.system_dirs.iter()).case_insensitive(options.case_insensitive);
    let system_modules: Vec<String> = if options.system_dirs.is_empty() {
        Vec::new()
    } else {
        state
            .unresolved_module_names
            .iter()
            .filter(|m| system_path.resolve(m).is_some())
            .cloned()
            .collect()
    };

    let report = RunReport {
        candidates,
        resolved: state.resolved_files.into_iter().collect(),
        unresolved: state.unresolved_module_names,
        system_modules,
        copied,
    };

    transcript.out("Unresolved Modules:");
    for m in report.missing_modules() {
        transcript.out(m);
    }

    Ok(report)
}
