//! Copy of the resolved dependency closure to the destination directory

use crate::common::{path_to_string, CopyDepsError};
use crate::report::{CopiedFile, CopyOutcome, Transcript};
use fs_err as fs;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::warn;

/// What to do when the destination file already exists
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum OverwritePolicy {
    #[default]
    Replace,
    Skip,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CopyOptions {
    pub overwrite: OverwritePolicy,
    /// Only report what would be copied
    pub dry_run: bool,
}

/// Copy every file into `destination`, keeping file names
///
/// Only failing to create the destination directory is an error; each file that cannot be
/// copied is reported in its `CopiedFile` and the remaining ones are still copied.
pub fn copy_files<'a, I>(
    files: I,
    destination: &Path,
    options: &CopyOptions,
    transcript: &mut Transcript,
) -> Result<Vec<CopiedFile>, CopyDepsError>
where
    I: IntoIterator<Item = &'a PathBuf>,
{
    if !options.dry_run {
        fs::create_dir_all(destination)?;
    }

    Ok(files
        .into_iter()
        .map(|source| {
            let copied = copy_file(source, destination, options);
            transcript.out(&format!(
                "Copy file: {} -> {}",
                path_to_string(&copied.source),
                path_to_string(&copied.destination)
            ));
            transcript.out(&match &copied.outcome {
                CopyOutcome::Copied => "copied".to_owned(),
                CopyOutcome::Skipped => "skipped, destination exists".to_owned(),
                CopyOutcome::Planned => "not copied (dry run)".to_owned(),
                CopyOutcome::Failed { message } => format!("failed: {}", message),
            });
            copied
        })
        .collect())
}

fn copy_file(source: &Path, destination_dir: &Path, options: &CopyOptions) -> CopiedFile {
    let destination = match source.file_name() {
        Some(name) => destination_dir.join(name),
        None => {
            return CopiedFile {
                source: source.to_owned(),
                destination: destination_dir.to_owned(),
                outcome: CopyOutcome::Failed {
                    message: "source has no file name".to_owned(),
                },
            }
        }
    };

    let outcome = if options.dry_run {
        CopyOutcome::Planned
    } else if destination.exists()
        && (options.overwrite == OverwritePolicy::Skip || is_same_file(source, &destination))
    {
        // copying a file onto itself would truncate it
        CopyOutcome::Skipped
    } else {
        match fs::copy(source, &destination) {
            Ok(_) => CopyOutcome::Copied,
            Err(e) => {
                warn!("{}", e);
                CopyOutcome::Failed {
                    message: e.to_string(),
                }
            }
        }
    };

    CopiedFile {
        source: source.to_owned(),
        destination,
        outcome,
    }
}

fn is_same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
