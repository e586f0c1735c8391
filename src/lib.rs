extern crate thiserror;

pub mod batch;
pub mod binary;
pub mod common;
pub mod copy;
pub mod report;
pub mod search_path;
pub mod walker;

pub use batch::{run, BatchOptions};
pub use binary::{ImportReader, NativeImportReader};
pub use common::CopyDepsError;
pub use copy::{CopyOptions, OverwritePolicy};
pub use report::{RunReport, Transcript};
pub use search_path::SearchPath;
pub use walker::{DependencyWalker, ResolutionState, WalkParameters};
