extern crate copydeps;

use anyhow::Context;
use clap::Parser;
use copydeps::common::readable_absolute_path;
use copydeps::{
    BatchOptions, CopyOptions, NativeImportReader, OverwritePolicy, Transcript, WalkParameters,
};
use fs_err as fs;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Copy the shared libraries an executable depends on
#[derive(Parser, Debug)]
#[command(name = "copydeps", version, about)]
struct Args {
    /// Target executable, or directory to scan for executables
    target: PathBuf,
    /// Directory to search for dependencies
    search_path: PathBuf,
    /// Directory the dependencies are copied to
    destination: PathBuf,

    /// Additional directory to search, after SEARCH_PATH (repeatable)
    #[arg(short = 'a', long = "search-path", value_name = "DIR")]
    extra_search_path: Vec<PathBuf>,

    /// Directory holding the operating system libraries (repeatable); unresolved modules found
    /// there are not reported as missing
    #[arg(short, long, value_name = "DIR")]
    system_dir: Vec<PathBuf>,

    /// Maximum recursion depth (default: unlimited)
    #[arg(short = 'd', long)]
    max_depth: Option<usize>,

    /// Only collect the direct dependencies of the target
    #[arg(long)]
    no_recursive: bool,

    /// What to do with files already present in DESTINATION
    #[arg(long, value_enum, default_value_t = OverwritePolicy::Replace)]
    overwrite: OverwritePolicy,

    /// Match module names ignoring case
    #[arg(long)]
    ignore_case: bool,

    /// Resolve and report, but do not copy
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Path for output in JSON format
    #[arg(short = 'j', long, value_name = "OUTPUT_JSON_PATH")]
    output_json_path: Option<PathBuf>,

    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_logger(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("copydeps=warn")),
        1 => EnvFilter::new("copydeps=debug"),
        _ => EnvFilter::new("copydeps=trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logger(args.verbose);

    let options = BatchOptions {
        search_path: [vec![args.search_path.clone()], args.extra_search_path.clone()].concat(),
        system_dirs: args.system_dir.clone(),
        case_insensitive: args.ignore_case,
        walk: WalkParameters {
            recursive: !args.no_recursive,
            max_depth: args.max_depth,
        },
        copy: CopyOptions {
            overwrite: args.overwrite,
            dry_run: args.dry_run,
        },
    };

    if args.verbose > 0 {
        println!(
            "Looking for dependencies of {}",
            readable_absolute_path(&args.target)?
        );
    }

    let mut transcript = Transcript::stdio();
    let report = copydeps::run(
        &NativeImportReader,
        &args.target,
        &args.destination,
        &options,
        &mut transcript,
    )
    .with_context(|| format!("could not process {}", args.target.display()))?;

    tracing::info!(
        "{} files resolved, {} modules unresolved, {} copies failed",
        report.resolved.len(),
        report.unresolved.len(),
        report.failed_copies()
    );

    if let Some(json_output_path) = &args.output_json_path {
        let js = serde_json::to_string_pretty(&report).context("Error serializing")?;
        let display = json_output_path.display();
        fs::write(json_output_path, js).context(format!("couldn't write to {}", display))?;

        if args.verbose > 0 {
            println!("successfully wrote to {}", display);
        }
    }

    Ok(())
}
