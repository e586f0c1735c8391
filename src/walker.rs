use crate::binary::ImportReader;
use crate::report::Transcript;
use crate::search_path::SearchPath;
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WalkParameters {
    /// Walk the imports of the discovered dependencies too
    pub recursive: bool,
    /// Maximum dependency depth; the binaries the walk starts from are at depth zero
    pub max_depth: Option<usize>,
}

impl Default for WalkParameters {
    fn default() -> Self {
        Self {
            recursive: true,
            max_depth: None,
        }
    }
}

/// Everything learned during one run
#[derive(Debug)]
pub struct ResolutionState {
    pub parameters: WalkParameters,
    pub search_path: SearchPath,
    /// The dependency closure found so far
    pub resolved_files: BTreeSet<PathBuf>,
    /// Every module name that was looked up, found or not
    pub processed_module_names: HashSet<String>,
    pub unresolved_module_names: Vec<String>,
}

impl ResolutionState {
    pub fn new(search_path: SearchPath, parameters: WalkParameters) -> Self {
        Self {
            parameters,
            search_path,
            resolved_files: BTreeSet::new(),
            processed_module_names: HashSet::new(),
            unresolved_module_names: Vec::new(),
        }
    }

    fn within_max_depth(&self, depth: usize) -> bool {
        self.parameters.max_depth.map_or(true, |d| depth <= d)
    }
}

/// Resolves the imports of binaries, recursing into the dependencies it finds
///
/// Module names are looked up at most once per state, so cycles and shared dependencies are
/// walked a single time.
pub struct DependencyWalker<'a, R: ImportReader> {
    reader: &'a R,
    state: &'a mut ResolutionState,
    transcript: &'a mut Transcript,
}

impl<'a, R: ImportReader> DependencyWalker<'a, R> {
    pub fn new(
        reader: &'a R,
        state: &'a mut ResolutionState,
        transcript: &'a mut Transcript,
    ) -> Self {
        Self {
            reader,
            state,
            transcript,
        }
    }

    /// Resolve the imports of the given binary
    pub fn walk<P: AsRef<Path>>(&mut self, file: P) {
        self.walk_at_depth(file.as_ref(), 0)
    }

    fn walk_at_depth(&mut self, file: &Path, depth: usize) {
        if !self.state.within_max_depth(depth + 1) {
            return;
        }

        let path = match self.state.search_path.resolve(file) {
            Some(p) => p,
            None => {
                warn!("unable to locate {}", file.display());
                self.transcript
                    .err(&format!("Error: unable to locate {} in PATH", file.display()));
                return;
            }
        };

        // the handle is dropped at the end of this scope, whatever happens
        let handle = match self.reader.open(&path) {
            Ok(Some(h)) => h,
            Ok(None) => {
                debug!("{} is not a native binary", path.display());
                return;
            }
            Err(e) => {
                warn!("could not read {}: {}", path.display(), e);
                return;
            }
        };

        for module in handle.imports() {
            trace!(
                "{} imports {} symbols from {}",
                path.display(),
                module.symbols.len(),
                module.name
            );
            self.process_import(&module.name, depth + 1);
        }
    }

    /// Look up a module imported at the given depth, and walk it if it is new
    pub fn process_import(&mut self, module_name: &str, depth: usize) {
        if !self.state.processed_module_names.insert(module_name.to_owned()) {
            return;
        }
        self.transcript.out(module_name);

        match self.state.search_path.resolve(module_name) {
            Some(path) => {
                debug!("{} => {}", module_name, path.display());
                if self.state.resolved_files.insert(path.clone()) && self.state.parameters.recursive
                {
                    self.walk_at_depth(&path, depth);
                }
            }
            None => {
                self.state
                    .unresolved_module_names
                    .push(module_name.to_owned());
                self.transcript.err(module_name);
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::binary::{BinaryHandle, ImportedModule};
    use crate::common::CopyDepsError;
    use crate::report::tests::buffered;
    use fs_err as fs;
    use std::cell::RefCell;
    use std::collections::HashMap;

    /// Import tables keyed by file name, with a log of every opened file
    #[derive(Default)]
    pub(crate) struct FakeReader {
        pub(crate) tables: HashMap<String, Vec<String>>,
        pub(crate) opened: RefCell<Vec<String>>,
    }

    impl FakeReader {
        pub(crate) fn with(mut self, file: &str, imports: &[&str]) -> Self {
            self.tables.insert(
                file.to_owned(),
                imports.iter().map(|&s| s.to_owned()).collect(),
            );
            self
        }

        pub(crate) fn times_opened(&self, file: &str) -> usize {
            self.opened.borrow().iter().filter(|f| *f == file).count()
        }
    }

    impl ImportReader for FakeReader {
        fn open(&self, path: &Path) -> Result<Option<BinaryHandle>, CopyDepsError> {
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default()
                .to_owned();
            self.opened.borrow_mut().push(name.clone());
            Ok(self.tables.get(&name).map(|imports| {
                BinaryHandle::new(
                    path,
                    imports.iter().map(ImportedModule::new).collect(),
                )
            }))
        }
    }

    /// Creates the named (empty) files in a fresh directory
    pub(crate) fn make_dir(files: &[&str]) -> Result<tempfile::TempDir, CopyDepsError> {
        let dir = tempfile::tempdir()?;
        for f in files {
            fs::write(dir.path().join(f), "")?;
        }
        Ok(dir)
    }

    fn run(
        reader: &FakeReader,
        dir: &Path,
        target: &str,
        parameters: WalkParameters,
    ) -> ResolutionState {
        let mut state = ResolutionState::new(SearchPath::from_dirs([dir]), parameters);
        let mut transcript = Transcript::sink();
        DependencyWalker::new(reader, &mut state, &mut transcript).walk(dir.join(target));
        state
    }

    fn names(state: &ResolutionState) -> Vec<String> {
        state
            .resolved_files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_owned())
            .collect()
    }

    #[test]
    fn shared_import_is_processed_once() -> Result<(), CopyDepsError> {
        let dir = make_dir(&["app", "liba.so", "libb.so", "libshared.so"])?;
        let reader = FakeReader::default()
            .with("app", &["liba.so", "libb.so", "libmissing.so"])
            .with("liba.so", &["libshared.so", "libmissing.so"])
            .with("libb.so", &["libshared.so", "libmissing.so", "libmissing.so"])
            .with("libshared.so", &[]);

        let state = run(&reader, dir.path(), "app", WalkParameters::default());
        assert_eq!(names(&state), vec!["liba.so", "libb.so", "libshared.so"]);
        assert_eq!(state.unresolved_module_names, vec!["libmissing.so"]);
        assert_eq!(reader.times_opened("libshared.so"), 1);
        Ok(())
    }

    #[test]
    fn cycle_terminates() -> Result<(), CopyDepsError> {
        let dir = make_dir(&["a.dll", "b.dll"])?;
        let reader = FakeReader::default()
            .with("a.dll", &["b.dll"])
            .with("b.dll", &["a.dll"]);

        let state = run(&reader, dir.path(), "a.dll", WalkParameters::default());
        assert_eq!(names(&state), vec!["a.dll", "b.dll"]);
        assert!(state.unresolved_module_names.is_empty());
        Ok(())
    }

    #[test]
    fn diamond_is_walked_once() -> Result<(), CopyDepsError> {
        let dir = make_dir(&["a.dll", "b.dll", "c.dll", "d.dll", "e.dll"])?;
        let reader = FakeReader::default()
            .with("a.dll", &["b.dll", "c.dll"])
            .with("b.dll", &["d.dll"])
            .with("c.dll", &["d.dll"])
            .with("d.dll", &["e.dll"])
            .with("e.dll", &[]);

        let state = run(&reader, dir.path(), "a.dll", WalkParameters::default());
        assert_eq!(names(&state), vec!["b.dll", "c.dll", "d.dll", "e.dll"]);
        assert_eq!(reader.times_opened("d.dll"), 1);
        assert_eq!(reader.times_opened("e.dll"), 1);
        Ok(())
    }

    #[test]
    fn unresolved_modules_are_recorded_in_discovery_order() -> Result<(), CopyDepsError> {
        let dir = make_dir(&["app.exe", "lib.dll"])?;
        let reader = FakeReader::default()
            .with("app.exe", &["USER32.dll", "lib.dll", "KERNEL32.dll"])
            .with("lib.dll", &["KERNEL32.dll", "ntdll.dll"]);

        let state = run(&reader, dir.path(), "app.exe", WalkParameters::default());
        assert_eq!(names(&state), vec!["lib.dll"]);
        assert_eq!(
            state.unresolved_module_names,
            vec!["USER32.dll", "KERNEL32.dll", "ntdll.dll"]
        );
        assert!(state.processed_module_names.contains("ntdll.dll"));
        Ok(())
    }

    #[test]
    fn process_import_is_idempotent() -> Result<(), CopyDepsError> {
        let dir = make_dir(&["lib.dll"])?;
        let reader = FakeReader::default().with("lib.dll", &[]);
        let mut state = ResolutionState::new(
            SearchPath::from_dirs([dir.path()]),
            WalkParameters::default(),
        );
        let mut transcript = Transcript::sink();
        let mut walker = DependencyWalker::new(&reader, &mut state, &mut transcript);
        for _ in 0..2 {
            walker.process_import("lib.dll", 1);
            walker.process_import("gone.dll", 1);
        }

        assert_eq!(state.resolved_files.len(), 1);
        assert_eq!(state.unresolved_module_names, vec!["gone.dll"]);
        assert_eq!(reader.times_opened("lib.dll"), 1);
        Ok(())
    }

    #[test]
    fn non_recursive_stops_at_direct_imports() -> Result<(), CopyDepsError> {
        let dir = make_dir(&["app", "liba.so", "libb.so"])?;
        let reader = FakeReader::default()
            .with("app", &["liba.so"])
            .with("liba.so", &["libb.so"]);

        let parameters = WalkParameters {
            recursive: false,
            max_depth: None,
        };
        let state = run(&reader, dir.path(), "app", parameters);
        assert_eq!(names(&state), vec!["liba.so"]);
        assert_eq!(reader.times_opened("liba.so"), 0);
        Ok(())
    }

    #[test]
    fn max_depth_limits_the_walk() -> Result<(), CopyDepsError> {
        let dir = make_dir(&["app", "liba.so", "libb.so", "libc.so"])?;
        let reader = FakeReader::default()
            .with("app", &["liba.so"])
            .with("liba.so", &["libb.so"])
            .with("libb.so", &["libc.so"]);

        let parameters = WalkParameters {
            recursive: true,
            max_depth: Some(2),
        };
        let state = run(&reader, dir.path(), "app", parameters);
        assert_eq!(names(&state), vec!["liba.so", "libb.so"]);
        assert!(!state.processed_module_names.contains("libc.so"));

        let parameters = WalkParameters {
            recursive: true,
            max_depth: Some(0),
        };
        let state = run(&reader, dir.path(), "app", parameters);
        assert!(state.resolved_files.is_empty());
        Ok(())
    }

    #[test]
    fn target_resolves_without_search_path() -> Result<(), CopyDepsError> {
        let target_dir = make_dir(&["tool.exe"])?;
        let lib_dir = make_dir(&["dep.dll"])?;
        let reader = FakeReader::default()
            .with("tool.exe", &["dep.dll"])
            .with("dep.dll", &[]);

        // the target's own directory is not on the search path
        let mut state = ResolutionState::new(
            SearchPath::from_dirs([lib_dir.path()]),
            WalkParameters::default(),
        );
        let mut transcript = Transcript::sink();
        DependencyWalker::new(&reader, &mut state, &mut transcript)
            .walk(target_dir.path().join("tool.exe"));
        assert_eq!(names(&state), vec!["dep.dll"]);
        assert_eq!(reader.times_opened("tool.exe"), 1);
        Ok(())
    }

    #[test]
    fn missing_target_is_not_fatal() -> Result<(), CopyDepsError> {
        let dir = make_dir(&[])?;
        let reader = FakeReader::default();
        let state = run(&reader, dir.path(), "ghost.exe", WalkParameters::default());
        assert!(state.resolved_files.is_empty());
        assert!(state.processed_module_names.is_empty());
        assert!(reader.opened.borrow().is_empty());
        Ok(())
    }

    #[test]
    fn transcript_separates_found_and_unresolved_modules() -> Result<(), CopyDepsError> {
        let dir = make_dir(&["app", "libfound.so"])?;
        let reader = FakeReader::default()
            .with("app", &["libfound.so", "libgone.so"])
            .with("libfound.so", &[]);
        let mut state = ResolutionState::new(
            SearchPath::from_dirs([dir.path()]),
            WalkParameters::default(),
        );
        let (mut transcript, out, err) = buffered();
        {
            let mut walker = DependencyWalker::new(&reader, &mut state, &mut transcript);
            walker.walk(dir.path().join("app"));
            walker.walk(dir.path().join("ghost"));
        }

        assert_eq!(out.lines(), vec!["libfound.so", "libgone.so"]);
        assert_eq!(
            err.lines(),
            vec![
                "libgone.so".to_owned(),
                format!(
                    "Error: unable to locate {} in PATH",
                    dir.path().join("ghost").display()
                ),
            ]
        );
        Ok(())
    }
}
