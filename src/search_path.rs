use crate::common::CopyDepsError;
use fs_err as fs;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Directory to be searched, and where it came from
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum SearchPathEntry {
    /// Directory containing a binary found while scanning the target directory
    ScannedDir(PathBuf),
    /// Directory given by the user
    UserDir(PathBuf),
}

impl SearchPathEntry {
    pub fn path(&self) -> &Path {
        match self {
            Self::ScannedDir(p) | Self::UserDir(p) => p,
        }
    }
}

/// Sorted list of directories to be looked up when searching for a module
#[derive(Debug, Default)]
pub struct SearchPath {
    pub entries: Vec<SearchPathEntry>,
    case_insensitive: bool,
    fs_cache: std::cell::RefCell<DirectoryCache>,
}

impl SearchPath {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_dirs<I, P>(dirs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let mut ret = Self::new();
        for d in dirs {
            ret.push(SearchPathEntry::UserDir(d.into()));
        }
        ret
    }

    /// Match module names against directory entries ignoring case
    pub fn case_insensitive(mut self, on: bool) -> Self {
        self.case_insensitive = on;
        self
    }

    /// Append an entry, unless the same directory is already listed
    pub fn push(&mut self, entry: SearchPathEntry) {
        if !self.entries.iter().any(|e| e.path() == entry.path()) {
            self.entries.push(entry);
        }
    }

    // linearize into a single vector of directories
    pub fn dirs(&self) -> Vec<PathBuf> {
        self.entries.iter().map(|e| e.path().to_owned()).collect()
    }

    /// Find the file a module name refers to
    ///
    /// A name that is itself the path of an existing file resolves to itself; otherwise the
    /// directories are tried in order and the first regular file found wins.
    pub fn resolve<P: AsRef<Path>>(&self, name: P) -> Option<PathBuf> {
        let name = name.as_ref();
        if name.is_file() {
            return Some(name.to_owned());
        }
        self.entries
            .iter()
            .find_map(|e| self.search_file_in_folder(name, e.path()))
    }

    fn search_file_in_folder(&self, name: &Path, folder: &Path) -> Option<PathBuf> {
        let candidate = folder.join(name);
        if candidate.is_file() {
            return Some(candidate);
        }
        if self.case_insensitive {
            // unreadable directories just don't match
            return self
                .fs_cache
                .borrow_mut()
                .test_file_in_folder_case_insensitive(name, folder)
                .unwrap_or(None);
        }
        None
    }
}

/// Caches the content of already scanned directories, to avoid repeated expensive filesystem access
#[derive(Debug, Default)]
pub(crate) struct DirectoryCache {
    files_in_dirs: HashMap<PathBuf, HashMap<String, PathBuf>>,
}

impl DirectoryCache {
    pub(crate) fn test_file_in_folder_case_insensitive<P: AsRef<Path>, Q: AsRef<Path>>(
        &mut self,
        filename: P,
        folder: Q,
    ) -> Result<Option<PathBuf>, CopyDepsError> {
        let folder = folder.as_ref();
        let filename = filename.as_ref().to_str().ok_or_else(|| {
            CopyDepsError::ScanError(format!("Invalid file name {:?}", filename.as_ref()))
        })?;
        if !self.files_in_dirs.contains_key(folder) {
            self.scan_folder(folder)?;
        }
        let dir = self.files_in_dirs.get(folder).ok_or_else(|| {
            CopyDepsError::ScanError(format!("Could not scan directory {:?}", folder))
        })?;
        Ok(dir.get(&filename.to_lowercase()).map(|p| folder.join(p)))
    }

    fn scan_folder(&mut self, folder: &Path) -> Result<(), CopyDepsError> {
        if let std::collections::hash_map::Entry::Vacant(e) =
            self.files_in_dirs.entry(folder.to_owned())
        {
            let matching_entries: HashMap<String, PathBuf> = fs::read_dir(folder)?
                .filter_map(|entry| entry.ok())
                .filter(|entry| entry.metadata().map_or_else(|_| false, |m| m.is_file()))
                .filter_map(|entry| {
                    entry
                        .file_name()
                        .to_str()
                        .map(|s| (s.to_lowercase(), entry.file_name().into()))
                })
                .collect();
            e.insert(matching_entries);
        }
        Ok(())
    }
}
