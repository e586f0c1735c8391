//! Import table access for native binaries through the goblin and pelite libraries

use crate::common::CopyDepsError;
use fs_err as fs;
use goblin::mach::Mach;
use goblin::Object;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A module referenced by the import table of a binary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportedModule {
    /// Name as it appears in the import table
    pub name: String,
    /// Symbols imported from this module, when the container records them
    pub symbols: Vec<String>,
}

impl ImportedModule {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            symbols: Vec::new(),
        }
    }
}

/// An opened native binary
///
/// The file content is read and parsed when the handle is created, so no OS file handle outlives
/// `ImportReader::open`. The imports can be consumed only once.
#[derive(Debug)]
pub struct BinaryHandle {
    path: PathBuf,
    imports: Vec<ImportedModule>,
}

impl BinaryHandle {
    pub fn new<P: AsRef<Path>>(path: P, imports: Vec<ImportedModule>) -> Self {
        Self {
            path: path.as_ref().to_owned(),
            imports,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Imported modules, in import table order
    pub fn imports(self) -> std::vec::IntoIter<ImportedModule> {
        self.imports.into_iter()
    }
}

/// Opens binaries and enumerates their imports
pub trait ImportReader {
    /// Returns `Ok(None)` if the file is not a native binary
    fn open(&self, path: &Path) -> Result<Option<BinaryHandle>, CopyDepsError>;

    /// Open the file only to test whether it is a native binary
    fn is_binary(&self, path: &Path) -> bool {
        matches!(self.open(path), Ok(Some(_)))
    }
}

/// Reader for the executable formats goblin understands (PE, ELF, Mach-O)
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeImportReader;

impl ImportReader for NativeImportReader {
    fn open(&self, path: &Path) -> Result<Option<BinaryHandle>, CopyDepsError> {
        let content = fs::read(path)?;
        Ok(read_imported_modules(&content)?.map(|imports| BinaryHandle::new(path, imports)))
    }

    /// Only files starting with a PE, ELF or Mach-O signature are read in full
    fn is_binary(&self, path: &Path) -> bool {
        has_binary_magic(path) && matches!(self.open(path), Ok(Some(_)))
    }
}

const BINARY_MAGICS: &[&[u8]] = &[
    b"MZ",
    b"\x7fELF",
    // Mach-O 32/64 bit, both byte orders
    &[0xfe, 0xed, 0xfa, 0xce],
    &[0xfe, 0xed, 0xfa, 0xcf],
    &[0xce, 0xfa, 0xed, 0xfe],
    &[0xcf, 0xfa, 0xed, 0xfe],
    // fat Mach-O
    &[0xca, 0xfe, 0xba, 0xbe],
    &[0xbe, 0xba, 0xfe, 0xca],
];

/// Whether the first bytes of the file carry the signature of a supported container
pub fn has_binary_magic(path: &Path) -> bool {
    let mut head = Vec::with_capacity(4);
    let read = fs::File::open(path).and_then(|f| f.take(4).read_to_end(&mut head));
    if let Err(e) = read {
        debug!("could not read {}: {}", path.display(), e);
        return false;
    }
    BINARY_MAGICS.iter().any(|magic| head.starts_with(magic))
}

/// Parse the import table of an in-memory binary
pub fn read_imported_modules(content: &[u8]) -> Result<Option<Vec<ImportedModule>>, CopyDepsError> {
    match Object::parse(content) {
        Ok(Object::PE(pe)) => Ok(Some(pe_imports(&pe))),
        Ok(Object::Elf(elf)) => Ok(Some(
            elf.libraries.iter().map(|&l| ImportedModule::new(l)).collect(),
        )),
        Ok(Object::Mach(Mach::Binary(macho))) => Ok(Some(macho_imports(&macho))),
        Ok(Object::Mach(Mach::Fat(fat))) => match fat.get(0) {
            Ok(goblin::mach::SingleArch::MachO(macho)) => Ok(Some(macho_imports(&macho))),
            _ => Ok(None),
        },
        Ok(_) => Ok(None),
        // goblin is stricter than the loader on some PE files
        Err(e) if content.starts_with(b"MZ") => match pelite_imports(content) {
            Ok(imports) => Ok(Some(imports)),
            Err(pe_err) => {
                debug!("not a PE file: {} / {}", e, pe_err);
                Ok(None)
            }
        },
        Err(e) => {
            debug!("not a native binary: {}", e);
            Ok(None)
        }
    }
}

fn pe_imports(pe: &goblin::pe::PE) -> Vec<ImportedModule> {
    let symbols: multimap::MultiMap<&str, &str> = pe
        .imports
        .iter()
        .map(|i| (i.dll, i.name.as_ref()))
        .collect();

    pe.libraries
        .iter()
        .map(|&lib| ImportedModule {
            name: lib.to_owned(),
            symbols: symbols
                .get_vec(lib)
                .map(|v| v.iter().map(ToString::to_string).collect())
                .unwrap_or_default(),
        })
        .collect()
}

fn macho_imports(macho: &goblin::mach::MachO) -> Vec<ImportedModule> {
    let symbols: multimap::MultiMap<&str, &str> = macho
        .imports()
        .map(|imports| imports.iter().map(|i| (i.dylib, i.name)).collect())
        .unwrap_or_default();

    // libs[0] is the binary itself
    macho
        .libs
        .iter()
        .filter(|&&l| l != "self")
        .map(|&lib| ImportedModule {
            name: lib.to_owned(),
            symbols: symbols
                .get_vec(lib)
                .map(|v| v.iter().map(ToString::to_string).collect())
                .unwrap_or_default(),
        })
        .collect()
}

// pe32 and pe64 are separate types in pelite, so the reader is stamped out once per width
macro_rules! pelite_imports_for {
    ($name:ident, $pe:ident) => {
        fn $name(content: &[u8]) -> Result<Vec<ImportedModule>, CopyDepsError> {
            use pelite::$pe::imports::Import;
            use pelite::$pe::{Pe, PeFile};

            let pefile = PeFile::from_bytes(content)?;
            let imports = match pefile.imports() {
                Ok(imports) => imports,
                // no import directory
                Err(pelite::Error::Null) => return Ok(Vec::new()),
                Err(e) => return Err(e.into()),
            };

            let mut ret = Vec::new();
            for desc in imports.iter() {
                let symbols = desc
                    .int()?
                    .filter_map(|imp| match imp {
                        Ok(Import::ByName { hint: _, name }) => Some(name.to_string()),
                        // nothing to name
                        Ok(Import::ByOrdinal { ord: _ }) => None,
                        Err(err) => {
                            debug!("Error parsing import: {err}");
                            None
                        }
                    })
                    .collect();
                ret.push(ImportedModule {
                    name: desc.dll_name()?.to_string(),
                    symbols,
                });
            }

            Ok(ret)
        }
    };
}

pelite_imports_for!(pelite_imports64, pe64);
pelite_imports_for!(pelite_imports32, pe32);

fn pelite_imports(content: &[u8]) -> Result<Vec<ImportedModule>, CopyDepsError> {
    match pelite_imports64(content) {
        Err(CopyDepsError::PEError(pelite::Error::PeMagic)) => pelite_imports32(content),
        r => r,
    }
}
