//! Locating packages and their module files on disk.
//!
//! A top-level package is found by searching each configured search path for
//! a directory with an `__init__.py`. Its module files are then collected by
//! walking that directory:
//!
//! - directories without an `__init__.py` are skipped along with everything
//!   beneath them
//! - hidden directories and hidden files are skipped
//! - file names with more than one dot (`some.module.py`) are skipped with a
//!   warning, since they cannot be imported
//! - only `.py` files become modules
//!
//! Entries are visited in name order so repeated walks produce the same
//! module order.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::module::Module;

const INIT_FILE: &str = "__init__.py";
const SOURCE_EXTENSION: &str = "py";

/// One module's source file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModuleFile {
    /// Module defined by the file
    pub module: Module,
    /// Path to the source file
    pub path: PathBuf,
    /// File modification time in nanoseconds since Unix epoch
    pub mtime_ns: i64,
}

impl ModuleFile {
    /// True if the file is a package's `__init__.py`.
    #[must_use]
    pub fn is_package(&self) -> bool {
        self.path.file_name().is_some_and(|name| name == INIT_FILE)
    }
}

/// A top-level package and every module file beneath it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoundPackage {
    /// Importable name of the package (may be a namespace portion like `a.b`)
    pub name: Module,
    /// Directory containing the package's `__init__.py`
    pub directory: PathBuf,
    /// Module files in walk order
    pub module_files: Vec<ModuleFile>,
}

impl FoundPackage {
    /// Modules defined by this package.
    pub fn modules(&self) -> impl Iterator<Item = &Module> {
        self.module_files.iter().map(|file| &file.module)
    }
}

/// Discovers the module files of a top-level package.
pub trait ModuleFinder: Send + Sync {
    /// Find a package by name and list its module files.
    ///
    /// # Errors
    ///
    /// Returns an error if the package cannot be located or read.
    fn find_package(&self, package_name: &Module) -> Result<FoundPackage>;
}

/// [`ModuleFinder`] over the local file system.
#[derive(Debug, Clone)]
pub struct FsModuleFinder {
    search_paths: Vec<PathBuf>,
}

impl FsModuleFinder {
    /// Create a finder that searches the given directories in order.
    ///
    /// An empty list searches the current directory.
    #[must_use]
    pub fn new(search_paths: Vec<PathBuf>) -> Self {
        let search_paths = if search_paths.is_empty() {
            vec![PathBuf::from(".")]
        } else {
            search_paths
        };
        Self { search_paths }
    }

    /// Directory holding the named package's `__init__.py`.
    ///
    /// The first search path containing a regular package wins.
    ///
    /// # Errors
    ///
    /// - [`Error::NotATopLevelModule`] if the name is a plain module, or its
    ///   parent is itself a regular package
    /// - [`Error::NamespacePackageEncountered`] if only directories without an
    ///   `__init__.py` match
    /// - [`Error::PackageNotFound`] if nothing matches
    pub fn determine_package_directory(&self, package_name: &Module) -> Result<PathBuf> {
        let mut namespace_found = false;

        for search_path in &self.search_paths {
            let candidate = package_name
                .segments()
                .fold(search_path.clone(), |dir, segment| dir.join(segment));

            if candidate.join(INIT_FILE).is_file() {
                if has_regular_parent(search_path, package_name) {
                    return Err(Error::NotATopLevelModule(package_name.to_string()));
                }
                return Ok(candidate);
            }
            if candidate.with_extension(SOURCE_EXTENSION).is_file() {
                return Err(Error::NotATopLevelModule(package_name.to_string()));
            }
            if candidate.is_dir() {
                namespace_found = true;
            }
        }

        debug!(
            package = %package_name,
            search_paths = ?self.search_paths,
            "Package not found on search paths"
        );
        if namespace_found {
            Err(Error::NamespacePackageEncountered(package_name.to_string()))
        } else {
            Err(Error::PackageNotFound(package_name.to_string()))
        }
    }

    fn walk_dir(
        &self,
        package_name: &Module,
        package_dir: &Path,
        dir: &Path,
        files: &mut Vec<ModuleFile>,
    ) -> Result<()> {
        let mut entries: Vec<PathBuf> = match fs::read_dir(dir) {
            Ok(entries) => entries
                .filter_map(|entry| match entry {
                    Ok(e) => Some(e.path()),
                    Err(e) => {
                        warn!(
                            directory = %dir.display(),
                            error = %e,
                            "Failed to read directory entry, skipping"
                        );
                        None
                    }
                })
                .collect(),
            Err(e) if dir == package_dir => return Err(e.into()),
            Err(e) => {
                warn!(
                    directory = %dir.display(),
                    error = %e,
                    "Cannot read directory, skipping"
                );
                return Ok(());
            }
        };
        entries.sort();

        // Not a regular package: nothing here or below is importable.
        if !entries.iter().any(|p| p.file_name().is_some_and(|n| n == INIT_FILE)) {
            return Ok(());
        }

        for path in entries {
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }

            if path.is_dir() {
                self.walk_dir(package_name, package_dir, &path, files)?;
            } else if path.is_file() && is_python_file(name, dir) {
                let module = module_name_from_path(package_name, package_dir, &path)?;
                let mtime_ns = file_mtime_ns(&path)?;
                files.push(ModuleFile {
                    module,
                    path,
                    mtime_ns,
                });
            }
        }

        Ok(())
    }
}

impl ModuleFinder for FsModuleFinder {
    fn find_package(&self, package_name: &Module) -> Result<FoundPackage> {
        let directory = self.determine_package_directory(package_name)?;
        let mut module_files = Vec::new();
        self.walk_dir(package_name, &directory, &directory, &mut module_files)?;

        debug!(
            package = %package_name,
            directory = %directory.display(),
            modules = module_files.len(),
            "Found package"
        );

        Ok(FoundPackage {
            name: package_name.clone(),
            directory,
            module_files,
        })
    }
}

fn has_regular_parent(search_path: &Path, package_name: &Module) -> bool {
    package_name.parent().is_some_and(|parent| {
        parent
            .segments()
            .fold(search_path.to_path_buf(), |dir, segment| dir.join(segment))
            .join(INIT_FILE)
            .is_file()
    })
}

fn is_python_file(file_name: &str, dir: &Path) -> bool {
    if file_name.matches('.').count() > 1 {
        warn!(
            directory = %dir.display(),
            file = file_name,
            "Skipping module with too many dots in the name"
        );
        return false;
    }
    Path::new(file_name)
        .extension()
        .is_some_and(|ext| ext == SOURCE_EXTENSION)
}

/// Module name for a source file: the package name followed by the path
/// components beneath the package directory, minus any trailing `__init__`.
fn module_name_from_path(package_name: &Module, package_dir: &Path, path: &Path) -> Result<Module> {
    let relative = path.strip_prefix(package_dir).map_err(|_| {
        Error::InvalidArgument(format!(
            "{} is outside package directory {}",
            path.display(),
            package_dir.display()
        ))
    })?;

    let mut name = package_name.to_string();
    for component in relative.with_extension("").components() {
        let segment = component.as_os_str().to_string_lossy();
        if segment == "__init__" {
            continue;
        }
        name.push('.');
        name.push_str(&segment);
    }
    Module::new(name)
}

fn file_mtime_ns(path: &Path) -> Result<i64> {
    let metadata = fs::metadata(path)?;
    #[allow(clippy::cast_possible_truncation)] // Nanoseconds fit in i64 for centuries
    let mtime_ns = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map_or(0, |d| d.as_nanos() as i64);
    Ok(mtime_ns)
}
