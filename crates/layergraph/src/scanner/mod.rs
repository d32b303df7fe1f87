//! Extracting direct imports from module source files.
//!
//! Scanning happens in two steps:
//!
//! 1. **Extraction** (`python`): tree-sitter finds every import statement
//!    and yields the raw imported object names (`.sibling`, `pkg.mod.func`,
//!    `pkg.mod.*`) with their line numbers.
//! 2. **Resolution** (`resolve`): relative names become absolute, and each
//!    object is mapped to the internal module that defines it, or to a
//!    distilled external package name.
//!
//! Objects that resolve to nothing (a missing internal module, or an external
//! import when external packages are excluded) are dropped.

mod python;
mod resolve;

pub use python::PythonImportScanner;

use std::collections::HashSet;
use std::path::Path;

use crate::error::{Error, Result};
use crate::finder::{FoundPackage, ModuleFile};
use crate::module::{DirectImport, Module};

/// Everything a scanner needs to know about the build beyond a single file.
#[derive(Debug, Clone)]
pub struct ScanContext {
    /// Names of the top-level packages being analyzed
    pub package_names: Vec<Module>,
    /// Every internal module across all found packages
    pub modules: HashSet<Module>,
    /// Whether external imports become squashed nodes
    pub include_external_packages: bool,
    /// Whether imports guarded by `if TYPE_CHECKING:` are dropped
    pub exclude_type_checking_imports: bool,
}

impl ScanContext {
    /// Build a context from the packages being analyzed.
    #[must_use]
    pub fn new(
        found_packages: &[FoundPackage],
        include_external_packages: bool,
        exclude_type_checking_imports: bool,
    ) -> Self {
        Self {
            package_names: found_packages.iter().map(|p| p.name.clone()).collect(),
            modules: found_packages
                .iter()
                .flat_map(FoundPackage::modules)
                .cloned()
                .collect(),
            include_external_packages,
            exclude_type_checking_imports,
        }
    }
}

/// Extracts the direct imports of one module file.
///
/// Implementations are shared across worker threads and must not keep
/// per-file mutable state.
pub trait ImportScanner: Send + Sync {
    /// Return the imports made by `module_file`, whose contents are `source`.
    ///
    /// The importer of every returned record is `module_file.module`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SourceSyntax`] if the source cannot be parsed.
    fn scan_for_imports(
        &self,
        module_file: &ModuleFile,
        source: &str,
        context: &ScanContext,
    ) -> Result<Vec<DirectImport>>;
}

/// Read a source file as UTF-8.
///
/// # Errors
///
/// Returns [`Error::Io`] if the file cannot be read, or [`Error::Encoding`] if
/// it is not valid UTF-8.
pub fn read_source(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;
    String::from_utf8(bytes).map_err(|_| Error::Encoding {
        path: path.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn found(name: &str, modules: &[&str]) -> FoundPackage {
        FoundPackage {
            name: Module::new(name).expect("valid name"),
            directory: PathBuf::from(name),
            module_files: modules
                .iter()
                .map(|m| ModuleFile {
                    module: Module::new(*m).expect("valid name"),
                    path: PathBuf::from(format!("{m}.py")),
                    mtime_ns: 1,
                })
                .collect(),
        }
    }

    #[test]
    fn context_collects_modules_across_packages() {
        let context = ScanContext::new(
            &[found("blue", &["blue", "blue.one"]), found("green", &["green"])],
            true,
            false,
        );
        assert_eq!(context.package_names.len(), 2);
        assert_eq!(context.modules.len(), 3);
        assert!(context.modules.contains("blue.one"));
    }

    #[test]
    fn read_source_rejects_invalid_utf8() {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let path = dir.path().join("latin1.py");
        std::fs::write(&path, b"name = '\xe9'\n").expect("failed to write file");
        assert!(matches!(read_source(&path), Err(Error::Encoding { .. })));
    }
}
