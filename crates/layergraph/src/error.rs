//! Error types for layergraph operations.
//!
//! Errors fall into four groups:
//!
//! - **Not found**: a module is absent from the graph, or a package cannot be
//!   located on the search paths
//! - **Invalid operation**: a query that is ill-formed for its arguments, such
//!   as asking for the children of a squashed module
//! - **Argument errors**: malformed module or package names
//! - **Infrastructure**: I/O, JSON and parser failures, propagated unchanged
//!
//! ## Propagation
//!
//! Every error is returned synchronously to the caller of the operation that
//! detected it. Nothing is retried. A single file that fails to scan aborts the
//! whole build, since a partial graph would understate real dependencies.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for layergraph operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for layergraph operations.
#[derive(Debug, Error)]
pub enum Error {
    // === Not found ===
    /// The named module is not a node in the graph
    #[error("\"{0}\" not present in the graph")]
    ModuleNotPresent(String),

    /// No top-level package with this name exists on the search paths
    #[error("could not find package \"{0}\" in the search paths")]
    PackageNotFound(String),

    /// The package is a namespace package (a directory without `__init__.py`)
    #[error(
        "package \"{0}\" is a namespace package; specify the portion name instead, \
         or add an __init__.py file"
    )]
    NamespacePackageEncountered(String),

    /// The name refers to a module or subpackage rather than a top-level package
    #[error("\"{0}\" is not a top-level package")]
    NotATopLevelModule(String),

    /// A layer container is not a module in the graph
    #[error("container \"{0}\" does not exist")]
    NoSuchContainer(String),

    // === Invalid operations ===
    /// Children were requested for a squashed module
    #[error("cannot find children of squashed module \"{0}\"")]
    SquashedModuleHasNoChildren(String),

    /// Descendants were requested for a squashed module
    #[error("cannot find descendants of squashed module \"{0}\"")]
    SquashedModuleHasNoDescendants(String),

    /// A module was re-added with a different squash flag
    #[error(
        "cannot add \"{0}\" as a squashed module when it is already present as an \
         unsquashed module, or vice versa"
    )]
    SquashConflict(String),

    /// A module was added beneath a squashed module
    #[error("\"{module}\" is a descendant of squashed module \"{squashed}\"")]
    DescendantOfSquashedModule {
        /// Module being added
        module: String,
        /// Squashed ancestor already in the graph
        squashed: String,
    },

    /// A squashed module was added while descendants of it are already known
    #[error("cannot squash \"{0}\": descendants of it are already in the graph")]
    SquashedModuleWithDescendants(String),

    /// Package-level query where one argument contains the other
    #[error("modules have shared descendants: \"{importer}\" and \"{imported}\"")]
    SharedDescendants {
        /// Importer argument
        importer: String,
        /// Imported argument
        imported: String,
    },

    /// A removed API shape was called
    #[error("{operation} is no longer supported, use {replacement} instead")]
    Unsupported {
        /// Operation that was called
        operation: &'static str,
        /// Operation to call instead
        replacement: &'static str,
    },

    // === Argument errors ===
    /// A dotted module name is empty or has an empty segment
    #[error("invalid module name: \"{0}\"")]
    InvalidModuleName(String),

    /// An argument failed validation
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A module expression has an empty segment or a partial wildcard
    #[error("\"{0}\" is not a valid module expression")]
    InvalidModuleExpression(String),

    /// An import expression is not two module expressions joined by `" -> "`
    #[error("\"{0}\" is not a valid import expression")]
    InvalidImportExpression(String),

    /// An options file could not be parsed
    #[error("configuration error: {0}")]
    Config(String),

    // === Source problems ===
    /// A scanned file is not valid Python syntax
    #[error("syntax error in {}, line {line}: {text}", path.display())]
    SourceSyntax {
        /// File that failed to parse
        path: PathBuf,
        /// 1-based line of the first error
        line: u32,
        /// Stripped contents of that line
        text: String,
    },

    /// A scanned file is not valid UTF-8
    #[error("{} is not valid UTF-8", path.display())]
    Encoding {
        /// File that failed to decode
        path: PathBuf,
    },

    // === Infrastructure ===
    /// Tree-sitter parsing infrastructure failed
    #[error("parser error: {0}")]
    Parser(String),

    /// File system operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a not-present error for a module name.
    #[must_use]
    pub fn module_not_present(name: impl Into<String>) -> Self {
        Self::ModuleNotPresent(name.into())
    }

    /// Create a shared-descendants error for a pair of modules.
    #[must_use]
    pub fn shared_descendants(importer: impl Into<String>, imported: impl Into<String>) -> Self {
        Self::SharedDescendants {
            importer: importer.into(),
            imported: imported.into(),
        }
    }

    /// Returns `true` if this error means something could not be found.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::ModuleNotPresent(_) | Self::PackageNotFound(_) | Self::NoSuchContainer(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_not_present_names_module() {
        let err = Error::module_not_present("mypackage.foo");
        assert_eq!(err.to_string(), "\"mypackage.foo\" not present in the graph");
        assert!(err.is_not_found());
    }

    #[test]
    fn unsupported_points_at_replacement() {
        let err = Error::Unsupported {
            operation: "find_all_simple_chains",
            replacement: "find_shortest_chains",
        };
        assert_eq!(
            err.to_string(),
            "find_all_simple_chains is no longer supported, use find_shortest_chains instead"
        );
        assert!(!err.is_not_found());
    }

    #[test]
    fn missing_container_is_not_found() {
        let err = Error::NoSuchContainer("one".to_string());
        assert_eq!(err.to_string(), "container \"one\" does not exist");
        assert!(err.is_not_found());
    }

    #[test]
    fn source_syntax_includes_location() {
        let err = Error::SourceSyntax {
            path: PathBuf::from("pkg/foo.py"),
            line: 3,
            text: "import".to_string(),
        };
        assert_eq!(err.to_string(), "syntax error in pkg/foo.py, line 3: import");
    }

    #[test]
    fn io_errors_convert() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
