//! Value types for modules and the imports between them.
//!
//! A [`Module`] is a dotted hierarchical name such as `mypackage.foo.bar`.
//! Hierarchy is never stored: ancestry is computed from the name segments, so
//! `mypackage` is an ancestor of `mypackage.foo.bar` whether or not either is
//! known to any graph.

use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A validated dotted module name.
///
/// Equality, ordering and hashing all use the normalized string, so a
/// `HashMap<Module, _>` can be queried with a plain `&str`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Module(String);

impl Module {
    /// Create a module from a dotted name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidModuleName`] if the name is empty or contains an
    /// empty segment (`"a..b"`, `".a"`, `"a."`).
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() || name.split('.').any(str::is_empty) {
            return Err(Error::InvalidModuleName(name));
        }
        Ok(Self(name))
    }

    /// The full dotted name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Iterate over the name segments.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('.')
    }

    /// Number of segments in the name.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.segments().count()
    }

    /// The module one level up, or `None` for a top-level module.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        self.0
            .rsplit_once('.')
            .map(|(parent, _)| Self(parent.to_string()))
    }

    /// The top-level package this module belongs to.
    #[must_use]
    pub fn root(&self) -> Self {
        Self(self.package_name().to_string())
    }

    /// Name of the top-level package this module belongs to.
    #[must_use]
    pub fn package_name(&self) -> &str {
        self.0.split('.').next().unwrap_or(&self.0)
    }

    /// A direct child of this module.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidModuleName`] if `name` is not a single valid segment.
    pub fn child(&self, name: &str) -> Result<Self> {
        if name.is_empty() || name.contains('.') {
            return Err(Error::InvalidModuleName(format!("{}.{name}", self.0)));
        }
        Ok(Self(format!("{}.{name}", self.0)))
    }

    /// True if `self` sits exactly one level beneath `other`.
    #[must_use]
    pub fn is_child_of(&self, other: &Self) -> bool {
        self.parent().as_ref() == Some(other)
    }

    /// True if `self` sits anywhere beneath `other`.
    #[must_use]
    pub fn is_descendant_of(&self, other: &Self) -> bool {
        is_descendant_name(&self.0, &other.0)
    }

    /// True if `other` sits anywhere beneath `self`.
    #[must_use]
    pub fn is_ancestor_of(&self, other: &Self) -> bool {
        other.is_descendant_of(self)
    }

    /// True if either module contains the other, or they are the same module.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self == other || self.is_descendant_of(other) || other.is_descendant_of(self)
    }
}

/// Name-level descendant test: `name` starts with `ancestor` followed by a dot.
pub(crate) fn is_descendant_name(name: &str, ancestor: &str) -> bool {
    name.len() > ancestor.len()
        && name.starts_with(ancestor)
        && name.as_bytes()[ancestor.len()] == b'.'
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Module {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for Module {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<&str> for Module {
    type Error = Error;

    fn try_from(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl From<Module> for String {
    fn from(module: Module) -> Self {
        module.0
    }
}

impl AsRef<str> for Module {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Module {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// One textual import occurrence between two modules.
///
/// Several records may describe the same `(importer, imported)` pair, for
/// example when a module imports the same name on two lines.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DirectImport {
    /// Module containing the import statement
    pub importer: Module,
    /// Module being imported
    pub imported: Module,
    /// 1-based line of the statement, if known
    pub line_number: Option<u32>,
    /// Stripped text of the statement's first line, if known
    pub line_contents: Option<String>,
}

impl DirectImport {
    /// Create an import record with source location.
    #[must_use]
    pub fn new(
        importer: Module,
        imported: Module,
        line_number: u32,
        line_contents: impl Into<String>,
    ) -> Self {
        Self {
            importer,
            imported,
            line_number: Some(line_number),
            line_contents: Some(line_contents.into()),
        }
    }
}

impl fmt::Display for DirectImport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.importer, self.imported)?;
        if let Some(line) = self.line_number {
            write!(f, " (l. {line})")?;
        }
        Ok(())
    }
}
