//! Wildcard expressions over dotted module names.
//!
//! A module expression is a dotted name where a whole segment may be:
//!
//! - `*`, standing in for exactly one segment
//! - `**`, standing in for one or more segments
//!
//! | Expression | Matches | Does not match |
//! |------------|---------|----------------|
//! | `pkg.*` | `pkg.foo` | `pkg.foo.bar` |
//! | `pkg.*.baz` | `pkg.foo.baz` | `pkg.foo.bar.baz` |
//! | `pkg.**` | `pkg.foo`, `pkg.foo.bar` | `pkg` |
//! | `pkg.**.qux` | `pkg.foo.qux`, `pkg.foo.bar.qux` | `pkg.qux` |
//!
//! Partial wildcards such as `pkg.foo*` are rejected.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use petgraph::Direction;

use super::ImportGraph;
use crate::error::{Error, Result};
use crate::module::Module;

/// Separator between the importer and imported halves of an import expression.
const IMPORT_ARROW: &str = " -> ";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Name(String),
    One,
    OneOrMore,
}

/// A parsed module expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleExpression {
    source: String,
    segments: Vec<Segment>,
}

impl ModuleExpression {
    /// Whether `module` is matched by this expression.
    #[must_use]
    pub fn is_match(&self, module: &Module) -> bool {
        let names: Vec<&str> = module.segments().collect();
        matches(&self.segments, &names)
    }
}

fn matches(pattern: &[Segment], names: &[&str]) -> bool {
    match (pattern.split_first(), names.split_first()) {
        (None, None) => true,
        (None, Some(_)) | (Some(_), None) => false,
        (Some((Segment::Name(expected), rest)), Some((name, names))) => {
            expected.as_str() == *name && matches(rest, names)
        }
        (Some((Segment::One, rest)), Some((_, names))) => matches(rest, names),
        (Some((Segment::OneOrMore, rest)), Some(_)) => {
            (1..=names.len()).any(|taken| matches(rest, &names[taken..]))
        }
    }
}

impl FromStr for ModuleExpression {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidModuleExpression(s.to_string());
        let mut segments = Vec::new();
        for part in s.split('.') {
            let segment = match part {
                "" => return Err(invalid()),
                "*" => Segment::One,
                "**" => Segment::OneOrMore,
                name if name.contains('*') => return Err(invalid()),
                name => Segment::Name(name.to_string()),
            };
            if segment == Segment::OneOrMore && segments.last() == Some(&Segment::OneOrMore) {
                return Err(invalid());
            }
            segments.push(segment);
        }
        Ok(Self {
            source: s.to_string(),
            segments,
        })
    }
}

impl fmt::Display for ModuleExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl ImportGraph {
    /// Modules whose names match a module expression.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidModuleExpression`] if the expression is malformed.
    pub fn find_matching_modules(&self, expression: &str) -> Result<BTreeSet<Module>> {
        let expression: ModuleExpression = expression.parse()?;
        Ok(self
            .node_map
            .keys()
            .filter(|module| expression.is_match(module))
            .cloned()
            .collect())
    }

    /// Direct imports matching an expression of the form
    /// `"importer_expression -> imported_expression"`, sorted by importer and
    /// then imported.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidImportExpression`] if there is no ` -> `
    /// separator or either half is not a valid module expression.
    pub fn find_matching_direct_imports(&self, expression: &str) -> Result<Vec<(Module, Module)>> {
        let invalid = || Error::InvalidImportExpression(expression.to_string());
        let (importer, imported) = expression.split_once(IMPORT_ARROW).ok_or_else(invalid)?;
        let importer: ModuleExpression = importer.parse().map_err(|_| invalid())?;
        let imported: ModuleExpression = imported.parse().map_err(|_| invalid())?;

        let mut found = BTreeSet::new();
        for (module, &ix) in &self.node_map {
            if !importer.is_match(module) {
                continue;
            }
            for next in self.graph.neighbors_directed(ix, Direction::Outgoing) {
                let target = self.module_at(next);
                if imported.is_match(target) {
                    found.insert((module.clone(), target.clone()));
                }
            }
        }
        Ok(found.into_iter().collect())
    }
}
