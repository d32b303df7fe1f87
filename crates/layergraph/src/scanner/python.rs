//! Python import extraction using tree-sitter-python.

// Tree-sitter returns usize for positions, but we store u32 for compactness.
// This is safe for practical source files (no file has 4 billion lines).
#![allow(clippy::cast_possible_truncation)]

use std::collections::HashSet;
use std::path::Path;

use tracing::trace;

use super::resolve::{absolute_object_name, distill_external_module, internal_module};
use super::{ImportScanner, ScanContext};
use crate::error::{Error, Result};
use crate::finder::ModuleFile;
use crate::module::DirectImport;

/// Tree-sitter node kind constants for the Python grammar.
mod node_kinds {
    // Statements
    pub const IMPORT_STATEMENT: &str = "import_statement";
    pub const IMPORT_FROM_STATEMENT: &str = "import_from_statement";
    pub const FUTURE_IMPORT_STATEMENT: &str = "future_import_statement";
    pub const IF_STATEMENT: &str = "if_statement";

    // Import parts
    pub const DOTTED_NAME: &str = "dotted_name";
    pub const ALIASED_IMPORT: &str = "aliased_import";
    pub const RELATIVE_IMPORT: &str = "relative_import";
    pub const IMPORT_PREFIX: &str = "import_prefix";
    pub const WILDCARD_IMPORT: &str = "wildcard_import";

    // Expressions
    pub const IDENTIFIER: &str = "identifier";
    pub const ATTRIBUTE: &str = "attribute";
}

const TYPE_CHECKING: &str = "TYPE_CHECKING";
const FUTURE_MODULE: &str = "__future__";

/// An imported object as written in the source, before resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct ImportedObject {
    /// Dotted name, with leading dots for relative imports
    pub(super) name: String,
    pub(super) line_number: u32,
    pub(super) line_contents: String,
    /// True if the import sits under an `if TYPE_CHECKING:` guard
    pub(super) typechecking_only: bool,
}

/// Default [`ImportScanner`] for Python source.
#[derive(Debug, Clone, Copy, Default)]
pub struct PythonImportScanner;

impl PythonImportScanner {
    /// Create a scanner.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl ImportScanner for PythonImportScanner {
    fn scan_for_imports(
        &self,
        module_file: &ModuleFile,
        source: &str,
        context: &ScanContext,
    ) -> Result<Vec<DirectImport>> {
        let is_package = module_file.is_package();
        let mut seen = HashSet::new();
        let mut imports = Vec::new();

        for object in parse_imports(source, &module_file.path)? {
            if context.exclude_type_checking_imports && object.typechecking_only {
                continue;
            }

            let Some(name) = absolute_object_name(&module_file.module, is_package, &object.name)
            else {
                trace!(
                    module = %module_file.module,
                    object = %object.name,
                    "Relative import climbs above top-level package, skipping"
                );
                continue;
            };

            let imported = match internal_module(&name, &context.modules) {
                Some(module) => module,
                None if context.include_external_packages => {
                    match distill_external_module(&name, &context.package_names) {
                        Some(module) => module,
                        None => continue,
                    }
                }
                None => continue,
            };

            let import = DirectImport::new(
                module_file.module.clone(),
                imported,
                object.line_number,
                object.line_contents,
            );
            if seen.insert(import.clone()) {
                imports.push(import);
            }
        }

        Ok(imports)
    }
}

/// Parse Python source and return every imported object in source order.
///
/// # Errors
///
/// Returns [`Error::SourceSyntax`] naming the first offending line if the
/// source does not parse cleanly.
pub(super) fn parse_imports(source: &str, path: &Path) -> Result<Vec<ImportedObject>> {
    let mut parser = tree_sitter::Parser::new();
    parser
        .set_language(&tree_sitter_python::LANGUAGE.into())
        .map_err(|e| Error::Parser(e.to_string()))?;
    let tree = parser
        .parse(source, None)
        .ok_or_else(|| Error::Parser("failed to parse file".to_string()))?;

    let lines: Vec<&str> = source.lines().collect();
    let root = tree.root_node();
    if root.has_error() {
        let row = first_error(root).map_or(0, |node| node.start_position().row);
        return Err(Error::SourceSyntax {
            path: path.to_path_buf(),
            line: row as u32 + 1,
            text: line_at(&lines, row),
        });
    }

    let mut objects = Vec::new();
    let walker = Walker {
        content: source.as_bytes(),
        lines: &lines,
    };
    walker.collect(&root, false, &mut objects);
    Ok(objects)
}

fn first_error(node: tree_sitter::Node<'_>) -> Option<tree_sitter::Node<'_>> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    if !node.has_error() {
        return None;
    }
    let mut cursor = node.walk();
    let children: Vec<_> = node.children(&mut cursor).collect();
    children.into_iter().find_map(first_error)
}

fn line_at(lines: &[&str], row: usize) -> String {
    lines.get(row).map(|l| l.trim().to_string()).unwrap_or_default()
}

fn node_text(node: &tree_sitter::Node, content: &[u8]) -> Option<String> {
    std::str::from_utf8(&content[node.byte_range()])
        .ok()
        .map(str::to_string)
}

struct Walker<'a> {
    content: &'a [u8],
    lines: &'a [&'a str],
}

impl Walker<'_> {
    fn collect(
        &self,
        node: &tree_sitter::Node,
        typechecking: bool,
        out: &mut Vec<ImportedObject>,
    ) {
        use node_kinds::{
            FUTURE_IMPORT_STATEMENT, IF_STATEMENT, IMPORT_FROM_STATEMENT, IMPORT_STATEMENT,
        };

        match node.kind() {
            IMPORT_STATEMENT => self.import_statement(node, typechecking, out),
            IMPORT_FROM_STATEMENT | FUTURE_IMPORT_STATEMENT => {
                self.from_import_statement(node, typechecking, out);
            }
            IF_STATEMENT => {
                let guarded = typechecking
                    || node
                        .child_by_field_name("condition")
                        .is_some_and(|c| self.is_type_checking_guard(&c));
                self.collect_children(node, guarded, out);
            }
            _ => self.collect_children(node, typechecking, out),
        }
    }

    fn collect_children(
        &self,
        node: &tree_sitter::Node,
        typechecking: bool,
        out: &mut Vec<ImportedObject>,
    ) {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.collect(&child, typechecking, out);
        }
    }

    /// `TYPE_CHECKING` or `<anything>.TYPE_CHECKING`.
    fn is_type_checking_guard(&self, condition: &tree_sitter::Node) -> bool {
        use node_kinds::{ATTRIBUTE, IDENTIFIER};

        let name = match condition.kind() {
            IDENTIFIER => Some(*condition),
            ATTRIBUTE => condition.child_by_field_name("attribute"),
            _ => None,
        };
        name.and_then(|n| node_text(&n, self.content))
            .is_some_and(|text| text == TYPE_CHECKING)
    }

    /// `import a.b, c as d`
    fn import_statement(
        &self,
        node: &tree_sitter::Node,
        typechecking: bool,
        out: &mut Vec<ImportedObject>,
    ) {
        let mut cursor = node.walk();
        for name_node in node.children_by_field_name("name", &mut cursor) {
            if let Some(name) = self.imported_name(&name_node) {
                out.push(self.object(node, name, typechecking));
            }
        }
    }

    /// `from .x import y, z as w` / `from x import *` / `from __future__ import y`
    fn from_import_statement(
        &self,
        node: &tree_sitter::Node,
        typechecking: bool,
        out: &mut Vec<ImportedObject>,
    ) {
        use node_kinds::{DOTTED_NAME, FUTURE_IMPORT_STATEMENT, RELATIVE_IMPORT, WILDCARD_IMPORT};

        let (dots, module) = if node.kind() == FUTURE_IMPORT_STATEMENT {
            (0, Some(FUTURE_MODULE.to_string()))
        } else {
            match node.child_by_field_name("module_name") {
                Some(m) if m.kind() == RELATIVE_IMPORT => self.relative_import(&m),
                Some(m) if m.kind() == DOTTED_NAME => (0, self.dotted_name(&m)),
                _ => return,
            }
        };

        let prefix = ".".repeat(dots);
        let qualify = |name: &str| match &module {
            Some(module) => format!("{prefix}{module}.{name}"),
            None => format!("{prefix}{name}"),
        };

        let mut cursor = node.walk();
        let has_wildcard = node
            .children(&mut cursor)
            .any(|child| child.kind() == WILDCARD_IMPORT);
        if has_wildcard {
            out.push(self.object(node, qualify("*"), typechecking));
            return;
        }

        let mut cursor = node.walk();
        for name_node in node.children_by_field_name("name", &mut cursor) {
            if let Some(name) = self.imported_name(&name_node) {
                out.push(self.object(node, qualify(&name), typechecking));
            }
        }
    }

    /// Leading dot count and optional module part of a `relative_import`.
    fn relative_import(&self, node: &tree_sitter::Node) -> (usize, Option<String>) {
        use node_kinds::{DOTTED_NAME, IMPORT_PREFIX};

        let mut dots = 0;
        let mut module = None;
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            match child.kind() {
                IMPORT_PREFIX => {
                    dots = node_text(&child, self.content)
                        .map_or(0, |text| text.chars().filter(|&c| c == '.').count());
                }
                DOTTED_NAME => module = self.dotted_name(&child),
                _ => {}
            }
        }
        (dots, module)
    }

    /// Name of a `dotted_name` or the original name of an `aliased_import`.
    fn imported_name(&self, node: &tree_sitter::Node) -> Option<String> {
        use node_kinds::{ALIASED_IMPORT, DOTTED_NAME};

        match node.kind() {
            DOTTED_NAME => self.dotted_name(node),
            ALIASED_IMPORT => node
                .child_by_field_name("name")
                .and_then(|n| self.dotted_name(&n)),
            _ => None,
        }
    }

    fn dotted_name(&self, node: &tree_sitter::Node) -> Option<String> {
        let mut cursor = node.walk();
        let parts: Vec<String> = node
            .children(&mut cursor)
            .filter(|child| child.kind() == node_kinds::IDENTIFIER)
            .filter_map(|child| node_text(&child, self.content))
            .collect();
        (!parts.is_empty()).then(|| parts.join("."))
    }

    fn object(
        &self,
        statement: &tree_sitter::Node,
        name: String,
        typechecking: bool,
    ) -> ImportedObject {
        let row = statement.start_position().row;
        ImportedObject {
            name,
            line_number: row as u32 + 1,
            line_contents: line_at(self.lines, row),
            typechecking_only: typechecking,
        }
    }
}
