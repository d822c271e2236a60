//! Static import validation over Python source.
//!
//! Parses the concatenated notebook code with tree-sitter and checks the
//! top-level component of every imported module against an allow-list.
//! Nothing is executed.

use std::collections::VecDeque;

use tree_sitter::{Node, Parser, Tree};

use crate::error::GradeError;
use crate::model::AllowedImports;

/// One import found in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRef {
    /// The top-level module name (text before the first `.`).
    pub module: String,
    /// 1-based line of the import statement.
    pub line: usize,
}

/// Parse `source`, rejecting it if tree-sitter reports any syntax error.
fn parse(source: &str) -> Result<Tree, GradeError> {
    let mut parser = Parser::new();
    let language: tree_sitter::Language = tree_sitter_python::LANGUAGE.into();
    parser
        .set_language(&language)
        .map_err(|e| GradeError::Interpreter(format!("failed to load Python grammar: {e}")))?;
    let tree = parser
        .parse(source, None)
        .ok_or_else(|| GradeError::Interpreter("tree-sitter returned no parse tree".into()))?;

    if tree.root_node().has_error() {
        let (line, column) = first_error(tree.root_node())
            .map(|n| {
                let pos = n.start_position();
                (pos.row + 1, pos.column + 1)
            })
            .unwrap_or((1, 1));
        return Err(GradeError::SyntaxRejected { line, column });
    }

    Ok(tree)
}

/// Pre-order search for the first ERROR or MISSING node.
fn first_error(root: Node<'_>) -> Option<Node<'_>> {
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if node.is_error() || node.is_missing() {
            return Some(node);
        }
        if node.has_error() {
            let mut cursor = node.walk();
            let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
            stack.extend(children.into_iter().rev());
        }
    }
    None
}

/// Top-level component of a dotted module path, ignoring stray whitespace.
fn top_level(dotted: &str) -> String {
    let compact: String = dotted.chars().filter(|c| !c.is_whitespace()).collect();
    compact
        .split('.')
        .next()
        .unwrap_or_default()
        .to_string()
}

/// Modules named by a single import statement node, in source order.
fn statement_modules(node: Node<'_>, source: &[u8]) -> Vec<String> {
    let text = |n: Node<'_>| n.utf8_text(source).map(top_level).unwrap_or_default();
    let mut cursor = node.walk();

    match node.kind() {
        "import_statement" => node
            .children_by_field_name("name", &mut cursor)
            .map(|name| match name.kind() {
                "aliased_import" => name.child_by_field_name("name").map(text).unwrap_or_default(),
                _ => text(name),
            })
            .filter(|m| !m.is_empty())
            .collect(),
        "import_from_statement" => {
            let Some(module) = node.child_by_field_name("module_name") else {
                return Vec::new();
            };
            if module.kind() == "relative_import" {
                // `from . import x` has nothing to check; `from .pkg import x`
                // is checked as `pkg`.
                let mut inner = module.walk();
                let dotted = module
                    .named_children(&mut inner)
                    .find(|c| c.kind() == "dotted_name");
                return dotted.map(text).into_iter().collect();
            }
            vec![text(module)]
        }
        "future_import_statement" => vec!["__future__".to_string()],
        _ => Vec::new(),
    }
}

/// Imports in breadth-first order: every module-level import comes before
/// any import nested in a function or class body, then the next level down.
fn collect_imports(tree: &Tree, source: &str) -> Vec<ImportRef> {
    let bytes = source.as_bytes();
    let mut found = Vec::new();
    let mut queue = VecDeque::from([tree.root_node()]);

    while let Some(node) = queue.pop_front() {
        match node.kind() {
            "import_statement" | "import_from_statement" | "future_import_statement" => {
                let line = node.start_position().row + 1;
                found.extend(
                    statement_modules(node, bytes)
                        .into_iter()
                        .map(|module| ImportRef { module, line }),
                );
            }
            _ => {
                let mut cursor = node.walk();
                queue.extend(node.named_children(&mut cursor));
            }
        }
    }

    found
}

/// Check `source` against `allowed`.
///
/// Fails with `SyntaxRejected` if the source does not parse, or with
/// `ImportRejected` naming the first disallowed module in breadth-first
/// order. Later imports are not examined once a violation is found.
pub fn validate(source: &str, allowed: &AllowedImports) -> Result<(), GradeError> {
    let tree = parse(source)?;
    if let Some(bad) = collect_imports(&tree, source)
        .into_iter()
        .find(|i| !allowed.allows(&i.module))
    {
        tracing::warn!(module = %bad.module, line = bad.line, "rejected import");
        return Err(GradeError::ImportRejected { module: bad.module });
    }
    Ok(())
}

/// Every import in `source`, shallowest first, source order within a level.
pub fn imports(source: &str) -> Result<Vec<ImportRef>, GradeError> {
    let tree = parse(source)?;
    Ok(collect_imports(&tree, source))
}

/// Distinct top-level modules imported by `source`, in first-seen order.
pub fn imported_modules(source: &str) -> Result<Vec<String>, GradeError> {
    let mut modules: Vec<String> = Vec::new();
    for import in imports(source)? {
        if !modules.contains(&import.module) {
            modules.push(import.module);
        }
    }
    Ok(modules)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numpy_only() -> AllowedImports {
        AllowedImports::new(["numpy"])
    }

    #[test]
    fn accepts_plain_function() {
        assert!(validate("def add(a, b):\n    return a + b\n", &numpy_only()).is_ok());
    }

    #[test]
    fn accepts_allowed_imports_in_all_forms() {
        let src = "import numpy\nimport numpy as np\nimport numpy.linalg\nfrom numpy.random import default_rng\n";
        assert!(validate(src, &numpy_only()).is_ok());
    }

    #[test]
    fn rejects_os() {
        let err = validate("import os\ndef f():\n    return os.getcwd()\n", &numpy_only()).unwrap_err();
        assert!(matches!(err, GradeError::ImportRejected { ref module } if module == "os"));
    }

    #[test]
    fn rejects_on_top_level_component() {
        let err = validate("import os.path\n", &numpy_only()).unwrap_err();
        assert_eq!(err.to_string(), "import not allowed: os");

        let err = validate("from subprocess import run\n", &numpy_only()).unwrap_err();
        assert_eq!(err.to_string(), "import not allowed: subprocess");
    }

    #[test]
    fn reports_first_violation_only() {
        let src = "import numpy\nimport sys\nimport os\n";
        let err = validate(src, &numpy_only()).unwrap_err();
        assert_eq!(err.to_string(), "import not allowed: sys");
    }

    #[test]
    fn checks_every_name_in_one_statement() {
        let err = validate("import numpy, shutil as sh\n", &numpy_only()).unwrap_err();
        assert_eq!(err.to_string(), "import not allowed: shutil");
    }

    #[test]
    fn finds_imports_nested_in_functions() {
        let src = "def sneaky():\n    import socket\n    return socket\n";
        let err = validate(src, &numpy_only()).unwrap_err();
        assert_eq!(err.to_string(), "import not allowed: socket");
    }

    #[test]
    fn module_level_import_is_reported_before_nested_one() {
        let src = "def f():\n    import socket\nimport sys\n";
        let err = validate(src, &numpy_only()).unwrap_err();
        assert_eq!(err.to_string(), "import not allowed: sys");
        let order: Vec<String> = imports(src).unwrap().into_iter().map(|i| i.module).collect();
        assert_eq!(order, vec!["sys", "socket"]);
    }

    #[test]
    fn bare_relative_import_is_skipped() {
        assert!(validate("from . import helpers\n", &numpy_only()).is_ok());
        let err = validate("from .helpers import f\n", &numpy_only()).unwrap_err();
        assert_eq!(err.to_string(), "import not allowed: helpers");
    }

    #[test]
    fn future_import_is_checked() {
        let src = "from __future__ import annotations\n";
        assert!(validate(src, &numpy_only()).is_err());
        assert!(validate(src, &AllowedImports::new(["__future__"])).is_ok());
    }

    #[test]
    fn syntax_error_is_reported_with_position() {
        let err = validate("x = 1\ndef broken(:\n    pass\n", &numpy_only()).unwrap_err();
        let GradeError::SyntaxRejected { line, column } = err else {
            panic!("expected syntax error, got {err:?}");
        };
        assert!(line >= 2, "error should not point at the valid first line");
        assert!(column >= 1);
    }

    #[test]
    fn syntax_error_wins_over_imports() {
        let err = validate("import os\nx = (\n", &numpy_only()).unwrap_err();
        assert_eq!(err.kind(), "syntax_rejected");
    }

    #[test]
    fn validation_is_idempotent() {
        let src = "import numpy as np\nimport os\n";
        let first = validate(src, &numpy_only()).map_err(|e| e.to_string());
        let second = validate(src, &numpy_only()).map_err(|e| e.to_string());
        assert_eq!(first, second);
    }

    #[test]
    fn imported_modules_dedupes_in_order() {
        let src = "import pandas as pd\nimport numpy as np\nfrom pandas import DataFrame\n";
        assert_eq!(imported_modules(src).unwrap(), vec!["pandas", "numpy"]);
        let refs = imports(src).unwrap();
        assert_eq!(refs[2], ImportRef { module: "pandas".into(), line: 3 });
    }

    #[test]
    fn empty_source_is_valid() {
        assert!(validate("", &numpy_only()).is_ok());
        assert!(imported_modules("").unwrap().is_empty());
    }
}
