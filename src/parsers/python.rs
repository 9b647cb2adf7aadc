//! Python structural parser.
//!
//! The richest of the parsers: Python was the host language of the kind
//! of repositories this index was built for, so it extracts docstrings,
//! decorator-derived method kinds, base classes, return annotations, and
//! async markers in addition to the shared contract.

use tree_sitter::{Node, Parser};

use super::{enclosing_class, node_text, LanguageParser};
use crate::models::{ClassRecord, FunctionRecord, MethodRecord, ParsedSource};

pub struct PythonParser;

impl LanguageParser for PythonParser {
    fn parse(&self, code: &str, path: &str) -> ParsedSource {
        let mut parser = Parser::new();
        if parser
            .set_language(&tree_sitter_python::language())
            .is_err()
        {
            return ParsedSource {
                parse_error: Some("python grammar unavailable".to_string()),
                ..Default::default()
            };
        }

        let Some(tree) = parser.parse(code, None) else {
            return ParsedSource {
                parse_error: Some(format!("failed to parse {path}")),
                ..Default::default()
            };
        };

        let root = tree.root_node();
        if root.has_error() {
            return ParsedSource {
                parse_error: Some(format!("syntax error in {path}")),
                ..Default::default()
            };
        }

        let classes = extract_classes(root, code);
        let functions = extract_functions(root, code, &classes);
        let imports = extract_imports(root, code);

        ParsedSource {
            functions,
            classes,
            imports,
            parse_error: None,
        }
    }
}

fn extract_classes(root: Node<'_>, code: &str) -> Vec<ClassRecord> {
    let mut classes = Vec::new();
    walk(root, &mut |node| {
        if node.kind() != "class_definition" {
            return;
        }
        let name = node
            .child_by_field_name("name")
            .map(|n| node_text(n, code))
            .unwrap_or_else(|| "anonymous".to_string());

        let base_classes = node
            .child_by_field_name("superclasses")
            .map(|args| {
                named_children(args)
                    .into_iter()
                    .filter(|c| c.kind() != "comment")
                    .map(|c| node_text(c, code))
                    .collect()
            })
            .unwrap_or_default();

        let mut methods = Vec::new();
        if let Some(body) = node.child_by_field_name("body") {
            for child in named_children(body) {
                let (func, decorators) = unwrap_decorated(child, code);
                if let Some(func) = func {
                    methods.push(method_record(func, code, &decorators));
                }
            }
        }

        classes.push(ClassRecord {
            name,
            line_start: node.start_position().row as u32 + 1,
            line_end: node.end_position().row as u32 + 1,
            methods,
            base_classes,
            docstring: body_docstring(node, code),
        });
    });
    classes
}

fn extract_functions(
    root: Node<'_>,
    code: &str,
    classes: &[ClassRecord],
) -> Vec<FunctionRecord> {
    let mut functions = Vec::new();
    walk(root, &mut |node| {
        if node.kind() != "function_definition" {
            return;
        }
        let line_start = node.start_position().row as u32 + 1;
        let parent_class = enclosing_class(classes, line_start).map(|c| c.name.clone());

        let name = node
            .child_by_field_name("name")
            .map(|n| node_text(n, code))
            .unwrap_or_else(|| "anonymous".to_string());
        let parameters = extract_parameters(node, code);
        let return_type = node
            .child_by_field_name("return_type")
            .map(|n| node_text(n, code));

        let mut signature = format!("{name}({})", parameters.join(", "));
        if let Some(ret) = &return_type {
            signature.push_str(&format!(" -> {ret}"));
        }

        functions.push(FunctionRecord {
            name,
            line_start,
            line_end: node.end_position().row as u32 + 1,
            parameters,
            is_method: parent_class.is_some(),
            parent_class,
            return_type,
            docstring: body_docstring(node, code),
            signature,
            is_async: is_async(node),
        });
    });
    functions
}

fn extract_imports(root: Node<'_>, code: &str) -> Vec<String> {
    let mut imports = Vec::new();
    walk(root, &mut |node| match node.kind() {
        // `import a.b, c as d` contributes every module name.
        "import_statement" => {
            for child in named_children(node) {
                match child.kind() {
                    "dotted_name" => imports.push(node_text(child, code)),
                    "aliased_import" => {
                        if let Some(name) = child.child_by_field_name("name") {
                            imports.push(node_text(name, code));
                        }
                    }
                    _ => {}
                }
            }
        }
        // `from X import …` contributes the module path; relative imports
        // keep their leading dots for the resolver.
        "import_from_statement" => {
            if let Some(module) = node.child_by_field_name("module_name") {
                imports.push(node_text(module, code));
            }
        }
        _ => {},
    });

    imports.retain(|i| !i.is_empty());
    imports.sort();
    imports.dedup();
    imports
}

fn method_record(node: Node<'_>, code: &str, decorators: &[String]) -> MethodRecord {
    let name = node
        .child_by_field_name("name")
        .map(|n| node_text(n, code))
        .unwrap_or_else(|| "anonymous".to_string());
    MethodRecord {
        name,
        line_start: node.start_position().row as u32 + 1,
        line_end: node.end_position().row as u32 + 1,
        parameters: extract_parameters(node, code),
        return_type: node
            .child_by_field_name("return_type")
            .map(|n| node_text(n, code)),
        docstring: body_docstring(node, code),
        is_async: is_async(node),
        is_static: decorators.iter().any(|d| d == "staticmethod"),
        is_class_method: decorators.iter().any(|d| d == "classmethod"),
    }
}

/// When a body statement is a `decorated_definition`, return the inner
/// function together with its decorator names.
fn unwrap_decorated<'a>(node: Node<'a>, code: &str) -> (Option<Node<'a>>, Vec<String>) {
    match node.kind() {
        "function_definition" => (Some(node), Vec::new()),
        "decorated_definition" => {
            let decorators = named_children(node)
                .into_iter()
                .filter(|c| c.kind() == "decorator")
                .map(|c| node_text(c, code).trim_start_matches('@').trim().to_string())
                .collect();
            let inner = node
                .child_by_field_name("definition")
                .filter(|d| d.kind() == "function_definition");
            (inner, decorators)
        }
        _ => (None, Vec::new()),
    }
}

fn extract_parameters(node: Node<'_>, code: &str) -> Vec<String> {
    let Some(params) = node.child_by_field_name("parameters") else {
        return Vec::new();
    };

    let mut out = Vec::new();
    for child in named_children(params) {
        match child.kind() {
            "identifier" => out.push(node_text(child, code)),
            "typed_parameter" => {
                // `x: int` — the pattern is the first child.
                if let Some(name) = child.named_child(0) {
                    out.push(node_text(name, code));
                }
            }
            "default_parameter" | "typed_default_parameter" => {
                if let Some(name) = child.child_by_field_name("name") {
                    out.push(node_text(name, code));
                }
            }
            "list_splat_pattern" | "dictionary_splat_pattern" => {
                out.push(node_text(child, code));
            }
            _ => {}
        }
    }
    out
}

/// First statement of the body when it is a bare string literal.
fn body_docstring(node: Node<'_>, code: &str) -> Option<String> {
    let body = node.child_by_field_name("body")?;
    let first = body.named_child(0)?;
    if first.kind() != "expression_statement" {
        return None;
    }
    let string = first.named_child(0)?;
    if string.kind() != "string" {
        return None;
    }
    Some(clean_string_literal(&node_text(string, code)))
}

fn clean_string_literal(raw: &str) -> String {
    let trimmed = raw
        .trim_start_matches(|c| matches!(c, 'r' | 'b' | 'f' | 'u' | 'R' | 'B' | 'F' | 'U'));
    for quote in ["\"\"\"", "'''", "\"", "'"] {
        if trimmed.starts_with(quote) && trimmed.ends_with(quote) && trimmed.len() >= 2 * quote.len()
        {
            return trimmed[quote.len()..trimmed.len() - quote.len()]
                .trim()
                .to_string();
        }
    }
    trimmed.trim().to_string()
}

fn is_async(node: Node<'_>) -> bool {
    let mut cursor = node.walk();
    let found = node.children(&mut cursor).any(|c| c.kind() == "async");
    found
}

fn named_children(node: Node<'_>) -> Vec<Node<'_>> {
    let mut cursor = node.walk();
    let children: Vec<Node<'_>> = node.named_children(&mut cursor).collect();
    children
}

fn walk<'a>(node: Node<'a>, visit: &mut impl FnMut(Node<'a>)) {
    visit(node);
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        walk(child, visit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"import os
from pathlib import Path
from .util import helper

def run(a, b=2):
    """Run it."""
    return a

class Engine:
    """Engine docs."""

    def start(self):
        pass

    @staticmethod
    def stop():
        pass

    async def restart(self, delay: int = 0) -> bool:
        return True
"#;

    fn parse(code: &str) -> ParsedSource {
        PythonParser.parse(code, "sample.py")
    }

    #[test]
    fn functions_are_flat_with_parent_links() {
        let parsed = parse(SAMPLE);
        assert!(parsed.parse_error.is_none());

        let names: Vec<&str> = parsed.functions.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["run", "start", "stop", "restart"]);

        let run = &parsed.functions[0];
        assert_eq!(run.parent_class, None);
        assert!(!run.is_method);
        assert_eq!(run.parameters, vec!["a", "b"]);
        assert_eq!(run.signature, "run(a, b)");
        assert_eq!(run.docstring.as_deref(), Some("Run it."));
        assert_eq!(run.line_start, 5);

        for method in &parsed.functions[1..] {
            assert_eq!(method.parent_class.as_deref(), Some("Engine"));
            assert!(method.is_method);
        }
    }

    #[test]
    fn classes_nest_full_method_records() {
        let parsed = parse(SAMPLE);
        assert_eq!(parsed.classes.len(), 1);

        let engine = &parsed.classes[0];
        assert_eq!(engine.name, "Engine");
        assert_eq!(engine.docstring.as_deref(), Some("Engine docs."));
        assert_eq!(engine.methods.len(), 3);

        let stop = &engine.methods[1];
        assert_eq!(stop.name, "stop");
        assert!(stop.is_static);
        assert!(!stop.is_class_method);

        let restart = &engine.methods[2];
        assert!(restart.is_async);
        assert_eq!(restart.return_type.as_deref(), Some("bool"));
        assert_eq!(restart.parameters, vec!["self", "delay"]);
    }

    #[test]
    fn imports_keep_relative_prefixes_and_dedupe() {
        let parsed = parse(SAMPLE);
        assert_eq!(parsed.imports, vec![".util", "os", "pathlib"]);
    }

    #[test]
    fn async_flag_set_on_flat_list_too() {
        let parsed = parse(SAMPLE);
        let restart = parsed.functions.iter().find(|f| f.name == "restart").unwrap();
        assert!(restart.is_async);
        assert_eq!(restart.signature, "restart(self, delay) -> bool");
    }

    #[test]
    fn syntax_errors_yield_parse_error_and_empty_lists() {
        let parsed = parse("def broken(:\n    pass");
        assert!(parsed.parse_error.is_some());
        assert!(parsed.functions.is_empty());
        assert!(parsed.classes.is_empty());
    }

    #[test]
    fn base_classes_are_recorded() {
        let parsed = parse("class Child(Base, mixins.Extra):\n    pass\n");
        assert_eq!(parsed.classes[0].base_classes, vec!["Base", "mixins.Extra"]);
    }

    #[test]
    fn reparsing_is_deterministic() {
        let first = parse(SAMPLE);
        let second = parse(SAMPLE);
        assert_eq!(first.functions, second.functions);
        assert_eq!(first.classes, second.classes);
        assert_eq!(first.imports, second.imports);
    }
}
