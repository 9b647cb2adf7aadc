//! Generic tree-sitter parser covering the compiled and web languages.
//!
//! Each language carries the set of node kinds that denote functions,
//! classes (or the language's closest concept), methods, and imports.
//! Parameter name extraction is best-effort: annotations and defaults are
//! stripped, and callers should rely on parameter counts where a grammar
//! makes names ambiguous.

use tree_sitter::{Language, Node, Parser};

use super::{enclosing_class, node_text, LanguageParser};
use crate::models::{ClassRecord, FunctionRecord, MethodRecord, ParsedSource};

pub struct TreeSitterParser;

struct LanguageSpec {
    grammar: Language,
    function_types: &'static [&'static str],
    class_types: &'static [&'static str],
    method_types: &'static [&'static str],
    class_body_types: &'static [&'static str],
    import_types: &'static [&'static str],
    param_list_types: &'static [&'static str],
}

fn spec_for(language: &str) -> Option<LanguageSpec> {
    let spec = match language {
        "javascript" | "jsx" => LanguageSpec {
            grammar: tree_sitter_javascript::language(),
            function_types: &["function_declaration", "method_definition", "arrow_function"],
            class_types: &["class_declaration"],
            method_types: &["method_definition"],
            class_body_types: &["class_body"],
            import_types: &["import_statement"],
            param_list_types: &["formal_parameters"],
        },
        "typescript" => LanguageSpec {
            grammar: tree_sitter_typescript::language_typescript(),
            function_types: &["function_declaration", "method_definition", "arrow_function"],
            class_types: &["class_declaration", "interface_declaration"],
            method_types: &["method_definition", "method_signature"],
            class_body_types: &["class_body", "interface_body"],
            import_types: &["import_statement"],
            param_list_types: &["formal_parameters"],
        },
        "tsx" => LanguageSpec {
            grammar: tree_sitter_typescript::language_tsx(),
            function_types: &["function_declaration", "method_definition", "arrow_function"],
            class_types: &["class_declaration", "interface_declaration"],
            class_body_types: &["class_body", "interface_body"],
            method_types: &["method_definition", "method_signature"],
            import_types: &["import_statement"],
            param_list_types: &["formal_parameters"],
        },
        "go" => LanguageSpec {
            grammar: tree_sitter_go::language(),
            function_types: &["function_declaration", "method_declaration"],
            class_types: &["type_declaration"],
            method_types: &["method_declaration"],
            class_body_types: &["field_declaration_list"],
            import_types: &["import_declaration"],
            param_list_types: &["parameter_list"],
        },
        "java" => LanguageSpec {
            grammar: tree_sitter_java::language(),
            function_types: &["method_declaration", "constructor_declaration"],
            class_types: &["class_declaration", "interface_declaration"],
            method_types: &["method_declaration", "constructor_declaration"],
            class_body_types: &["class_body", "interface_body"],
            import_types: &["import_declaration"],
            param_list_types: &["formal_parameters"],
        },
        "rust" => LanguageSpec {
            grammar: tree_sitter_rust::language(),
            function_types: &["function_item"],
            class_types: &["struct_item", "enum_item", "trait_item"],
            method_types: &["function_item", "function_signature_item"],
            class_body_types: &["declaration_list"],
            import_types: &["use_declaration"],
            param_list_types: &["parameters"],
        },
        "c" => LanguageSpec {
            grammar: tree_sitter_c::language(),
            function_types: &["function_definition"],
            class_types: &["struct_specifier"],
            method_types: &[],
            class_body_types: &["field_declaration_list"],
            import_types: &["preproc_include"],
            param_list_types: &["parameter_list"],
        },
        "cpp" => LanguageSpec {
            grammar: tree_sitter_cpp::language(),
            function_types: &["function_definition"],
            class_types: &["class_specifier", "struct_specifier"],
            method_types: &["function_definition"],
            class_body_types: &["field_declaration_list"],
            import_types: &["preproc_include"],
            param_list_types: &["parameter_list"],
        },
        "php" => LanguageSpec {
            grammar: tree_sitter_php::language_php(),
            function_types: &["function_definition", "method_declaration"],
            class_types: &["class_declaration", "interface_declaration"],
            method_types: &["method_declaration"],
            class_body_types: &["declaration_list"],
            import_types: &["namespace_use_declaration"],
            param_list_types: &["formal_parameters"],
        },
        _ => return None,
    };
    Some(spec)
}

impl LanguageParser for TreeSitterParser {
    fn parse(&self, code: &str, path: &str) -> ParsedSource {
        let language = language_from_path(path);
        let Some(spec) = language.and_then(spec_for) else {
            return ParsedSource {
                parse_error: Some(format!("could not detect language for {path}")),
                ..Default::default()
            };
        };

        let mut parser = Parser::new();
        if parser.set_language(&spec.grammar).is_err() {
            return ParsedSource {
                parse_error: Some(format!("grammar unavailable for {path}")),
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

        let classes = extract_classes(root, code, &spec);
        let functions = extract_functions(root, code, &spec, &classes);
        let imports = extract_imports(root, code, &spec);

        ParsedSource {
            functions,
            classes,
            imports,
            parse_error: None,
        }
    }
}

/// The generic parser keys off the file path so `.jsx`/`.tsx` select the
/// right grammar variant regardless of the registry's language label.
fn language_from_path(path: &str) -> Option<&'static str> {
    let language = if path.ends_with(".js") || path.ends_with(".jsx") {
        "javascript"
    } else if path.ends_with(".tsx") {
        "tsx"
    } else if path.ends_with(".ts") {
        "typescript"
    } else if path.ends_with(".go") {
        "go"
    } else if path.ends_with(".java") {
        "java"
    } else if path.ends_with(".rs") {
        "rust"
    } else if path.ends_with(".cpp")
        || path.ends_with(".cc")
        || path.ends_with(".cxx")
        || path.ends_with(".hpp")
        || path.ends_with(".h")
    {
        "cpp"
    } else if path.ends_with(".c") {
        "c"
    } else if path.ends_with(".php") {
        "php"
    } else {
        return None;
    };
    Some(language)
}

fn extract_classes(root: Node<'_>, code: &str, spec: &LanguageSpec) -> Vec<ClassRecord> {
    let mut classes = Vec::new();
    walk(root, &mut |node| {
        if !spec.class_types.contains(&node.kind()) {
            return;
        }

        let mut methods = Vec::new();
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            if !spec.class_body_types.contains(&child.kind()) {
                continue;
            }
            let mut body_cursor = child.walk();
            for member in child.children(&mut body_cursor) {
                if spec.method_types.contains(&member.kind()) {
                    methods.push(MethodRecord {
                        name: extract_name(member, code),
                        line_start: member.start_position().row as u32 + 1,
                        line_end: member.end_position().row as u32 + 1,
                        parameters: extract_parameters(member, code, spec),
                        return_type: None,
                        docstring: None,
                        is_async: has_async_child(member),
                        is_static: false,
                        is_class_method: false,
                    });
                }
            }
        }

        classes.push(ClassRecord {
            name: extract_name(node, code),
            line_start: node.start_position().row as u32 + 1,
            line_end: node.end_position().row as u32 + 1,
            methods,
            base_classes: Vec::new(),
            docstring: None,
        });
    });
    classes
}

fn extract_functions(
    root: Node<'_>,
    code: &str,
    spec: &LanguageSpec,
    classes: &[ClassRecord],
) -> Vec<FunctionRecord> {
    let mut functions = Vec::new();
    walk(root, &mut |node| {
        if !spec.function_types.contains(&node.kind()) {
            return;
        }
        let line_start = node.start_position().row as u32 + 1;
        let parent_class = enclosing_class(classes, line_start).map(|c| c.name.clone());

        let name = extract_name(node, code);
        let parameters = extract_parameters(node, code, spec);
        let signature = format!("{name}({})", parameters.join(", "));

        functions.push(FunctionRecord {
            name,
            line_start,
            line_end: node.end_position().row as u32 + 1,
            parameters,
            is_method: parent_class.is_some(),
            parent_class,
            return_type: None,
            docstring: None,
            signature,
            is_async: has_async_child(node),
        });
    });
    functions
}

fn extract_imports(root: Node<'_>, code: &str, spec: &LanguageSpec) -> Vec<String> {
    let mut imports = Vec::new();
    walk(root, &mut |node| {
        if spec.import_types.contains(&node.kind()) {
            imports.push(node_text(node, code).trim().to_string());
        }
    });
    imports.retain(|i| !i.is_empty());
    imports.sort();
    imports.dedup();
    imports
}

/// Name of a definition node: the first identifier-like direct child, or
/// one level into a declarator (C/C++ nest the name there).
fn extract_name(node: Node<'_>, code: &str) -> String {
    if let Some(name) = identifier_child(node, code) {
        return name;
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind().contains("declarator") || child.kind() == "type_spec" {
            if let Some(name) = identifier_child(child, code) {
                return name;
            }
        }
    }
    "anonymous".to_string()
}

fn identifier_child(node: Node<'_>, code: &str) -> Option<String> {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind().contains("identifier") || child.kind() == "name" {
            return Some(node_text(child, code));
        }
    }
    None
}

fn extract_parameters(node: Node<'_>, code: &str, spec: &LanguageSpec) -> Vec<String> {
    let mut params = Vec::new();
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if !spec.param_list_types.contains(&child.kind()) {
            continue;
        }
        let mut list_cursor = child.walk();
        for param in child.children(&mut list_cursor) {
            let kind = param.kind();
            let looks_like_param = kind.contains("identifier")
                || kind == "required_parameter"
                || kind == "optional_parameter"
                || kind == "parameter_declaration"
                || kind == "simple_parameter"
                || kind == "self_parameter"
                || kind == "parameter";
            if !looks_like_param {
                continue;
            }
            let text = node_text(param, code);
            // Strip type annotations and defaults.
            let name = text
                .split(':')
                .next()
                .unwrap_or("")
                .split('=')
                .next()
                .unwrap_or("")
                .trim()
                .to_string();
            if !name.is_empty() && !matches!(name.as_str(), "," | "(" | ")" | "{" | "}") {
                params.push(name);
            }
        }
    }
    params
}

fn has_async_child(node: Node<'_>) -> bool {
    let mut cursor = node.walk();
    let found = node.children(&mut cursor).any(|c| c.kind() == "async");
    found
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

    #[test]
    fn javascript_classes_and_methods() {
        let code = r#"import { helper } from './util';

function greet(name) {
  return helper(name);
}

class Parser {
  parse(input) {
    return input;
  }
}
"#;
        let parsed = TreeSitterParser.parse(code, "src/parser.js");
        assert!(parsed.parse_error.is_none());

        let names: Vec<&str> = parsed.functions.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["greet", "parse"]);

        let parse_fn = parsed.functions.iter().find(|f| f.name == "parse").unwrap();
        assert_eq!(parse_fn.parent_class.as_deref(), Some("Parser"));
        assert!(parse_fn.is_method);

        assert_eq!(parsed.classes.len(), 1);
        assert_eq!(parsed.classes[0].methods.len(), 1);
        assert_eq!(parsed.classes[0].methods[0].name, "parse");

        assert_eq!(parsed.imports, vec!["import { helper } from './util';"]);
    }

    #[test]
    fn typescript_interfaces_count_as_classes() {
        let code = r#"interface Store {
  get(key: string): string;
}

export function open(path: string): Store {
  throw new Error(path);
}
"#;
        let parsed = TreeSitterParser.parse(code, "src/store.ts");
        assert!(parsed.parse_error.is_none());
        assert_eq!(parsed.classes.len(), 1);
        assert_eq!(parsed.classes[0].name, "Store");

        let open = parsed.functions.iter().find(|f| f.name == "open").unwrap();
        assert_eq!(open.parameters, vec!["path"]);
    }

    #[test]
    fn rust_structs_traits_and_uses() {
        let code = r#"use std::fmt;

pub struct Engine {
    id: u32,
}

pub fn start(engine: &Engine) -> u32 {
    engine.id
}
"#;
        let parsed = TreeSitterParser.parse(code, "src/engine.rs");
        assert!(parsed.parse_error.is_none());
        assert_eq!(parsed.classes.len(), 1);
        assert_eq!(parsed.classes[0].name, "Engine");
        assert_eq!(parsed.functions.len(), 1);
        assert_eq!(parsed.functions[0].name, "start");
        assert_eq!(parsed.imports, vec!["use std::fmt;"]);
    }

    #[test]
    fn go_parameter_extraction_is_count_only() {
        let code = r#"package main

import "fmt"

func Add(a int, b int) int {
    fmt.Println(a)
    return a + b
}
"#;
        let parsed = TreeSitterParser.parse(code, "main.go");
        assert!(parsed.parse_error.is_none());
        let add = parsed.functions.iter().find(|f| f.name == "Add").unwrap();
        // Grammar nests names inside parameter_declaration; only the count
        // is stable across grammar versions.
        assert_eq!(add.parameters.len(), 2);
    }

    #[test]
    fn unknown_extension_reports_parse_error() {
        let parsed = TreeSitterParser.parse("whatever", "notes.txt");
        assert!(parsed.parse_error.is_some());
        assert!(parsed.functions.is_empty());
    }
}
