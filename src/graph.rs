//! Inter-file dependency resolution.
//!
//! Works purely over the parsed File set: raw import strings plus the set
//! of known paths in the repository. Anything that maps to a known path
//! becomes an internal edge (with a mirrored `imported_by` reverse edge);
//! everything else is recorded as an external package name. No I/O, and
//! deterministic for a given file set.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::Serialize;

use crate::models::Dependencies;
use crate::store::FileMeta;

pub struct DependencyResolver<'a> {
    files: &'a [FileMeta],
    known_paths: HashSet<&'a str>,
}

impl<'a> DependencyResolver<'a> {
    pub fn new(files: &'a [FileMeta]) -> Self {
        let known_paths = files.iter().map(|f| f.path.as_str()).collect();
        Self { files, known_paths }
    }

    /// Resolve every file's imports into `{imports, imported_by,
    /// external_imports}`, keyed by path.
    pub fn resolve_all(&self) -> BTreeMap<String, Dependencies> {
        let mut resolved: BTreeMap<String, Dependencies> = self
            .files
            .iter()
            .map(|f| (f.path.clone(), Dependencies::default()))
            .collect();

        for file in self.files {
            let mut internal = BTreeSet::new();
            let mut external = BTreeSet::new();

            for raw in file.imports.0.iter() {
                for specifier in extract_specifiers(raw, &file.language) {
                    match self.resolve_specifier(&specifier, &file.path, &file.language) {
                        Some(target) if target != file.path => {
                            internal.insert(target);
                        }
                        Some(_) => {}
                        None => {
                            if let Some(name) = external_name(&specifier, &file.language) {
                                external.insert(name);
                            }
                        }
                    }
                }
            }

            if let Some(entry) = resolved.get_mut(&file.path) {
                entry.imports = internal.into_iter().collect();
                entry.external_imports = external.into_iter().collect();
            }
        }

        // Reverse edges are a projection of the forward edges.
        let forward: Vec<(String, Vec<String>)> = resolved
            .iter()
            .map(|(path, deps)| (path.clone(), deps.imports.clone()))
            .collect();
        for (source, targets) in forward {
            for target in targets {
                if let Some(entry) = resolved.get_mut(&target) {
                    entry.imported_by.push(source.clone());
                }
            }
        }
        for deps in resolved.values_mut() {
            deps.imported_by.sort();
            deps.imported_by.dedup();
        }

        resolved
    }

    fn resolve_specifier(&self, specifier: &str, importer: &str, language: &str) -> Option<String> {
        let candidates = match language {
            "python" => python_candidates(specifier, importer),
            "javascript" | "jsx" | "typescript" | "tsx" => js_candidates(specifier, importer),
            "rust" => rust_candidates(specifier, importer),
            "java" => return self.java_suffix_match(specifier),
            "go" => return self.go_package_match(specifier),
            "c" | "cpp" => c_candidates(specifier, importer),
            _ => Vec::new(),
        };

        candidates
            .into_iter()
            .find(|candidate| self.known_paths.contains(candidate.as_str()))
    }

    /// Java source roots vary (`src/main/java/…`), so a dotted import is
    /// matched against any known path with the right suffix, on a
    /// segment boundary.
    fn java_suffix_match(&self, specifier: &str) -> Option<String> {
        let suffix = format!("{}.java", specifier.replace('.', "/"));
        let boundary = format!("/{suffix}");
        let mut matches: Vec<&str> = self
            .known_paths
            .iter()
            .filter(|p| **p == suffix || p.ends_with(&boundary))
            .copied()
            .collect();
        matches.sort();
        matches.first().map(|p| p.to_string())
    }

    /// Go imports name a package directory behind a module prefix that
    /// never appears in the repo tree. Leading segments are stripped
    /// until the remainder matches a directory of `.go` files; the
    /// lexically first file of that package carries the edge.
    fn go_package_match(&self, specifier: &str) -> Option<String> {
        let segments: Vec<&str> = specifier.split('/').filter(|s| !s.is_empty()).collect();
        for skip in 0..segments.len() {
            let dir = segments[skip..].join("/");
            let boundary = format!("/{dir}");
            let mut matches: Vec<&str> = self
                .known_paths
                .iter()
                .filter(|p| p.ends_with(".go"))
                .filter(|p| match p.rsplit_once('/') {
                    Some((parent, _)) => parent == dir || parent.ends_with(&boundary),
                    None => false,
                })
                .copied()
                .collect();
            if !matches.is_empty() {
                matches.sort();
                return matches.first().map(|p| p.to_string());
            }
        }
        None
    }

    pub fn stats(&self, resolved: &BTreeMap<String, Dependencies>) -> DependencyStats {
        let total_internal: usize = resolved.values().map(|d| d.imports.len()).sum();
        let total_external: usize = resolved.values().map(|d| d.external_imports.len()).sum();
        let total_files = resolved.len();

        let mut most_imported: Vec<MostImported> = resolved
            .iter()
            .filter(|(_, d)| !d.imported_by.is_empty())
            .map(|(path, d)| MostImported {
                path: path.clone(),
                imported_by_count: d.imported_by.len(),
            })
            .collect();
        most_imported.sort_by(|a, b| {
            b.imported_by_count
                .cmp(&a.imported_by_count)
                .then_with(|| a.path.cmp(&b.path))
        });
        most_imported.truncate(10);

        DependencyStats {
            total_files,
            total_internal_dependencies: total_internal,
            total_external_dependencies: total_external,
            average_dependencies_per_file: if total_files == 0 {
                0.0
            } else {
                total_internal as f64 / total_files as f64
            },
            most_imported_files: most_imported,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MostImported {
    pub path: String,
    pub imported_by_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct DependencyStats {
    pub total_files: usize,
    pub total_internal_dependencies: usize,
    pub total_external_dependencies: usize,
    pub average_dependencies_per_file: f64,
    pub most_imported_files: Vec<MostImported>,
}

// ---------------------------------------------------------------------------
// Graph projection (for visualization consumers)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct GraphNode {
    pub id: String,
    pub path: String,
    pub filename: String,
    pub language: String,
    pub functions: Vec<String>,
    pub classes: Vec<String>,
    pub has_external_dependencies: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub edge_type: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct DependencyGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

/// Project stored files into a nodes/edges shape. Derived entirely from
/// the File collection; edges point from importer to imported.
pub fn build_graph(files: &[FileMeta]) -> DependencyGraph {
    let path_to_id: BTreeMap<&str, &str> = files
        .iter()
        .map(|f| (f.path.as_str(), f.file_id.as_str()))
        .collect();

    let nodes = files
        .iter()
        .map(|f| GraphNode {
            id: f.file_id.clone(),
            path: f.path.clone(),
            filename: f.filename.clone(),
            language: f.language.clone(),
            functions: f.functions.0.iter().map(|func| func.name.clone()).collect(),
            classes: f.classes.0.iter().map(|c| c.name.clone()).collect(),
            has_external_dependencies: !f.dependencies.0.external_imports.is_empty(),
        })
        .collect();

    let mut edges = Vec::new();
    for file in files {
        for imported in &file.dependencies.0.imports {
            if let Some(target) = path_to_id.get(imported.as_str()) {
                edges.push(GraphEdge {
                    source: file.file_id.clone(),
                    target: (*target).to_string(),
                    edge_type: "imports",
                });
            }
        }
    }

    DependencyGraph { nodes, edges }
}

// ---------------------------------------------------------------------------
// Specifier extraction and candidate generation
// ---------------------------------------------------------------------------

/// Pull module specifiers out of a raw import entry. Python imports are
/// already bare module paths; other languages store the whole statement,
/// so quoted or keyword-delimited specifiers are extracted here.
fn extract_specifiers(raw: &str, language: &str) -> Vec<String> {
    match language {
        "python" => vec![raw.to_string()],
        "javascript" | "jsx" | "typescript" | "tsx" | "go" | "c" | "cpp" => {
            let quoted = extract_quoted(raw);
            if quoted.is_empty() && (language == "c" || language == "cpp") {
                // `#include <stdio.h>`
                if let Some(start) = raw.find('<') {
                    if let Some(end) = raw[start..].find('>') {
                        return vec![format!("<{}>", &raw[start + 1..start + end])];
                    }
                }
            }
            quoted
        }
        "rust" => {
            let body = raw
                .trim_start_matches("pub ")
                .trim_start_matches("use ")
                .trim_end_matches(';')
                .trim();
            // `use a::b::{c, d}` resolves through the common prefix.
            let prefix = body.split('{').next().unwrap_or(body);
            vec![prefix.trim_end_matches("::").trim().to_string()]
        }
        "java" => vec![raw
            .trim_start_matches("import ")
            .trim_start_matches("static ")
            .trim_end_matches(';')
            .trim()
            .to_string()],
        "php" => vec![raw
            .trim_start_matches("use ")
            .trim_end_matches(';')
            .trim()
            .to_string()],
        _ => Vec::new(),
    }
}

fn extract_quoted(raw: &str) -> Vec<String> {
    let mut out = Vec::new();
    for quote in ['"', '\''] {
        let mut rest = raw;
        while let Some(start) = rest.find(quote) {
            let tail = &rest[start + 1..];
            match tail.find(quote) {
                Some(end) => {
                    out.push(tail[..end].to_string());
                    rest = &tail[end + 1..];
                }
                None => break,
            }
        }
        if !out.is_empty() {
            break;
        }
    }
    out
}

fn python_candidates(specifier: &str, importer: &str) -> Vec<String> {
    let base = if let Some(stripped) = specifier.strip_prefix('.') {
        // Relative import: one dot is the importer's package, each extra
        // dot climbs a directory.
        let extra_dots = stripped.chars().take_while(|c| *c == '.').count();
        let module = &stripped[extra_dots..];
        let mut dir = parent_dir(importer);
        for _ in 0..extra_dots {
            dir = parent_dir(&dir);
        }
        join_dir(&dir, &module.replace('.', "/"))
    } else {
        specifier.replace('.', "/")
    };

    if base.is_empty() {
        return Vec::new();
    }
    vec![format!("{base}.py"), format!("{base}/__init__.py")]
}

fn js_candidates(specifier: &str, importer: &str) -> Vec<String> {
    if !specifier.starts_with("./") && !specifier.starts_with("../") {
        return Vec::new();
    }
    let base = normalize_relative(&parent_dir(importer), specifier);
    let mut candidates = vec![base.clone()];
    for ext in [".ts", ".tsx", ".js", ".jsx"] {
        candidates.push(format!("{base}{ext}"));
    }
    for index in ["index.ts", "index.tsx", "index.js", "index.jsx"] {
        candidates.push(join_dir(&base, index));
    }
    candidates
}

fn rust_candidates(specifier: &str, importer: &str) -> Vec<String> {
    let segments: Vec<&str> = specifier.split("::").map(str::trim).collect();
    let (root, rest): (String, &[&str]) = match segments.first().copied() {
        Some("crate") => ("src".to_string(), &segments[1..]),
        Some("self") => (parent_dir(importer), &segments[1..]),
        Some("super") => (parent_dir(&parent_dir(importer)), &segments[1..]),
        _ => return Vec::new(),
    };

    // The tail segments may name items rather than modules; try every
    // prefix from longest to shortest.
    let mut candidates = Vec::new();
    for take in (1..=rest.len()).rev() {
        let joined = rest[..take].join("/");
        let base = join_dir(&root, &joined);
        candidates.push(format!("{base}.rs"));
        candidates.push(format!("{base}/mod.rs"));
    }
    candidates
}

fn c_candidates(specifier: &str, importer: &str) -> Vec<String> {
    if specifier.starts_with('<') {
        return Vec::new();
    }
    vec![
        normalize_relative(&parent_dir(importer), specifier),
        specifier.to_string(),
    ]
}

/// Package name reported when a specifier resolves outside the repo.
fn external_name(specifier: &str, language: &str) -> Option<String> {
    let name = match language {
        "python" => specifier.trim_start_matches('.').split('.').next()?.to_string(),
        "javascript" | "jsx" | "typescript" | "tsx" => {
            if specifier.starts_with("./") || specifier.starts_with("../") {
                return None;
            }
            if let Some(rest) = specifier.strip_prefix('@') {
                // Scoped package: @scope/name
                let mut parts = rest.splitn(3, '/');
                let scope = parts.next()?;
                let package = parts.next()?;
                format!("@{scope}/{package}")
            } else {
                specifier.split('/').next()?.to_string()
            }
        }
        "rust" => {
            let first = specifier.split("::").next()?.trim();
            if matches!(first, "crate" | "self" | "super") {
                return None;
            }
            first.to_string()
        }
        "java" => {
            let mut parts = specifier.split('.');
            match (parts.next(), parts.next()) {
                (Some(a), Some(b)) => format!("{a}.{b}"),
                (Some(a), None) => a.to_string(),
                _ => return None,
            }
        }
        "go" => specifier.to_string(),
        "c" | "cpp" => specifier
            .trim_matches(|c| c == '<' || c == '>')
            .to_string(),
        "php" => specifier.split('\\').next()?.to_string(),
        _ => return None,
    };

    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

fn parent_dir(path: &str) -> String {
    match path.rfind('/') {
        Some(idx) => path[..idx].to_string(),
        None => String::new(),
    }
}

fn join_dir(dir: &str, rest: &str) -> String {
    if dir.is_empty() {
        rest.to_string()
    } else if rest.is_empty() {
        dir.to_string()
    } else {
        format!("{dir}/{rest}")
    }
}

/// Resolve `./` and `../` segments of `relative` against `base`.
fn normalize_relative(base: &str, relative: &str) -> String {
    let mut parts: Vec<&str> = if base.is_empty() {
        Vec::new()
    } else {
        base.split('/').collect()
    };
    for segment in relative.split('/') {
        match segment {
            "." | "" => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ClassRecord, Dependencies, FunctionRecord};
    use sqlx::types::Json;

    fn meta(path: &str, language: &str, imports: &[&str]) -> FileMeta {
        FileMeta {
            file_id: format!("file-{path}"),
            path: path.to_string(),
            filename: path.rsplit('/').next().unwrap_or(path).to_string(),
            language: language.to_string(),
            functions: Json(Vec::<FunctionRecord>::new()),
            classes: Json(Vec::<ClassRecord>::new()),
            imports: Json(imports.iter().map(|s| s.to_string()).collect()),
            dependencies: Json(Dependencies::default()),
            summary: None,
            parsed: true,
        }
    }

    #[test]
    fn python_dotted_and_relative_imports_resolve() {
        let files = vec![
            meta("app/main.py", "python", &["app.services.engine", "os"]),
            meta("app/services/engine.py", "python", &[".util"]),
            meta("app/services/util.py", "python", &[]),
        ];
        let resolver = DependencyResolver::new(&files);
        let resolved = resolver.resolve_all();

        assert_eq!(
            resolved["app/main.py"].imports,
            vec!["app/services/engine.py"]
        );
        assert_eq!(resolved["app/main.py"].external_imports, vec!["os"]);
        assert_eq!(
            resolved["app/services/engine.py"].imports,
            vec!["app/services/util.py"]
        );
    }

    #[test]
    fn reverse_edges_mirror_forward_edges() {
        let files = vec![
            meta("src/main.py", "python", &["src.util"]),
            meta("src/util.py", "python", &[]),
        ];
        let resolved = DependencyResolver::new(&files).resolve_all();

        assert_eq!(resolved["src/main.py"].imports, vec!["src/util.py"]);
        assert_eq!(resolved["src/util.py"].imported_by, vec!["src/main.py"]);
        // Invariant: every forward edge has its reverse.
        for (path, deps) in &resolved {
            for target in &deps.imports {
                assert!(resolved[target].imported_by.contains(path));
            }
        }
    }

    #[test]
    fn js_relative_imports_try_extensions_and_index() {
        let files = vec![
            meta(
                "web/app.ts",
                "typescript",
                &["import { x } from './util';", "import React from 'react';"],
            ),
            meta("web/util.ts", "typescript", &[]),
            meta(
                "web/pages.tsx",
                "tsx",
                &["import { page } from './components';"],
            ),
            meta("web/components/index.tsx", "tsx", &[]),
        ];
        let resolved = DependencyResolver::new(&files).resolve_all();

        assert_eq!(resolved["web/app.ts"].imports, vec!["web/util.ts"]);
        assert_eq!(resolved["web/app.ts"].external_imports, vec!["react"]);
        assert_eq!(
            resolved["web/pages.tsx"].imports,
            vec!["web/components/index.tsx"]
        );
    }

    #[test]
    fn java_dotted_imports_match_across_source_roots() {
        let files = vec![
            meta(
                "src/main/java/com/acme/app/Main.java",
                "java",
                &["import com.acme.util.Strings;", "import java.util.List;"],
            ),
            meta("src/main/java/com/acme/util/Strings.java", "java", &[]),
        ];
        let resolved = DependencyResolver::new(&files).resolve_all();

        assert_eq!(
            resolved["src/main/java/com/acme/app/Main.java"].imports,
            vec!["src/main/java/com/acme/util/Strings.java"]
        );
        assert_eq!(
            resolved["src/main/java/com/acme/app/Main.java"].external_imports,
            vec!["java.util"]
        );
        assert_eq!(
            resolved["src/main/java/com/acme/util/Strings.java"].imported_by,
            vec!["src/main/java/com/acme/app/Main.java"]
        );
    }

    #[test]
    fn java_suffix_match_requires_a_segment_boundary() {
        // "acme/util/Strings.java" must not match "legacyacme/util/…".
        let files = vec![
            meta("app/Main.java", "java", &["import acme.util.Strings;"]),
            meta("legacyacme/util/Strings.java", "java", &[]),
        ];
        let resolved = DependencyResolver::new(&files).resolve_all();
        assert!(resolved["app/Main.java"].imports.is_empty());
        assert_eq!(resolved["app/Main.java"].external_imports, vec!["acme.util"]);
    }

    #[test]
    fn go_package_imports_resolve_past_the_module_prefix() {
        let files = vec![
            meta(
                "cmd/server/main.go",
                "go",
                &["import (\n\t\"fmt\"\n\t\"example.com/demo/internal/parser\"\n)"],
            ),
            meta("internal/parser/lexer.go", "go", &[]),
            meta("internal/parser/parser.go", "go", &[]),
        ];
        let resolved = DependencyResolver::new(&files).resolve_all();

        // The package matched as a directory; its lexically first file
        // carries the edge, and stdlib packages stay external.
        assert_eq!(
            resolved["cmd/server/main.go"].imports,
            vec!["internal/parser/lexer.go"]
        );
        assert_eq!(resolved["cmd/server/main.go"].external_imports, vec!["fmt"]);
        assert_eq!(
            resolved["internal/parser/lexer.go"].imported_by,
            vec!["cmd/server/main.go"]
        );
    }

    #[test]
    fn rust_crate_paths_resolve_with_mod_fallback() {
        let files = vec![
            meta(
                "src/main.rs",
                "rust",
                &["use crate::engine::start;", "use serde::Serialize;"],
            ),
            meta("src/engine/mod.rs", "rust", &[]),
        ];
        let resolved = DependencyResolver::new(&files).resolve_all();

        assert_eq!(resolved["src/main.rs"].imports, vec!["src/engine/mod.rs"]);
        assert_eq!(resolved["src/main.rs"].external_imports, vec!["serde"]);
    }

    #[test]
    fn resolution_is_idempotent() {
        let files = vec![
            meta("a.py", "python", &["b"]),
            meta("b.py", "python", &["a"]),
        ];
        let resolver = DependencyResolver::new(&files);
        let first = resolver.resolve_all();
        let second = resolver.resolve_all();
        assert_eq!(first, second);
        // Cycles are representable: both directions exist.
        assert_eq!(first["a.py"].imports, vec!["b.py"]);
        assert_eq!(first["b.py"].imports, vec!["a.py"]);
        assert_eq!(first["a.py"].imported_by, vec!["b.py"]);
    }

    #[test]
    fn stats_count_edges_and_rank_most_imported() {
        let files = vec![
            meta("a.py", "python", &["c"]),
            meta("b.py", "python", &["c"]),
            meta("c.py", "python", &["json"]),
        ];
        let resolver = DependencyResolver::new(&files);
        let resolved = resolver.resolve_all();
        let stats = resolver.stats(&resolved);

        assert_eq!(stats.total_files, 3);
        assert_eq!(stats.total_internal_dependencies, 2);
        assert_eq!(stats.total_external_dependencies, 1);
        assert_eq!(stats.most_imported_files[0].path, "c.py");
        assert_eq!(stats.most_imported_files[0].imported_by_count, 2);
    }

    #[test]
    fn graph_projection_links_by_file_id() {
        let mut files = vec![
            meta("a.py", "python", &[]),
            meta("b.py", "python", &[]),
        ];
        files[0].dependencies = Json(Dependencies {
            imports: vec!["b.py".to_string()],
            imported_by: vec![],
            external_imports: vec!["requests".to_string()],
        });

        let graph = build_graph(&files);
        assert_eq!(graph.nodes.len(), 2);
        assert_eq!(graph.edges.len(), 1);
        assert_eq!(graph.edges[0].source, "file-a.py");
        assert_eq!(graph.edges[0].target, "file-b.py");
        assert!(graph.nodes[0].has_external_dependencies);
    }
}
