//! End-to-end structural checks across the parse → chunk path, without
//! any network or database: parser output feeds the embedding planner
//! exactly the way the pipeline wires them together.

use repograph::models::EmbeddingType;
use repograph::parsers::ParserRegistry;
use repograph::pipeline::embedder::{extract_lines, plan_embeddings};

use chrono::Utc;
use repograph::models::{Dependencies, FileRecord, ParsedSource};

fn file_record(path: &str, language: &str, content: String, parsed: ParsedSource) -> FileRecord {
    let now = Utc::now();
    FileRecord {
        file_id: format!("file-{path}"),
        repo_id: "repo-test".to_string(),
        session_id: "session-test".to_string(),
        path: path.to_string(),
        filename: path.rsplit('/').next().unwrap_or(path).to_string(),
        extension: String::new(),
        language: language.to_string(),
        size_bytes: content.len() as i64,
        content,
        content_hash: String::new(),
        functions: parsed.functions,
        classes: parsed.classes,
        imports: parsed.imports,
        parse_error: parsed.parse_error,
        dependencies: Dependencies::default(),
        summary: None,
        provider: None,
        model: None,
        parsed: true,
        embedded: false,
        analyzed: false,
        created_at: now,
        updated_at: now,
    }
}

const MAIN_PY: &str = r#"from src.util import helper

def run():
    return helper()

class Engine:
    def start(self):
        return True

    def stop(self):
        return False
"#;

#[test]
fn parsed_structure_feeds_the_planner_with_consistent_records() {
    let registry = ParserRegistry::with_default_parsers();
    let parsed = registry
        .parse(MAIN_PY, "src/main.py", "python")
        .expect("python is registered");
    assert!(parsed.parse_error.is_none());

    // Flat list is the union of standalone functions and every method,
    // with parent_class linking each method to its class.
    let names: Vec<&str> = parsed.functions.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["run", "start", "stop"]);
    for method in parsed.functions.iter().filter(|f| f.is_method) {
        assert_eq!(method.parent_class.as_deref(), Some("Engine"));
        let class = parsed
            .classes
            .iter()
            .find(|c| c.name == "Engine")
            .expect("class extracted");
        assert!(class.methods.iter().any(|m| m.name == method.name));
    }

    let file = file_record("src/main.py", "python", MAIN_PY.to_string(), parsed);
    let plans = plan_embeddings(&file);

    // One class embedding, one standalone function; methods are covered
    // by the class and never embedded individually.
    let kinds: Vec<(EmbeddingType, &str)> = plans
        .iter()
        .map(|p| (p.embedding_type, p.name.as_str()))
        .collect();
    assert_eq!(
        kinds,
        vec![
            (EmbeddingType::Class, "Engine"),
            (EmbeddingType::Function, "run"),
        ]
    );

    // Every planned range lies within the file and matches its source.
    let total_lines = file.content.lines().count() as u32;
    for plan in &plans {
        assert!(plan.line_start >= 1);
        assert!(plan.line_start <= plan.line_end);
        assert!(plan.line_end <= total_lines);
        assert_eq!(
            plan.code,
            extract_lines(&file.content, plan.line_start, plan.line_end)
        );
    }
}

#[test]
fn oversized_parsed_class_is_chunked_with_recoverable_windows() {
    // A class opening on line 10 whose body runs through line 910
    // (span 900, over the 800-line threshold).
    let mut lines: Vec<String> = (1..=9).map(|i| format!("# filler {i}")).collect();
    lines.push("class Huge:".to_string());
    for i in 11..=910 {
        lines.push(format!("    attr_{i} = {i}"));
    }
    let content = lines.join("\n");

    let registry = ParserRegistry::with_default_parsers();
    let parsed = registry
        .parse(&content, "src/huge.py", "python")
        .expect("python is registered");
    assert!(parsed.parse_error.is_none());

    let class = &parsed.classes[0];
    assert_eq!((class.line_start, class.line_end), (10, 910));

    let file = file_record("src/huge.py", "python", content.clone(), parsed);
    let plans = plan_embeddings(&file);

    assert_eq!(plans.len(), 2);
    for plan in &plans {
        assert_eq!(plan.embedding_type, EmbeddingType::ClassChunk);
        assert_eq!(plan.parent_class.as_deref(), Some("Huge"));
        assert_eq!(plan.total_chunks, Some(2));
    }
    assert_eq!((plans[0].line_start, plans[0].line_end), (10, 709));
    assert_eq!((plans[1].line_start, plans[1].line_end), (610, 910));
    assert_eq!(plans[0].name, "Huge_chunk_1");
    assert_eq!(plans[1].name, "Huge_chunk_2");

    // Reconstruction: extracting the class range from the stored content
    // yields exactly the class source the chunks were cut from.
    let reconstructed = extract_lines(&content, 10, 910);
    assert!(reconstructed.starts_with("class Huge:"));
    assert!(reconstructed.ends_with("attr_910 = 910"));
    assert!(plans[0].code.starts_with("class Huge:"));
    assert!(reconstructed.contains(plans[1].code.lines().last().unwrap()));
}
