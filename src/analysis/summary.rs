//! Per-file summary generation.
//!
//! Each file gets a prompt shaped by what it is (code, configuration,
//! documentation, script, or other) carrying its structure and a content
//! prefix; the model answers with a compact structured summary that is
//! persisted with provider/model provenance.

use futures::future::join_all;

use crate::ai::client::{ChatMessage, LlmClient};
use crate::ai::think::strip_thinking_content;
use crate::error::Result;
use crate::store::{FileStore, SummaryInput};

const SUMMARY_BATCH_SIZE: usize = 5;
const MAX_PROMPT_CONTENT: usize = 2_000;
const SUMMARY_MAX_TOKENS: u32 = 16_384;

/// Directories that never get summaries even if their files were stored.
const EXCLUDED_DIRS: &[&str] = &[
    "node_modules/",
    "vendor/",
    "target/",
    ".git/",
    ".svn/",
    ".hg/",
    "dist/",
    "build/",
    "out/",
    ".next/",
    "__pycache__/",
    ".pytest_cache/",
    "venv/",
    "env/",
    ".venv/",
];

const SUMMARY_SYSTEM_PROMPT: &str = r#"You are a code analysis expert. Generate concise, structured summaries.

Format:
1. **Overview**: What this file does (1 sentence)
2. **Key Functions** (list 3-5 most important):
   - functionName(): What it does in 1 sentence
   - anotherFunction(): What it does in 1 sentence
3. **Dependencies**: Key imports/integrations (1 sentence)
4. **Security** (optional): ONLY medium/high severity issues
5. **Notable** (optional): ONLY critical gotchas

Rules:
- MUST list individual functions with what they do
- Focus on 3-5 most important functions/methods
- Keep each function description to 1 sentence
- Total summary under 1000 characters
- Skip Performance/Security/Notable if no significant issues

Be specific about what each function does."#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Code,
    Config,
    Documentation,
    Script,
    Other,
}

pub fn classify_file(path: &str, has_structure: bool) -> FileKind {
    if has_structure {
        return FileKind::Code;
    }
    let lower = path.to_lowercase();
    if [".json", ".yml", ".yaml", ".toml", ".ini", ".env"]
        .iter()
        .any(|ext| lower.ends_with(ext))
    {
        FileKind::Config
    } else if [".md", ".txt", ".rst"].iter().any(|ext| lower.ends_with(ext)) {
        FileKind::Documentation
    } else if [".sh", ".bash", ".ps1"].iter().any(|ext| lower.ends_with(ext))
        || lower.ends_with("makefile")
        || lower.ends_with("dockerfile")
    {
        FileKind::Script
    } else {
        FileKind::Other
    }
}

pub fn build_summary_prompt(file: &SummaryInput) -> String {
    let functions = &file.functions.0;
    let classes = &file.classes.0;
    let imports = &file.imports.0;

    let mut content = file.content_prefix.clone();
    if content.len() > MAX_PROMPT_CONTENT || (file.content_len as usize) > content.len() {
        let cut = floor_char_boundary(&content, MAX_PROMPT_CONTENT.min(content.len()));
        content.truncate(cut);
        content.push_str("\n... (truncated)");
    }

    let kind = classify_file(&file.path, !functions.is_empty() || !classes.is_empty());
    let path = &file.path;
    let language = &file.language;

    match kind {
        FileKind::Code => {
            let function_lines: Vec<String> = functions
                .iter()
                .take(10)
                .map(|f| {
                    let parent = f
                        .parent_class
                        .as_ref()
                        .map(|c| format!(" (in {c})"))
                        .unwrap_or_default();
                    format!("  - {}{parent}", f.signature)
                })
                .collect();

            let class_lines: Vec<String> = classes
                .iter()
                .take(10)
                .map(|c| {
                    let method_names: Vec<&str> =
                        c.methods.iter().take(5).map(|m| m.name.as_str()).collect();
                    format!(
                        "  - {} ({} methods: {})",
                        c.name,
                        c.methods.len(),
                        method_names.join(", ")
                    )
                })
                .collect();

            let import_list: Vec<&str> = imports.iter().take(10).map(String::as_str).collect();

            format!(
                "Analyze this {language} file and generate a comprehensive summary.\n\n\
                 **File:** `{path}`\n\n\
                 **Functions ({}):**\n{}\n\n\
                 **Classes ({}):**\n{}\n\n\
                 **Imports ({}):**\n{}\n\n\
                 **Code:**\n```{language}\n{content}\n```\n\n\
                 Generate a concise summary (3-5 sentences) covering:\n\
                 1. Primary purpose of this file\n\
                 2. Key functionality and components\n\
                 3. Dependencies and how it fits in the codebase\n\
                 4. Any notable patterns, concerns, or complexity",
                functions.len(),
                if function_lines.is_empty() {
                    "  (none)".to_string()
                } else {
                    function_lines.join("\n")
                },
                classes.len(),
                if class_lines.is_empty() {
                    "  (none)".to_string()
                } else {
                    class_lines.join("\n")
                },
                imports.len(),
                if import_list.is_empty() {
                    "(none)".to_string()
                } else {
                    import_list.join(", ")
                },
            )
        }
        FileKind::Config => format!(
            "Analyze this configuration file and generate a summary.\n\n\
             **File:** `{path}` (Configuration)\n\n\
             **Content:**\n```{language}\n{content}\n```\n\n\
             Generate a concise summary covering:\n\
             1. What this configuration file controls\n\
             2. Key settings and their purpose\n\
             3. Any notable or critical configurations"
        ),
        FileKind::Documentation => format!(
            "Analyze this documentation file and generate a summary.\n\n\
             **File:** `{path}` (Documentation)\n\n\
             **Content:**\n```{language}\n{content}\n```\n\n\
             Generate a concise summary covering:\n\
             1. Main topic or purpose of this document\n\
             2. Key information or instructions provided\n\
             3. Target audience (developers, users, etc.)"
        ),
        FileKind::Script => format!(
            "Analyze this script file and generate a summary.\n\n\
             **File:** `{path}` (Script)\n\n\
             **Content:**\n```{language}\n{content}\n```\n\n\
             Generate a concise summary covering:\n\
             1. What this script does\n\
             2. When/how it should be run\n\
             3. Any important dependencies or requirements"
        ),
        FileKind::Other => format!(
            "Analyze this file and generate a summary.\n\n\
             **File:** `{path}` ({language})\n\n\
             **Content:**\n```{language}\n{content}\n```\n\n\
             Generate a concise summary covering the file's purpose and contents."
        ),
    }
}

pub struct Summarizer {
    llm: LlmClient,
    files: FileStore,
    provider: String,
}

impl Summarizer {
    pub fn new(llm: LlmClient, files: FileStore, provider: String) -> Self {
        Self {
            llm,
            files,
            provider,
        }
    }

    /// Summarize every eligible file in the repository, in parallel
    /// batches. Per-file failures are logged and skipped.
    pub async fn generate_for_repository(&self, repo_id: &str) -> Result<()> {
        let files = self.files.list_for_summaries(repo_id).await?;
        let eligible: Vec<SummaryInput> = files
            .into_iter()
            .filter(|f| !EXCLUDED_DIRS.iter().any(|dir| f.path.starts_with(dir)))
            .collect();

        if eligible.is_empty() {
            tracing::info!(repo_id, "no files to summarize");
            return Ok(());
        }

        let total = eligible.len();
        tracing::info!(repo_id, total, "generating file summaries");

        let mut generated = 0usize;
        for batch in eligible.chunks(SUMMARY_BATCH_SIZE) {
            let results = join_all(batch.iter().map(|file| self.summarize_file(file))).await;
            generated += results.iter().filter(|ok| **ok).count();
        }

        tracing::info!(repo_id, generated, total, "summary generation complete");
        Ok(())
    }

    async fn summarize_file(&self, file: &SummaryInput) -> bool {
        let prompt = build_summary_prompt(file);
        let messages = [
            ChatMessage::system(SUMMARY_SYSTEM_PROMPT),
            ChatMessage::user(prompt),
        ];

        let completion = match self
            .llm
            .complete(&messages, None, 0.3, Some(SUMMARY_MAX_TOKENS))
            .await
        {
            Ok(completion) => completion,
            Err(err) => {
                tracing::warn!(path = %file.path, %err, "summary generation failed");
                return false;
            }
        };

        let Some(raw) = completion.content else {
            tracing::warn!(path = %file.path, "empty summary response");
            return false;
        };
        let summary = strip_thinking_content(raw.trim());
        if summary.is_empty() {
            return false;
        }

        match self
            .files
            .set_summary(&file.file_id, &summary, &self.provider, self.llm.model())
            .await
        {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(path = %file.path, %err, "failed to persist summary");
                false
            }
        }
    }
}

fn floor_char_boundary(s: &str, mut index: usize) -> usize {
    while index > 0 && !s.is_char_boundary(index) {
        index -= 1;
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ClassRecord, FunctionRecord, MethodRecord};
    use sqlx::types::Json;

    fn input(path: &str, functions: Vec<FunctionRecord>, classes: Vec<ClassRecord>) -> SummaryInput {
        SummaryInput {
            file_id: "file-1".to_string(),
            path: path.to_string(),
            language: "python".to_string(),
            functions: Json(functions),
            classes: Json(classes),
            imports: Json(vec!["os".to_string()]),
            content_prefix: "print('hi')".to_string(),
            content_len: 11,
        }
    }

    fn function(name: &str, parent: Option<&str>) -> FunctionRecord {
        FunctionRecord {
            name: name.to_string(),
            line_start: 1,
            line_end: 2,
            parameters: vec![],
            parent_class: parent.map(String::from),
            is_method: parent.is_some(),
            return_type: None,
            docstring: None,
            signature: format!("{name}()"),
            is_async: false,
        }
    }

    #[test]
    fn classification_covers_each_kind() {
        assert_eq!(classify_file("src/app.py", true), FileKind::Code);
        assert_eq!(classify_file("config.yaml", false), FileKind::Config);
        assert_eq!(classify_file("README.md", false), FileKind::Documentation);
        assert_eq!(classify_file("scripts/run.sh", false), FileKind::Script);
        assert_eq!(classify_file("Dockerfile", false), FileKind::Script);
        assert_eq!(classify_file("data.csv", false), FileKind::Other);
    }

    #[test]
    fn code_prompt_lists_structure_with_parent_annotations() {
        let classes = vec![ClassRecord {
            name: "Engine".to_string(),
            line_start: 1,
            line_end: 10,
            methods: vec![MethodRecord {
                name: "start".to_string(),
                line_start: 2,
                line_end: 3,
                parameters: vec![],
                return_type: None,
                docstring: None,
                is_async: false,
                is_static: false,
                is_class_method: false,
            }],
            base_classes: vec![],
            docstring: None,
        }];
        let prompt = build_summary_prompt(&input(
            "src/engine.py",
            vec![function("run", None), function("start", Some("Engine"))],
            classes,
        ));

        assert!(prompt.contains("`src/engine.py`"));
        assert!(prompt.contains("- run()"));
        assert!(prompt.contains("- start() (in Engine)"));
        assert!(prompt.contains("Engine (1 methods: start)"));
    }

    #[test]
    fn config_prompt_selected_for_structureless_yaml() {
        let prompt = build_summary_prompt(&input("deploy/app.yaml", vec![], vec![]));
        assert!(prompt.contains("(Configuration)"));
    }

    #[test]
    fn long_content_gets_truncation_marker() {
        let mut file = input("src/big.py", vec![function("run", None)], vec![]);
        file.content_prefix = "x".repeat(3_000);
        file.content_len = 50_000;
        let prompt = build_summary_prompt(&file);
        assert!(prompt.contains("... (truncated)"));
        assert!(!prompt.contains(&"x".repeat(2_500)));
    }
}
