//! Repository-level overview generation.
//!
//! Aggregates the per-file summaries into one prompt, prioritizing README
//! files, entry points, and the structurally densest files, and asks the
//! model for a multi-paragraph architectural overview.

use std::collections::BTreeMap;

use crate::ai::client::{ChatMessage, LlmClient};
use crate::error::Result;
use crate::store::{FileStore, OverviewFile, RepositoryStore};

const MAX_OVERVIEW_FILES: usize = 100;
const OVERVIEW_MAX_TOKENS: u32 = 8_192;

const OVERVIEW_SYSTEM_PROMPT: &str = r#"You are a senior software architect. Generate a comprehensive repository overview.

Create a 4-5 paragraph overview covering:
1. **Purpose & Scope**: What does this repository do? What problems does it solve?
2. **Architecture & Components**: Main modules, how they interact, design patterns
3. **Tech Stack**: Languages, frameworks, key libraries
4. **Entry Points**: Where to start reading the code (main files, important modules)
5. **Notable Concerns**: Critical security/performance/scalability issues across the codebase

Write in clear, professional language. Focus on helping new developers understand the codebase quickly."#;

const ENTRY_POINT_PATTERNS: &[&str] = &[
    "main.",
    "index.",
    "app.",
    "server.",
    "__init__.py",
    "__main__.py",
];

/// Order summaries for the prompt: READMEs first, then entry points, then
/// everything else by structural weight, capped at `MAX_OVERVIEW_FILES`.
pub fn select_overview_files(files: &[OverviewFile]) -> Vec<&OverviewFile> {
    let mut readmes = Vec::new();
    let mut entry_points = Vec::new();
    let mut others = Vec::new();

    for file in files {
        let filename = file
            .path
            .rsplit('/')
            .next()
            .unwrap_or(&file.path)
            .to_lowercase();
        if filename.contains("readme") {
            readmes.push(file);
        } else if ENTRY_POINT_PATTERNS
            .iter()
            .any(|pattern| filename.contains(pattern))
        {
            entry_points.push(file);
        } else {
            others.push(file);
        }
    }

    others.sort_by(|a, b| {
        let weight_a = a.function_count + a.class_count;
        let weight_b = b.function_count + b.class_count;
        weight_b.cmp(&weight_a).then_with(|| a.path.cmp(&b.path))
    });

    readmes
        .into_iter()
        .chain(entry_points)
        .chain(others)
        .take(MAX_OVERVIEW_FILES)
        .collect()
}

pub fn build_overview_prompt(files: &[OverviewFile]) -> String {
    let mut by_language: BTreeMap<&str, usize> = BTreeMap::new();
    for file in files {
        *by_language.entry(file.language.as_str()).or_insert(0) += 1;
    }
    let language_header: Vec<String> = by_language
        .iter()
        .map(|(language, count)| format!("{language} ({count})"))
        .collect();

    let selected = select_overview_files(files);
    let summaries: Vec<String> = selected
        .iter()
        .map(|file| {
            format!(
                "**{}**\n{}\n",
                file.path,
                file.summary.as_deref().unwrap_or("")
            )
        })
        .collect();

    format!(
        "Analyze this repository based on {} file summaries.\n\n\
         **Languages in repository:**\n{}\n\n\
         **File Summaries:**\n\n{}\n\
         Generate a comprehensive repository overview covering:\n\
         1. Overall purpose and what it does\n\
         2. Architecture and main components\n\
         3. Tech stack and key dependencies\n\
         4. Entry points for new developers\n\
         5. Critical issues or concerns across the codebase",
        files.len(),
        language_header.join(", "),
        summaries.join("\n"),
    )
}

pub struct OverviewGenerator {
    llm: LlmClient,
    files: FileStore,
    repositories: RepositoryStore,
}

impl OverviewGenerator {
    pub fn new(llm: LlmClient, files: FileStore, repositories: RepositoryStore) -> Self {
        Self {
            llm,
            files,
            repositories,
        }
    }

    /// Generate and persist the overview. Returns `Ok(None)` when no file
    /// summaries exist yet.
    pub async fn generate_for_repository(&self, repo_id: &str) -> Result<Option<String>> {
        let all = self.files.list_overview_inputs(repo_id).await?;
        let with_summaries: Vec<OverviewFile> = all
            .into_iter()
            .filter(|f| f.summary.as_deref().is_some_and(|s| !s.is_empty()))
            .collect();

        if with_summaries.is_empty() {
            tracing::info!(repo_id, "no summaries available for overview");
            return Ok(None);
        }

        let prompt = build_overview_prompt(&with_summaries);
        let messages = [
            ChatMessage::system(OVERVIEW_SYSTEM_PROMPT),
            ChatMessage::user(prompt),
        ];

        let completion = self
            .llm
            .complete(&messages, None, 0.3, Some(OVERVIEW_MAX_TOKENS))
            .await?;

        let Some(overview) = completion.content.map(|c| c.trim().to_string()) else {
            return Ok(None);
        };
        if overview.is_empty() {
            return Ok(None);
        }

        self.repositories.save_overview(repo_id, &overview).await?;
        tracing::info!(repo_id, chars = overview.len(), "repository overview saved");
        Ok(Some(overview))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(path: &str, functions: i64, classes: i64) -> OverviewFile {
        OverviewFile {
            file_id: format!("file-{path}"),
            path: path.to_string(),
            language: "python".to_string(),
            summary: Some(format!("Summary of {path}")),
            function_count: functions,
            class_count: classes,
        }
    }

    #[test]
    fn readmes_come_first_then_entry_points_then_by_weight() {
        let files = vec![
            file("src/helpers.py", 1, 0),
            file("src/core.py", 9, 3),
            file("src/main.py", 2, 0),
            file("README.md", 0, 0),
        ];
        let selected = select_overview_files(&files);
        let paths: Vec<&str> = selected.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(
            paths,
            vec!["README.md", "src/main.py", "src/core.py", "src/helpers.py"]
        );
    }

    #[test]
    fn selection_caps_at_one_hundred_files() {
        let files: Vec<OverviewFile> = (0..150)
            .map(|i| file(&format!("src/module_{i:03}.py"), i, 0))
            .collect();
        assert_eq!(select_overview_files(&files).len(), 100);
    }

    #[test]
    fn prompt_carries_language_counts_and_summaries() {
        let files = vec![file("src/main.py", 1, 0), file("README.md", 0, 0)];
        let prompt = build_overview_prompt(&files);
        assert!(prompt.contains("python (2)"));
        assert!(prompt.contains("**README.md**"));
        assert!(prompt.contains("Summary of src/main.py"));
    }
}
