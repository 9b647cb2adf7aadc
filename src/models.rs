//! Persisted document shapes shared by the pipeline and the retrieval side.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// File tree
// ---------------------------------------------------------------------------

/// Nested repository file tree. Folder children are keyed by path segment;
/// every leaf's `path` equals the concatenation of its ancestor keys.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TreeNode {
    Folder { children: BTreeMap<String, TreeNode> },
    File { path: String, size: u64, url: String },
}

pub type FileTree = BTreeMap<String, TreeNode>;

/// Flat view of a tree leaf, used by the parse stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TreeFile {
    pub path: String,
    pub size: u64,
    pub url: String,
}

// ---------------------------------------------------------------------------
// Structural records
// ---------------------------------------------------------------------------

/// One callable in the flat per-file `functions` list. Methods appear here
/// too, linked to their class through `parent_class`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionRecord {
    pub name: String,
    pub line_start: u32,
    pub line_end: u32,
    pub parameters: Vec<String>,
    pub parent_class: Option<String>,
    pub is_method: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docstring: Option<String>,
    pub signature: String,
    #[serde(default)]
    pub is_async: bool,
}

/// A method as nested inside its class record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MethodRecord {
    pub name: String,
    pub line_start: u32,
    pub line_end: u32,
    pub parameters: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docstring: Option<String>,
    #[serde(default)]
    pub is_async: bool,
    #[serde(default)]
    pub is_static: bool,
    #[serde(default)]
    pub is_class_method: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClassRecord {
    pub name: String,
    pub line_start: u32,
    pub line_end: u32,
    pub methods: Vec<MethodRecord>,
    #[serde(default)]
    pub base_classes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docstring: Option<String>,
}

/// Output contract of every language parser. On syntax errors the lists
/// are empty and `parse_error` is set; the file is still stored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParsedSource {
    pub functions: Vec<FunctionRecord>,
    pub classes: Vec<ClassRecord>,
    pub imports: Vec<String>,
    pub parse_error: Option<String>,
}

/// Resolved import graph entry for one file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Dependencies {
    /// Repo-relative paths this file imports.
    pub imports: Vec<String>,
    /// Repo-relative paths that import this file.
    pub imported_by: Vec<String>,
    /// Package names that did not resolve to a file in the repo.
    pub external_imports: Vec<String>,
}

// ---------------------------------------------------------------------------
// Embeddings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingType {
    Function,
    Class,
    ClassChunk,
}

impl EmbeddingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmbeddingType::Function => "function",
            EmbeddingType::Class => "class",
            EmbeddingType::ClassChunk => "class_chunk",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "function" => Some(EmbeddingType::Function),
            "class" => Some(EmbeddingType::Class),
            "class_chunk" => Some(EmbeddingType::ClassChunk),
            _ => None,
        }
    }
}

/// One code embedding produced by the chunker. The summary embedding is
/// not one of these: it lives in its own column on the file so it can be
/// indexed and regenerated independently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeEmbedding {
    #[serde(rename = "type")]
    pub embedding_type: EmbeddingType,
    pub name: String,
    pub code: String,
    pub embedding: Vec<f32>,
    pub line_start: u32,
    pub line_end: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_index: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_chunks: Option<u32>,
}

// ---------------------------------------------------------------------------
// Repository / file documents
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepoStatus {
    Pending,
    Fetched,
    Processing,
    Completed,
    Failed,
}

impl RepoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepoStatus::Pending => "pending",
            RepoStatus::Fetched => "fetched",
            RepoStatus::Processing => "processing",
            RepoStatus::Completed => "completed",
            RepoStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repository {
    pub repo_id: String,
    pub session_id: String,
    pub github_url: String,
    pub owner: String,
    pub repo_name: String,
    pub full_name: String,
    pub description: Option<String>,
    pub default_branch: String,
    pub language: Option<String>,
    pub stars: i64,
    pub forks: i64,
    pub status: RepoStatus,
    pub task_id: Option<String>,
    pub error_message: Option<String>,
    pub file_tree: FileTree,
    pub file_count: i64,
    pub languages_breakdown: BTreeMap<String, i64>,
    pub overview: Option<String>,
    pub overview_generated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One retained source file. Structural fields are populated by the parse
/// stage; `dependencies`, summaries, and embeddings arrive later from the
/// concurrent analysis tasks, each flipping its own flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub file_id: String,
    pub repo_id: String,
    pub session_id: String,
    pub path: String,
    pub filename: String,
    pub extension: String,
    pub language: String,
    pub size_bytes: i64,
    pub content: String,
    pub content_hash: String,

    pub functions: Vec<FunctionRecord>,
    pub classes: Vec<ClassRecord>,
    pub imports: Vec<String>,
    pub parse_error: Option<String>,
    pub dependencies: Dependencies,

    pub summary: Option<String>,
    pub provider: Option<String>,
    pub model: Option<String>,

    pub parsed: bool,
    pub embedded: bool,
    pub analyzed: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }
}

/// Ingestion progress steps, in the order a task moves through them.
/// The discriminant order backs the monotonicity check in the task store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStep {
    Queued,
    Fetching,
    Parsing,
    Embedding,
    Summarizing,
    Overview,
    Finalizing,
    Completed,
}

impl TaskStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStep::Queued => "queued",
            TaskStep::Fetching => "fetching",
            TaskStep::Parsing => "parsing",
            TaskStep::Embedding => "embedding",
            TaskStep::Summarizing => "summarizing",
            TaskStep::Overview => "overview",
            TaskStep::Finalizing => "finalizing",
            TaskStep::Completed => "completed",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            TaskStep::Queued => "Queued",
            TaskStep::Fetching => "Fetching files from GitHub",
            TaskStep::Parsing => "Parsing code structure",
            TaskStep::Embedding => "Generating embeddings",
            TaskStep::Summarizing => "Generating AI summaries",
            TaskStep::Overview => "Generating repository overview",
            TaskStep::Finalizing => "Finalizing analysis",
            TaskStep::Completed => "Completed",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskProgress {
    pub total_files: i64,
    pub processed_files: i64,
    pub current_step: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub task_id: String,
    pub task_type: String,
    pub status: TaskStatus,
    pub payload: serde_json::Value,
    pub progress: TaskProgress,
    pub result: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Sessions / conversations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionPreferences {
    pub ai_provider: Option<String>,
    pub ai_model: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub preferences: Option<SessionPreferences>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub conversation_id: String,
    pub session_id: String,
    pub repo_id: String,
    pub title: String,
    pub system_prompt: String,
    pub message_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_steps_order_matches_pipeline_sequence() {
        use TaskStep::*;
        let steps = [Queued, Fetching, Parsing, Embedding, Summarizing, Overview, Finalizing, Completed];
        for pair in steps.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn embedding_type_round_trips_through_tag() {
        for ty in [EmbeddingType::Function, EmbeddingType::Class, EmbeddingType::ClassChunk] {
            assert_eq!(EmbeddingType::parse(ty.as_str()), Some(ty));
        }
    }

    #[test]
    fn tree_node_serializes_with_type_tag() {
        let node = TreeNode::File {
            path: "src/main.py".into(),
            size: 10,
            url: String::new(),
        };
        let value = serde_json::to_value(&node).unwrap();
        assert_eq!(value["type"], "file");
        assert_eq!(value["path"], "src/main.py");
    }
}
