//! Code chunking and embedding generation.
//!
//! Per parsed file: whole-class embeddings for classes up to the chunk
//! threshold, overlapping sliding-window chunks for larger ones,
//! standalone-function embeddings, and the file's summary embedding.
//! Methods of a small class are covered by the enclosing class embedding
//! rather than embedded individually.

use futures::future::join_all;

use crate::ai::EmbeddingClient;
use crate::error::Result;
use crate::models::{CodeEmbedding, EmbeddingType, FileRecord};
use crate::store::FileStore;

/// Classes spanning more than this many lines are chunked.
pub const CLASS_CHUNK_THRESHOLD: u32 = 800;
pub const CHUNK_SIZE: u32 = 700;
pub const CHUNK_OVERLAP: u32 = 100;
const EMBED_BATCH_SIZE: usize = 8;

/// Extract lines `[start, end]` (1-indexed, inclusive) from `content`.
pub fn extract_lines(content: &str, start: u32, end: u32) -> String {
    if start == 0 || end < start {
        return String::new();
    }
    content
        .lines()
        .skip(start as usize - 1)
        .take((end - start + 1) as usize)
        .collect::<Vec<&str>>()
        .join("\n")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineChunk {
    pub start: u32,
    pub end: u32,
}

/// Sliding windows over `[line_start, line_end]`: each window covers
/// `chunk_size` lines inclusive, the next starts `chunk_size - overlap`
/// later, and the final window is clamped to the class end.
pub fn sliding_window_chunks(
    line_start: u32,
    line_end: u32,
    chunk_size: u32,
    overlap: u32,
) -> Vec<LineChunk> {
    let mut chunks = Vec::new();
    let step = chunk_size - overlap;

    let mut current = line_start;
    while current < line_end {
        let chunk_end = (current + chunk_size - 1).min(line_end);
        chunks.push(LineChunk {
            start: current,
            end: chunk_end,
        });
        if chunk_end >= line_end {
            break;
        }
        current += step;
    }

    chunks
}

/// One embedding to produce for a file: everything but the vector.
#[derive(Debug, Clone)]
pub struct EmbeddingPlan {
    pub embedding_type: EmbeddingType,
    pub name: String,
    pub code: String,
    pub line_start: u32,
    pub line_end: u32,
    pub method_count: Option<u32>,
    pub parent_class: Option<String>,
    pub chunk_index: Option<u32>,
    pub total_chunks: Option<u32>,
}

/// Decide what gets embedded for a parsed file. Pure planning, no I/O.
pub fn plan_embeddings(file: &FileRecord) -> Vec<EmbeddingPlan> {
    let mut plans = Vec::new();

    for class in &file.classes {
        let span = class.line_end - class.line_start;
        if span <= CLASS_CHUNK_THRESHOLD {
            plans.push(EmbeddingPlan {
                embedding_type: EmbeddingType::Class,
                name: class.name.clone(),
                code: extract_lines(&file.content, class.line_start, class.line_end),
                line_start: class.line_start,
                line_end: class.line_end,
                method_count: Some(class.methods.len() as u32),
                parent_class: None,
                chunk_index: None,
                total_chunks: None,
            });
        } else {
            let chunks =
                sliding_window_chunks(class.line_start, class.line_end, CHUNK_SIZE, CHUNK_OVERLAP);
            let total = chunks.len() as u32;
            for (i, chunk) in chunks.iter().enumerate() {
                plans.push(EmbeddingPlan {
                    embedding_type: EmbeddingType::ClassChunk,
                    name: format!("{}_chunk_{}", class.name, i + 1),
                    code: extract_lines(&file.content, chunk.start, chunk.end),
                    line_start: chunk.start,
                    line_end: chunk.end,
                    method_count: None,
                    parent_class: Some(class.name.clone()),
                    chunk_index: Some(i as u32 + 1),
                    total_chunks: Some(total),
                });
            }
        }
    }

    for function in file.functions.iter().filter(|f| !f.is_method) {
        plans.push(EmbeddingPlan {
            embedding_type: EmbeddingType::Function,
            name: function.name.clone(),
            code: extract_lines(&file.content, function.line_start, function.line_end),
            line_start: function.line_start,
            line_end: function.line_end,
            method_count: None,
            parent_class: None,
            chunk_index: None,
            total_chunks: None,
        });
    }

    plans
}

pub struct Embedder {
    client: EmbeddingClient,
    files: FileStore,
}

impl Embedder {
    pub fn new(client: EmbeddingClient, files: FileStore) -> Self {
        Self { client, files }
    }

    /// Embed every parsed file in the repository, in parallel batches.
    /// Individual embedding failures are logged and skipped; a file may
    /// end up with a partial embedding set.
    pub async fn generate_for_repository(&self, repo_id: &str) -> Result<()> {
        let files = self.files.list_parsed_with_content(repo_id).await?;
        if files.is_empty() {
            tracing::info!(repo_id, "no parsed files to embed");
            return Ok(());
        }

        let total = files.len();
        tracing::info!(repo_id, total, "generating code embeddings");

        let mut embedded = 0usize;
        for batch in files.chunks(EMBED_BATCH_SIZE) {
            let results = join_all(batch.iter().map(|file| self.embed_file(file))).await;
            embedded += results.iter().filter(|ok| **ok).count();
        }

        tracing::info!(repo_id, embedded, total, "embedding generation complete");
        Ok(())
    }

    async fn embed_file(&self, file: &FileRecord) -> bool {
        if file.content.is_empty() {
            return false;
        }

        let mut embeddings = Vec::new();
        for plan in plan_embeddings(file) {
            match self.client.embed(&plan.code).await {
                Ok(vector) if !vector.is_empty() => embeddings.push(CodeEmbedding {
                    embedding_type: plan.embedding_type,
                    name: plan.name,
                    code: plan.code,
                    embedding: vector,
                    line_start: plan.line_start,
                    line_end: plan.line_end,
                    method_count: plan.method_count,
                    parent_class: plan.parent_class,
                    chunk_index: plan.chunk_index,
                    total_chunks: plan.total_chunks,
                }),
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(path = %file.path, name = %plan.name, %err,
                        "embedding failed, skipping element");
                }
            }
        }

        // Summary embedding goes to its own column; regenerated later
        // once summaries are final.
        let mut summary_embedded = false;
        if let Some(summary) = file.summary.as_deref().filter(|s| !s.is_empty()) {
            match self.client.embed(summary).await {
                Ok(vector) if !vector.is_empty() => {
                    if let Err(err) = self.files.set_summary_embedding(&file.file_id, &vector).await
                    {
                        tracing::warn!(path = %file.path, %err, "failed to store summary embedding");
                    } else {
                        summary_embedded = true;
                    }
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(path = %file.path, %err, "summary embedding failed");
                }
            }
        }

        if embeddings.is_empty() {
            return summary_embedded;
        }

        match self
            .files
            .replace_code_embeddings(&file.file_id, &file.repo_id, &embeddings)
            .await
        {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(path = %file.path, %err, "failed to store embeddings");
                false
            }
        }
    }

    /// Re-embed file summaries after the summary stage finishes.
    pub async fn regenerate_summary_embeddings(&self, repo_id: &str) -> Result<()> {
        let files = self.files.list_overview_inputs(repo_id).await?;
        let with_summaries: Vec<_> = files
            .into_iter()
            .filter(|f| f.summary.as_deref().is_some_and(|s| !s.is_empty()))
            .collect();

        if with_summaries.is_empty() {
            tracing::info!(repo_id, "no summaries to embed");
            return Ok(());
        }

        let mut updated = 0usize;
        for batch in with_summaries.chunks(EMBED_BATCH_SIZE) {
            let results = join_all(batch.iter().map(|file| async {
                let summary = file.summary.as_deref().unwrap_or_default();
                match self.client.embed(summary).await {
                    Ok(vector) if !vector.is_empty() => self
                        .files
                        .set_summary_embedding(&file.file_id, &vector)
                        .await
                        .is_ok(),
                    Ok(_) => false,
                    Err(err) => {
                        tracing::warn!(path = %file.path, %err, "summary re-embedding failed");
                        false
                    }
                }
            }))
            .await;
            updated += results.iter().filter(|ok| **ok).count();
        }

        tracing::info!(repo_id, updated, "summary embeddings regenerated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ClassRecord, Dependencies, FunctionRecord, MethodRecord};
    use chrono::Utc;

    fn numbered_content(lines: u32) -> String {
        (1..=lines)
            .map(|i| format!("line {i}"))
            .collect::<Vec<String>>()
            .join("\n")
    }

    fn file_with(
        content: String,
        functions: Vec<FunctionRecord>,
        classes: Vec<ClassRecord>,
    ) -> FileRecord {
        let now = Utc::now();
        FileRecord {
            file_id: "file-1".to_string(),
            repo_id: "repo-1".to_string(),
            session_id: "session-1".to_string(),
            path: "src/big.py".to_string(),
            filename: "big.py".to_string(),
            extension: ".py".to_string(),
            language: "python".to_string(),
            size_bytes: content.len() as i64,
            content,
            content_hash: String::new(),
            functions,
            classes,
            imports: vec![],
            parse_error: None,
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

    fn class(name: &str, start: u32, end: u32, methods: u32) -> ClassRecord {
        ClassRecord {
            name: name.to_string(),
            line_start: start,
            line_end: end,
            methods: (0..methods)
                .map(|i| MethodRecord {
                    name: format!("m{i}"),
                    line_start: start + 1,
                    line_end: start + 2,
                    parameters: vec![],
                    return_type: None,
                    docstring: None,
                    is_async: false,
                    is_static: false,
                    is_class_method: false,
                })
                .collect(),
            base_classes: vec![],
            docstring: None,
        }
    }

    fn function(name: &str, start: u32, end: u32, is_method: bool) -> FunctionRecord {
        FunctionRecord {
            name: name.to_string(),
            line_start: start,
            line_end: end,
            parameters: vec![],
            parent_class: is_method.then(|| "C".to_string()),
            is_method,
            return_type: None,
            docstring: None,
            signature: format!("{name}()"),
            is_async: false,
        }
    }

    #[test]
    fn extract_lines_is_one_indexed_and_inclusive() {
        let content = "a\nb\nc\nd";
        assert_eq!(extract_lines(content, 2, 3), "b\nc");
        assert_eq!(extract_lines(content, 1, 1), "a");
        assert_eq!(extract_lines(content, 4, 4), "d");
    }

    #[test]
    fn span_of_900_lines_produces_two_expected_chunks() {
        // Class lines 10..910 (span 900): chunks [10,709] and [610,910].
        let chunks = sliding_window_chunks(10, 910, CHUNK_SIZE, CHUNK_OVERLAP);
        assert_eq!(
            chunks,
            vec![
                LineChunk { start: 10, end: 709 },
                LineChunk { start: 610, end: 910 },
            ]
        );
    }

    #[test]
    fn chunk_count_matches_closed_form() {
        for span in [801u32, 900, 1500, 2501, 4000] {
            let start = 1;
            let end = start + span;
            let chunks = sliding_window_chunks(start, end, CHUNK_SIZE, CHUNK_OVERLAP);
            let expected =
                ((span - CHUNK_OVERLAP) as f64 / (CHUNK_SIZE - CHUNK_OVERLAP) as f64).ceil() as usize;
            assert_eq!(chunks.len(), expected, "span {span}");

            // Windows stay within size, overlap, and jointly cover the class.
            assert_eq!(chunks.first().unwrap().start, start);
            assert_eq!(chunks.last().unwrap().end, end);
            for chunk in &chunks {
                assert!(chunk.end - chunk.start + 1 <= CHUNK_SIZE);
            }
            for pair in chunks.windows(2) {
                assert!(pair[0].end >= pair[1].start + CHUNK_OVERLAP - 1);
                assert!(pair[1].start <= pair[0].end);
            }
        }
    }

    #[test]
    fn small_class_is_embedded_whole_with_method_count() {
        let file = file_with(
            numbered_content(100),
            vec![function("helper", 60, 70, false), function("m0", 15, 20, true)],
            vec![class("Engine", 10, 50, 3)],
        );
        let plans = plan_embeddings(&file);

        assert_eq!(plans.len(), 2);
        let class_plan = &plans[0];
        assert_eq!(class_plan.embedding_type, EmbeddingType::Class);
        assert_eq!(class_plan.method_count, Some(3));
        assert!(class_plan.code.starts_with("line 10"));
        assert!(class_plan.code.ends_with("line 50"));

        // Methods are not embedded individually.
        assert!(plans.iter().all(|p| p.name != "m0"));
        assert_eq!(plans[1].embedding_type, EmbeddingType::Function);
        assert_eq!(plans[1].name, "helper");
    }

    #[test]
    fn large_class_becomes_indexed_chunks() {
        let file = file_with(numbered_content(950), vec![], vec![class("Huge", 10, 910, 5)]);
        let plans = plan_embeddings(&file);

        assert_eq!(plans.len(), 2);
        assert_eq!(plans[0].embedding_type, EmbeddingType::ClassChunk);
        assert_eq!(plans[0].name, "Huge_chunk_1");
        assert_eq!(plans[0].parent_class.as_deref(), Some("Huge"));
        assert_eq!(plans[0].chunk_index, Some(1));
        assert_eq!(plans[0].total_chunks, Some(2));
        assert_eq!(plans[1].name, "Huge_chunk_2");
        assert_eq!((plans[1].line_start, plans[1].line_end), (610, 910));
    }

    #[test]
    fn chunk_reconstruction_recovers_exact_class_source() {
        let content = numbered_content(950);
        let file = file_with(content.clone(), vec![], vec![class("Huge", 10, 910, 0)]);
        let class_source = extract_lines(&content, 10, 910);

        // Stitch chunks back together, dropping each successor's overlap.
        let plans = plan_embeddings(&file);
        let mut stitched = plans[0].code.clone();
        for pair in plans.windows(2) {
            let overlap_lines = pair[0].line_end - pair[1].line_start + 1;
            let tail: Vec<&str> = pair[1].code.lines().skip(overlap_lines as usize).collect();
            stitched.push('\n');
            stitched.push_str(&tail.join("\n"));
        }
        assert_eq!(stitched, class_source);
    }
}
