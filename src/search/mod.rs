//! Hybrid retrieval over the indexed repository.
//!
//! Two ANN searches (file-summary vectors and flattened code-element
//! vectors, both filtered by repository) are combined with a lexical
//! full-text score and a filename boost, then merged per file. Matched
//! chunks of large classes are expanded back to the full class source
//! from the stored file content.

pub mod scoring;

use std::collections::HashMap;

use serde::Serialize;
use sqlx::PgPool;

use crate::ai::EmbeddingClient;
use crate::db::vector_literal;
use crate::error::Result;
use crate::models::EmbeddingType;
use crate::pipeline::embedder::extract_lines;
use crate::store::{FileStore, RepositoryStore};

/// How many file summaries and code elements feed the unified merge.
const UNIFIED_SUMMARY_TOP_K: i64 = 2;
const UNIFIED_CODE_TOP_K: i64 = 2;

#[derive(Debug, Clone, Serialize)]
pub struct FileSearchHit {
    pub file_id: String,
    pub file_path: String,
    pub file_language: String,
    pub file_summary: String,
    pub embedding_type: &'static str,
    pub similarity_score: f64,
    pub vector_score: f64,
    pub keyword_score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CodeElement {
    #[serde(rename = "type")]
    pub element_type: String,
    pub name: String,
    pub code: String,
    /// Set for `class_chunk` hits: the specific chunk that matched, while
    /// `code` carries the reconstructed full class.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_code: Option<String>,
    pub line_start: i32,
    pub line_end: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_index: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_chunks: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_class_line_start: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_class_line_end: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reconstruction_hint: Option<String>,
    pub similarity_score: f64,
}

/// Merged per-file result of `search_code`: file context plus the code
/// elements that matched (empty when only the summary matched).
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub file_id: String,
    pub file_path: String,
    pub file_language: String,
    pub file_summary: String,
    pub similarity_score: f64,
    pub code_elements: Vec<CodeElement>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RepoOverview {
    pub repo_id: String,
    pub name: String,
    pub full_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overview: Option<String>,
    pub languages: std::collections::BTreeMap<String, i64>,
    pub total_files: i64,
    pub url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileDetails {
    pub file_id: String,
    pub path: String,
    pub language: String,
    pub content: String,
    pub summary: String,
    pub functions: Vec<crate::models::FunctionRecord>,
    pub classes: Vec<crate::models::ClassRecord>,
    pub imports: Vec<String>,
    pub parsed: bool,
    pub size_bytes: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FunctionHit {
    pub file_id: String,
    pub file_path: String,
    pub file_language: String,
    pub file_summary: String,
    pub embedding_type: &'static str,
    pub name: String,
    pub signature: String,
    pub code: String,
    pub line_start: i32,
    pub line_end: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity_score: Option<f64>,
}

#[derive(sqlx::FromRow)]
struct SummaryRow {
    file_id: String,
    path: String,
    language: String,
    summary: Option<String>,
    score: f64,
}

#[derive(sqlx::FromRow)]
struct CodeRow {
    file_id: String,
    path: String,
    language: String,
    summary: Option<String>,
    embedding_type: String,
    name: String,
    code: String,
    line_start: i32,
    line_end: i32,
    parent_class: Option<String>,
    chunk_index: Option<i32>,
    total_chunks: Option<i32>,
    score: f64,
}

#[derive(Clone)]
pub struct SearchService {
    pool: PgPool,
    files: FileStore,
    repositories: RepositoryStore,
    embeddings: EmbeddingClient,
}

impl SearchService {
    pub fn new(pool: PgPool, embeddings: EmbeddingClient) -> Self {
        Self {
            files: FileStore::new(pool.clone()),
            repositories: RepositoryStore::new(pool.clone()),
            pool,
            embeddings,
        }
    }

    /// Unified hybrid search: top file summaries and top code elements,
    /// merged per file so one file cannot monopolize the results.
    pub async fn search_code(
        &self,
        repo_id: &str,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<SearchResult>> {
        let query_vector = self.embeddings.embed(query).await?;
        tracing::debug!(query, dims = query_vector.len(), "query embedded");

        let (summary_hits, code_hits) = tokio::try_join!(
            self.summary_vector_search(repo_id, query, &query_vector, UNIFIED_SUMMARY_TOP_K),
            self.code_vector_search(repo_id, query, &query_vector, UNIFIED_CODE_TOP_K),
        )?;

        // Group by file, keeping the highest score seen for each file.
        let mut order: Vec<String> = Vec::new();
        let mut by_file: HashMap<String, SearchResult> = HashMap::new();

        for hit in &summary_hits {
            by_file
                .entry(hit.file_id.clone())
                .or_insert_with(|| {
                    order.push(hit.file_id.clone());
                    SearchResult {
                        file_id: hit.file_id.clone(),
                        file_path: hit.file_path.clone(),
                        file_language: hit.file_language.clone(),
                        file_summary: hit.file_summary.clone(),
                        similarity_score: hit.similarity_score,
                        code_elements: Vec::new(),
                    }
                });
        }

        for (row, element) in code_hits {
            let entry = by_file.entry(row.file_id.clone()).or_insert_with(|| {
                order.push(row.file_id.clone());
                SearchResult {
                    file_id: row.file_id.clone(),
                    file_path: row.path.clone(),
                    file_language: row.language.clone(),
                    file_summary: row.summary.clone().unwrap_or_default(),
                    similarity_score: 0.0,
                    code_elements: Vec::new(),
                }
            });
            if element.similarity_score > entry.similarity_score {
                entry.similarity_score = element.similarity_score;
            }
            entry.code_elements.push(element);
        }

        let mut merged: Vec<SearchResult> = order
            .into_iter()
            .filter_map(|file_id| by_file.remove(&file_id))
            .collect();
        merged.sort_by(|a, b| {
            b.similarity_score
                .partial_cmp(&a.similarity_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        merged.truncate(top_k.max(1));

        tracing::debug!(results = merged.len(), "search_code merged");
        Ok(merged)
    }

    /// Summary-only search, for queries about file characteristics.
    pub async fn search_files(
        &self,
        repo_id: &str,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<FileSearchHit>> {
        let query_vector = self.embeddings.embed(query).await?;
        self.summary_vector_search(repo_id, query, &query_vector, top_k as i64)
            .await
    }

    pub async fn get_repo_overview(&self, repo_id: &str) -> Result<Option<RepoOverview>> {
        let Some(repo) = self.repositories.get(repo_id).await? else {
            return Ok(None);
        };
        Ok(Some(RepoOverview {
            repo_id: repo.repo_id,
            name: repo.repo_name,
            full_name: repo.full_name,
            description: repo.description,
            overview: repo.overview,
            languages: repo.languages_breakdown,
            total_files: repo.file_count,
            url: repo.github_url,
        }))
    }

    pub async fn get_file_by_path(
        &self,
        repo_id: &str,
        file_path: &str,
    ) -> Result<Option<FileDetails>> {
        let normalized = file_path.trim_start_matches('/');
        let Some(file) = self.files.get_by_path(repo_id, normalized).await? else {
            return Ok(None);
        };
        Ok(Some(FileDetails {
            file_id: file.file_id,
            path: file.path,
            language: file.language,
            content: file.content,
            summary: file.summary.unwrap_or_default(),
            functions: file.functions,
            classes: file.classes,
            imports: file.imports,
            parsed: file.parsed,
            size_bytes: file.size_bytes,
        }))
    }

    /// Exact-name lookup first; vector search only as a fallback. An
    /// exact match never touches the embedding API.
    pub async fn find_function(
        &self,
        repo_id: &str,
        function_name: &str,
        file_path: Option<&str>,
    ) -> Result<Option<FunctionHit>> {
        let normalized = file_path.map(|p| p.trim_start_matches('/'));

        if let Some(file) = self
            .files
            .find_file_with_function(repo_id, function_name, normalized)
            .await?
        {
            if let Some(function) = file.functions.iter().find(|f| f.name == function_name) {
                let code = extract_lines(&file.content, function.line_start, function.line_end);
                return Ok(Some(FunctionHit {
                    file_id: file.file_id.clone(),
                    file_path: file.path.clone(),
                    file_language: file.language.clone(),
                    file_summary: file.summary.clone().unwrap_or_default(),
                    embedding_type: "function",
                    name: function.name.clone(),
                    signature: function.signature.clone(),
                    code,
                    line_start: function.line_start as i32,
                    line_end: function.line_end as i32,
                    parent_class: function.parent_class.clone(),
                    similarity_score: None,
                }));
            }
        }

        tracing::debug!(function_name, "no exact match, falling back to vector search");
        let mut query = format!("function {function_name}");
        if let Some(path) = normalized {
            query.push_str(&format!(" in {path}"));
        }

        let results = self.search_code(repo_id, &query, 1).await?;
        let Some(top) = results.first() else {
            return Ok(None);
        };
        let Some(element) = top
            .code_elements
            .iter()
            .find(|e| e.element_type == EmbeddingType::Function.as_str())
        else {
            return Ok(None);
        };

        Ok(Some(FunctionHit {
            file_id: top.file_id.clone(),
            file_path: top.file_path.clone(),
            file_language: top.file_language.clone(),
            file_summary: top.file_summary.clone(),
            embedding_type: "function",
            name: element.name.clone(),
            signature: element.name.clone(),
            code: element.code.clone(),
            line_start: element.line_start,
            line_end: element.line_end,
            parent_class: element.parent_class.clone(),
            similarity_score: Some(element.similarity_score),
        }))
    }

    // -----------------------------------------------------------------
    // Vector search halves
    // -----------------------------------------------------------------

    async fn summary_vector_search(
        &self,
        repo_id: &str,
        query: &str,
        query_vector: &[f32],
        top_k: i64,
    ) -> Result<Vec<FileSearchHit>> {
        let rows = sqlx::query_as::<_, SummaryRow>(
            r#"
            SELECT file_id, path, language, summary,
                   1 - (summary_embedding <=> $2::vector) AS score
            FROM files
            WHERE repo_id = $1 AND summary_embedding IS NOT NULL
            ORDER BY summary_embedding <=> $2::vector
            LIMIT $3
            "#,
        )
        .bind(repo_id)
        .bind(vector_literal(query_vector))
        .bind(top_k)
        .fetch_all(&self.pool)
        .await?;

        let file_ids: Vec<String> = rows.iter().map(|r| r.file_id.clone()).collect();
        let text_scores = self.text_scores(query, &file_ids).await?;

        let mut hits: Vec<FileSearchHit> = rows
            .into_iter()
            .map(|row| {
                let keyword = scoring::normalize_text_score(
                    text_scores.get(&row.file_id).copied().unwrap_or(0.0),
                );
                let hybrid = scoring::hybrid_score(row.score, keyword);
                let final_score = scoring::apply_filename_boost(query, &row.path, hybrid);
                FileSearchHit {
                    file_id: row.file_id,
                    file_path: row.path,
                    file_language: row.language,
                    file_summary: row.summary.unwrap_or_default(),
                    embedding_type: "summary",
                    similarity_score: final_score,
                    vector_score: row.score,
                    keyword_score: keyword,
                }
            })
            .collect();

        hits.sort_by(|a, b| {
            b.similarity_score
                .partial_cmp(&a.similarity_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(hits)
    }

    async fn code_vector_search(
        &self,
        repo_id: &str,
        query: &str,
        query_vector: &[f32],
        top_k: i64,
    ) -> Result<Vec<(CodeRow, CodeElement)>> {
        // Per-embedding candidates collapsed to the best embedding per
        // file, so one file cannot fill every slot.
        let rows = sqlx::query_as::<_, CodeRow>(
            r#"
            SELECT * FROM (
                SELECT DISTINCT ON (ce.file_id)
                    ce.file_id, f.path, f.language, f.summary,
                    ce.embedding_type, ce.name, ce.code, ce.line_start, ce.line_end,
                    ce.parent_class, ce.chunk_index, ce.total_chunks,
                    1 - (ce.embedding <=> $2::vector) AS score
                FROM code_embeddings ce
                JOIN files f ON f.file_id = ce.file_id
                WHERE ce.repo_id = $1
                ORDER BY ce.file_id, ce.embedding <=> $2::vector
            ) best
            ORDER BY score DESC
            LIMIT $3
            "#,
        )
        .bind(repo_id)
        .bind(vector_literal(query_vector))
        .bind(top_k)
        .fetch_all(&self.pool)
        .await?;

        let file_ids: Vec<String> = rows.iter().map(|r| r.file_id.clone()).collect();
        let text_scores = self.text_scores(query, &file_ids).await?;

        let mut scored: Vec<(CodeRow, f64)> = rows
            .into_iter()
            .map(|row| {
                let keyword = scoring::normalize_text_score(
                    text_scores.get(&row.file_id).copied().unwrap_or(0.0),
                );
                let hybrid = scoring::hybrid_score(row.score, keyword);
                let final_score = scoring::apply_filename_boost(query, &row.path, hybrid);
                (row, final_score)
            })
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let mut results = Vec::with_capacity(scored.len());
        for (row, final_score) in scored {
            let element = self.build_code_element(&row, final_score).await;
            results.push((row, element));
        }
        Ok(results)
    }

    async fn build_code_element(&self, row: &CodeRow, final_score: f64) -> CodeElement {
        let mut element = CodeElement {
            element_type: row.embedding_type.clone(),
            name: row.name.clone(),
            code: row.code.clone(),
            chunk_code: None,
            line_start: row.line_start,
            line_end: row.line_end,
            parent_class: row.parent_class.clone(),
            chunk_index: row.chunk_index,
            total_chunks: row.total_chunks,
            full_class_line_start: None,
            full_class_line_end: None,
            reconstruction_hint: None,
            similarity_score: final_score,
        };

        // A matched chunk of a large class is expanded to the whole class
        // from the stored file content, keeping the chunk for reference.
        if row.embedding_type == EmbeddingType::ClassChunk.as_str() {
            if let Some(parent) = &row.parent_class {
                match self.reconstruct_class(&row.file_id, parent).await {
                    Some((code, start, end)) => {
                        element.chunk_code = Some(row.code.clone());
                        element.code = code;
                        element.full_class_line_start = Some(start);
                        element.full_class_line_end = Some(end);
                        element.reconstruction_hint = Some(format!(
                            "Matched chunk {}/{} of class {}. Full class code reconstructed (lines {}-{}).",
                            row.chunk_index.unwrap_or(0),
                            row.total_chunks.unwrap_or(0),
                            parent,
                            start,
                            end,
                        ));
                    }
                    None => {
                        tracing::warn!(file_id = %row.file_id, class = %parent,
                            "failed to reconstruct class from chunk");
                    }
                }
            }
        }

        element
    }

    async fn reconstruct_class(
        &self,
        file_id: &str,
        parent_class: &str,
    ) -> Option<(String, i32, i32)> {
        let file = self.files.get(file_id).await.ok().flatten()?;
        let class = file.classes.iter().find(|c| c.name == parent_class)?;
        if file.content.is_empty() {
            return None;
        }
        let code = extract_lines(&file.content, class.line_start, class.line_end);
        Some((code, class.line_start as i32, class.line_end as i32))
    }

    /// Full-text rank per file over path + summary + embedding names.
    async fn text_scores(
        &self,
        query: &str,
        file_ids: &[String],
    ) -> Result<HashMap<String, f64>> {
        if file_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows: Vec<(String, f64)> = sqlx::query_as(
            r#"
            SELECT f.file_id,
                   ts_rank(
                       to_tsvector('english',
                           f.path || ' ' || coalesce(f.summary, '') || ' ' ||
                           coalesce(string_agg(ce.name, ' '), '')),
                       plainto_tsquery('english', $1)
                   )::float8 AS score
            FROM files f
            LEFT JOIN code_embeddings ce ON ce.file_id = f.file_id
            WHERE f.file_id = ANY($2)
            GROUP BY f.file_id, f.path, f.summary
            "#,
        )
        .bind(query)
        .bind(file_ids)
        .fetch_all(&self.pool)
        .await
        .unwrap_or_default();

        Ok(rows.into_iter().collect())
    }
}
