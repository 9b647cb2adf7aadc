use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;

use crate::db::vector_literal;
use crate::error::Result;
use crate::models::{
    ClassRecord, CodeEmbedding, Dependencies, FileRecord, FunctionRecord, ParsedSource,
};

#[derive(Clone)]
pub struct FileStore {
    pool: PgPool,
}

const FILE_COLUMNS: &str = "file_id, repo_id, session_id, path, filename, extension, language, \
     size_bytes, content, content_hash, functions, classes, imports, parse_error, dependencies, \
     summary, provider, model, parsed, embedded, analyzed, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct FileRow {
    file_id: String,
    repo_id: String,
    session_id: String,
    path: String,
    filename: String,
    extension: String,
    language: String,
    size_bytes: i64,
    content: String,
    content_hash: String,
    functions: Json<Vec<FunctionRecord>>,
    classes: Json<Vec<ClassRecord>>,
    imports: Json<Vec<String>>,
    parse_error: Option<String>,
    dependencies: Json<Dependencies>,
    summary: Option<String>,
    provider: Option<String>,
    model: Option<String>,
    parsed: bool,
    embedded: bool,
    analyzed: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl FileRow {
    fn into_model(self) -> FileRecord {
        FileRecord {
            file_id: self.file_id,
            repo_id: self.repo_id,
            session_id: self.session_id,
            path: self.path,
            filename: self.filename,
            extension: self.extension,
            language: self.language,
            size_bytes: self.size_bytes,
            content: self.content,
            content_hash: self.content_hash,
            functions: self.functions.0,
            classes: self.classes.0,
            imports: self.imports.0,
            parse_error: self.parse_error,
            dependencies: self.dependencies.0,
            summary: self.summary,
            provider: self.provider,
            model: self.model,
            parsed: self.parsed,
            embedded: self.embedded,
            analyzed: self.analyzed,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Lightweight projection: everything except `content` and vectors.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FileMeta {
    pub file_id: String,
    pub path: String,
    pub filename: String,
    pub language: String,
    pub functions: Json<Vec<FunctionRecord>>,
    pub classes: Json<Vec<ClassRecord>>,
    pub imports: Json<Vec<String>>,
    pub dependencies: Json<Dependencies>,
    pub summary: Option<String>,
    pub parsed: bool,
}

/// Input to the per-file summary stage; `content_prefix` is truncated
/// server-side so summary batches never pull whole file bodies.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SummaryInput {
    pub file_id: String,
    pub path: String,
    pub language: String,
    pub functions: Json<Vec<FunctionRecord>>,
    pub classes: Json<Vec<ClassRecord>>,
    pub imports: Json<Vec<String>>,
    pub content_prefix: String,
    pub content_len: i32,
}

/// Projection for overview generation and summary re-embedding.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OverviewFile {
    pub file_id: String,
    pub path: String,
    pub language: String,
    pub summary: Option<String>,
    pub function_count: i64,
    pub class_count: i64,
}

impl FileStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, file: &FileRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO files
                (file_id, repo_id, session_id, path, filename, extension, language,
                 size_bytes, content, content_hash, created_at, updated_at)
            VALUES
                ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11)
            ON CONFLICT (repo_id, path) DO NOTHING
            "#,
        )
        .bind(&file.file_id)
        .bind(&file.repo_id)
        .bind(&file.session_id)
        .bind(&file.path)
        .bind(&file.filename)
        .bind(&file.extension)
        .bind(&file.language)
        .bind(file.size_bytes)
        .bind(&file.content)
        .bind(&file.content_hash)
        .bind(file.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Persist parse output and mark the file visible to dependents.
    pub async fn update_parsed(
        &self,
        repo_id: &str,
        path: &str,
        parsed: &ParsedSource,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE files
            SET functions = $3, classes = $4, imports = $5, parse_error = $6,
                parsed = TRUE, updated_at = now()
            WHERE repo_id = $1 AND path = $2
            "#,
        )
        .bind(repo_id)
        .bind(path)
        .bind(Json(&parsed.functions))
        .bind(Json(&parsed.classes))
        .bind(Json(&parsed.imports))
        .bind(&parsed.parse_error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get(&self, file_id: &str) -> Result<Option<FileRecord>> {
        let row = sqlx::query_as::<_, FileRow>(&format!(
            "SELECT {FILE_COLUMNS} FROM files WHERE file_id = $1"
        ))
        .bind(file_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(FileRow::into_model))
    }

    pub async fn get_by_path(&self, repo_id: &str, path: &str) -> Result<Option<FileRecord>> {
        let row = sqlx::query_as::<_, FileRow>(&format!(
            "SELECT {FILE_COLUMNS} FROM files WHERE repo_id = $1 AND path = $2"
        ))
        .bind(repo_id)
        .bind(path)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(FileRow::into_model))
    }

    pub async fn list_meta(&self, repo_id: &str) -> Result<Vec<FileMeta>> {
        let rows = sqlx::query_as::<_, FileMeta>(
            "SELECT file_id, path, filename, language, functions, classes, imports, \
             dependencies, summary, parsed \
             FROM files WHERE repo_id = $1 ORDER BY path",
        )
        .bind(repo_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn list_for_summaries(&self, repo_id: &str) -> Result<Vec<SummaryInput>> {
        let rows = sqlx::query_as::<_, SummaryInput>(
            "SELECT file_id, path, language, functions, classes, imports, \
             left(content, 4000) AS content_prefix, length(content)::int AS content_len \
             FROM files WHERE repo_id = $1 ORDER BY path",
        )
        .bind(repo_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Parsed files with full content, for the chunker/embedder.
    pub async fn list_parsed_with_content(&self, repo_id: &str) -> Result<Vec<FileRecord>> {
        let rows = sqlx::query_as::<_, FileRow>(&format!(
            "SELECT {FILE_COLUMNS} FROM files WHERE repo_id = $1 AND parsed = TRUE ORDER BY path"
        ))
        .bind(repo_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(FileRow::into_model).collect())
    }

    pub async fn list_overview_inputs(&self, repo_id: &str) -> Result<Vec<OverviewFile>> {
        let rows = sqlx::query_as::<_, OverviewFile>(
            "SELECT file_id, path, language, summary, \
             jsonb_array_length(functions)::bigint AS function_count, \
             jsonb_array_length(classes)::bigint AS class_count \
             FROM files WHERE repo_id = $1 ORDER BY path",
        )
        .bind(repo_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn bulk_update_dependencies(
        &self,
        repo_id: &str,
        dependencies: &BTreeMap<String, Dependencies>,
    ) -> Result<u64> {
        let mut updated = 0;
        for (path, deps) in dependencies {
            let result = sqlx::query(
                "UPDATE files SET dependencies = $3, updated_at = now() \
                 WHERE repo_id = $1 AND path = $2",
            )
            .bind(repo_id)
            .bind(path)
            .bind(Json(deps))
            .execute(&self.pool)
            .await?;
            updated += result.rows_affected();
        }
        Ok(updated)
    }

    pub async fn set_summary(
        &self,
        file_id: &str,
        summary: &str,
        provider: &str,
        model: &str,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE files SET summary = $2, provider = $3, model = $4, \
             analyzed = TRUE, updated_at = now() WHERE file_id = $1",
        )
        .bind(file_id)
        .bind(summary)
        .bind(provider)
        .bind(model)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Replace the file's code embeddings atomically enough for our needs:
    /// the pipeline is the only writer of this subtree.
    pub async fn replace_code_embeddings(
        &self,
        file_id: &str,
        repo_id: &str,
        embeddings: &[CodeEmbedding],
    ) -> Result<()> {
        sqlx::query("DELETE FROM code_embeddings WHERE file_id = $1")
            .bind(file_id)
            .execute(&self.pool)
            .await?;

        for record in embeddings {
            sqlx::query(
                r#"
                INSERT INTO code_embeddings
                    (file_id, repo_id, embedding_type, name, code, line_start, line_end,
                     method_count, parent_class, chunk_index, total_chunks, embedding)
                VALUES
                    ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12::vector)
                "#,
            )
            .bind(file_id)
            .bind(repo_id)
            .bind(record.embedding_type.as_str())
            .bind(&record.name)
            .bind(&record.code)
            .bind(record.line_start as i32)
            .bind(record.line_end as i32)
            .bind(record.method_count.map(|c| c as i32))
            .bind(&record.parent_class)
            .bind(record.chunk_index.map(|c| c as i32))
            .bind(record.total_chunks.map(|c| c as i32))
            .bind(vector_literal(&record.embedding))
            .execute(&self.pool)
            .await?;
        }

        sqlx::query("UPDATE files SET embedded = TRUE, updated_at = now() WHERE file_id = $1")
            .bind(file_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_summary_embedding(&self, file_id: &str, embedding: &[f32]) -> Result<()> {
        sqlx::query(
            "UPDATE files SET summary_embedding = $2::vector, updated_at = now() \
             WHERE file_id = $1",
        )
        .bind(file_id)
        .bind(vector_literal(embedding))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn count_by_repo(&self, repo_id: &str) -> Result<i64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM files WHERE repo_id = $1")
                .bind(repo_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    /// Exact-name function lookup via JSONB containment on the flat
    /// `functions` list, optionally constrained to one path.
    pub async fn find_file_with_function(
        &self,
        repo_id: &str,
        function_name: &str,
        path: Option<&str>,
    ) -> Result<Option<FileRecord>> {
        let probe = serde_json::json!([{ "name": function_name }]);
        let row = match path {
            Some(path) => {
                sqlx::query_as::<_, FileRow>(&format!(
                    "SELECT {FILE_COLUMNS} FROM files \
                     WHERE repo_id = $1 AND path = $2 AND functions @> $3"
                ))
                .bind(repo_id)
                .bind(path)
                .bind(Json(&probe))
                .fetch_optional(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, FileRow>(&format!(
                    "SELECT {FILE_COLUMNS} FROM files \
                     WHERE repo_id = $1 AND functions @> $2 ORDER BY path LIMIT 1"
                ))
                .bind(repo_id)
                .bind(Json(&probe))
                .fetch_optional(&self.pool)
                .await?
            }
        };
        Ok(row.map(FileRow::into_model))
    }
}
