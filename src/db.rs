//! Database pool and schema bootstrap.
//!
//! The store keeps one table per collection. Nested document fields
//! (file tree, functions, classes, dependencies) are JSONB; the flattened
//! code-embedding array gets its own table so its vectors can carry an
//! ANN index of their own, separate from the per-file summary vector.

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::config::Settings;
use crate::error::Result;

pub async fn connect(settings: &Settings) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(20)
        .connect(&settings.database_url)
        .await?;
    Ok(pool)
}

/// Create tables and indexes on startup. Idempotent.
pub async fn ensure_schema(pool: &PgPool, embedding_dimension: usize) -> Result<()> {
    sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
        .execute(pool)
        .await?;

    let statements = [
        r#"
        CREATE TABLE IF NOT EXISTS sessions (
            session_id   TEXT PRIMARY KEY,
            preferences  JSONB,
            created_at   TIMESTAMPTZ NOT NULL DEFAULT now(),
            updated_at   TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#
        .to_string(),
        r#"
        CREATE TABLE IF NOT EXISTS repositories (
            repo_id               TEXT PRIMARY KEY,
            session_id            TEXT NOT NULL,
            github_url            TEXT NOT NULL,
            owner                 TEXT NOT NULL DEFAULT '',
            repo_name             TEXT NOT NULL DEFAULT '',
            full_name             TEXT NOT NULL DEFAULT '',
            description           TEXT,
            default_branch        TEXT NOT NULL DEFAULT 'main',
            language              TEXT,
            stars                 BIGINT NOT NULL DEFAULT 0,
            forks                 BIGINT NOT NULL DEFAULT 0,
            status                TEXT NOT NULL DEFAULT 'pending',
            task_id               TEXT,
            error_message         TEXT,
            file_tree             JSONB NOT NULL DEFAULT '{}'::jsonb,
            file_count            BIGINT NOT NULL DEFAULT 0,
            languages_breakdown   JSONB NOT NULL DEFAULT '{}'::jsonb,
            overview              TEXT,
            overview_generated_at TIMESTAMPTZ,
            created_at            TIMESTAMPTZ NOT NULL DEFAULT now(),
            updated_at            TIMESTAMPTZ NOT NULL DEFAULT now(),
            last_fetched          TIMESTAMPTZ
        )
        "#
        .to_string(),
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS files (
                file_id           TEXT PRIMARY KEY,
                repo_id           TEXT NOT NULL,
                session_id        TEXT NOT NULL,
                path              TEXT NOT NULL,
                filename          TEXT NOT NULL,
                extension         TEXT NOT NULL DEFAULT '',
                language          TEXT NOT NULL DEFAULT 'unknown',
                size_bytes        BIGINT NOT NULL DEFAULT 0,
                content           TEXT NOT NULL DEFAULT '',
                content_hash      TEXT NOT NULL DEFAULT '',
                functions         JSONB NOT NULL DEFAULT '[]'::jsonb,
                classes           JSONB NOT NULL DEFAULT '[]'::jsonb,
                imports           JSONB NOT NULL DEFAULT '[]'::jsonb,
                parse_error       TEXT,
                dependencies      JSONB NOT NULL DEFAULT
                    '{{"imports": [], "imported_by": [], "external_imports": []}}'::jsonb,
                summary           TEXT,
                provider          TEXT,
                model             TEXT,
                summary_embedding vector({dim}),
                parsed            BOOLEAN NOT NULL DEFAULT FALSE,
                embedded          BOOLEAN NOT NULL DEFAULT FALSE,
                analyzed          BOOLEAN NOT NULL DEFAULT FALSE,
                created_at        TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at        TIMESTAMPTZ NOT NULL DEFAULT now(),
                UNIQUE (repo_id, path)
            )
            "#,
            dim = embedding_dimension
        ),
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS code_embeddings (
                id             BIGSERIAL PRIMARY KEY,
                file_id        TEXT NOT NULL REFERENCES files (file_id) ON DELETE CASCADE,
                repo_id        TEXT NOT NULL,
                embedding_type TEXT NOT NULL,
                name           TEXT NOT NULL,
                code           TEXT NOT NULL,
                line_start     INT NOT NULL,
                line_end       INT NOT NULL,
                method_count   INT,
                parent_class   TEXT,
                chunk_index    INT,
                total_chunks   INT,
                embedding      vector({dim}) NOT NULL
            )
            "#,
            dim = embedding_dimension
        ),
        r#"
        CREATE TABLE IF NOT EXISTS tasks (
            task_id         TEXT PRIMARY KEY,
            task_type       TEXT NOT NULL,
            status          TEXT NOT NULL DEFAULT 'pending',
            payload         JSONB NOT NULL DEFAULT '{}'::jsonb,
            total_files     BIGINT NOT NULL DEFAULT 0,
            processed_files BIGINT NOT NULL DEFAULT 0,
            current_step    TEXT NOT NULL DEFAULT 'queued',
            result          JSONB,
            error_message   TEXT,
            created_at      TIMESTAMPTZ NOT NULL DEFAULT now(),
            started_at      TIMESTAMPTZ,
            completed_at    TIMESTAMPTZ,
            updated_at      TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#
        .to_string(),
        r#"
        CREATE TABLE IF NOT EXISTS conversations (
            conversation_id TEXT PRIMARY KEY,
            session_id      TEXT NOT NULL,
            repo_id         TEXT NOT NULL,
            title           TEXT NOT NULL DEFAULT '',
            system_prompt   TEXT NOT NULL DEFAULT '',
            message_count   BIGINT NOT NULL DEFAULT 0,
            created_at      TIMESTAMPTZ NOT NULL DEFAULT now(),
            updated_at      TIMESTAMPTZ NOT NULL DEFAULT now(),
            UNIQUE (session_id, repo_id)
        )
        "#
        .to_string(),
        r#"
        CREATE TABLE IF NOT EXISTS messages (
            message_id      TEXT PRIMARY KEY,
            conversation_id TEXT NOT NULL,
            role            TEXT NOT NULL,
            content         TEXT NOT NULL DEFAULT '',
            tool_calls      JSONB,
            tool_call_id    TEXT,
            sequence_number BIGINT NOT NULL,
            created_at      TIMESTAMPTZ NOT NULL DEFAULT now(),
            UNIQUE (conversation_id, sequence_number)
        )
        "#
        .to_string(),
    ];

    for statement in &statements {
        sqlx::query(statement).execute(pool).await?;
    }

    let indexes = [
        "CREATE INDEX IF NOT EXISTS idx_files_repo ON files (repo_id)",
        "CREATE INDEX IF NOT EXISTS idx_repositories_session ON repositories (session_id)",
        "CREATE INDEX IF NOT EXISTS idx_repositories_task ON repositories (task_id)",
        "CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks (status)",
        "CREATE INDEX IF NOT EXISTS idx_code_embeddings_repo ON code_embeddings (repo_id)",
        "CREATE INDEX IF NOT EXISTS idx_code_embeddings_file ON code_embeddings (file_id)",
        "CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages (conversation_id, sequence_number)",
        // ANN indexes: one over per-file summary vectors, one over the
        // flattened code-embedding vectors.
        "CREATE INDEX IF NOT EXISTS idx_files_summary_ann ON files \
         USING hnsw (summary_embedding vector_cosine_ops)",
        "CREATE INDEX IF NOT EXISTS idx_code_embeddings_ann ON code_embeddings \
         USING hnsw (embedding vector_cosine_ops)",
        // Lexical index over path + summary; embedding names are scored
        // through the code_embeddings join at query time.
        "CREATE INDEX IF NOT EXISTS idx_files_text ON files USING gin \
         (to_tsvector('english', path || ' ' || coalesce(summary, '')))",
    ];

    for statement in &indexes {
        sqlx::query(statement).execute(pool).await?;
    }

    tracing::info!("database schema ready");
    Ok(())
}

/// Render a vector the way pgvector's text input expects it, for binding
/// as `$n::vector`.
pub fn vector_literal(embedding: &[f32]) -> String {
    let mut out = String::with_capacity(embedding.len() * 10 + 2);
    out.push('[');
    for (i, v) in embedding.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&v.to_string());
    }
    out.push(']');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vector_literal_matches_pgvector_input_format() {
        assert_eq!(vector_literal(&[1.0, -0.5, 0.25]), "[1,-0.5,0.25]");
        assert_eq!(vector_literal(&[]), "[]");
    }
}
