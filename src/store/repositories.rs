use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;

use crate::error::Result;
use crate::models::{FileTree, RepoStatus, Repository};

#[derive(Clone)]
pub struct RepositoryStore {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct RepositoryRow {
    repo_id: String,
    session_id: String,
    github_url: String,
    owner: String,
    repo_name: String,
    full_name: String,
    description: Option<String>,
    default_branch: String,
    language: Option<String>,
    stars: i64,
    forks: i64,
    status: String,
    task_id: Option<String>,
    error_message: Option<String>,
    file_tree: Json<FileTree>,
    file_count: i64,
    languages_breakdown: Json<BTreeMap<String, i64>>,
    overview: Option<String>,
    overview_generated_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

const REPO_COLUMNS: &str = "repo_id, session_id, github_url, owner, repo_name, full_name, \
     description, default_branch, language, stars, forks, status, task_id, error_message, \
     file_tree, file_count, languages_breakdown, overview, overview_generated_at, \
     created_at, updated_at";

impl RepositoryRow {
    fn into_model(self) -> Repository {
        let status = match self.status.as_str() {
            "fetched" => RepoStatus::Fetched,
            "processing" => RepoStatus::Processing,
            "completed" => RepoStatus::Completed,
            "failed" => RepoStatus::Failed,
            _ => RepoStatus::Pending,
        };
        Repository {
            repo_id: self.repo_id,
            session_id: self.session_id,
            github_url: self.github_url,
            owner: self.owner,
            repo_name: self.repo_name,
            full_name: self.full_name,
            description: self.description,
            default_branch: self.default_branch,
            language: self.language,
            stars: self.stars,
            forks: self.forks,
            status,
            task_id: self.task_id,
            error_message: self.error_message,
            file_tree: self.file_tree.0,
            file_count: self.file_count,
            languages_breakdown: self.languages_breakdown.0,
            overview: self.overview,
            overview_generated_at: self.overview_generated_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

impl RepositoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, repo: &Repository) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO repositories
                (repo_id, session_id, github_url, owner, repo_name, full_name, description,
                 default_branch, language, stars, forks, status, file_tree, file_count,
                 languages_breakdown, created_at, updated_at, last_fetched)
            VALUES
                ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $16, $16)
            "#,
        )
        .bind(&repo.repo_id)
        .bind(&repo.session_id)
        .bind(&repo.github_url)
        .bind(&repo.owner)
        .bind(&repo.repo_name)
        .bind(&repo.full_name)
        .bind(&repo.description)
        .bind(&repo.default_branch)
        .bind(&repo.language)
        .bind(repo.stars)
        .bind(repo.forks)
        .bind(repo.status.as_str())
        .bind(Json(&repo.file_tree))
        .bind(repo.file_count)
        .bind(Json(&repo.languages_breakdown))
        .bind(repo.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get(&self, repo_id: &str) -> Result<Option<Repository>> {
        let row = sqlx::query_as::<_, RepositoryRow>(&format!(
            "SELECT {REPO_COLUMNS} FROM repositories WHERE repo_id = $1"
        ))
        .bind(repo_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(RepositoryRow::into_model))
    }

    pub async fn update_status(
        &self,
        repo_id: &str,
        status: RepoStatus,
        error_message: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE repositories SET status = $2, \
             error_message = COALESCE($3, error_message), updated_at = now() \
             WHERE repo_id = $1",
        )
        .bind(repo_id)
        .bind(status.as_str())
        .bind(error_message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn update_task_id(&self, repo_id: &str, task_id: &str) -> Result<()> {
        sqlx::query(
            "UPDATE repositories SET task_id = $2, updated_at = now() WHERE repo_id = $1",
        )
        .bind(repo_id)
        .bind(task_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn save_overview(&self, repo_id: &str, overview: &str) -> Result<()> {
        sqlx::query(
            "UPDATE repositories SET overview = $2, overview_generated_at = now(), \
             updated_at = now() WHERE repo_id = $1",
        )
        .bind(repo_id)
        .bind(overview)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
