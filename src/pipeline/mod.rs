//! Ingestion pipeline orchestrator.
//!
//! Drives one repository from URL to fully indexed: register (metadata +
//! tree), parse in batches, then fan out dependency resolution, code
//! embeddings, and per-file summaries concurrently, regenerate summary
//! embeddings alongside the repository overview, and finalize. Progress
//! moves through a strictly monotonic step sequence on the linked task.

pub mod embedder;

use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use uuid::Uuid;

use crate::ai::{resolve_credential, AiContext};
use crate::analysis::{OverviewGenerator, Summarizer};
use crate::config::Settings;
use crate::error::{Error, Result};
use crate::github::{self, filter, tree, GitHubClient};
use crate::graph::DependencyResolver;
use crate::models::{
    Dependencies, FileRecord, FileTree, ParsedSource, RepoStatus, Repository, TaskStep, TreeFile,
};
use crate::parsers::ParserRegistry;
use crate::store::{FileStore, RepositoryStore, SessionStore, TaskStore};
use embedder::Embedder;

const PARSE_BATCH_SIZE: usize = 100;

/// Outcome of repository registration: ids plus the fetched metadata.
#[derive(Debug, Clone)]
pub struct Registration {
    pub repo_id: String,
    pub task_id: String,
    pub metadata: github::RepoMetadata,
    pub file_count: i64,
}

#[derive(Clone)]
pub struct IngestionPipeline {
    settings: Settings,
    github: GitHubClient,
    repositories: RepositoryStore,
    files: FileStore,
    tasks: TaskStore,
    sessions: SessionStore,
    registry: Arc<ParserRegistry>,
}

impl IngestionPipeline {
    pub fn new(settings: Settings, pool: PgPool) -> Self {
        Self {
            settings,
            github: GitHubClient::new(),
            repositories: RepositoryStore::new(pool.clone()),
            files: FileStore::new(pool.clone()),
            tasks: TaskStore::new(pool.clone()),
            sessions: SessionStore::new(pool),
            registry: Arc::new(ParserRegistry::with_default_parsers()),
        }
    }

    /// Register a repository: validate the URL, fetch metadata and the
    /// recursive tree, persist the repository document, and create the
    /// linked ingestion task. Metadata failures are fatal; a tree failure
    /// degrades to an empty tree.
    pub async fn register_repository(
        &self,
        github_url: &str,
        session_id: &str,
    ) -> Result<Registration> {
        let (owner, repo_name) = github::parse_github_url(github_url)?;
        let metadata = self
            .github
            .get_repository_metadata(&owner, &repo_name)
            .await?;

        let file_tree = match self
            .github
            .get_repository_tree(&metadata.owner, &metadata.repo_name, &metadata.default_branch)
            .await
        {
            Ok(api_tree) => tree::build_nested_tree(&api_tree),
            Err(err) => {
                tracing::warn!(%err, "failed to fetch file tree, continuing with empty tree");
                FileTree::new()
            }
        };

        let file_count = tree::count_files(&file_tree);
        let languages_breakdown = tree::languages_breakdown(&file_tree);

        let repo_id = format!("repo-{}", Uuid::new_v4());
        let now = Utc::now();
        let repository = Repository {
            repo_id: repo_id.clone(),
            session_id: session_id.to_string(),
            github_url: github_url.to_string(),
            owner: metadata.owner.clone(),
            repo_name: metadata.repo_name.clone(),
            full_name: metadata.full_name.clone(),
            description: metadata.description.clone(),
            default_branch: metadata.default_branch.clone(),
            language: metadata.language.clone(),
            stars: metadata.stars,
            forks: metadata.forks,
            status: RepoStatus::Fetched,
            task_id: None,
            error_message: None,
            file_tree,
            file_count,
            languages_breakdown,
            overview: None,
            overview_generated_at: None,
            created_at: now,
            updated_at: now,
        };
        self.repositories.create(&repository).await?;

        let task_id = self
            .tasks
            .create(
                "process_files",
                serde_json::json!({
                    "repo_id": repo_id,
                    "session_id": session_id,
                    "file_count": file_count,
                }),
            )
            .await?;
        self.repositories.update_task_id(&repo_id, &task_id).await?;

        tracing::info!(%repo_id, %task_id, file_count, "repository registered");
        Ok(Registration {
            repo_id,
            task_id,
            metadata,
            file_count,
        })
    }

    /// Run the full ingestion for a registered repository. Any error here
    /// marks both the task and the repository failed; per-file problems
    /// inside stages never propagate this far.
    pub async fn process_repository_files(
        &self,
        repo_id: &str,
        session_id: &str,
        task_id: &str,
        api_key: Option<String>,
    ) {
        if let Err(err) = self.run(repo_id, session_id, task_id, api_key).await {
            tracing::error!(repo_id, task_id, %err, "ingestion failed");
            let message = err.to_string();
            if let Err(err) = self.tasks.fail(task_id, &message).await {
                tracing::error!(task_id, %err, "failed to mark task failed");
            }
            if let Err(err) = self
                .repositories
                .update_status(repo_id, RepoStatus::Failed, Some(&message))
                .await
            {
                tracing::error!(repo_id, %err, "failed to mark repository failed");
            }
        }
    }

    async fn run(
        &self,
        repo_id: &str,
        session_id: &str,
        task_id: &str,
        api_key: Option<String>,
    ) -> Result<()> {
        let credential = resolve_credential(&self.settings, api_key)?;
        let session = self.sessions.get(session_id).await?;
        let ai = AiContext::new(&self.settings, session.as_ref(), credential)?;
        tracing::info!(provider = %ai.provider, model = %ai.model, "AI context resolved");

        let repo = self
            .repositories
            .get(repo_id)
            .await?
            .ok_or_else(|| Error::not_found("repository", repo_id))?;

        self.tasks.update_step(task_id, TaskStep::Fetching).await?;
        let files_to_process = tree::extract_files(&repo.file_tree);
        let total_files = files_to_process.len() as i64;

        if files_to_process.is_empty() {
            self.tasks
                .complete(
                    task_id,
                    Some(serde_json::json!({"processed_files": 0, "message": "no files to process"})),
                )
                .await?;
            self.repositories
                .update_status(repo_id, RepoStatus::Completed, None)
                .await?;
            return Ok(());
        }

        // Parse stage: sequential batches, concurrent within each batch.
        self.tasks
            .update_progress(task_id, 0, total_files, TaskStep::Parsing)
            .await?;
        self.repositories
            .update_status(repo_id, RepoStatus::Processing, None)
            .await?;

        let mut processed = 0i64;
        for batch in files_to_process.chunks(PARSE_BATCH_SIZE) {
            join_all(
                batch
                    .iter()
                    .map(|file| self.process_single_file(file, &repo)),
            )
            .await;
            processed += batch.len() as i64;
            self.tasks
                .update_progress(task_id, processed, total_files, TaskStep::Parsing)
                .await?;
            tracing::info!(repo_id, processed, total_files, "parse batch complete");
        }

        // Analysis fan-out: dependencies, code embeddings, and summaries
        // run concurrently; each is optional and contains its own errors.
        self.tasks.update_step(task_id, TaskStep::Embedding).await?;

        let embedder = Arc::new(Embedder::new(ai.embeddings.clone(), self.files.clone()));
        let summarizer = Arc::new(Summarizer::new(
            ai.llm.clone(),
            self.files.clone(),
            ai.provider.clone(),
        ));

        let deps_handle = {
            let pipeline = self.clone();
            let repo_id = repo_id.to_string();
            tokio::spawn(async move {
                if let Err(err) = pipeline.resolve_dependencies(&repo_id).await {
                    tracing::warn!(%repo_id, %err, "dependency resolution failed, continuing");
                }
            })
        };
        let embed_handle = {
            let embedder = Arc::clone(&embedder);
            let repo_id = repo_id.to_string();
            let enabled = self.settings.use_remote_embeddings;
            tokio::spawn(async move {
                if !enabled {
                    tracing::info!(%repo_id, "remote embeddings disabled, skipping");
                    return;
                }
                if let Err(err) = embedder.generate_for_repository(&repo_id).await {
                    tracing::warn!(%repo_id, %err, "embedding generation failed, continuing");
                }
            })
        };
        let summary_handle = {
            let summarizer = Arc::clone(&summarizer);
            let repo_id = repo_id.to_string();
            tokio::spawn(async move {
                if let Err(err) = summarizer.generate_for_repository(&repo_id).await {
                    tracing::warn!(%repo_id, %err, "summary generation failed, continuing");
                }
            })
        };

        // Steps stay monotonic: flip to `summarizing` once the first two
        // analysis tasks have joined, while summaries may still run.
        let _ = deps_handle.await;
        let _ = embed_handle.await;
        self.tasks
            .update_step(task_id, TaskStep::Summarizing)
            .await?;
        let _ = summary_handle.await;

        // Post-fan-out: summary embeddings are redone now that summaries
        // are final, concurrently with the repository overview.
        self.tasks.update_step(task_id, TaskStep::Overview).await?;
        let overview = OverviewGenerator::new(
            ai.llm.clone(),
            self.files.clone(),
            self.repositories.clone(),
        );
        let regen = async {
            if !self.settings.use_remote_embeddings {
                return;
            }
            if let Err(err) = embedder.regenerate_summary_embeddings(repo_id).await {
                tracing::warn!(repo_id, %err, "summary re-embedding failed, continuing");
            }
        };
        let overview_task = async {
            if let Err(err) = overview.generate_for_repository(repo_id).await {
                tracing::warn!(repo_id, %err, "overview generation failed, continuing");
            }
        };
        tokio::join!(regen, overview_task);

        // Finalize.
        self.tasks.update_step(task_id, TaskStep::Finalizing).await?;
        self.tasks
            .complete(
                task_id,
                Some(serde_json::json!({
                    "files_processed": processed,
                    "total_files": total_files,
                })),
            )
            .await?;
        self.repositories
            .update_status(repo_id, RepoStatus::Completed, None)
            .await?;
        tracing::info!(repo_id, processed, total_files, "ingestion complete");
        Ok(())
    }

    /// Fetch, hash, parse, and persist one file. Every failure here is a
    /// skip, never a pipeline error.
    async fn process_single_file(&self, file_info: &TreeFile, repo: &Repository) {
        let path = &file_info.path;
        let filename = path.rsplit('/').next().unwrap_or(path).to_string();
        let extension = filter::file_extension(&filename);
        let language = filter::detect_language(&filename);

        let Some(content) = self
            .github
            .fetch_file_content(&repo.owner, &repo.repo_name, &repo.default_branch, path)
            .await
        else {
            tracing::debug!(%path, "skipped (fetch failed or binary)");
            return;
        };

        let content_hash = format!("{:x}", Sha256::digest(content.as_bytes()));
        let language_name = language.unwrap_or("unknown");

        let parsed: Option<ParsedSource> = language.and_then(|lang| {
            self.registry
                .parse(&content, path, lang)
                .map(|parsed| {
                    if let Some(error) = &parsed.parse_error {
                        tracing::debug!(%path, %error, "parse failure");
                    }
                    parsed
                })
        });

        let now = Utc::now();
        let record = FileRecord {
            file_id: format!("file-{}", Uuid::new_v4()),
            repo_id: repo.repo_id.clone(),
            session_id: repo.session_id.clone(),
            path: path.clone(),
            filename,
            extension,
            language: language_name.to_string(),
            size_bytes: file_info.size as i64,
            content,
            content_hash,
            functions: vec![],
            classes: vec![],
            imports: vec![],
            parse_error: None,
            dependencies: Dependencies::default(),
            summary: None,
            provider: None,
            model: None,
            parsed: false,
            embedded: false,
            analyzed: false,
            created_at: now,
            updated_at: now,
        };

        if let Err(err) = self.files.create(&record).await {
            tracing::warn!(%path, %err, "failed to store file");
            return;
        }

        if let Some(parsed) = parsed {
            if let Err(err) = self
                .files
                .update_parsed(&repo.repo_id, path, &parsed)
                .await
            {
                tracing::warn!(%path, %err, "failed to store parse results");
            }
        }
    }

    async fn resolve_dependencies(&self, repo_id: &str) -> Result<()> {
        let files = self.files.list_meta(repo_id).await?;
        if files.is_empty() {
            tracing::info!(repo_id, "no files for dependency resolution");
            return Ok(());
        }

        let resolver = DependencyResolver::new(&files);
        let resolved = resolver.resolve_all();
        let stats = resolver.stats(&resolved);
        let updated = self
            .files
            .bulk_update_dependencies(repo_id, &resolved)
            .await?;

        tracing::info!(
            repo_id,
            updated,
            internal = stats.total_internal_dependencies,
            external = stats.total_external_dependencies,
            "dependency resolution complete"
        );
        Ok(())
    }
}
