//! Development driver: ingest a repository or run a query from the
//! command line. The HTTP surface lives elsewhere; this binary exists to
//! exercise the pipeline and the query loop end to end.

use clap::{Parser, Subcommand};
use dotenv::dotenv;
use tokio_stream::StreamExt;

use repograph::config::Settings;
use repograph::graph::build_graph;
use repograph::pipeline::IngestionPipeline;
use repograph::query::{events, QueryOrchestrator};
use repograph::store::{FileStore, SessionStore, TaskStore};
use repograph::{db, Result};

#[derive(Parser)]
#[command(name = "repograph", about = "Index a GitHub repository and ask questions about it")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Register and fully ingest a repository.
    Ingest {
        github_url: String,
        #[arg(long, default_value = "dev-session")]
        session: String,
        /// Provider API key; falls back to AI_API_KEY in development.
        #[arg(long)]
        api_key: Option<String>,
    },
    /// Ask a question about an ingested repository.
    Query {
        repo_id: String,
        question: String,
        #[arg(long, default_value = "dev-session")]
        session: String,
        #[arg(long)]
        api_key: Option<String>,
    },
    /// Print the resolved dependency graph of an ingested repository.
    Graph { repo_id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "repograph=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let settings = Settings::from_env()?;
    let pool = db::connect(&settings).await?;
    db::ensure_schema(&pool, settings.embedding_dimension).await?;

    match cli.command {
        Command::Ingest {
            github_url,
            session,
            api_key,
        } => {
            SessionStore::new(pool.clone()).ensure(&session, None).await?;
            let pipeline = IngestionPipeline::new(settings, pool.clone());

            let registration = pipeline.register_repository(&github_url, &session).await?;
            println!(
                "registered {} ({} files), repo_id={}, task_id={}",
                registration.metadata.full_name,
                registration.file_count,
                registration.repo_id,
                registration.task_id,
            );

            pipeline
                .process_repository_files(
                    &registration.repo_id,
                    &session,
                    &registration.task_id,
                    api_key,
                )
                .await;

            if let Some(task) = TaskStore::new(pool).get(&registration.task_id).await? {
                println!(
                    "task {}: {} ({}/{} files, step {})",
                    task.task_id,
                    task.status.as_str(),
                    task.progress.processed_files,
                    task.progress.total_files,
                    task.progress.current_step,
                );
            }
        }
        Command::Query {
            repo_id,
            question,
            session,
            api_key,
        } => {
            let orchestrator = QueryOrchestrator::new(settings, pool);
            let mut stream = orchestrator.stream_query(session, repo_id, question, api_key);
            while let Some(event) = stream.next().await {
                print!("{}", events::to_sse(&event));
            }
        }
        Command::Graph { repo_id } => {
            let files = FileStore::new(pool).list_meta(&repo_id).await?;
            let graph = build_graph(&files);
            println!("{}", serde_json::to_string_pretty(&graph)?);
        }
    }

    Ok(())
}
