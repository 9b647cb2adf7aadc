//! Streaming RAG query orchestrator.
//!
//! One query drives a bounded tool-calling loop: the model streams either
//! answer tokens (filtered for `<think>` regions) or tool calls; tool
//! calls are executed against the search service and fed back as tool
//! messages until the model answers in plain text. Every event goes
//! through an mpsc channel, so a consumer dropping the stream stops the
//! loop at the next emission.

pub mod events;
pub mod tools;

use sqlx::PgPool;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::ai::client::{ChatMessage, ToolCall, ToolCallAssembler};
use crate::ai::think::ThinkFilter;
use crate::ai::{resolve_credential, AiContext};
use crate::config::Settings;
use crate::error::Result;
use crate::search::SearchService;
use crate::store::{ConversationStore, MessageStore, SessionStore};
use events::{dedup_sources, QueryEvent, Source, ToolCallSummary};

const MAX_ITERATIONS: usize = 5;
const HISTORY_LIMIT: i64 = 20;
const QUERY_TEMPERATURE: f32 = 0.3;
const CONVERSATION_TITLE_LIMIT: usize = 50;

const FALLBACK_ANSWER: &str = "I apologize, but I couldn't generate a complete answer after \
multiple attempts. Please try rephrasing your question.";

fn system_prompt(repo_id: &str) -> String {
    format!(
        r#"You are a helpful code analysis assistant. You help developers understand codebases by answering questions about code.

You have access to 5 tools to search and retrieve code:
1. search_code - Search for code implementations (functions, classes) + file summaries. Use when you need actual code.
2. search_files - Search ONLY file summaries (no code). Use for finding files by characteristics: security issues, performance, patterns, etc.
3. get_repo_overview - Get high-level repository overview
4. get_file_by_path - Get specific file by path (e.g., /app/stream.ts)
5. find_function - Find specific function by name

Guidelines:
- ALWAYS use tools to find relevant code before answering
- You CAN and SHOULD use MULTIPLE tools in a single response if needed to fully answer the question
- DO NOT answer without calling tools first - you must wait for tool results
- After calling tools, WAIT for all tool results before generating your answer
- DO NOT make assumptions about code - only use information from tool results

Tool selection:
- For "how does X work" questions -> use search_code (returns code + summaries)
- For "files with security issues" -> use search_files (returns only summaries)
- For "list files that..." questions -> use search_files
- For "what does this repo do" -> use get_repo_overview
- For "explain /path/to/file" -> use get_file_by_path
- For "show me function X" -> use find_function
- For complex questions -> use MULTIPLE tools

Answer format:
- Cite file paths and line numbers in your answers
- If code chunks are returned, explain what they do
- Be concise but thorough

After receiving tool results, provide a natural language answer to the user's question. DO NOT generate more tool calls in text format - just answer the question based on the code you found.

Current repository ID: {repo_id}
"#
    )
}

#[derive(Clone)]
pub struct QueryOrchestrator {
    settings: Settings,
    pool: PgPool,
    sessions: SessionStore,
    conversations: ConversationStore,
    messages: MessageStore,
}

impl QueryOrchestrator {
    pub fn new(settings: Settings, pool: PgPool) -> Self {
        Self {
            sessions: SessionStore::new(pool.clone()),
            conversations: ConversationStore::new(pool.clone()),
            messages: MessageStore::new(pool.clone()),
            settings,
            pool,
        }
    }

    /// Run one query and stream events. The returned stream always ends
    /// with exactly one `done` or `error` event (unless the consumer
    /// hangs up first).
    pub fn stream_query(
        &self,
        session_id: String,
        repo_id: String,
        user_query: String,
        api_key: Option<String>,
    ) -> ReceiverStream<QueryEvent> {
        let (tx, rx) = mpsc::channel(32);
        let orchestrator = self.clone();

        tokio::spawn(async move {
            let result = orchestrator
                .run(&session_id, &repo_id, &user_query, api_key, &tx)
                .await;
            if let Err(err) = result {
                tracing::error!(%repo_id, %err, "query failed");
                let _ = tx
                    .send(QueryEvent::Error {
                        error: err.to_string(),
                    })
                    .await;
            }
        });

        ReceiverStream::new(rx)
    }

    async fn run(
        &self,
        session_id: &str,
        repo_id: &str,
        user_query: &str,
        api_key: Option<String>,
        tx: &mpsc::Sender<QueryEvent>,
    ) -> Result<()> {
        let credential = resolve_credential(&self.settings, api_key)?;
        let session = self.sessions.get(session_id).await?;
        let ai = AiContext::new(&self.settings, session.as_ref(), credential)?;
        let search = SearchService::new(self.pool.clone(), ai.embeddings.clone());

        tracing::info!(repo_id, provider = %ai.provider, model = %ai.model, "query started");

        // Conversation state: system prompt + last 20 messages + query.
        let system = system_prompt(repo_id);
        let title = truncate_title(user_query);
        let conversation = self
            .conversations
            .find_or_create(session_id, repo_id, &system, &title)
            .await?;
        let conversation_id = conversation.conversation_id.clone();

        let history = self
            .messages
            .recent_chat_messages(&conversation_id, HISTORY_LIMIT)
            .await?;
        tracing::debug!(loaded = history.len(), "conversation history loaded");

        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(system));
        messages.extend(history);
        messages.push(ChatMessage::user(user_query));

        let user_sequence = self.messages.next_sequence_number(&conversation_id).await?;
        self.messages
            .create(&conversation_id, "user", user_query, None, None, user_sequence)
            .await?;

        let tool_schema = tools::tool_definitions();
        let mut sources: Vec<Source> = Vec::new();
        let mut tool_calls_made: Vec<ToolCallSummary> = Vec::new();
        let mut all_tool_calls: Vec<ToolCall> = Vec::new();
        let mut full_answer = String::new();

        for iteration in 0..MAX_ITERATIONS {
            tracing::debug!(iteration = iteration + 1, "LLM iteration");

            let mut stream = ai
                .llm
                .stream(&messages, Some(tool_schema.as_slice()), QUERY_TEMPERATURE, None)
                .await?;

            let mut assembler = ToolCallAssembler::new();
            let mut filter = ThinkFilter::new();
            let mut collected_content = String::new();

            while let Some(delta) = stream.next_delta().await? {
                if let Some(content) = &delta.content {
                    collected_content.push_str(content);
                    let visible = filter.push(content);
                    if !visible.is_empty() {
                        full_answer.push_str(&visible);
                        if emit(tx, QueryEvent::AnswerChunk { content: visible })
                            .await
                            .is_err()
                        {
                            return Ok(()); // consumer hung up
                        }
                    }
                }
                for tool_delta in &delta.tool_calls {
                    assembler.push(tool_delta);
                }
            }

            let tail = filter.finish();
            if !tail.is_empty() {
                full_answer.push_str(&tail);
                if emit(tx, QueryEvent::AnswerChunk { content: tail }).await.is_err() {
                    return Ok(());
                }
            }

            if !assembler.is_empty() {
                let calls = assembler.finish();
                tracing::debug!(count = calls.len(), "model requested tool calls");

                messages.push(ChatMessage::assistant(
                    (!collected_content.is_empty()).then(|| collected_content.clone()),
                    Some(calls.clone()),
                ));

                for call in &calls {
                    let args: serde_json::Value =
                        serde_json::from_str(&call.function.arguments).unwrap_or_else(|err| {
                            tracing::warn!(%err, "unparseable tool arguments");
                            serde_json::json!({})
                        });
                    let tool_name = call.function.name.clone();

                    if emit(
                        tx,
                        QueryEvent::ToolCall {
                            tool: tool_name.clone(),
                            args: args.clone(),
                        },
                    )
                    .await
                    .is_err()
                    {
                        return Ok(());
                    }

                    let outcome = tools::execute_tool(&search, repo_id, &tool_name, &args).await;

                    if emit(
                        tx,
                        QueryEvent::ToolResult {
                            tool: tool_name.clone(),
                            result_count: outcome.result_count,
                        },
                    )
                    .await
                    .is_err()
                    {
                        return Ok(());
                    }

                    tool_calls_made.push(ToolCallSummary {
                        tool: tool_name,
                        args,
                        result_count: outcome.result_count,
                    });
                    sources.extend(outcome.sources);

                    let result_json = serde_json::to_string(&outcome.result)?;
                    messages.push(ChatMessage::tool(call.id.clone(), result_json));
                }

                all_tool_calls.extend(calls);
                continue;
            }

            // No tool calls: this stream was the final answer.
            if !full_answer.is_empty() {
                let assistant_sequence =
                    self.messages.next_sequence_number(&conversation_id).await?;
                self.messages
                    .create(
                        &conversation_id,
                        "assistant",
                        &full_answer,
                        (!all_tool_calls.is_empty()).then_some(all_tool_calls.as_slice()),
                        None,
                        assistant_sequence,
                    )
                    .await?;
                self.conversations
                    .increment_message_count(&conversation_id, 2)
                    .await?;
            }

            let _ = emit(
                tx,
                QueryEvent::Done {
                    sources: dedup_sources(sources),
                    tool_calls: tool_calls_made,
                },
            )
            .await;
            return Ok(());
        }

        // Iteration bound exhausted without a plain-text answer.
        tracing::warn!(repo_id, "query hit the iteration bound");
        let _ = emit(
            tx,
            QueryEvent::AnswerChunk {
                content: FALLBACK_ANSWER.to_string(),
            },
        )
        .await;
        let _ = emit(
            tx,
            QueryEvent::Done {
                sources: dedup_sources(sources),
                tool_calls: tool_calls_made,
            },
        )
        .await;
        Ok(())
    }
}

async fn emit(
    tx: &mpsc::Sender<QueryEvent>,
    event: QueryEvent,
) -> std::result::Result<(), mpsc::error::SendError<QueryEvent>> {
    tx.send(event).await
}

fn truncate_title(query: &str) -> String {
    if query.chars().count() > CONVERSATION_TITLE_LIMIT {
        let cut: String = query.chars().take(CONVERSATION_TITLE_LIMIT).collect();
        format!("{cut}...")
    } else {
        query.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_is_truncated_at_fifty_chars() {
        let short = "how does the parser work";
        assert_eq!(truncate_title(short), short);

        let long = "x".repeat(80);
        let title = truncate_title(&long);
        assert_eq!(title.chars().count(), 53);
        assert!(title.ends_with("..."));
    }

    #[test]
    fn system_prompt_embeds_repo_id_and_tools() {
        let prompt = system_prompt("repo-123");
        assert!(prompt.contains("Current repository ID: repo-123"));
        for tool in [
            "search_code",
            "search_files",
            "get_repo_overview",
            "get_file_by_path",
            "find_function",
        ] {
            assert!(prompt.contains(tool), "missing {tool}");
        }
    }
}
