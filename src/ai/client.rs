//! Chat-completions client for OpenAI-compatible providers.
//!
//! Supports non-streaming completion and SSE streaming. Streamed tool
//! calls arrive as indexed fragments, possibly interleaved and with the
//! JSON arguments split across deltas; [`ToolCallAssembler`] rebuilds
//! them and arguments are only parsed after the stream ends.

use std::pin::Pin;

use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

type BoxByteStream = Pin<Box<dyn Stream<Item = reqwest::Result<bytes::Bytes>> + Send>>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::plain("system", content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain("user", content)
    }

    pub fn assistant(content: Option<String>, tool_calls: Option<Vec<ToolCall>>) -> Self {
        Self {
            role: "assistant".to_string(),
            content,
            tool_calls,
            tool_call_id: None,
        }
    }

    /// Tool-response message carrying the result JSON back to the model.
    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: "tool".to_string(),
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
        }
    }

    fn plain(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: String,
    pub function: FunctionCall,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionCall {
    pub name: String,
    /// Raw JSON string, exactly as the provider sent it.
    pub arguments: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Tool {
    #[serde(rename = "type")]
    pub tool_type: &'static str,
    pub function: ToolFunction,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolFunction {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: serde_json::Value,
}

impl Tool {
    pub fn function(
        name: &'static str,
        description: &'static str,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            tool_type: "function",
            function: ToolFunction {
                name,
                description,
                parameters,
            },
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [Tool]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'a str>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<ToolCall>>,
}

/// Non-streaming completion result: text, tool calls, or both.
#[derive(Debug, Clone)]
pub struct Completion {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
}

#[derive(Clone)]
pub struct LlmClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl LlmClient {
    /// `base_url` and `model` are per-invocation configuration; the
    /// credential is supplied by the caller on every request path.
    pub fn new(base_url: &str, api_key: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: Option<&[Tool]>,
        temperature: f32,
        max_tokens: Option<u32>,
    ) -> Result<Completion> {
        let request = ChatRequest {
            model: &self.model,
            messages,
            tools,
            tool_choice: tools.map(|_| "auto"),
            temperature,
            max_tokens,
            stream: false,
        };

        let response = self.post(&request).await?;
        let parsed: ChatResponse = response.json().await?;
        let message = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| Error::Upstream("chat API returned no choices".to_string()))?;

        Ok(Completion {
            content: message.content,
            tool_calls: message.tool_calls.unwrap_or_default(),
        })
    }

    pub async fn stream(
        &self,
        messages: &[ChatMessage],
        tools: Option<&[Tool]>,
        temperature: f32,
        max_tokens: Option<u32>,
    ) -> Result<ChatStream> {
        let request = ChatRequest {
            model: &self.model,
            messages,
            tools,
            tool_choice: tools.map(|_| "auto"),
            temperature,
            max_tokens,
            stream: true,
        };

        let response = self.post(&request).await?;
        Ok(ChatStream {
            inner: Box::pin(response.bytes_stream()),
            buffer: String::new(),
            done: false,
        })
    }

    async fn post(&self, request: &ChatRequest<'_>) -> Result<reqwest::Response> {
        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Upstream(format!(
                "chat API returned {status}: {body}"
            )));
        }
        Ok(response)
    }
}

/// One streamed delta: a content fragment and/or partial tool calls.
#[derive(Debug, Clone, Default)]
pub struct StreamDelta {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCallDelta>,
}

#[derive(Debug, Clone)]
pub struct ToolCallDelta {
    pub index: usize,
    pub id: Option<String>,
    pub name: Option<String>,
    pub arguments: Option<String>,
}

#[derive(Deserialize)]
struct WireChunk {
    choices: Vec<WireChoice>,
}

#[derive(Deserialize)]
struct WireChoice {
    delta: WireDelta,
}

#[derive(Deserialize, Default)]
struct WireDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCallDelta>>,
}

#[derive(Deserialize)]
struct WireToolCallDelta {
    #[serde(default)]
    index: Option<usize>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<WireFunctionDelta>,
}

#[derive(Deserialize)]
struct WireFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

/// Server-sent-event stream of chat deltas. `data: [DONE]` ends it.
pub struct ChatStream {
    inner: BoxByteStream,
    buffer: String,
    done: bool,
}

impl ChatStream {
    /// Next delta, or `None` once the stream has finished.
    pub async fn next_delta(&mut self) -> Result<Option<StreamDelta>> {
        loop {
            if self.done {
                return Ok(None);
            }

            if let Some(line) = self.take_line() {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let Some(payload) = line.strip_prefix("data:") else {
                    continue;
                };
                let payload = payload.trim();
                if payload == "[DONE]" {
                    self.done = true;
                    return Ok(None);
                }

                let chunk: WireChunk = match serde_json::from_str(payload) {
                    Ok(chunk) => chunk,
                    Err(err) => {
                        tracing::warn!(%err, "skipping malformed stream chunk");
                        continue;
                    }
                };
                let Some(choice) = chunk.choices.into_iter().next() else {
                    continue;
                };

                let tool_calls = choice
                    .delta
                    .tool_calls
                    .unwrap_or_default()
                    .into_iter()
                    .filter_map(|tc| {
                        tc.index.map(|index| ToolCallDelta {
                            index,
                            id: tc.id,
                            name: tc.function.as_ref().and_then(|f| f.name.clone()),
                            arguments: tc.function.as_ref().and_then(|f| f.arguments.clone()),
                        })
                    })
                    .collect();

                return Ok(Some(StreamDelta {
                    content: choice.delta.content,
                    tool_calls,
                }));
            }

            match self.inner.next().await {
                Some(Ok(bytes)) => {
                    self.buffer.push_str(&String::from_utf8_lossy(&bytes));
                }
                Some(Err(err)) => {
                    self.done = true;
                    return Err(Error::Upstream(format!("stream read failed: {err}")));
                }
                None => {
                    self.done = true;
                    return Ok(None);
                }
            }
        }
    }

    fn take_line(&mut self) -> Option<String> {
        let newline = self.buffer.find('\n')?;
        let line: String = self.buffer.drain(..=newline).collect();
        Some(line)
    }
}

/// Rebuilds complete tool calls from indexed fragments. Fragments for
/// different indexes may interleave; arguments concatenate in arrival
/// order within an index.
#[derive(Debug, Default)]
pub struct ToolCallAssembler {
    calls: Vec<PartialToolCall>,
}

#[derive(Debug, Default)]
struct PartialToolCall {
    id: String,
    name: String,
    arguments: String,
}

impl ToolCallAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, delta: &ToolCallDelta) {
        while self.calls.len() <= delta.index {
            self.calls.push(PartialToolCall::default());
        }
        let call = &mut self.calls[delta.index];
        if let Some(id) = &delta.id {
            call.id = id.clone();
        }
        if let Some(name) = &delta.name {
            call.name = name.clone();
        }
        if let Some(arguments) = &delta.arguments {
            call.arguments.push_str(arguments);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn finish(self) -> Vec<ToolCall> {
        self.calls
            .into_iter()
            .map(|partial| ToolCall {
                id: partial.id,
                call_type: "function".to_string(),
                function: FunctionCall {
                    name: partial.name,
                    arguments: partial.arguments,
                },
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delta(index: usize, id: Option<&str>, name: Option<&str>, args: Option<&str>) -> ToolCallDelta {
        ToolCallDelta {
            index,
            id: id.map(String::from),
            name: name.map(String::from),
            arguments: args.map(String::from),
        }
    }

    #[test]
    fn assembler_concatenates_split_arguments() {
        let mut assembler = ToolCallAssembler::new();
        assembler.push(&delta(0, Some("call_1"), Some("search_code"), None));
        assembler.push(&delta(0, None, None, Some("{\"query\": ")));
        assembler.push(&delta(0, None, None, Some("\"rdb parser\"}")));

        let calls = assembler.finish();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "call_1");
        assert_eq!(calls[0].function.name, "search_code");
        let args: serde_json::Value =
            serde_json::from_str(&calls[0].function.arguments).unwrap();
        assert_eq!(args["query"], "rdb parser");
    }

    #[test]
    fn assembler_tolerates_interleaved_indexes() {
        let mut assembler = ToolCallAssembler::new();
        assembler.push(&delta(1, Some("call_b"), Some("search_files"), Some("{\"query\":")));
        assembler.push(&delta(0, Some("call_a"), Some("search_code"), Some("{}")));
        assembler.push(&delta(1, None, None, Some("\"auth\"}")));

        let calls = assembler.finish();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].id, "call_a");
        assert_eq!(calls[1].id, "call_b");
        assert_eq!(calls[1].function.arguments, "{\"query\":\"auth\"}");
    }

    #[test]
    fn chat_messages_serialize_openai_shape() {
        let message = ChatMessage::tool("call_1", "{\"ok\":true}");
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["role"], "tool");
        assert_eq!(value["tool_call_id"], "call_1");
        assert!(value.get("tool_calls").is_none());
    }
}
