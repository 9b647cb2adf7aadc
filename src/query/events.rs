//! Events streamed to query clients, and their text-event-stream framing.

use serde::Serialize;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Source {
    pub file_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_start: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_end: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolCallSummary {
    pub tool: String,
    pub args: serde_json::Value,
    pub result_count: usize,
}

/// Event order per query: zero or more tool_call/tool_result pairs, zero
/// or more answer_chunks, then exactly one done or error.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueryEvent {
    ToolCall {
        tool: String,
        args: serde_json::Value,
    },
    ToolResult {
        tool: String,
        result_count: usize,
    },
    AnswerChunk {
        content: String,
    },
    Done {
        sources: Vec<Source>,
        tool_calls: Vec<ToolCallSummary>,
    },
    Error {
        error: String,
    },
}

/// Frame an event for a text event stream: `data: <JSON>\n\n`.
pub fn to_sse(event: &QueryEvent) -> String {
    let json = serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string());
    format!("data: {json}\n\n")
}

/// Drop duplicate sources while preserving first-seen order.
pub fn dedup_sources(sources: Vec<Source>) -> Vec<Source> {
    let mut seen = std::collections::HashSet::new();
    sources
        .into_iter()
        .filter(|s| seen.insert((s.file_path.clone(), s.line_start, s.line_end)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_type_tag() {
        let event = QueryEvent::ToolCall {
            tool: "search_code".to_string(),
            args: serde_json::json!({"query": "parser"}),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "tool_call");
        assert_eq!(value["tool"], "search_code");
    }

    #[test]
    fn sse_framing_matches_contract() {
        let event = QueryEvent::AnswerChunk {
            content: "hi".to_string(),
        };
        let framed = to_sse(&event);
        assert!(framed.starts_with("data: {"));
        assert!(framed.ends_with("\n\n"));
    }

    #[test]
    fn sources_dedupe_preserves_order() {
        let sources = vec![
            Source { file_path: "a.py".into(), line_start: Some(1), line_end: Some(5) },
            Source { file_path: "b.py".into(), line_start: None, line_end: None },
            Source { file_path: "a.py".into(), line_start: Some(1), line_end: Some(5) },
        ];
        let deduped = dedup_sources(sources);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].file_path, "a.py");
        assert_eq!(deduped[1].file_path, "b.py");
    }
}
