//! Streamed-answer hygiene: the think filter and the tool-call assembler
//! must cooperate the way the query loop drives them, regardless of how
//! the provider slices its deltas.

use repograph::ai::client::{ToolCallAssembler, ToolCallDelta};
use repograph::ai::think::ThinkFilter;
use repograph::query::events::{to_sse, QueryEvent};

#[test]
fn answer_chunks_never_leak_think_fragments() {
    // Provider slices the answer adversarially: tags split across deltas,
    // reasoning interleaved mid-sentence.
    let deltas = [
        "The RDB ",
        "parser<th",
        "ink>let me reason about whether",
        " to mention internals</t",
        "hink> lives in src/rdb.rs and ",
        "reads length-prefixed records.",
    ];

    let mut filter = ThinkFilter::new();
    let mut chunks: Vec<String> = Vec::new();
    for delta in deltas {
        let visible = filter.push(delta);
        if !visible.is_empty() {
            chunks.push(visible);
        }
    }
    let tail = filter.finish();
    if !tail.is_empty() {
        chunks.push(tail);
    }

    let answer: String = chunks.concat();
    assert_eq!(
        answer,
        "The RDB parser lives in src/rdb.rs and reads length-prefixed records."
    );
    for chunk in &chunks {
        assert!(!chunk.contains("<think>"), "leaked tag in {chunk:?}");
        assert!(!chunk.contains("</think>"));
        assert!(!chunk.contains("reason about"));
    }
}

#[test]
fn interleaved_tool_call_fragments_assemble_and_parse() {
    let deltas = [
        ToolCallDelta {
            index: 0,
            id: Some("call_search".to_string()),
            name: Some("search_code".to_string()),
            arguments: None,
        },
        ToolCallDelta {
            index: 1,
            id: Some("call_file".to_string()),
            name: Some("get_file_by_path".to_string()),
            arguments: Some("{\"file_pa".to_string()),
        },
        ToolCallDelta {
            index: 0,
            id: None,
            name: None,
            arguments: Some("{\"query\": \"rdb".to_string()),
        },
        ToolCallDelta {
            index: 1,
            id: None,
            name: None,
            arguments: Some("th\": \"src/rdb.rs\"}".to_string()),
        },
        ToolCallDelta {
            index: 0,
            id: None,
            name: None,
            arguments: Some(" parser\", \"top_k\": 5}".to_string()),
        },
    ];

    let mut assembler = ToolCallAssembler::new();
    for delta in &deltas {
        assembler.push(delta);
    }
    let calls = assembler.finish();

    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].function.name, "search_code");
    assert_eq!(calls[1].function.name, "get_file_by_path");

    // Arguments only parse after the stream ends; both must be valid now.
    let args0: serde_json::Value = serde_json::from_str(&calls[0].function.arguments).unwrap();
    assert_eq!(args0["query"], "rdb parser");
    assert_eq!(args0["top_k"], 5);
    let args1: serde_json::Value = serde_json::from_str(&calls[1].function.arguments).unwrap();
    assert_eq!(args1["file_path"], "src/rdb.rs");
}

#[test]
fn sse_frames_parse_back_to_tagged_events() {
    let events = [
        QueryEvent::ToolCall {
            tool: "search_code".to_string(),
            args: serde_json::json!({"query": "auth"}),
        },
        QueryEvent::ToolResult {
            tool: "search_code".to_string(),
            result_count: 3,
        },
        QueryEvent::AnswerChunk {
            content: "Authentication lives in".to_string(),
        },
        QueryEvent::Done {
            sources: vec![],
            tool_calls: vec![],
        },
    ];

    let expected_types = ["tool_call", "tool_result", "answer_chunk", "done"];
    for (event, expected) in events.iter().zip(expected_types) {
        let framed = to_sse(event);
        let payload = framed
            .strip_prefix("data: ")
            .and_then(|rest| rest.strip_suffix("\n\n"))
            .expect("sse framing");
        let value: serde_json::Value = serde_json::from_str(payload).unwrap();
        assert_eq!(value["type"], expected);
    }
}
