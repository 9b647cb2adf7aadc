//! The five retrieval tools exposed to the model, and their dispatch.

use serde_json::{json, Value};

use crate::ai::Tool;
use crate::query::events::Source;
use crate::search::SearchService;

pub fn tool_definitions() -> Vec<Tool> {
    vec![
        Tool::function(
            "search_code",
            "Search for specific code implementations (functions, classes) AND file \
             summaries. Returns both code chunks and file summaries merged together. Use \
             this when you need to see actual code implementations. Examples: 'how does \
             RDB parser work', 'show me authentication logic', 'find HTTP request handlers'.",
            json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Search query (e.g., 'RDB parser implementation', 'authentication logic', 'HTTP handlers')"
                    },
                    "top_k": {
                        "type": "integer",
                        "description": "Number of results to return (default 10)",
                        "default": 10
                    }
                },
                "required": ["query"]
            }),
        ),
        Tool::function(
            "search_files",
            "Search ONLY file summaries (no code chunks). Best for finding files by \
             characteristics, issues, or patterns. Use this for queries about security \
             issues, performance problems, code quality, architecture patterns, or file \
             characteristics. Examples: 'files with security issues', 'performance \
             problems', 'files handling authentication', 'configuration files'.",
            json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Search query about file characteristics (e.g., 'security issues', 'performance problems', 'error handling')"
                    },
                    "top_k": {
                        "type": "integer",
                        "description": "Number of files to return (default 10)",
                        "default": 10
                    }
                },
                "required": ["query"]
            }),
        ),
        Tool::function(
            "get_repo_overview",
            "Get high-level repository overview including purpose, architecture, and tech \
             stack. Use this when the user asks 'what does this repo do' or wants a \
             general overview.",
            json!({
                "type": "object",
                "properties": {},
                "required": []
            }),
        ),
        Tool::function(
            "get_file_by_path",
            "Get complete content and summary of a specific file by its path. Use this \
             when the user explicitly mentions a file path (e.g., 'explain /app/stream.ts' \
             or 'what does src/main.py do').",
            json!({
                "type": "object",
                "properties": {
                    "file_path": {
                        "type": "string",
                        "description": "File path (e.g., '/app/stream.ts' or 'src/main.py')"
                    }
                },
                "required": ["file_path"]
            }),
        ),
        Tool::function(
            "find_function",
            "Find a specific function by its exact name. Uses exact search first, falls \
             back to vector search. Use when the user asks for a specific function name \
             (e.g., 'show me the validateToken function').",
            json!({
                "type": "object",
                "properties": {
                    "function_name": {
                        "type": "string",
                        "description": "Function name to search for (e.g., 'validateToken', 'parseRDBFile')"
                    },
                    "file_path": {
                        "type": "string",
                        "description": "Optional: Narrow search to specific file path"
                    }
                },
                "required": ["function_name"]
            }),
        ),
    ]
}

pub struct ToolOutcome {
    pub result: Value,
    pub result_count: usize,
    pub sources: Vec<Source>,
}

/// Execute one tool call against the search service. Unknown tools and
/// missing results come back as error objects for the model, never as
/// Rust errors — the loop must keep going.
pub async fn execute_tool(
    search: &SearchService,
    repo_id: &str,
    name: &str,
    args: &Value,
) -> ToolOutcome {
    let result = dispatch(search, repo_id, name, args).await;
    let result = match result {
        Ok(value) => value,
        Err(err) => json!({"error": err.to_string()}),
    };

    let result_count = match &result {
        Value::Array(items) => items.len(),
        _ => 1,
    };
    let sources = collect_sources(&result);

    ToolOutcome {
        result,
        result_count,
        sources,
    }
}

async fn dispatch(
    search: &SearchService,
    repo_id: &str,
    name: &str,
    args: &Value,
) -> crate::error::Result<Value> {
    let top_k = args
        .get("top_k")
        .and_then(Value::as_u64)
        .unwrap_or(10) as usize;

    match name {
        "search_code" => {
            let query = required_str(args, "query")?;
            let results = search.search_code(repo_id, query, top_k).await?;
            Ok(serde_json::to_value(results)?)
        }
        "search_files" => {
            let query = required_str(args, "query")?;
            let results = search.search_files(repo_id, query, top_k).await?;
            Ok(serde_json::to_value(results)?)
        }
        "get_repo_overview" => {
            let overview = search.get_repo_overview(repo_id).await?;
            Ok(match overview {
                Some(overview) => serde_json::to_value(overview)?,
                None => json!({"error": "Repository overview not found"}),
            })
        }
        "get_file_by_path" => {
            let path = required_str(args, "file_path")?;
            let file = search.get_file_by_path(repo_id, path).await?;
            Ok(match file {
                Some(file) => serde_json::to_value(file)?,
                None => json!({"error": format!("File not found: {path}")}),
            })
        }
        "find_function" => {
            let function_name = required_str(args, "function_name")?;
            let file_path = args.get("file_path").and_then(Value::as_str);
            let hit = search.find_function(repo_id, function_name, file_path).await?;
            Ok(match hit {
                Some(hit) => serde_json::to_value(hit)?,
                None => json!({"error": format!("Function not found: {function_name}")}),
            })
        }
        other => Ok(json!({"error": format!("Unknown tool: {other}")})),
    }
}

fn required_str<'a>(args: &'a Value, key: &str) -> crate::error::Result<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| crate::error::Error::InvalidInput(format!("missing tool argument '{key}'")))
}

/// Pull source references out of a tool result: every element of a list
/// result with a `file_path`, or the path of a single-object result.
fn collect_sources(result: &Value) -> Vec<Source> {
    match result {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| {
                let file_path = item.get("file_path")?.as_str()?.to_string();
                Some(Source {
                    file_path,
                    line_start: item.get("line_start").and_then(Value::as_i64),
                    line_end: item.get("line_end").and_then(Value::as_i64),
                })
            })
            .collect(),
        Value::Object(map) => {
            let path = map
                .get("path")
                .or_else(|| map.get("file_path"))
                .and_then(Value::as_str);
            match path {
                Some(path) => vec![Source {
                    file_path: path.to_string(),
                    line_start: map.get("line_start").and_then(Value::as_i64),
                    line_end: map.get("line_end").and_then(Value::as_i64),
                }],
                None => Vec::new(),
            }
        }
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn five_tools_are_defined() {
        let tools = tool_definitions();
        let names: Vec<&str> = tools.iter().map(|t| t.function.name).collect();
        assert_eq!(
            names,
            vec![
                "search_code",
                "search_files",
                "get_repo_overview",
                "get_file_by_path",
                "find_function"
            ]
        );
    }

    #[test]
    fn list_results_contribute_each_source() {
        let result = json!([
            {"file_path": "src/a.py", "line_start": 5, "line_end": 20},
            {"file_path": "src/b.py"},
            {"no_path": true},
        ]);
        let sources = collect_sources(&result);
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].line_start, Some(5));
        assert_eq!(sources[1].line_start, None);
    }

    #[test]
    fn object_results_contribute_their_path() {
        let result = json!({"path": "src/main.py", "content": "..."});
        let sources = collect_sources(&result);
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].file_path, "src/main.py");

        let error = json!({"error": "File not found"});
        assert!(collect_sources(&error).is_empty());
    }
}
