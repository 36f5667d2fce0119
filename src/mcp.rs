// Multi-Reasoner Bridge - MCP Server (JSON-RPC 2.0 over stdio)
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// Thin protocol shell. Every tool call is handed to the Dispatcher.
// Exposes: chatgpt, gemini, grok, mistral, consensus, codex_review

use crate::dispatch::{CallError, Dispatcher, Tool};
use crate::gate::MAX_FILES;
use crate::request::{Depth, Mode};
use serde_json::{json, Value};
use std::io::{self, BufRead, Write};

pub const PROTOCOL_VERSION: &str = "2024-11-05";
pub const SERVER_NAME: &str = "multi-reasoner";
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

const PARSE_ERROR: i64 = -32700;
const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;

/// Summarize tool params for logging (truncate large values, never file contents)
fn param_summary(args: &Value) -> String {
    let input = args.get("reasoning_input").and_then(Value::as_str).unwrap_or("?");
    let snippet: String = input.chars().take(120).collect();
    let ellipsis = if input.chars().count() > 120 { "…" } else { "" };
    let depth = args.get("depth").and_then(Value::as_str).unwrap_or("-");
    let mode = args.get("mode").and_then(Value::as_str).unwrap_or("-");
    let files = args.get("files").and_then(Value::as_array).map(Vec::len).unwrap_or(0);
    format!("depth={} mode={} files={} input={}{}", depth, mode, files, snippet, ellipsis)
}

fn response(id: &Value, result: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result,
    })
}

fn error_response(id: &Value, code: i64, message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "code": code, "message": message },
    })
}

/// Write one JSON-RPC frame as a single line
fn send<W: Write>(out: &mut W, frame: &Value) -> io::Result<()> {
    serde_json::to_writer(&mut *out, frame)?;
    out.write_all(b"\n")?;
    out.flush()
}

/// MCP tool definition helper
fn tool_def(name: &str, description: &str, properties: Value, required: Vec<&str>) -> Value {
    json!({
        "name": name,
        "description": description,
        "inputSchema": {
            "type": "object",
            "properties": properties,
            "required": required,
        }
    })
}

fn reasoning_properties() -> Value {
    json!({
        "reasoning_input": {
            "type": "string",
            "description": "The question, idea, plan, or text to reason about"
        },
        "depth": {
            "type": "string",
            "enum": Depth::ALL.map(Depth::as_str),
            "default": Depth::default().as_str(),
            "description": "Reasoning effort. Lower is faster; high may take several minutes."
        },
        "mode": {
            "type": "string",
            "enum": Mode::ALL.map(Mode::as_str),
            "default": Mode::default().as_str(),
            "description": "Output shape: memo (structured sections), bullets, questions, or quick (2-5 sentences)"
        },
        "files": {
            "type": "array",
            "items": {"type": "string"},
            "maxItems": MAX_FILES,
            "description": "Optional local text files to attach (max 10, 512KB each). Sensitive paths are refused."
        }
    })
}

/// Return all tool definitions
pub fn tool_definitions() -> Vec<Value> {
    vec![
        // ====== SINGLE-BACKEND REASONING ======
        tool_def(
            "chatgpt",
            "Get a second opinion from ChatGPT (via the local Codex CLI). Reasoning only: it will not run commands or browse your repository. Use for brainstorming, critique, and strategic analysis.",
            reasoning_properties(),
            vec!["reasoning_input"],
        ),
        tool_def(
            "gemini",
            "Get a second opinion from Google Gemini. Requires GEMINI_API_KEY. Use for brainstorming, critique, and strategic analysis.",
            reasoning_properties(),
            vec!["reasoning_input"],
        ),
        tool_def(
            "grok",
            "Get a second opinion from xAI Grok. Requires XAI_API_KEY. Use for brainstorming, critique, and strategic analysis.",
            reasoning_properties(),
            vec!["reasoning_input"],
        ),
        tool_def(
            "mistral",
            "Get a second opinion from Mistral (Magistral reasoning model). Requires MISTRAL_API_KEY. Use for brainstorming, critique, and strategic analysis.",
            reasoning_properties(),
            vec!["reasoning_input"],
        ),

        // ====== FAN-OUT ======
        tool_def(
            "consensus",
            "Ask every reasoning backend the same question at once and get their answers side by side. Backends that fail are reported without blocking the others.",
            reasoning_properties(),
            vec!["reasoning_input"],
        ),

        // ====== DEPRECATED ======
        tool_def(
            "codex_review",
            "DEPRECATED: use the /codex skill for code reviews. Returns redirect instructions and performs no review.",
            json!({
                "review_request": {"type": "string", "description": "What to review"},
                "working_dir": {"type": "string", "description": "Repository directory (ignored)"}
            }),
            vec!["review_request"],
        ),
    ]
}

/// Handle one parsed JSON-RPC message. Returns the response frame, if any.
pub fn handle_message(dispatcher: &Dispatcher, msg: &Value) -> Option<Value> {
    let method = msg["method"].as_str().unwrap_or("");
    let id = &msg["id"];
    let params = &msg["params"];

    log::debug!("Received: {}", method);

    match method {
        "initialize" => Some(response(id, json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": { "tools": {} },
            "serverInfo": {
                "name": SERVER_NAME,
                "version": SERVER_VERSION,
            }
        }))),

        "notifications/initialized" => None,

        "tools/list" => Some(response(id, json!({ "tools": tool_definitions() }))),

        "tools/call" => {
            let name = params["name"].as_str().unwrap_or("");
            let args = params.get("arguments").cloned().unwrap_or_else(|| json!({}));
            Some(call_tool(dispatcher, id, name, &args))
        }

        "ping" => Some(response(id, json!({}))),

        _ => {
            if id.is_null() {
                None
            } else {
                Some(error_response(id, METHOD_NOT_FOUND, &format!("Unknown method: {}", method)))
            }
        }
    }
}

fn call_tool(dispatcher: &Dispatcher, id: &Value, name: &str, args: &Value) -> Value {
    if name == Tool::CodexReview.as_str() {
        log::info!("CALL {}", name);
    } else {
        log::info!("CALL {} | {}", name, param_summary(args));
    }

    match dispatcher.handle(name, args) {
        Ok(reply) => {
            let is_error = reply.is_error();
            if is_error {
                log::warn!("FAIL {} | no backend produced an answer", name);
            }
            response(id, json!({
                "content": [{ "type": "text", "text": reply.render() }],
                "structuredContent": reply.structured(),
                "isError": is_error,
            }))
        }
        Err(e) => {
            log::warn!("REJECT {} | {}", name, e);
            let message = match &e {
                CallError::UnknownTool(_) => format!("Unknown tool: {}", name),
                CallError::Args(arg) => format!("Invalid arguments for {}: {}", name, arg),
            };
            error_response(id, INVALID_PARAMS, &message)
        }
    }
}

/// Serve line-delimited JSON-RPC until `input` closes
pub fn serve<R: BufRead, W: Write>(dispatcher: &Dispatcher, input: R, mut output: W) -> io::Result<()> {
    for line in input.lines() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                log::warn!("stdin read error: {}", e);
                continue;
            }
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let frame = match serde_json::from_str::<Value>(line) {
            Ok(msg) => handle_message(dispatcher, &msg),
            Err(e) => {
                log::warn!("JSON parse error: {}", e);
                Some(error_response(&Value::Null, PARSE_ERROR, &format!("Parse error: {}", e)))
            }
        };

        if let Some(frame) = frame {
            send(&mut output, &frame)?;
        }
    }
    Ok(())
}

/// Main server loop over the process's stdin/stdout. stdout carries only JSON-RPC.
pub fn run(dispatcher: &Dispatcher) -> io::Result<()> {
    log::info!("Starting {} v{}", SERVER_NAME, SERVER_VERSION);
    log::info!(
        "Backends: {}",
        dispatcher
            .backends()
            .iter()
            .map(|b| b.id().as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    let stdin = io::stdin();
    let stdout = io::stdout();
    serve(dispatcher, stdin.lock(), stdout.lock())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Backend, BackendFailure, BackendId};
    use crate::config::BridgeConfig;
    use crate::gate::PathGate;
    use crate::prompt::BackendFamily;
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::Duration;

    struct Echo(BackendId, Result<(), BackendFailure>);

    impl Backend for Echo {
        fn id(&self) -> BackendId {
            self.0
        }
        fn family(&self) -> BackendFamily {
            BackendFamily::Api
        }
        fn preflight(&self) -> Result<(), BackendFailure> {
            Ok(())
        }
        fn call(&self, _: &str, depth: Depth, _: Duration) -> Result<String, BackendFailure> {
            self.1.clone().map(|_| format!("{} thought at {}", self.0, depth))
        }
    }

    fn dispatcher(backends: Vec<Arc<dyn Backend>>) -> Dispatcher {
        let gate = PathGate::new(Some(PathBuf::from("/home/tester")), PathBuf::from("/"));
        Dispatcher::with_backends(BridgeConfig::default(), gate, backends)
    }

    fn healthy() -> Dispatcher {
        dispatcher(vec![
            Arc::new(Echo(BackendId::Gemini, Ok(()))),
            Arc::new(Echo(BackendId::Grok, Err(BackendFailure::AuthMissing { var: "XAI_API_KEY".into() }))),
        ])
    }

    fn roundtrip(d: &Dispatcher, lines: &str) -> Vec<Value> {
        let mut out = Vec::new();
        serve(d, lines.as_bytes(), &mut out).unwrap();
        String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn catalog_lists_six_tools_with_schemas() {
        let tools = tool_definitions();
        let names: Vec<&str> = tools.iter().map(|t| t["name"].as_str().unwrap()).collect();
        assert_eq!(names, ["chatgpt", "gemini", "grok", "mistral", "consensus", "codex_review"]);

        let gemini = &tools[1]["inputSchema"];
        assert_eq!(gemini["required"], json!(["reasoning_input"]));
        assert_eq!(gemini["properties"]["depth"]["enum"], json!(["low", "medium", "high"]));
        assert_eq!(gemini["properties"]["depth"]["default"], "high");
        assert_eq!(gemini["properties"]["mode"]["enum"], json!(["memo", "bullets", "questions", "quick"]));
        assert_eq!(gemini["properties"]["files"]["maxItems"], 10);
        assert_eq!(tools[5]["inputSchema"]["required"], json!(["review_request"]));
    }

    #[test]
    fn handshake_and_ping() {
        let d = healthy();
        let frames = roundtrip(
            &d,
            concat!(
                r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#, "\n",
                r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#, "\n",
                "\n",
                r#"{"jsonrpc":"2.0","id":2,"method":"ping"}"#, "\n",
            ),
        );
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0]["id"], 1);
        assert_eq!(frames[0]["result"]["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(frames[0]["result"]["serverInfo"]["name"], SERVER_NAME);
        assert_eq!(frames[1]["id"], 2);
        assert_eq!(frames[1]["result"], json!({}));
    }

    #[test]
    fn protocol_errors() {
        let d = healthy();
        let frames = roundtrip(
            &d,
            concat!(
                "{not json\n",
                r#"{"jsonrpc":"2.0","id":7,"method":"resources/list"}"#, "\n",
                r#"{"jsonrpc":"2.0","method":"notifications/unknown"}"#, "\n",
            ),
        );
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0]["error"]["code"], -32700);
        assert!(frames[0]["id"].is_null());
        assert_eq!(frames[1]["error"]["code"], -32601);
        assert_eq!(frames[1]["id"], 7);
    }

    #[test]
    fn tool_call_success_carries_text_and_structure() {
        let d = healthy();
        let msg = json!({"jsonrpc": "2.0", "id": 3, "method": "tools/call",
            "params": {"name": "gemini", "arguments": {"reasoning_input": "Evaluate build vs buy", "depth": "medium"}}});
        let frame = handle_message(&d, &msg).unwrap();
        let result = &frame["result"];
        assert_eq!(result["content"][0]["type"], "text");
        assert_eq!(result["content"][0]["text"], "gemini thought at medium");
        assert_eq!(result["structuredContent"]["per_backend"]["gemini"]["status"], "ok");
        assert_eq!(result["isError"], false);
    }

    #[test]
    fn backend_failure_is_a_result_with_is_error() {
        let d = healthy();
        let msg = json!({"jsonrpc": "2.0", "id": 4, "method": "tools/call",
            "params": {"name": "grok", "arguments": {"reasoning_input": "x"}}});
        let frame = handle_message(&d, &msg).unwrap();
        assert!(frame.get("error").is_none());
        assert_eq!(frame["result"]["isError"], true);
        let text = frame["result"]["content"][0]["text"].as_str().unwrap();
        assert!(text.contains("grok failed [auth_missing]"));
    }

    #[test]
    fn consensus_with_one_failure_is_not_an_error() {
        let d = healthy();
        let msg = json!({"jsonrpc": "2.0", "id": 5, "method": "tools/call",
            "params": {"name": "consensus", "arguments": {"reasoning_input": "x", "depth": "low"}}});
        let result = handle_message(&d, &msg).unwrap()["result"].clone();
        assert_eq!(result["isError"], false);
        let text = result["content"][0]["text"].as_str().unwrap();
        assert!(text.find("## GEMINI").unwrap() < text.find("## GROK").unwrap());
    }

    #[test]
    fn malformed_arguments_are_invalid_params() {
        let d = healthy();
        let cases = [
            json!({"name": "gemini", "arguments": {}}),
            json!({"name": "gemini", "arguments": {"reasoning_input": "x", "depth": "extreme"}}),
            json!({"name": "gemini", "arguments": {"reasoning_input": "x", "files": [1, 2]}}),
            json!({"name": "gpt5", "arguments": {"reasoning_input": "x"}}),
        ];
        for params in cases {
            let msg = json!({"jsonrpc": "2.0", "id": 6, "method": "tools/call", "params": params});
            let frame = handle_message(&d, &msg).unwrap();
            assert_eq!(frame["error"]["code"], -32602, "params {}", params);
            assert!(frame.get("result").is_none());
        }
    }

    #[test]
    fn codex_review_returns_redirect() {
        let d = healthy();
        let msg = json!({"jsonrpc": "2.0", "id": 8, "method": "tools/call",
            "params": {"name": "codex_review", "arguments": {"review_request": "review my diff"}}});
        let result = handle_message(&d, &msg).unwrap()["result"].clone();
        assert_eq!(result["isError"], false);
        assert!(result["content"][0]["text"].as_str().unwrap().contains("/codex"));
    }

    #[test]
    fn param_summary_truncates_input() {
        let long = "a".repeat(500);
        let summary = param_summary(&json!({"reasoning_input": long, "depth": "low", "files": ["a", "b"]}));
        assert!(summary.starts_with("depth=low mode=- files=2 input="));
        assert!(summary.ends_with("…"));
        assert!(summary.len() < 200);
    }
}
