// Multi-Reasoner Bridge - HTTP Model Adapters
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// Gemini (generateContent), Grok and Mistral (OpenAI-style chat completions).
// One synchronous request per call, bounded by the caller's timeout.
// Check order: credential (auth_missing) -> HTTP client (dependency_missing)
// -> request (timeout / backend_error) -> parse (malformed_output).

use crate::backend::{Backend, BackendFailure, BackendId};
use crate::config::ProviderSettings;
use crate::prompt::BackendFamily;
use crate::request::Depth;
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

const USER_AGENT: &str = concat!("multi-reasoner/", env!("CARGO_PKG_VERSION"));
const GEMINI_MAX_OUTPUT_TOKENS: u32 = 16384;
const UPSTREAM_SNIPPET_CHARS: usize = 300;

/// Shared blocking client. A construction failure (TLS backend unavailable)
/// is remembered and reported as dependency_missing on every call.
pub fn build_client() -> Result<Client, String> {
    Client::builder()
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| format!("Failed to create HTTP client: {}", e))
}

/// First non-empty key among the configured variables, re-read per call
fn api_key(settings: &ProviderSettings) -> Result<String, BackendFailure> {
    settings
        .key_vars
        .iter()
        .find_map(|var| std::env::var(var).ok().filter(|v| !v.trim().is_empty()))
        .ok_or_else(|| BackendFailure::AuthMissing { var: settings.key_vars.join(" or ") })
}

fn client_or_missing<'a>(client: &'a Result<Client, String>, provider: &str) -> Result<&'a Client, BackendFailure> {
    client.as_ref().map_err(|e| BackendFailure::DependencyMissing {
        what: format!("HTTP client for {}", provider),
        hint: format!("Rebuild multi-reasoner with a working TLS backend ({}).", e),
    })
}

/// Send a JSON POST and return the raw body of a 2xx response
fn post_json(
    request: reqwest::blocking::RequestBuilder,
    body: &Value,
    timeout: Duration,
    provider: &str,
) -> Result<String, BackendFailure> {
    let map_err = |e: reqwest::Error| {
        if e.is_timeout() {
            BackendFailure::Timeout { secs: timeout.as_secs() }
        } else {
            BackendFailure::Backend(format!("{} request failed: {}", provider, e))
        }
    };

    let resp = request.timeout(timeout).json(body).send().map_err(map_err)?;
    let status = resp.status();
    let text = resp.text().map_err(map_err)?;

    if !status.is_success() {
        return Err(BackendFailure::Backend(format!(
            "{} API error: HTTP {}: {}",
            provider,
            status.as_u16(),
            upstream_message(&text)
        )));
    }
    Ok(text)
}

/// Pull the provider's own error message out of an error body
pub fn upstream_message(body: &str) -> String {
    if let Ok(v) = serde_json::from_str::<Value>(body) {
        let found = v
            .pointer("/error/message")
            .or_else(|| v.get("error"))
            .or_else(|| v.get("message"))
            .or_else(|| v.get("detail"));
        match found {
            Some(Value::String(s)) if !s.is_empty() => return s.clone(),
            Some(other) if !other.is_null() && !other.is_string() => return other.to_string(),
            _ => {}
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "empty response body".to_string();
    }
    trimmed.chars().take(UPSTREAM_SNIPPET_CHARS).collect()
}

// ============================================================================
// GEMINI
// ============================================================================

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
    #[serde(rename = "promptFeedback")]
    prompt_feedback: Option<GeminiFeedback>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    parts: Option<Vec<GeminiPart>>,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    text: Option<String>,
    #[serde(default)]
    thought: bool,
}

#[derive(Debug, Deserialize)]
struct GeminiFeedback {
    #[serde(rename = "blockReason")]
    block_reason: Option<String>,
}

pub fn gemini_thinking_budget(depth: Depth) -> u32 {
    match depth {
        Depth::Low => 1024,
        Depth::Medium => 8192,
        Depth::High => 24576,
    }
}

pub fn gemini_body(prompt: &str, depth: Depth) -> Value {
    json!({
        "contents": [
            {"role": "user", "parts": [{"text": prompt}]}
        ],
        "generationConfig": {
            "temperature": 1.0,
            "maxOutputTokens": GEMINI_MAX_OUTPUT_TOKENS,
            "thinkingConfig": {"thinkingBudget": gemini_thinking_budget(depth)}
        }
    })
}

/// Answer text from a generateContent body; thought parts are skipped
pub fn parse_gemini(body: &str) -> Result<String, BackendFailure> {
    let parsed: GeminiResponse = serde_json::from_str(body)
        .map_err(|e| BackendFailure::Malformed(format!("Gemini response is not valid JSON: {}", e)))?;

    let text = parsed
        .candidates
        .unwrap_or_default()
        .into_iter()
        .flat_map(|c| c.content.and_then(|content| content.parts).unwrap_or_default())
        .filter(|p| !p.thought)
        .filter_map(|p| p.text)
        .collect::<Vec<_>>()
        .join("");

    if text.trim().is_empty() {
        if let Some(reason) = parsed.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(BackendFailure::Backend(format!("Gemini blocked the prompt: {}", reason)));
        }
        return Err(BackendFailure::Malformed("Gemini returned empty response".to_string()));
    }
    Ok(text)
}

pub struct GeminiBackend {
    settings: ProviderSettings,
    client: Result<Client, String>,
}

impl GeminiBackend {
    pub fn new(settings: ProviderSettings) -> Self {
        Self::with_client(settings, build_client())
    }

    pub fn with_client(settings: ProviderSettings, client: Result<Client, String>) -> Self {
        Self { settings, client }
    }
}

impl Backend for GeminiBackend {
    fn id(&self) -> BackendId {
        BackendId::Gemini
    }

    fn family(&self) -> BackendFamily {
        BackendFamily::Api
    }

    fn preflight(&self) -> Result<(), BackendFailure> {
        api_key(&self.settings)?;
        client_or_missing(&self.client, "Gemini").map(|_| ())
    }

    fn call(&self, prompt: &str, depth: Depth, timeout: Duration) -> Result<String, BackendFailure> {
        let key = api_key(&self.settings)?;
        let client = client_or_missing(&self.client, "Gemini")?;
        let url = format!(
            "{}/models/{}:generateContent",
            self.settings.base_url.trim_end_matches('/'),
            self.settings.model
        );
        log::debug!("Gemini: model={}, thinking_budget={}", self.settings.model, gemini_thinking_budget(depth));

        let request = client.post(&url).header("x-goog-api-key", key);
        let body = post_json(request, &gemini_body(prompt, depth), timeout, "Gemini")?;
        parse_gemini(&body)
    }
}

// ============================================================================
// CHAT COMPLETIONS (Grok, Mistral)
// ============================================================================

/// Provider-specific knobs on top of the shared chat-completions shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatFlavor {
    Grok,
    Mistral,
}

impl ChatFlavor {
    fn provider(self) -> &'static str {
        match self {
            ChatFlavor::Grok => "Grok",
            ChatFlavor::Mistral => "Mistral",
        }
    }

    fn backend_id(self) -> BackendId {
        match self {
            ChatFlavor::Grok => BackendId::Grok,
            ChatFlavor::Mistral => BackendId::Mistral,
        }
    }
}

pub fn mistral_max_tokens(depth: Depth) -> u32 {
    match depth {
        Depth::Low => 4096,
        Depth::Medium => 8192,
        Depth::High => 16384,
    }
}

/// xAI only accepts low|high, and only on the grok-3-mini family
pub fn grok_reasoning_effort(depth: Depth) -> &'static str {
    match depth {
        Depth::Low | Depth::Medium => "low",
        Depth::High => "high",
    }
}

pub fn chat_body(flavor: ChatFlavor, model: &str, prompt: &str, depth: Depth) -> Value {
    let mut body = json!({
        "model": model,
        "messages": [
            {"role": "user", "content": prompt}
        ]
    });
    match flavor {
        ChatFlavor::Grok => {
            if model.starts_with("grok-3-mini") {
                body["reasoning_effort"] = json!(grok_reasoning_effort(depth));
            }
        }
        ChatFlavor::Mistral => {
            body["max_tokens"] = json!(mistral_max_tokens(depth));
        }
    }
    body
}

/// Answer text from a chat-completions body.
/// Content may be a plain string or an array of typed chunks (only `text` kept).
pub fn parse_chat(body: &str, provider: &str) -> Result<String, BackendFailure> {
    let v: Value = serde_json::from_str(body)
        .map_err(|e| BackendFailure::Malformed(format!("{} response is not valid JSON: {}", provider, e)))?;

    let content = v
        .pointer("/choices/0/message/content")
        .ok_or_else(|| BackendFailure::Malformed(format!("{} response has no message content", provider)))?;

    let text = match content {
        Value::String(s) => s.clone(),
        Value::Array(chunks) => chunks
            .iter()
            .filter(|c| c.get("type").and_then(Value::as_str) == Some("text"))
            .filter_map(|c| c.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join(""),
        _ => String::new(),
    };

    if text.trim().is_empty() {
        return Err(BackendFailure::Malformed(format!("{} returned empty response", provider)));
    }
    Ok(text.trim().to_string())
}

pub struct ChatBackend {
    flavor: ChatFlavor,
    settings: ProviderSettings,
    client: Result<Client, String>,
}

impl ChatBackend {
    pub fn new(flavor: ChatFlavor, settings: ProviderSettings) -> Self {
        Self::with_client(flavor, settings, build_client())
    }

    pub fn with_client(flavor: ChatFlavor, settings: ProviderSettings, client: Result<Client, String>) -> Self {
        Self { flavor, settings, client }
    }
}

impl Backend for ChatBackend {
    fn id(&self) -> BackendId {
        self.flavor.backend_id()
    }

    fn family(&self) -> BackendFamily {
        BackendFamily::Api
    }

    fn preflight(&self) -> Result<(), BackendFailure> {
        api_key(&self.settings)?;
        client_or_missing(&self.client, self.flavor.provider()).map(|_| ())
    }

    fn call(&self, prompt: &str, depth: Depth, timeout: Duration) -> Result<String, BackendFailure> {
        let provider = self.flavor.provider();
        let key = api_key(&self.settings)?;
        let client = client_or_missing(&self.client, provider)?;
        let url = format!("{}/chat/completions", self.settings.base_url.trim_end_matches('/'));
        log::debug!("{}: model={}, depth={}", provider, self.settings.model, depth);

        let body = chat_body(self.flavor, &self.settings.model, prompt, depth);
        let raw = post_json(client.post(&url).bearer_auth(key), &body, timeout, provider)?;
        parse_chat(&raw, provider)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Status;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::time::Instant;

    fn settings(base_url: &str, key_var: &str) -> ProviderSettings {
        ProviderSettings {
            base_url: base_url.to_string(),
            model: "test-model".to_string(),
            key_vars: vec![key_var.to_string()],
        }
    }

    fn direct_client() -> Result<Client, String> {
        Client::builder().no_proxy().build().map_err(|e| e.to_string())
    }

    /// Read one HTTP request (headers + content-length body)
    fn read_request(stream: &mut std::net::TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = stream.read(&mut chunk).unwrap_or(0);
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf).to_string();
            if let Some(split) = text.find("\r\n\r\n") {
                let len = text[..split]
                    .lines()
                    .find_map(|l| {
                        let lower = l.to_ascii_lowercase();
                        lower.strip_prefix("content-length:").map(|v| v.trim().parse::<usize>().unwrap_or(0))
                    })
                    .unwrap_or(0);
                if buf.len() >= split + 4 + len {
                    return text;
                }
            }
        }
        String::from_utf8_lossy(&buf).to_string()
    }

    /// One-shot HTTP stub; returns base URL and a handle yielding the captured request
    fn stub(status_line: &'static str, body: &'static str) -> (String, std::thread::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let request = read_request(&mut stream);
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            let _ = stream.write_all(response.as_bytes());
            request
        });
        (format!("http://{}", addr), handle)
    }

    #[test]
    fn missing_key_is_auth_missing_before_anything_else() {
        let backend = GeminiBackend::with_client(
            settings("http://127.0.0.1:9", "MULTI_REASONER_TEST_NEVER_SET_KEY"),
            Err("no tls".to_string()),
        );
        let err = backend.call("p", Depth::Low, Duration::from_secs(1)).unwrap_err();
        assert_eq!(err, BackendFailure::AuthMissing { var: "MULTI_REASONER_TEST_NEVER_SET_KEY".to_string() });
    }

    #[test]
    fn broken_client_is_dependency_missing() {
        std::env::set_var("MULTI_REASONER_TEST_KEY_DEP", "k");
        let backend = ChatBackend::with_client(
            ChatFlavor::Mistral,
            settings("http://127.0.0.1:9", "MULTI_REASONER_TEST_KEY_DEP"),
            Err("no tls".to_string()),
        );
        let result = backend.invoke("p", Depth::Low, Duration::from_secs(1));
        assert_eq!(result.status, Status::DependencyMissing);
        assert!(result.remediation.is_some());
    }

    #[test]
    fn thinking_budgets_follow_depth() {
        assert_eq!(gemini_thinking_budget(Depth::Low), 1024);
        assert_eq!(gemini_thinking_budget(Depth::Medium), 8192);
        assert_eq!(gemini_thinking_budget(Depth::High), 24576);
        let body = gemini_body("hi", Depth::Medium);
        assert_eq!(body["generationConfig"]["thinkingConfig"]["thinkingBudget"], 8192);
        assert_eq!(body["contents"][0]["parts"][0]["text"], "hi");
    }

    #[test]
    fn chat_bodies_carry_provider_budgets() {
        let grok = chat_body(ChatFlavor::Grok, "grok-3-mini", "q", Depth::High);
        assert_eq!(grok["reasoning_effort"], "high");
        let grok4 = chat_body(ChatFlavor::Grok, "grok-4", "q", Depth::High);
        assert!(grok4.get("reasoning_effort").is_none());
        let mistral = chat_body(ChatFlavor::Mistral, "magistral-medium-latest", "q", Depth::Low);
        assert_eq!(mistral["max_tokens"], 4096);
        assert_eq!(mistral["messages"][0]["content"], "q");
    }

    #[test]
    fn gemini_parsing_skips_thoughts() {
        let body = r#"{"candidates":[{"content":{"parts":[{"text":"secret musing","thought":true},{"text":"Final "},{"text":"answer."}]}}]}"#;
        assert_eq!(parse_gemini(body).unwrap(), "Final answer.");
        let blocked = r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#;
        assert_eq!(parse_gemini(blocked).unwrap_err().status(), Status::BackendError);
        assert_eq!(parse_gemini(r#"{"candidates":[]}"#).unwrap_err().status(), Status::MalformedOutput);
        assert_eq!(parse_gemini("<html>").unwrap_err().status(), Status::MalformedOutput);
    }

    #[test]
    fn chat_parsing_handles_string_and_chunks() {
        let plain = r#"{"choices":[{"message":{"content":"  Go with option B.  "}}]}"#;
        assert_eq!(parse_chat(plain, "Grok").unwrap(), "Go with option B.");
        let chunked = r#"{"choices":[{"message":{"content":[{"type":"thinking","thinking":[{"type":"text","text":"hmm"}]},{"type":"text","text":"Option A."}]}}]}"#;
        assert_eq!(parse_chat(chunked, "Mistral").unwrap(), "Option A.");
        assert_eq!(parse_chat(r#"{"choices":[]}"#, "Grok").unwrap_err().status(), Status::MalformedOutput);
        assert_eq!(
            parse_chat(r#"{"choices":[{"message":{"content":""}}]}"#, "Grok").unwrap_err().status(),
            Status::MalformedOutput
        );
    }

    #[test]
    fn upstream_messages_are_preserved() {
        assert_eq!(upstream_message(r#"{"error":{"message":"Incorrect API key"}}"#), "Incorrect API key");
        assert_eq!(upstream_message(r#"{"error":"model not found"}"#), "model not found");
        assert_eq!(upstream_message(r#"{"message":"Unauthorized"}"#), "Unauthorized");
        assert_eq!(upstream_message("Bad Gateway"), "Bad Gateway");
        assert_eq!(upstream_message(""), "empty response body");
    }

    #[test]
    fn successful_chat_round_trip_sends_bearer_key() {
        std::env::set_var("MULTI_REASONER_TEST_KEY_OK", "sk-test-123");
        let (base, server) = stub("200 OK", r#"{"choices":[{"message":{"content":"Buy it."}}]}"#);
        let backend = ChatBackend::with_client(
            ChatFlavor::Grok,
            settings(&base, "MULTI_REASONER_TEST_KEY_OK"),
            direct_client(),
        );
        let out = backend.call("Evaluate build vs buy", Depth::Low, Duration::from_secs(10)).unwrap();
        assert_eq!(out, "Buy it.");
        let request = server.join().unwrap();
        assert!(request.starts_with("POST /chat/completions"));
        assert!(request.to_ascii_lowercase().contains("authorization: bearer sk-test-123"));
        assert!(request.contains("Evaluate build vs buy"));
    }

    #[test]
    fn gemini_sends_key_header() {
        std::env::set_var("MULTI_REASONER_TEST_KEY_GEM", "g-key");
        let (base, server) = stub("200 OK", r#"{"candidates":[{"content":{"parts":[{"text":"Yes."}]}}]}"#);
        let backend = GeminiBackend::with_client(settings(&base, "MULTI_REASONER_TEST_KEY_GEM"), direct_client());
        assert_eq!(backend.call("q", Depth::High, Duration::from_secs(10)).unwrap(), "Yes.");
        let request = server.join().unwrap();
        assert!(request.starts_with("POST /models/test-model:generateContent"));
        assert!(request.to_ascii_lowercase().contains("x-goog-api-key: g-key"));
    }

    #[test]
    fn api_errors_become_backend_error_with_upstream_detail() {
        std::env::set_var("MULTI_REASONER_TEST_KEY_ERR", "bad");
        let (base, server) = stub("401 Unauthorized", r#"{"error":{"message":"Incorrect API key provided"}}"#);
        let backend = ChatBackend::with_client(
            ChatFlavor::Mistral,
            settings(&base, "MULTI_REASONER_TEST_KEY_ERR"),
            direct_client(),
        );
        let result = backend.invoke("q", Depth::Low, Duration::from_secs(10));
        server.join().unwrap();
        assert_eq!(result.status, Status::BackendError);
        assert_eq!(
            result.error_detail.as_deref(),
            Some("Mistral API error: HTTP 401: Incorrect API key provided")
        );
    }

    #[test]
    fn silent_server_times_out() {
        std::env::set_var("MULTI_REASONER_TEST_KEY_SLOW", "k");
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let holder = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            std::thread::sleep(Duration::from_secs(4));
            drop(stream);
        });

        let backend = GeminiBackend::with_client(settings(&base, "MULTI_REASONER_TEST_KEY_SLOW"), direct_client());
        let started = Instant::now();
        let err = backend.call("q", Depth::Low, Duration::from_secs(1)).unwrap_err();
        assert_eq!(err, BackendFailure::Timeout { secs: 1 });
        assert!(started.elapsed() < Duration::from_secs(3));
        holder.join().unwrap();
    }
}
