// Multi-Reasoner Bridge - Dispatcher
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// Routes one tool call to its backend(s):
//   chatgpt/gemini/grok/mistral -> Gate -> Assemble -> one adapter
//   consensus                   -> Gate + Assemble once -> all adapters concurrently
//   codex_review                -> static redirect, no subprocess, no network
// Backend failures are results, never protocol errors.

use crate::backend::{Backend, BackendFailure, BackendId, BackendResult, Status};
use crate::codex::CodexBackend;
use crate::config::BridgeConfig;
use crate::gate::{GateOutcome, PathGate, Rejection};
use crate::prompt::{self, BackendFamily};
use crate::providers::{ChatBackend, ChatFlavor, GeminiBackend};
use crate::request::{ArgError, ReasoningRequest};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub const CODEX_REVIEW_REDIRECT: &str = "## Use the /codex skill instead

For code reviews, use the `/codex` skill which runs Codex via Bash.

**Why?** This MCP tool has timeout limitations. The /codex skill:
- Runs via Bash with no timeout constraints
- Can run in background for large reviews
- Supports all Codex review features

**Examples:**
```bash
codex review \"Review my uncommitted changes\"
codex review \"Review the last 3 commits\"
```";

/// Every tool the bridge exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tool {
    Chatgpt,
    Gemini,
    Grok,
    Mistral,
    Consensus,
    CodexReview,
}

impl Tool {
    pub const ALL: [Tool; 6] = [
        Tool::Chatgpt,
        Tool::Gemini,
        Tool::Grok,
        Tool::Mistral,
        Tool::Consensus,
        Tool::CodexReview,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Tool::Chatgpt => "chatgpt",
            Tool::Gemini => "gemini",
            Tool::Grok => "grok",
            Tool::Mistral => "mistral",
            Tool::Consensus => "consensus",
            Tool::CodexReview => "codex_review",
        }
    }

    /// The single backend a tool targets, if it targets exactly one
    pub fn backend(self) -> Option<BackendId> {
        match self {
            Tool::Chatgpt => Some(BackendId::Chatgpt),
            Tool::Gemini => Some(BackendId::Gemini),
            Tool::Grok => Some(BackendId::Grok),
            Tool::Mistral => Some(BackendId::Mistral),
            Tool::Consensus | Tool::CodexReview => None,
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tool {
    type Err = CallError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Tool::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| CallError::UnknownTool(s.to_string()))
    }
}

/// A tool call the protocol layer must reject outright
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError {
    #[error("unknown tool '{0}'")]
    UnknownTool(String),

    #[error(transparent)]
    Args(#[from] ArgError),
}

/// Consensus outcome: one result per backend, keyed in canonical order
#[derive(Debug, Clone, Serialize)]
pub struct AggregatedResponse {
    pub per_backend: BTreeMap<BackendId, BackendResult>,
    pub combined_text: String,
}

impl AggregatedResponse {
    pub fn from_results(results: Vec<BackendResult>) -> Self {
        let per_backend: BTreeMap<BackendId, BackendResult> =
            results.into_iter().map(|r| (r.backend_id, r)).collect();

        if per_backend.is_empty() {
            return Self {
                per_backend,
                combined_text: "No reasoning backends are configured.".to_string(),
            };
        }

        let sections: Vec<String> = per_backend
            .values()
            .map(|r| {
                let heading = r.backend_id.as_str().to_uppercase();
                match (&r.status, &r.text) {
                    (Status::Ok, Some(text)) => format!("## {}\n\n{}", heading, text),
                    _ => format!("## {}\n\n*No answer.* {}", heading, r.failure_summary()),
                }
            })
            .collect();

        let answered = per_backend.values().filter(|r| r.is_ok()).count();
        let combined_text = format!(
            "{}\n\n---\n\n*{}/{} backends answered.*",
            sections.join("\n\n---\n\n"),
            answered,
            per_backend.len()
        );
        Self { per_backend, combined_text }
    }

    pub fn any_ok(&self) -> bool {
        self.per_backend.values().any(BackendResult::is_ok)
    }
}

/// What a tool call produced
#[derive(Debug, Clone)]
pub enum Reply {
    Single { result: BackendResult, skipped: Vec<Rejection> },
    Consensus { aggregated: AggregatedResponse, skipped: Vec<Rejection> },
    Static(&'static str),
}

impl Reply {
    /// True when no backend produced an answer
    pub fn is_error(&self) -> bool {
        match self {
            Reply::Single { result, .. } => !result.is_ok(),
            Reply::Consensus { aggregated, .. } => !aggregated.any_ok(),
            Reply::Static(_) => false,
        }
    }

    /// Text shown to the host assistant
    pub fn render(&self) -> String {
        let (body, skipped) = match self {
            Reply::Static(text) => return text.to_string(),
            Reply::Single { result, skipped } => {
                let body = match &result.text {
                    Some(text) if result.is_ok() => text.clone(),
                    _ => format!("Error: {}", result.failure_summary()),
                };
                (body, skipped)
            }
            Reply::Consensus { aggregated, skipped } => (aggregated.combined_text.clone(), skipped),
        };
        if skipped.is_empty() {
            return body;
        }
        let notes: Vec<String> = skipped.iter().map(|r| r.to_string()).collect();
        format!("{}\n\n---\n*Skipped files: {}*", body, notes.join("; "))
    }

    /// Machine-readable form for structuredContent
    pub fn structured(&self) -> Value {
        match self {
            Reply::Static(_) => json!({ "status": "deprecated" }),
            Reply::Single { result, skipped } => json!({
                "per_backend": { result.backend_id.as_str(): result },
                "skipped_files": skipped,
            }),
            Reply::Consensus { aggregated, skipped } => json!({
                "per_backend": aggregated.per_backend,
                "skipped_files": skipped,
            }),
        }
    }
}

/// Stateless router. Holds only immutable, startup-time configuration.
pub struct Dispatcher {
    config: BridgeConfig,
    gate: PathGate,
    backends: Vec<Arc<dyn Backend>>,
}

impl Dispatcher {
    /// Dispatcher with every real backend registered
    pub fn new(config: BridgeConfig, gate: PathGate) -> Self {
        let backends: Vec<Arc<dyn Backend>> = vec![
            Arc::new(CodexBackend::new(config.codex.binary.clone())),
            Arc::new(GeminiBackend::new(config.gemini.clone())),
            Arc::new(ChatBackend::new(ChatFlavor::Grok, config.grok.clone())),
            Arc::new(ChatBackend::new(ChatFlavor::Mistral, config.mistral.clone())),
        ];
        Self::with_backends(config, gate, backends)
    }

    /// Dispatcher over an explicit backend set, kept in canonical order
    pub fn with_backends(config: BridgeConfig, gate: PathGate, mut backends: Vec<Arc<dyn Backend>>) -> Self {
        backends.sort_by_key(|b| b.id());
        Self { config, gate, backends }
    }

    pub fn backends(&self) -> &[Arc<dyn Backend>] {
        &self.backends
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Entry point for the protocol layer: resolve the tool, parse arguments, dispatch.
    /// codex_review ignores its arguments entirely.
    pub fn handle(&self, tool_name: &str, args: &Value) -> Result<Reply, CallError> {
        let tool: Tool = tool_name.parse()?;
        if tool == Tool::CodexReview {
            return Ok(Reply::Static(CODEX_REVIEW_REDIRECT));
        }
        let request = ReasoningRequest::from_args(args)?;
        Ok(self.dispatch(tool, &request))
    }

    pub fn dispatch(&self, tool: Tool, request: &ReasoningRequest) -> Reply {
        match (tool, tool.backend()) {
            (_, Some(id)) => self.single(id, request),
            (Tool::Consensus, None) => self.consensus(request),
            (_, None) => Reply::Static(CODEX_REVIEW_REDIRECT),
        }
    }

    fn single(&self, id: BackendId, request: &ReasoningRequest) -> Reply {
        let gated = self.gate.check(request.files());
        let timeout = self.config.timeout_for(request.depth());

        let result = match self.backends.iter().find(|b| b.id() == id) {
            Some(backend) => {
                let prompt = prompt::assemble(request, &gated, backend.family());
                backend.invoke(&prompt, request.depth(), timeout)
            }
            None => unregistered(id),
        };

        Reply::Single { result, skipped: gated.rejections }
    }

    fn consensus(&self, request: &ReasoningRequest) -> Reply {
        let gated = self.gate.check(request.files());
        let prompts = self.prompts_by_family(request, &gated);
        let timeout = self.config.timeout_for(request.depth());
        log::info!(
            "Consensus: {} backends, depth={}, mode={}",
            self.backends.len(),
            request.depth(),
            request.mode()
        );

        let results = fan_out(&self.backends, &prompts, request, timeout);
        let aggregated = AggregatedResponse::from_results(results);
        log::info!(
            "Consensus returned {} chars, {}/{} answered",
            aggregated.combined_text.len(),
            aggregated.per_backend.values().filter(|r| r.is_ok()).count(),
            aggregated.per_backend.len()
        );

        Reply::Consensus { aggregated, skipped: gated.rejections }
    }

    /// One assembled prompt per family in use; shared read-only by the workers
    fn prompts_by_family(&self, request: &ReasoningRequest, gated: &GateOutcome) -> HashMap<BackendFamily, String> {
        let mut prompts = HashMap::new();
        for backend in &self.backends {
            prompts
                .entry(backend.family())
                .or_insert_with(|| prompt::assemble(request, gated, backend.family()));
        }
        prompts
    }
}

/// Run every backend on its own thread and collect results in backend order.
/// Each adapter enforces its own deadline, so one slow backend never holds
/// back or cancels the others.
fn fan_out(
    backends: &[Arc<dyn Backend>],
    prompts: &HashMap<BackendFamily, String>,
    request: &ReasoningRequest,
    timeout: Duration,
) -> Vec<BackendResult> {
    std::thread::scope(|s| {
        let handles: Vec<_> = backends
            .iter()
            .map(|backend| {
                let prompt = prompts.get(&backend.family()).map(String::as_str).unwrap_or_default();
                let depth = request.depth();
                (backend.id(), s.spawn(move || backend.invoke(prompt, depth, timeout)))
            })
            .collect();

        handles
            .into_iter()
            .map(|(id, handle)| {
                handle.join().unwrap_or_else(|_| {
                    log::error!("{} adapter panicked", id);
                    BackendResult::from_outcome(
                        id,
                        Err(BackendFailure::Backend("adapter panicked".to_string())),
                        Duration::ZERO,
                    )
                })
            })
            .collect()
    })
}

fn unregistered(id: BackendId) -> BackendResult {
    BackendResult::from_outcome(
        id,
        Err(BackendFailure::DependencyMissing {
            what: format!("backend '{}'", id),
            hint: format!("Register a {} backend with the dispatcher.", id),
        }),
        Duration::ZERO,
    )
}

// ============================================================================
// TESTS
// ============================================================================
