// Multi-Reasoner Bridge - Backend Contract
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// One capability interface for every reasoning backend, subprocess or HTTP.
// Expected failures are DATA: every adapter outcome becomes a BackendResult
// with a status from one taxonomy. Nothing here panics or propagates.

use crate::prompt::BackendFamily;
use crate::request::Depth;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Backend identifiers in canonical (display) order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendId {
    Chatgpt,
    Gemini,
    Grok,
    Mistral,
}

impl BackendId {
    pub const ALL: [BackendId; 4] = [BackendId::Chatgpt, BackendId::Gemini, BackendId::Grok, BackendId::Mistral];

    pub fn as_str(self) -> &'static str {
        match self {
            BackendId::Chatgpt => "chatgpt",
            BackendId::Gemini => "gemini",
            BackendId::Grok => "grok",
            BackendId::Mistral => "mistral",
        }
    }
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BackendId::ALL
            .into_iter()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| format!("unknown backend '{}'", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Ok,
    Timeout,
    AuthMissing,
    DependencyMissing,
    BackendError,
    MalformedOutput,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Ok => "ok",
            Status::Timeout => "timeout",
            Status::AuthMissing => "auth_missing",
            Status::DependencyMissing => "dependency_missing",
            Status::BackendError => "backend_error",
            Status::MalformedOutput => "malformed_output",
        }
    }
}

/// Why an adapter call produced no answer
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendFailure {
    #[error("timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("{var} is not set")]
    AuthMissing { var: String },

    #[error("{what} is not available")]
    DependencyMissing { what: String, hint: String },

    #[error("{0}")]
    Backend(String),

    #[error("{0}")]
    Malformed(String),
}

impl BackendFailure {
    pub fn status(&self) -> Status {
        match self {
            BackendFailure::Timeout { .. } => Status::Timeout,
            BackendFailure::AuthMissing { .. } => Status::AuthMissing,
            BackendFailure::DependencyMissing { .. } => Status::DependencyMissing,
            BackendFailure::Backend(_) => Status::BackendError,
            BackendFailure::Malformed(_) => Status::MalformedOutput,
        }
    }

    /// What the user can do about it, when anything
    pub fn remediation(&self) -> Option<String> {
        match self {
            BackendFailure::Timeout { .. } => {
                Some("Retry with depth=low or depth=medium for a faster answer.".to_string())
            }
            BackendFailure::AuthMissing { var } => Some(format!(
                "Set {} in the environment that launches the MCP server, then retry.",
                var
            )),
            BackendFailure::DependencyMissing { hint, .. } => Some(hint.clone()),
            BackendFailure::Backend(_) | BackendFailure::Malformed(_) => None,
        }
    }
}

/// One adapter call in flight. Owned by a single dispatcher call, never shared.
#[derive(Debug)]
pub struct BackendInvocation<'a> {
    pub backend_id: BackendId,
    pub prompt: &'a str,
    pub timeout_seconds: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    clock: Instant,
}

impl<'a> BackendInvocation<'a> {
    pub fn start(backend_id: BackendId, prompt: &'a str, timeout: Duration) -> Self {
        Self {
            backend_id,
            prompt,
            timeout_seconds: timeout.as_secs(),
            started_at: Utc::now(),
            finished_at: None,
            clock: Instant::now(),
        }
    }

    pub fn finish(&mut self) -> Duration {
        self.finished_at = Some(Utc::now());
        self.clock.elapsed()
    }
}

/// Outcome of exactly one adapter invocation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackendResult {
    pub backend_id: BackendId,
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
    pub elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl BackendResult {
    pub fn from_outcome(
        backend_id: BackendId,
        outcome: Result<String, BackendFailure>,
        elapsed: Duration,
    ) -> Self {
        let elapsed_ms = elapsed.as_millis() as u64;
        match outcome {
            Ok(text) => Self {
                backend_id,
                status: Status::Ok,
                text: Some(text),
                error_detail: None,
                remediation: None,
                elapsed_ms,
                started_at: None,
                finished_at: None,
            },
            Err(failure) => Self {
                backend_id,
                status: failure.status(),
                text: None,
                error_detail: Some(failure.to_string()),
                remediation: failure.remediation(),
                elapsed_ms,
                started_at: None,
                finished_at: None,
            },
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }

    /// One-paragraph human-readable failure description
    pub fn failure_summary(&self) -> String {
        let mut out = format!(
            "{} failed [{}]: {}",
            self.backend_id,
            self.status.as_str(),
            self.error_detail.as_deref().unwrap_or("no detail")
        );
        if self.status == Status::Timeout {
            out.push_str(&format!(" (elapsed {:.1}s)", self.elapsed_ms as f64 / 1000.0));
        }
        if let Some(fix) = &self.remediation {
            out.push_str(&format!("\nFix: {}", fix));
        }
        out
    }
}

/// Common capability interface. Implementations hold no mutable shared state,
/// so one instance may serve concurrent calls.
pub trait Backend: Send + Sync {
    fn id(&self) -> BackendId;

    fn family(&self) -> BackendFamily;

    /// Cheap environment check (binary on PATH, key present) without calling out
    fn preflight(&self) -> Result<(), BackendFailure>;

    /// Run the prompt against the backend within `timeout`
    fn call(&self, prompt: &str, depth: Depth, timeout: Duration) -> Result<String, BackendFailure>;

    /// `call` wrapped into a BackendResult with timing
    fn invoke(&self, prompt: &str, depth: Depth, timeout: Duration) -> BackendResult {
        let mut invocation = BackendInvocation::start(self.id(), prompt, timeout);
        log::info!(
            "Calling {}: depth={}, timeout={}s, prompt={} chars",
            invocation.backend_id,
            depth,
            invocation.timeout_seconds,
            invocation.prompt.len()
        );
        let outcome = self.call(invocation.prompt, depth, timeout);
        let elapsed = invocation.finish();
        let mut result = BackendResult::from_outcome(invocation.backend_id, outcome, elapsed);
        result.started_at = Some(invocation.started_at);
        result.finished_at = invocation.finished_at;
        match &result.text {
            Some(text) => log::info!(
                "{} returned {} chars in {}ms",
                result.backend_id, text.len(), result.elapsed_ms
            ),
            None => log::warn!(
                "{} {} after {}ms: {}",
                result.backend_id,
                result.status.as_str(),
                result.elapsed_ms,
                result.error_detail.as_deref().unwrap_or("")
            ),
        }
        result
    }
}

// ============================================================================
// TESTS
// ============================================================================
