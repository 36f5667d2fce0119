// Multi-Reasoner Bridge - Reasoning Requests
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// Typed view of a reasoning tool call: input text, depth, mode, files.
// Parsing failures here are the ONLY errors surfaced as protocol errors.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Malformed tool arguments (wrong types, missing fields, bad enum values)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArgError {
    #[error("missing required argument '{0}'")]
    Missing(&'static str),

    #[error("argument '{field}' must be {expected}")]
    WrongType { field: &'static str, expected: &'static str },

    #[error("argument '{field}' has invalid value '{value}' (expected one of: {allowed})")]
    InvalidValue { field: &'static str, value: String, allowed: &'static str },

    #[error("arguments must be a JSON object")]
    NotAnObject,
}

/// Reasoning-effort tier forwarded to the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Depth {
    Low,
    Medium,
    High,
}

impl Depth {
    pub const ALL: [Depth; 3] = [Depth::Low, Depth::Medium, Depth::High];
    pub const ALLOWED: &'static str = "low, medium, high";

    pub fn as_str(self) -> &'static str {
        match self {
            Depth::Low => "low",
            Depth::Medium => "medium",
            Depth::High => "high",
        }
    }
}

impl Default for Depth {
    fn default() -> Self {
        Depth::High
    }
}

impl fmt::Display for Depth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Depth {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Depth::Low),
            "medium" => Ok(Depth::Medium),
            "high" => Ok(Depth::High),
            other => Err(other.to_string()),
        }
    }
}

/// Output-formatting instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Memo,
    Bullets,
    Questions,
    Quick,
}

impl Mode {
    pub const ALL: [Mode; 4] = [Mode::Memo, Mode::Bullets, Mode::Questions, Mode::Quick];
    pub const ALLOWED: &'static str = "memo, bullets, questions, quick";

    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Memo => "memo",
            Mode::Bullets => "bullets",
            Mode::Questions => "questions",
            Mode::Quick => "quick",
        }
    }
}

impl Default for Mode {
    fn default() -> Self {
        Mode::Memo
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memo" => Ok(Mode::Memo),
            "bullets" => Ok(Mode::Bullets),
            "questions" => Ok(Mode::Questions),
            "quick" => Ok(Mode::Quick),
            other => Err(other.to_string()),
        }
    }
}

/// One reasoning call. Immutable once built; lives for a single tool invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReasoningRequest {
    input: String,
    depth: Depth,
    mode: Mode,
    files: Vec<String>,
}

impl ReasoningRequest {
    pub fn new(input: impl Into<String>, depth: Depth, mode: Mode, files: Vec<String>) -> Self {
        Self { input: input.into(), depth, mode, files }
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn depth(&self) -> Depth {
        self.depth
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn files(&self) -> &[String] {
        &self.files
    }

    /// Parse MCP `tools/call` arguments.
    /// `reasoning_input` is required; `depth`, `mode`, `files` are optional.
    /// A JSON null for an optional field counts as absent.
    pub fn from_args(args: &Value) -> Result<Self, ArgError> {
        let obj = match args {
            Value::Object(map) => map,
            Value::Null => return Err(ArgError::Missing("reasoning_input")),
            _ => return Err(ArgError::NotAnObject),
        };

        let input = match obj.get("reasoning_input") {
            None | Some(Value::Null) => return Err(ArgError::Missing("reasoning_input")),
            Some(Value::String(s)) => s.clone(),
            Some(_) => {
                return Err(ArgError::WrongType { field: "reasoning_input", expected: "a string" })
            }
        };

        let depth = match obj.get("depth") {
            None | Some(Value::Null) => Depth::default(),
            Some(Value::String(s)) => s.parse().map_err(|value| ArgError::InvalidValue {
                field: "depth",
                value,
                allowed: Depth::ALLOWED,
            })?,
            Some(_) => return Err(ArgError::WrongType { field: "depth", expected: "a string" }),
        };

        let mode = match obj.get("mode") {
            None | Some(Value::Null) => Mode::default(),
            Some(Value::String(s)) => s.parse().map_err(|value| ArgError::InvalidValue {
                field: "mode",
                value,
                allowed: Mode::ALLOWED,
            })?,
            Some(_) => return Err(ArgError::WrongType { field: "mode", expected: "a string" }),
        };

        let files = match obj.get("files") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .map(|v| {
                    v.as_str().map(str::to_string).ok_or(ArgError::WrongType {
                        field: "files",
                        expected: "an array of strings",
                    })
                })
                .collect::<Result<Vec<_>, _>>()?,
            Some(_) => {
                return Err(ArgError::WrongType { field: "files", expected: "an array of strings" })
            }
        };

        Ok(Self { input, depth, mode, files })
    }
}

// ============================================================================
// TESTS
// ============================================================================
