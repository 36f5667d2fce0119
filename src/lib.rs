// Multi-Reasoner Bridge - Library Root
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// All modules exported here for use by the binary and tests.

pub mod paths;
pub mod config;
pub mod request;
pub mod validate;
pub mod gate;
pub mod prompt;
pub mod mcp;

// ============================================================================
// BACKENDS - one trait, two transports
// ============================================================================

/// Backend trait, result taxonomy, invocation timing
pub mod backend;

/// CLI subprocess adapter (codex exec)
pub mod codex;

/// HTTP adapters: Gemini, Grok, Mistral
pub mod providers;

/// Single-backend routing and consensus fan-out
pub mod dispatch;
