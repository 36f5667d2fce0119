// Multi-Reasoner Bridge - Configuration
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// Process-wide settings read ONCE at startup from the environment.
// No config file is owned by the bridge. Credentials are NOT captured
// here: adapters re-read them per call so a key exported after start
// is picked up without a restart.

use crate::request::Depth;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_TIMEOUT_SECS: u64 = 180;
const MIN_TIMEOUT_SECS: u64 = 5;
const MAX_TIMEOUT_SECS: u64 = 1800;

/// Master bridge configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Wall-clock budget for a high-depth call; lower depths get a fraction
    pub timeout_secs: u64,
    pub codex: CodexSettings,
    pub gemini: ProviderSettings,
    pub grok: ProviderSettings,
    pub mistral: ProviderSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodexSettings {
    /// Executable name or absolute path
    pub binary: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    pub base_url: String,
    pub model: String,
    /// Environment variables checked in order for the API key
    pub key_vars: Vec<String>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            codex: CodexSettings { binary: "codex".to_string() },
            gemini: ProviderSettings {
                base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
                model: "gemini-2.5-flash".to_string(),
                key_vars: vec!["GEMINI_API_KEY".to_string(), "GOOGLE_API_KEY".to_string()],
            },
            grok: ProviderSettings {
                base_url: "https://api.x.ai/v1".to_string(),
                model: "grok-3-mini".to_string(),
                key_vars: vec!["XAI_API_KEY".to_string()],
            },
            mistral: ProviderSettings {
                base_url: "https://api.mistral.ai/v1".to_string(),
                model: "magistral-medium-latest".to_string(),
                key_vars: vec!["MISTRAL_API_KEY".to_string()],
            },
        }
    }
}

impl BridgeConfig {
    /// Load from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary lookup; unset or blank values keep defaults
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Self::default();

        if let Some(raw) = get("REASONER_TIMEOUT_SECS") {
            match raw.parse::<u64>() {
                Ok(secs) => config.timeout_secs = secs.clamp(MIN_TIMEOUT_SECS, MAX_TIMEOUT_SECS),
                Err(_) => log::warn!(
                    "Ignoring REASONER_TIMEOUT_SECS={:?}: not a number, using {}s",
                    raw, DEFAULT_TIMEOUT_SECS
                ),
            }
        }
        if let Some(bin) = get("CODEX_BIN") {
            config.codex.binary = bin;
        }

        let providers = [
            (&mut config.gemini, "GEMINI_MODEL", "GEMINI_BASE_URL"),
            (&mut config.grok, "GROK_MODEL", "XAI_BASE_URL"),
            (&mut config.mistral, "MISTRAL_MODEL", "MISTRAL_BASE_URL"),
        ];
        for (settings, model_var, url_var) in providers {
            if let Some(model) = get(model_var) {
                settings.model = model;
            }
            if let Some(url) = get(url_var) {
                settings.base_url = url.trim_end_matches('/').to_string();
            }
        }

        config
    }

    /// Override the base timeout (CLI flag); clamped like the env value
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs.clamp(MIN_TIMEOUT_SECS, MAX_TIMEOUT_SECS);
        self
    }

    /// Depth-derived wall-clock budget: low 50%, medium 75%, high 100%
    pub fn timeout_for(&self, depth: Depth) -> Duration {
        let percent = match depth {
            Depth::Low => 50,
            Depth::Medium => 75,
            Depth::High => 100,
        };
        Duration::from_secs((self.timeout_secs * percent / 100).max(1))
    }
}

// ============================================================================
// TESTS
// ============================================================================
