// Multi-Reasoner Bridge - Path Rules
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// Compiled rule tables for file attachments:
// - Sensitive-path denylist (credential stores, secret files, own config)
// - Text-like extension allow-list
// - Extensionless conventional filename allow-list
//
// Rules are compiled Rust, not configurable by the caller.

use std::path::{Component, Path};

/// Path components that are sensitive on their own, compared case-insensitively
const BLOCKED_COMPONENTS: &[&str] = &[".ssh", ".gnupg", ".aws", ".netrc", ".docker", ".kube"];

/// Substrings that mark any component as sensitive: `.env.local`, `prod.env.yaml`,
/// `backup_id_rsa.txt`, `aws-credentials.json`, ...
const BLOCKED_COMPONENT_FRAGMENTS: &[&str] = &[
    ".env",
    "id_rsa",
    "id_ed25519",
    "id_ecdsa",
    "id_dsa",
    "credentials",
    "secrets",
];

/// Adjacent component pairs
const BLOCKED_SEQUENCES: &[(&str, &str)] = &[(".git", "config"), (".claude", "settings.json")];

/// Absolute prefixes, matched on whole components
const BLOCKED_PREFIXES: &[&str] = &[
    "/etc/ssh",
    "/etc/ssl/private",
    "/etc/shadow",
    "/etc/gshadow",
    "/etc/sudoers",
    "/proc",
    "/sys",
    "/dev",
];

pub const ALLOWED_EXTENSIONS: &[&str] = &[
    "md", "txt", "py", "js", "ts", "jsx", "tsx",
    "json", "yaml", "yml", "toml", "cfg", "ini",
    "html", "css", "csv", "xml", "rst", "org",
    "sh", "bash", "zsh", "fish",
    "go", "rs", "rb", "php", "java", "kt", "swift",
    "c", "h", "cpp", "hpp",
    "sql", "graphql", "proto",
    "tf", "hcl",
];

pub const ALLOWED_BASENAMES: &[&str] = &[
    "README", "LICENSE", "LICENCE", "Makefile", "Dockerfile",
    "Vagrantfile", "Gemfile", "Rakefile", "Procfile",
    "CHANGELOG", "CONTRIBUTING", "AUTHORS",
];

/// Why a path is sensitive, or None if it is not.
/// `extra` holds additional absolute directories to deny (the tool's own config dir).
pub fn sensitive_match(path: &Path, extra: &[&Path]) -> Option<String> {
    for prefix in BLOCKED_PREFIXES {
        if path.starts_with(prefix) {
            return Some(format!("inside protected system location '{}'", prefix));
        }
    }
    for dir in extra {
        if path.starts_with(dir) {
            return Some(format!("inside the bridge's own configuration directory '{}'", dir.display()));
        }
    }

    let names: Vec<String> = path
        .components()
        .filter_map(|c| match c {
            Component::Normal(os) => Some(os.to_string_lossy().to_lowercase()),
            _ => None,
        })
        .collect();

    for name in &names {
        if BLOCKED_COMPONENTS.contains(&name.as_str()) {
            return Some(format!("matches sensitive pattern '{}'", name));
        }
        if let Some(frag) = BLOCKED_COMPONENT_FRAGMENTS.iter().find(|f| name.contains(*f)) {
            return Some(format!("matches sensitive pattern '{}'", frag));
        }
    }

    for pair in names.windows(2) {
        if let Some((a, b)) = BLOCKED_SEQUENCES
            .iter()
            .find(|(a, b)| pair[0] == *a && pair[1] == *b)
        {
            return Some(format!("matches sensitive pattern '{}/{}'", a, b));
        }
    }

    None
}

/// True when the file is text-like by extension or a known extensionless name.
/// Extensions compare case-insensitively; basenames compare exactly.
pub fn is_allowed_kind(path: &Path) -> bool {
    let basename = match path.file_name() {
        Some(n) => n.to_string_lossy(),
        None => return false,
    };
    if ALLOWED_BASENAMES.contains(&basename.as_ref()) {
        return true;
    }
    match path.extension() {
        Some(ext) => {
            let ext = ext.to_string_lossy().to_lowercase();
            ALLOWED_EXTENSIONS.contains(&ext.as_str())
        }
        None => false,
    }
}

// ============================================================================
// TESTS
// ============================================================================
