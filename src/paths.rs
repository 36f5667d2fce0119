// Multi-Reasoner Bridge - Path Resolution
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// Single source of truth for path handling: home expansion, lexical
// normalization, executable discovery on PATH, and the scratch working
// directory handed to CLI backends.
//
// SECURITY NOTE: the sensitive-path denylist lives in validate.rs.
// Everything here only *resolves* paths; nothing here decides access.

use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;
use tempfile::TempDir;

static HOME_CACHE: OnceLock<Option<PathBuf>> = OnceLock::new();

/// Directory name used for this tool's own configuration under ~/.config
pub const TOOL_DIR_NAME: &str = "multi-reasoner";

/// Current user's home directory, resolved once from $HOME.
/// None when HOME is unset or empty (e.g. stripped service environments).
pub fn actual_home() -> Option<&'static Path> {
    HOME_CACHE
        .get_or_init(|| {
            std::env::var_os("HOME")
                .filter(|h| !h.is_empty())
                .map(PathBuf::from)
        })
        .as_deref()
}

/// The tool's own configuration directory (<home>/.config/multi-reasoner).
/// Listed as sensitive so a caller can never attach it to a prompt.
pub fn tool_config_dir(home: &Path) -> PathBuf {
    home.join(".config").join(TOOL_DIR_NAME)
}

/// Expand a leading `~` or `~/` against the given home directory.
/// `~user` forms are not supported and return None.
pub fn expand_home(raw: &str, home: Option<&Path>) -> Option<PathBuf> {
    if raw == "~" {
        return home.map(Path::to_path_buf);
    }
    if let Some(rest) = raw.strip_prefix("~/") {
        return home.map(|h| h.join(rest));
    }
    if raw.starts_with('~') {
        return None;
    }
    Some(PathBuf::from(raw))
}

/// Collapse `.` and `..` without touching the filesystem.
/// `..` at the root stays at the root.
pub fn normalize_lexical(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Turn a user-supplied path string into an absolute, normalized path.
/// Relative paths are anchored at `cwd`. Returns None for empty strings,
/// embedded NULs, and unsupported `~user` forms.
pub fn absolutize(raw: &str, home: Option<&Path>, cwd: &Path) -> Option<PathBuf> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.contains('\0') {
        return None;
    }
    let expanded = expand_home(trimmed, home)?;
    let absolute = if expanded.is_absolute() {
        expanded
    } else {
        cwd.join(expanded)
    };
    Some(normalize_lexical(&absolute))
}

/// Locate an executable on PATH (or accept an explicit path to one).
pub fn find_executable(binary: &str) -> Option<PathBuf> {
    which::which(binary).ok()
}

/// Fresh scratch directory outside any project tree.
/// CLI backends run here so they never auto-detect a git repository.
/// Removed when the returned guard drops.
pub fn scratch_dir() -> std::io::Result<TempDir> {
    tempfile::Builder::new()
        .prefix(&format!("{}-", TOOL_DIR_NAME))
        .tempdir()
}

// ============================================================================
// TESTS
// ============================================================================
