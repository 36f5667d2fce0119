// Multi-Reasoner Bridge - Path Safety Gate (Attachment Enforcement Point)
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// Every file path supplied by the caller passes through here before its
// contents may enter a prompt sent to a third party.
// Resolve -> Denylist -> Kind -> Open+Stat -> Read. Short-circuits per file.
// Bad entries are reported per file; good entries proceed. Never throws.
// Read-only: nothing is written, deleted, or executed.

use crate::paths;
use crate::validate;
use serde::Serialize;
use std::fmt;
use std::fs::{File, Metadata, OpenOptions};
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};

/// Per-file size cap (512 KiB)
pub const MAX_FILE_BYTES: u64 = 512 * 1024;

/// Per-request file cap; entries past this position are not considered
pub const MAX_FILES: usize = 10;

/// A file accepted for prompt inclusion. Discarded after assembly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileAttachment {
    /// Path exactly as the caller supplied it
    pub path: String,
    pub resolved_absolute_path: String,
    pub size_bytes: u64,
    #[serde(skip)]
    pub contents: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    InvalidPath,
    BlockedPath,
    UnsupportedExtension,
    NotFound,
    TooLarge,
    TooManyFiles,
    Unreadable,
}

impl RejectReason {
    pub fn as_str(self) -> &'static str {
        match self {
            RejectReason::InvalidPath => "invalid_path",
            RejectReason::BlockedPath => "blocked_path",
            RejectReason::UnsupportedExtension => "unsupported_extension",
            RejectReason::NotFound => "not_found",
            RejectReason::TooLarge => "too_large",
            RejectReason::TooManyFiles => "too_many_files",
            RejectReason::Unreadable => "unreadable",
        }
    }
}

/// A file refused by the gate, with a human-readable cause
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rejection {
    pub path: String,
    pub reason: RejectReason,
    pub detail: String,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} ({})", self.path, self.reason.as_str(), self.detail)
    }
}

/// Result of gating one request's file list, both in input order
#[derive(Debug, Clone, Default, Serialize)]
pub struct GateOutcome {
    pub attachments: Vec<FileAttachment>,
    pub rejections: Vec<Rejection>,
}

/// The gate itself. Holds only the resolution context, no per-request state.
#[derive(Debug, Clone)]
pub struct PathGate {
    home: Option<PathBuf>,
    cwd: PathBuf,
    extra_blocked: Vec<PathBuf>,
}

impl PathGate {
    pub fn new(home: Option<PathBuf>, cwd: PathBuf) -> Self {
        let extra_blocked = home.iter().map(|h| paths::tool_config_dir(h)).collect();
        Self { home, cwd, extra_blocked }
    }

    /// Gate bound to the running process: $HOME and the current directory
    pub fn for_process() -> Self {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
        Self::new(paths::actual_home().map(Path::to_path_buf), cwd)
    }

    /// Gate every path. The first MAX_FILES entries are considered;
    /// the rest are rejected with too_many_files without touching disk.
    pub fn check(&self, files: &[String]) -> GateOutcome {
        let mut outcome = GateOutcome::default();

        for (index, raw) in files.iter().enumerate() {
            if index >= MAX_FILES {
                outcome.rejections.push(Rejection {
                    path: raw.clone(),
                    reason: RejectReason::TooManyFiles,
                    detail: format!("only the first {} files are attached", MAX_FILES),
                });
                continue;
            }
            match self.check_one(raw) {
                Ok(attachment) => {
                    log::info!("Attached file: {} ({} bytes)", raw, attachment.size_bytes);
                    outcome.attachments.push(attachment);
                }
                Err(rejection) => {
                    log::warn!("Rejected file: {}", rejection);
                    outcome.rejections.push(rejection);
                }
            }
        }

        outcome
    }

    fn check_one(&self, raw: &str) -> Result<FileAttachment, Rejection> {
        let reject = |reason: RejectReason, detail: String| Rejection {
            path: raw.to_string(),
            reason,
            detail,
        };

        // 1. Resolve
        let lexical = paths::absolutize(raw, self.home.as_deref(), &self.cwd).ok_or_else(|| {
            reject(RejectReason::InvalidPath, "path cannot be resolved".to_string())
        })?;
        let resolved = match std::fs::canonicalize(&lexical) {
            Ok(p) => p,
            // Missing file: keep the lexical path so the denylist still applies
            Err(e) if e.kind() == ErrorKind::NotFound => lexical.clone(),
            Err(e) => return Err(reject(RejectReason::InvalidPath, e.to_string())),
        };

        // 2. Denylist, on both the supplied and the symlink-resolved path
        let extra: Vec<&Path> = self.extra_blocked.iter().map(PathBuf::as_path).collect();
        if let Some(why) = validate::sensitive_match(&lexical, &extra)
            .or_else(|| validate::sensitive_match(&resolved, &extra))
        {
            return Err(reject(RejectReason::BlockedPath, why));
        }

        // 3. Kind
        if !validate::is_allowed_kind(&resolved) {
            let name = resolved
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            return Err(reject(
                RejectReason::UnsupportedExtension,
                format!("'{}' is not an allowed text extension or filename", name),
            ));
        }

        // 4. Open once, then stat and read through the same descriptor
        let (file, meta) = open_regular(&resolved).map_err(|(reason, detail)| reject(reason, detail))?;
        if meta.len() > MAX_FILE_BYTES {
            return Err(reject(
                RejectReason::TooLarge,
                format!("{} bytes exceeds the {} byte limit", meta.len(), MAX_FILE_BYTES),
            ));
        }

        // 5. Read as text
        let bytes = read_capped(file).map_err(|(reason, detail)| reject(reason, detail))?;
        let size_bytes = bytes.len() as u64;
        let contents = String::from_utf8(bytes)
            .map_err(|_| reject(RejectReason::Unreadable, "not valid UTF-8 text".to_string()))?;

        Ok(FileAttachment {
            path: raw.to_string(),
            resolved_absolute_path: resolved.to_string_lossy().to_string(),
            size_bytes,
            contents,
        })
    }
}

/// Open without following a final symlink and without blocking on FIFOs,
/// then require a regular file via the open descriptor.
fn open_regular(path: &Path) -> Result<(File, Metadata), (RejectReason, String)> {
    let mut options = OpenOptions::new();
    options.read(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.custom_flags(libc::O_NOFOLLOW | libc::O_NONBLOCK);
    }

    let file = options.open(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => (RejectReason::NotFound, "file does not exist".to_string()),
        _ => (RejectReason::Unreadable, e.to_string()),
    })?;
    let meta = file
        .metadata()
        .map_err(|e| (RejectReason::Unreadable, e.to_string()))?;
    if !meta.is_file() {
        return Err((RejectReason::Unreadable, "not a regular file".to_string()));
    }
    Ok((file, meta))
}

/// Read at most MAX_FILE_BYTES + 1 bytes; anything beyond the cap is too_large
/// even if the file grew after it was stat'ed.
fn read_capped(file: File) -> Result<Vec<u8>, (RejectReason, String)> {
    let mut bytes = Vec::new();
    file.take(MAX_FILE_BYTES + 1)
        .read_to_end(&mut bytes)
        .map_err(|e| (RejectReason::Unreadable, e.to_string()))?;
    if bytes.len() as u64 > MAX_FILE_BYTES {
        return Err((
            RejectReason::TooLarge,
            format!("more than {} bytes", MAX_FILE_BYTES),
        ));
    }
    Ok(bytes)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn setup() -> (TempDir, PathGate) {
        let dir = tempfile::tempdir().unwrap();
        let root = fs::canonicalize(dir.path()).unwrap();
        let gate = PathGate::new(Some(root.join("home")), root.clone());
        (dir, gate)
    }

    fn root_of(dir: &TempDir) -> PathBuf {
        fs::canonicalize(dir.path()).unwrap()
    }

    #[test]
    fn accepts_text_file_with_exact_contents() {
        let (dir, gate) = setup();
        let body = "# Plan\n\nümlaut and emoji \u{1F680}\n";
        fs::write(root_of(&dir).join("plan.md"), body).unwrap();

        let out = gate.check(&["plan.md".to_string()]);
        assert!(out.rejections.is_empty());
        assert_eq!(out.attachments.len(), 1);
        let a = &out.attachments[0];
        assert_eq!(a.path, "plan.md");
        assert_eq!(a.contents, body);
        assert_eq!(a.size_bytes, body.len() as u64);
        assert!(Path::new(&a.resolved_absolute_path).is_absolute());
    }

    #[test]
    fn accepts_allowed_basename_and_expands_home() {
        let (dir, gate) = setup();
        let home = root_of(&dir).join("home");
        fs::create_dir_all(&home).unwrap();
        fs::write(home.join("Makefile"), "all:\n\ttrue\n").unwrap();

        let out = gate.check(&["~/Makefile".to_string()]);
        assert_eq!(out.attachments.len(), 1);
        assert_eq!(out.attachments[0].contents, "all:\n\ttrue\n");
    }

    #[test]
    fn sensitive_paths_are_blocked_regardless_of_extension() {
        let (dir, gate) = setup();
        let ssh = root_of(&dir).join("home/.ssh");
        fs::create_dir_all(&ssh).unwrap();
        fs::write(ssh.join("notes.md"), "x").unwrap();
        fs::write(ssh.join("id_rsa"), "KEY").unwrap();

        let out = gate.check(&[
            "~/.ssh/notes.md".to_string(),
            "~/.ssh/id_rsa".to_string(),
            "/etc/ssh/known_hosts".to_string(),
        ]);
        assert!(out.attachments.is_empty());
        assert_eq!(out.rejections.len(), 3);
        assert!(out.rejections.iter().all(|r| r.reason == RejectReason::BlockedPath));
    }

    #[cfg(unix)]
    #[test]
    fn symlink_into_sensitive_dir_is_blocked() {
        let (dir, gate) = setup();
        let root = root_of(&dir);
        let aws = root.join("home/.aws");
        fs::create_dir_all(&aws).unwrap();
        fs::write(aws.join("config.toml"), "[default]").unwrap();
        std::os::unix::fs::symlink(aws.join("config.toml"), root.join("innocent.toml")).unwrap();

        let out = gate.check(&["innocent.toml".to_string()]);
        assert!(out.attachments.is_empty());
        assert_eq!(out.rejections[0].reason, RejectReason::BlockedPath);
    }

    #[test]
    fn own_config_dir_is_blocked() {
        let (dir, gate) = setup();
        let own = root_of(&dir).join("home/.config/multi-reasoner");
        fs::create_dir_all(&own).unwrap();
        fs::write(own.join("notes.txt"), "x").unwrap();

        let out = gate.check(&["~/.config/multi-reasoner/notes.txt".to_string()]);
        assert_eq!(out.rejections[0].reason, RejectReason::BlockedPath);
    }

    #[test]
    fn per_file_failures_are_classified() {
        let (dir, gate) = setup();
        let root = root_of(&dir);
        fs::write(root.join("photo.png"), [0x89, 0x50]).unwrap();
        fs::write(root.join("big.txt"), vec![b'a'; (MAX_FILE_BYTES + 1) as usize]).unwrap();
        fs::write(root.join("binary.txt"), [0xff, 0xfe, 0x00]).unwrap();
        fs::create_dir(root.join("folder.md")).unwrap();

        let out = gate.check(&[
            "photo.png".to_string(),
            "missing.md".to_string(),
            "big.txt".to_string(),
            "binary.txt".to_string(),
            "folder.md".to_string(),
            "".to_string(),
            "~nobody/x.md".to_string(),
        ]);
        let reasons: Vec<RejectReason> = out.rejections.iter().map(|r| r.reason).collect();
        assert_eq!(
            reasons,
            vec![
                RejectReason::UnsupportedExtension,
                RejectReason::NotFound,
                RejectReason::TooLarge,
                RejectReason::Unreadable,
                RejectReason::Unreadable,
                RejectReason::InvalidPath,
                RejectReason::InvalidPath,
            ]
        );
        assert!(out.attachments.is_empty());
    }

    #[test]
    fn file_at_exact_cap_is_accepted() {
        let (dir, gate) = setup();
        fs::write(root_of(&dir).join("edge.txt"), vec![b'z'; MAX_FILE_BYTES as usize]).unwrap();
        let out = gate.check(&["edge.txt".to_string()]);
        assert_eq!(out.attachments.len(), 1);
        assert_eq!(out.attachments[0].size_bytes, MAX_FILE_BYTES);
    }

    #[test]
    fn only_first_ten_entries_are_considered() {
        let (dir, gate) = setup();
        let root = root_of(&dir);
        let mut files = Vec::new();
        for i in 0..12 {
            let name = format!("f{:02}.txt", i);
            fs::write(root.join(&name), format!("file {}", i)).unwrap();
            files.push(name);
        }

        let out = gate.check(&files);
        assert_eq!(out.attachments.len(), 10);
        assert_eq!(out.attachments[0].path, "f00.txt");
        assert_eq!(out.attachments[9].path, "f09.txt");
        assert_eq!(out.rejections.len(), 2);
        assert_eq!(out.rejections[0].path, "f10.txt");
        assert!(out.rejections.iter().all(|r| r.reason == RejectReason::TooManyFiles));
    }

    #[test]
    fn good_entries_survive_bad_neighbours() {
        let (dir, gate) = setup();
        fs::write(root_of(&dir).join("ok.rs"), "fn main() {}").unwrap();
        let out = gate.check(&["/proc/self/status".to_string(), "ok.rs".to_string()]);
        assert_eq!(out.attachments.len(), 1);
        assert_eq!(out.rejections.len(), 1);
        assert_eq!(out.rejections[0].to_string().split(':').next(), Some("/proc/self/status"));
    }

    #[test]
    fn read_stops_one_byte_past_the_cap() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grown.txt");
        fs::write(&path, vec![b'g'; (MAX_FILE_BYTES * 3) as usize]).unwrap();
        let file = File::open(&path).unwrap();
        let (reason, _) = read_capped(file).unwrap_err();
        assert_eq!(reason, RejectReason::TooLarge);

        fs::write(&path, vec![b'g'; MAX_FILE_BYTES as usize]).unwrap();
        let bytes = read_capped(File::open(&path).unwrap()).unwrap();
        assert_eq!(bytes.len() as u64, MAX_FILE_BYTES);
    }

    #[cfg(unix)]
    #[test]
    fn final_symlink_is_not_followed_at_open() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("target.txt");
        let link = dir.path().join("link.txt");
        fs::write(&target, "swapped in").unwrap();
        std::os::unix::fs::symlink(&target, &link).unwrap();

        let (reason, _) = open_regular(&link).unwrap_err();
        assert_eq!(reason, RejectReason::Unreadable);
        assert!(open_regular(&target).is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn fifo_is_refused_without_blocking() {
        let (dir, gate) = setup();
        let fifo = root_of(&dir).join("pipe.txt");
        let c_path = std::ffi::CString::new(fifo.to_string_lossy().as_bytes()).unwrap();
        assert_eq!(unsafe { libc::mkfifo(c_path.as_ptr(), 0o644) }, 0);

        let out = gate.check(&["pipe.txt".to_string()]);
        assert!(out.attachments.is_empty());
        assert_eq!(out.rejections[0].reason, RejectReason::Unreadable);
    }
}
