//! Filesystem helpers.
//!
//! Home-directory expansion for configured paths, and cross-platform directory
//! permission checks for read, write, and execute (traverse).
//!
//! The permission probe attempts real operations instead of reading mode bits,
//! so it reflects what the current process can actually do on any platform.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Expand a leading `~/` using `$HOME`; other paths are returned unchanged.
pub fn expand_tilde(p: &str) -> String {
    match p.strip_prefix("~/") {
        Some(rest) => match std::env::var("HOME") {
            Ok(home) => format!("{}/{}", home.trim_end_matches('/'), rest),
            Err(_) => p.to_string(),
        },
        None => p.to_string(),
    }
}

/// Result of probing directory permissions for the current process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirPermissions {
    pub read: bool,
    pub write: bool,
    pub execute: bool, // "traverse" on Unix; ability to canonicalize/enter the dir
}

impl DirPermissions {
    /// Convenience: all permissions are granted.
    pub const fn all() -> Self {
        Self {
            read: true,
            write: true,
            execute: true,
        }
    }
}

/// Probe read, write, and traverse permissions on `dir` by attempting the operations.
pub fn check_dir_permissions<P: AsRef<Path>>(dir: P) -> DirPermissions {
    let dir = dir.as_ref();
    if !fs::metadata(dir).map(|md| md.is_dir()).unwrap_or(false) {
        return DirPermissions {
            read: false,
            write: false,
            execute: false,
        };
    }

    DirPermissions {
        read: fs::read_dir(dir).is_ok(),
        write: probe_write(dir).unwrap_or(false),
        execute: fs::canonicalize(dir).is_ok(),
    }
}

fn probe_write(dir: &Path) -> io::Result<bool> {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let probe: PathBuf = dir.join(format!(".write_probe_{}_{}.tmp", std::process::id(), nanos));

    match fs::OpenOptions::new().write(true).create_new(true).open(&probe) {
        Ok(file) => {
            drop(file);
            let _ = fs::remove_file(&probe);
            Ok(true)
        }
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => Ok(false),
        Err(e) => Err(e),
    }
}
