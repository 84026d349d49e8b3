use crate::global_var::LOGGER;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Owns a directory and removes it recursively when dropped.
#[derive(Debug)]
pub struct TmpDirGuard(pub PathBuf);

impl TmpDirGuard {
    /// Create a fresh, uniquely named directory under the system temp dir.
    pub fn new(prefix: &str) -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let mut p = std::env::temp_dir();
        p.push(format!(
            "{}_{}_{}_{:x}",
            prefix,
            std::process::id(),
            nanos,
            rand::random::<u32>()
        ));
        let _ = std::fs::create_dir_all(&p);
        Self(p)
    }
}

impl Drop for TmpDirGuard {
    fn drop(&mut self) {
        LOGGER.trace(format!(
            "TmpDirGuard dropping, removing temporary directory: {:?}",
            &self.0
        ));
        let _ = std::fs::remove_dir_all(&self.0);
    }
}

impl From<PathBuf> for TmpDirGuard {
    fn from(path: PathBuf) -> Self {
        Self(path)
    }
}

impl AsRef<Path> for TmpDirGuard {
    fn as_ref(&self) -> &Path {
        self.0.as_path()
    }
}

impl Deref for TmpDirGuard {
    type Target = PathBuf;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
