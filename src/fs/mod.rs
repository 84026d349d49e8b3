pub mod fs_op;
pub mod util;

use crate::err::Result;
use crate::utilities::AsyncLogger;
use crate::utilities::init_file_logger;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::RwLock;
use tokio::task::JoinHandle;

/// Local view of which folders this node has joined.
pub trait FolderRegistry: Send + Sync {
    fn is_joined(&self, folder_id: &str) -> bool;
}

/// In-memory [`FolderRegistry`].
#[derive(Debug, Default)]
pub struct JoinedFolders {
    folders: RwLock<HashSet<String>>,
}

impl JoinedFolders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn join(&self, folder_id: &str) {
        if let Ok(mut folders) = self.folders.write() {
            folders.insert(folder_id.to_string());
        }
    }

    pub fn leave(&self, folder_id: &str) {
        if let Ok(mut folders) = self.folders.write() {
            folders.remove(folder_id);
        }
    }
}

impl FolderRegistry for JoinedFolders {
    fn is_joined(&self, folder_id: &str) -> bool {
        self.folders
            .read()
            .map(|folders| folders.contains(folder_id))
            .unwrap_or(false)
    }
}

/// Prepare the misc files location and start the file logger.
///
/// Steps:
/// 1. Get or create the misc directory.
/// 2. Verify we have read, write, and execute permissions on it.
/// 3. Initialize the async file logger at `log_file`.
pub async fn init_misc_dir<P: AsRef<Path>, L: AsRef<Path>>(
    misc_dir: P,
    log_file: L,
) -> Result<(AsyncLogger, JoinHandle<()>)> {
    let base: &Path = misc_dir.as_ref();
    fs::create_dir_all(base)?;

    let perms = util::check_dir_permissions(base);
    if !(perms.read && perms.write && perms.execute) {
        return Err(format!(
            "Insufficient permissions for path '{}': read={}, write={}, execute={}",
            base.display(),
            perms.read,
            perms.write,
            perms.execute
        )
        .into());
    }

    init_file_logger(log_file).await
}

/// Like [`init_misc_dir`], but never fails. When the misc directory cannot be
/// used the error goes to stderr, logging falls back to stderr and the
/// returned handle is `None`: nothing should be written there this session.
pub async fn init_misc_dir_or_stderr<P: AsRef<Path>, L: AsRef<Path>>(
    misc_dir: P,
    log_file: L,
) -> (AsyncLogger, Option<JoinHandle<()>>) {
    match init_misc_dir(misc_dir.as_ref(), log_file).await {
        Ok((logger, task)) => (logger, Some(task)),
        Err(e) => {
            let logger = AsyncLogger::stderr();
            logger.error(format!(
                "Cannot use {}: {}. Running without persistence",
                misc_dir.as_ref().display(),
                e
            ));
            (logger, None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utilities::temp_dir::TmpDirGuard;

    #[test]
    fn joined_folders_tracks_membership() {
        let folders = JoinedFolders::new();
        assert!(!folders.is_joined("f-1"));
        folders.join("f-1");
        assert!(folders.is_joined("f-1"));
        folders.leave("f-1");
        assert!(!folders.is_joined("f-1"));
    }

    #[tokio::test]
    async fn init_misc_dir_creates_directory_and_log() {
        let dir = TmpDirGuard::new("init_misc_dir");
        let misc = dir.join("misc");
        let log = misc.join("logs").join("tasks.log");
        let (logger, task) = init_misc_dir(&misc, &log).await.expect("init misc dir");
        logger.info("ready");
        drop(logger);
        task.await.unwrap();
        assert!(misc.is_dir());
        assert!(std::fs::read_to_string(&log).unwrap().contains("ready"));
    }

    #[tokio::test]
    async fn unusable_misc_dir_falls_back_to_stderr() {
        let dir = TmpDirGuard::new("init_misc_dir_fallback");
        let blocker = dir.join("file");
        std::fs::write(&blocker, b"not a dir").unwrap();
        let misc = blocker.join("misc");

        assert!(init_misc_dir(&misc, misc.join("tasks.log")).await.is_err());
        let (logger, task) = init_misc_dir_or_stderr(&misc, misc.join("tasks.log")).await;
        assert!(task.is_none());
        logger.info("still running");
        logger.shutdown().await;
        assert!(!misc.exists());
    }
}
