//! Remote service stubs reachable through a connected session.

use crate::err::Result;
use crate::types::{AccountInfo, FolderInfo, FolderPermission, NodeInfo};
use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

#[async_trait]
pub trait FolderService: Send + Sync {
    async fn create_folder(&self, folder: &FolderInfo) -> Result<()>;
    async fn set_archive_mode(&self, folder: &FolderInfo, versions: u32) -> Result<()>;
}

#[async_trait]
pub trait AccountService: Send + Sync {
    async fn remove_computer(&self, account: &AccountInfo, node: &NodeInfo) -> Result<()>;
}

#[async_trait]
pub trait SecurityService: Send + Sync {
    async fn grant(&self, account: &AccountInfo, permission: &FolderPermission) -> Result<()>;
    async fn revoke(&self, account: &AccountInfo, permission: &FolderPermission) -> Result<()>;
}

/// A call observed by [`RecordingServices`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCallRecord {
    CreateFolder(FolderInfo),
    SetArchiveMode(FolderInfo, u32),
    RemoveComputer(AccountInfo, NodeInfo),
    Grant(AccountInfo, FolderPermission),
    Revoke(AccountInfo, FolderPermission),
}

/// Service implementation that records successful calls and can be told to
/// fail the next `n` calls.
#[derive(Debug, Default)]
pub struct RecordingServices {
    calls: Mutex<Vec<RemoteCallRecord>>,
    failures_left: AtomicUsize,
    attempts: AtomicUsize,
}

impl RecordingServices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self, n: usize) {
        self.failures_left.store(n, Ordering::SeqCst);
    }

    /// Successful calls, in order.
    pub fn calls(&self) -> Vec<RemoteCallRecord> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Every call attempt, including failed ones.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    fn record(&self, call: RemoteCallRecord) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let should_fail = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(format!("remote service rejected {:?}", call).into());
        }
        self.calls
            .lock()
            .map_err(|_| "recording lock poisoned")?
            .push(call);
        Ok(())
    }
}

#[async_trait]
impl FolderService for RecordingServices {
    async fn create_folder(&self, folder: &FolderInfo) -> Result<()> {
        self.record(RemoteCallRecord::CreateFolder(folder.clone()))
    }

    async fn set_archive_mode(&self, folder: &FolderInfo, versions: u32) -> Result<()> {
        self.record(RemoteCallRecord::SetArchiveMode(folder.clone(), versions))
    }
}

#[async_trait]
impl AccountService for RecordingServices {
    async fn remove_computer(&self, account: &AccountInfo, node: &NodeInfo) -> Result<()> {
        self.record(RemoteCallRecord::RemoveComputer(account.clone(), node.clone()))
    }
}

#[async_trait]
impl SecurityService for RecordingServices {
    async fn grant(&self, account: &AccountInfo, permission: &FolderPermission) -> Result<()> {
        self.record(RemoteCallRecord::Grant(account.clone(), permission.clone()))
    }

    async fn revoke(&self, account: &AccountInfo, permission: &FolderPermission) -> Result<()> {
        self.record(RemoteCallRecord::Revoke(account.clone(), permission.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn failures_are_consumed_before_calls_succeed() {
        let services = RecordingServices::new();
        let folder = FolderInfo::new("f-1", "Docs");
        services.fail_next(1);
        assert!(services.create_folder(&folder).await.is_err());
        assert!(services.create_folder(&folder).await.is_ok());
        assert_eq!(services.attempts(), 2);
        assert_eq!(services.calls(), vec![RemoteCallRecord::CreateFolder(folder)]);
    }
}
