use crate::core::tasks::{Relevance, RemoteCall, RemoteCallTask, Services};
use crate::err::Result;
use crate::network::SessionProvider;
use crate::types::{AccountInfo, FolderInfo, FolderPermission};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

fn joined(services: &Services, folder: &FolderInfo) -> Relevance {
    if services.folders.is_joined(&folder.id) {
        Relevance::Relevant
    } else {
        Relevance::Obsolete(format!("folder {} is no longer joined", folder))
    }
}

/// Create a locally joined folder on the server, optionally setting how many
/// archived versions it keeps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateFolderOnServer {
    pub folder: FolderInfo,
    pub archive_versions: Option<u32>,
}

pub type CreateFolderOnServerTask = RemoteCallTask<CreateFolderOnServer>;

impl CreateFolderOnServer {
    pub fn new(folder: FolderInfo) -> Self {
        Self {
            folder,
            archive_versions: None,
        }
    }

    pub fn with_archive_versions(mut self, versions: u32) -> Self {
        self.archive_versions = Some(versions);
        self
    }
}

#[async_trait]
impl RemoteCall for CreateFolderOnServer {
    const KIND: &'static str = "CreateFolderOnServerTask";

    fn describe(&self) -> String {
        format!("create folder {}", self.folder)
    }

    async fn still_relevant(&self, services: &Services) -> Relevance {
        joined(services, &self.folder)
    }

    async fn call(&self, session: &dyn SessionProvider) -> Result<()> {
        let service = session.folder_service()?;
        service.create_folder(&self.folder).await?;
        if let Some(versions) = self.archive_versions {
            service.set_archive_mode(&self.folder, versions).await?;
        }
        Ok(())
    }
}

/// Ask the server for read access to a joined folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderObtainPermission {
    pub account: AccountInfo,
    pub folder: FolderInfo,
}

pub type FolderObtainPermissionTask = RemoteCallTask<FolderObtainPermission>;

#[async_trait]
impl RemoteCall for FolderObtainPermission {
    const KIND: &'static str = "FolderObtainPermissionTask";

    fn describe(&self) -> String {
        format!("grant read on {} to {}", self.folder, self.account)
    }

    async fn still_relevant(&self, services: &Services) -> Relevance {
        joined(services, &self.folder)
    }

    async fn call(&self, session: &dyn SessionProvider) -> Result<()> {
        session
            .security_service()?
            .grant(&self.account, &FolderPermission::read(self.folder.clone()))
            .await
    }
}

/// Revoke a folder permission from an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderRemovePermission {
    pub account: AccountInfo,
    pub permission: FolderPermission,
}

pub type FolderRemovePermissionTask = RemoteCallTask<FolderRemovePermission>;

#[async_trait]
impl RemoteCall for FolderRemovePermission {
    const KIND: &'static str = "FolderRemovePermissionTask";

    fn describe(&self) -> String {
        format!("revoke {} from {}", self.permission, self.account)
    }

    async fn call(&self, session: &dyn SessionProvider) -> Result<()> {
        session
            .security_service()?
            .revoke(&self.account, &self.permission)
            .await
    }
}
