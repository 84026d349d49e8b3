use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Identifies a folder shared between nodes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FolderInfo {
    pub id: String,
    pub name: String,
}

impl FolderInfo {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

impl Display for FolderInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.name, self.id)
    }
}

/// Account on the remote server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountInfo {
    pub username: String,
}

impl AccountInfo {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
        }
    }
}

impl Display for AccountInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.username)
    }
}

/// A node (computer) participating in the sync network.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeInfo {
    pub id: String,
    pub nick: String,
}

impl NodeInfo {
    pub fn new(id: impl Into<String>, nick: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            nick: nick.into(),
        }
    }
}

impl Display for NodeInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.nick, self.id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PermissionLevel {
    Read,
    ReadWrite,
    Admin,
}

/// Access right of an account on a folder.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FolderPermission {
    pub level: PermissionLevel,
    pub folder: FolderInfo,
}

impl FolderPermission {
    pub fn read(folder: FolderInfo) -> Self {
        Self {
            level: PermissionLevel::Read,
            folder,
        }
    }

    pub fn read_write(folder: FolderInfo) -> Self {
        Self {
            level: PermissionLevel::ReadWrite,
            folder,
        }
    }

    pub fn admin(folder: FolderInfo) -> Self {
        Self {
            level: PermissionLevel::Admin,
            folder,
        }
    }
}

impl Display for FolderPermission {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?} on {}", self.level, self.folder)
    }
}
