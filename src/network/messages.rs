use crate::types::{FolderInfo, NodeInfo};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Application message delivered to a single peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeerMessage {
    /// "You were added as a friend" notice.
    AddFriendNotification {
        from: NodeInfo,
        personal_message: Option<String>,
    },
    /// A remote deletion of this file was reverted locally.
    RevertedFile {
        folder: FolderInfo,
        file_name: String,
    },
    Text(String),
}

impl Display for PeerMessage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            PeerMessage::AddFriendNotification { from, .. } => {
                write!(f, "AddFriendNotification from {}", from)
            }
            PeerMessage::RevertedFile { folder, file_name } => {
                write!(f, "RevertedFile {} in {}", file_name, folder)
            }
            PeerMessage::Text(text) => write!(f, "Text({} chars)", text.len()),
        }
    }
}
