//! Task kinds shipped with the crate.

mod account_tasks;
mod folder_tasks;
mod send_message;

pub use account_tasks::{RemoveComputerFromAccount, RemoveComputerFromAccountTask};
pub use folder_tasks::{
    CreateFolderOnServer, CreateFolderOnServerTask, FolderObtainPermission,
    FolderObtainPermissionTask, FolderRemovePermission, FolderRemovePermissionTask,
};
pub use send_message::SendMessageTask;

use crate::core::tasks::{
    PersistentTask, RemoteCall, RemoteCallTask, TaskRegistry,
};
use crate::err::Result;
use std::sync::Arc;

fn decode_remote<C: RemoteCall>(bytes: &[u8]) -> Result<Arc<dyn PersistentTask>> {
    Ok(Arc::new(RemoteCallTask::<C>::decode(bytes)?))
}

pub(crate) fn register_all(registry: &mut TaskRegistry) {
    registry
        .register(SendMessageTask::KIND, SendMessageTask::decode_boxed)
        .register(CreateFolderOnServer::KIND, decode_remote::<CreateFolderOnServer>)
        .register(
            FolderObtainPermission::KIND,
            decode_remote::<FolderObtainPermission>,
        )
        .register(
            FolderRemovePermission::KIND,
            decode_remote::<FolderRemovePermission>,
        )
        .register(
            RemoveComputerFromAccount::KIND,
            decode_remote::<RemoveComputerFromAccount>,
        );
}
