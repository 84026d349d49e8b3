pub mod config;
pub mod core;
pub mod err;
pub mod fs;
pub mod global_var;
pub mod network;
pub mod types;
pub mod utilities;

pub use crate::core::tasks::builtin::SendMessageTask;
pub use crate::core::tasks::{
    ManagerOptions, PersistentTask, PersistentTaskManager, RemoteCall, RemoteCallTask,
    RemoteServiceToggle, Services, TaskContext, TaskId, TaskRegistry, TaskStore,
};
