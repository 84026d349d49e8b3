//! Durable deferred tasks and the manager that drives them.
//!
//! A [`PersistentTask`] is registered with [`PersistentTaskManager::schedule_task`],
//! initialized on the worker [`TaskQueue`](task_queue::TaskQueue) and kept until it
//! removes itself through its [`TaskContext`]. Whatever is still registered when the
//! manager shuts down is written to the [`TaskStore`] and restored by the next
//! [`PersistentTaskManager::start`].

pub mod builtin;
mod helpers;
mod manager;
mod registry;
mod remote_call;
mod store;
pub mod task_queue;

pub use helpers::Subscription;
pub use manager::PersistentTaskManager;
pub use registry::{TaskDecoder, TaskRegistry};
pub use remote_call::{Relevance, RemoteCall, RemoteCallTask};
pub use store::{TaskRecord, TaskStore};

use crate::core::topology::{NodeDirectory, PeerTable};
use crate::err::Result;
use crate::fs::{FolderRegistry, JoinedFolders};
use crate::network::{LoopbackSession, SessionProvider};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt::{Debug, Display, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

/// A unit of deferred work that survives restarts.
///
/// `initialize` runs once per registration (after `schedule_task`, or during
/// `start` for tasks restored from the store). It may finish the work at once or
/// subscribe to whatever event it waits for. `shutdown` releases those
/// subscriptions and may be called more than once.
#[async_trait]
pub trait PersistentTask: Send + Sync + 'static {
    /// Stable tag written into every stored record.
    fn kind(&self) -> &'static str;

    fn expires_at(&self) -> Option<DateTime<Utc>>;

    fn is_expired(&self) -> bool {
        self.expires_at().is_some_and(|at| Utc::now() > at)
    }

    /// Payload bytes as stored. Must include the expiry.
    fn encode(&self) -> Result<Vec<u8>>;

    async fn initialize(&self, ctx: TaskContext) -> Result<()>;

    fn shutdown(&self);

    fn describe(&self) -> String {
        self.kind().to_string()
    }
}

/// Identity of a task: a digest over its kind and encoded payload. Two tasks
/// with the same id are considered equal.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    pub fn of(task: &dyn PersistentTask) -> Result<Self> {
        Ok(Self::from_parts(task.kind(), &task.encode()?))
    }

    pub fn from_parts(kind: &str, payload: &[u8]) -> Self {
        let mut buf = Vec::with_capacity(kind.len() + 1 + payload.len());
        buf.extend_from_slice(kind.as_bytes());
        buf.push(0);
        buf.extend_from_slice(payload);
        Self(xxhash_rust::xxh64::xxh64(&buf, 0))
    }
}

impl Debug for TaskId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "TaskId({:016x})", self.0)
    }
}

impl Display for TaskId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Global "remote services enabled" switch, read by remote-call tasks when
/// they initialize.
#[derive(Clone, Debug)]
pub struct RemoteServiceToggle(Arc<AtomicBool>);

impl RemoteServiceToggle {
    pub fn new(enabled: bool) -> Self {
        Self(Arc::new(AtomicBool::new(enabled)))
    }

    pub fn is_enabled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.0.store(enabled, Ordering::SeqCst);
    }
}

impl Default for RemoteServiceToggle {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Collaborators shared by every task.
#[derive(Clone)]
pub struct Services {
    pub session: Arc<dyn SessionProvider>,
    pub nodes: Arc<dyn NodeDirectory>,
    pub folders: Arc<dyn FolderRegistry>,
    pub remote_service: RemoteServiceToggle,
}

impl Services {
    pub fn new(
        session: Arc<dyn SessionProvider>,
        nodes: Arc<dyn NodeDirectory>,
        folders: Arc<dyn FolderRegistry>,
        remote_service: RemoteServiceToggle,
    ) -> Self {
        Self {
            session,
            nodes,
            folders,
            remote_service,
        }
    }

    /// Disconnected loopback session, empty peer table and no joined folders.
    pub fn offline(remote_service_enabled: bool) -> Self {
        Self::new(
            Arc::new(LoopbackSession::new()),
            Arc::new(PeerTable::new()),
            Arc::new(JoinedFolders::new()),
            RemoteServiceToggle::new(remote_service_enabled),
        )
    }
}

impl Debug for Services {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services")
            .field("session_connected", &self.session.is_connected())
            .field("remote_service", &self.remote_service.is_enabled())
            .finish()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManagerOptions {
    /// How long removal and shutdown wait for in-flight initializations before
    /// dropping them as stuck. `None` waits forever.
    pub pending_init_timeout: Option<Duration>,
    pub worker_queue_bound: usize,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            pending_init_timeout: Some(Duration::from_secs(120)),
            worker_queue_bound: 1024,
        }
    }
}

/// Handle given to a task's `initialize`. Lets the task reach the shared
/// collaborators and deregister itself.
#[derive(Clone)]
pub struct TaskContext {
    id: TaskId,
    manager: Weak<manager::ManagerInner>,
    services: Arc<Services>,
}

impl TaskContext {
    pub(crate) fn new(
        id: TaskId,
        manager: Weak<manager::ManagerInner>,
        services: Arc<Services>,
    ) -> Self {
        Self {
            id,
            manager,
            services,
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    /// Permanently deregister this task. A no-op once the manager is gone.
    pub async fn remove(&self) {
        if let Some(manager) = self.manager.upgrade() {
            manager.remove_self(self.id).await;
        }
    }
}

impl Debug for TaskContext {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "TaskContext {{ id: {} }}", self.id)
    }
}
