use crate::core::tasks::builtin::SendMessageTask;
use crate::core::tasks::task_queue::{TaskQueue, TaskQueueConfig, WorkItem};
use crate::core::tasks::{
    ManagerOptions, PersistentTask, Services, TaskContext, TaskId, TaskRecord, TaskRegistry,
    TaskStore,
};
use crate::err::Result;
use crate::global_var::LOGGER;
use async_trait::async_trait;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::sync::Notify;
use tokio::task::JoinError;
use tokio::time::Instant;

type TaskEntry = (TaskId, Arc<dyn PersistentTask>);

#[derive(Default)]
struct TaskTable {
    started: bool,
    shutting_down: bool,
    purging: bool,
    tasks: Vec<TaskEntry>,
    /// Initializations dispatched but not finished.
    pending: HashSet<TaskId>,
    /// Tasks whose `shutdown` the manager is running right now.
    closing: HashSet<TaskId>,
    workers: Option<TaskQueue>,
}

impl TaskTable {
    fn contains(&self, id: TaskId) -> bool {
        self.tasks.iter().any(|(tid, _)| *tid == id)
    }

    fn take(&mut self, id: TaskId) -> Option<Arc<dyn PersistentTask>> {
        let pos = self.tasks.iter().position(|(tid, _)| *tid == id)?;
        Some(self.tasks.remove(pos).1)
    }
}

pub(crate) struct ManagerInner {
    state: Mutex<TaskTable>,
    /// Woken whenever `pending` or `closing` shrinks.
    changed: Notify,
    store: TaskStore,
    registry: TaskRegistry,
    services: Arc<Services>,
    options: ManagerOptions,
}

/// Owns the set of scheduled tasks, restores it at start and stores it at
/// shutdown.
///
/// All bookkeeping happens under one lock. Task bodies (`initialize` and
/// `shutdown`) always run with the lock released.
#[derive(Clone)]
pub struct PersistentTaskManager {
    inner: Arc<ManagerInner>,
}

fn run_shutdown(task: &dyn PersistentTask) {
    if std::panic::catch_unwind(AssertUnwindSafe(|| task.shutdown())).is_err() {
        LOGGER.error(format!("Task {} panicked during shutdown", task.describe()));
    }
}

fn init_failure(outcome: std::result::Result<Result<()>, JoinError>) -> Option<String> {
    match outcome {
        Ok(Ok(())) => None,
        Ok(Err(e)) => Some(format!("{}", e)),
        Err(e) if e.is_panic() => Some("initialize panicked".to_string()),
        Err(e) => Some(format!("initialize was cancelled: {}", e)),
    }
}

impl ManagerInner {
    fn lock(&self) -> MutexGuard<'_, TaskTable> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn context(self: &Arc<Self>, id: TaskId) -> TaskContext {
        TaskContext::new(id, Arc::downgrade(self), self.services.clone())
    }

    /// Run `initialize` in its own tokio task so a panic stays contained.
    async fn run_initialize(self: &Arc<Self>, id: TaskId, task: Arc<dyn PersistentTask>) -> Option<String> {
        let ctx = self.context(id);
        init_failure(tokio::spawn(async move { task.initialize(ctx).await }).await)
    }

    pub(crate) fn schedule_task(self: &Arc<Self>, task: Arc<dyn PersistentTask>) -> Option<TaskId> {
        let id = match TaskId::of(task.as_ref()) {
            Ok(id) => id,
            Err(e) => {
                LOGGER.error(format!(
                    "Unable to schedule {}: cannot encode it: {}",
                    task.describe(),
                    e
                ));
                return None;
            }
        };

        let mut table = self.lock();
        if !table.started {
            LOGGER.error(format!(
                "Task manager is not started, refusing to schedule {}",
                task.describe()
            ));
            return None;
        }
        if table.shutting_down {
            LOGGER.debug(format!(
                "Task manager is shutting down, not scheduling {}",
                task.describe()
            ));
            return None;
        }
        if table.purging {
            LOGGER.debug(format!(
                "Task manager is purging, not scheduling {}",
                task.describe()
            ));
            return None;
        }
        if table.contains(id) {
            LOGGER.debug(format!("{} is already scheduled", task.describe()));
            return None;
        }

        table.tasks.push((id, task.clone()));
        table.pending.insert(id);
        let item = InitializeTask {
            id,
            task: task.clone(),
            manager: Arc::downgrade(self),
        };
        let enqueued = match &table.workers {
            Some(workers) => workers.sender().try_send(Box::new(item)),
            None => Err("worker pool is not running".into()),
        };
        if let Err(e) = enqueued {
            table.pending.remove(&id);
            drop(table);
            self.changed.notify_waiters();
            LOGGER.error(format!(
                "Could not dispatch initialization of {}, it stays stored: {}",
                task.describe(),
                e
            ));
        } else {
            LOGGER.debug(format!("Scheduled {} as {}", task.describe(), id));
        }
        Some(id)
    }

    /// Called once `initialize` finished, failed or panicked.
    fn initialize_finished(&self, id: TaskId, failure: Option<String>) {
        let failed = {
            let mut table = self.lock();
            table.pending.remove(&id);
            match &failure {
                Some(_) if !table.closing.contains(&id) => {
                    let task = table.take(id);
                    if task.is_some() {
                        table.closing.insert(id);
                    }
                    task
                }
                _ => None,
            }
        };
        if let Some(task) = failed {
            LOGGER.error(format!(
                "Initialization of {} failed, dropping it: {}",
                task.describe(),
                failure.unwrap_or_default()
            ));
            run_shutdown(task.as_ref());
            self.lock().closing.remove(&id);
        }
        self.changed.notify_waiters();
    }

    /// Wait until no initialization is in flight. The lock is not held while
    /// waiting. If the configured timeout elapses first, whatever is still
    /// pending is considered stuck and dropped.
    async fn wait_for_pending_tasks(&self) {
        let deadline = self.options.pending_init_timeout.map(|t| Instant::now() + t);
        loop {
            // Registered before the check so a wake-up in between is kept.
            let notified = self.changed.notified();
            {
                let table = self.lock();
                if table.pending.is_empty() {
                    return;
                }
                LOGGER.trace(format!(
                    "Waiting for {} pending initializations",
                    table.pending.len()
                ));
            }
            match deadline {
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, notified).await.is_err() {
                        self.drop_stuck_tasks();
                        return;
                    }
                }
                None => notified.await,
            }
        }
    }

    fn drop_stuck_tasks(&self) {
        let stuck: Vec<Arc<dyn PersistentTask>> = {
            let mut table = self.lock();
            let ids: Vec<TaskId> = table.pending.drain().collect();
            ids.into_iter().filter_map(|id| table.take(id)).collect()
        };
        for task in &stuck {
            LOGGER.error(format!(
                "{} did not finish initializing in {:?}, abandoning it",
                task.describe(),
                self.options.pending_init_timeout.unwrap_or_default()
            ));
            run_shutdown(task.as_ref());
        }
        self.changed.notify_waiters();
    }

    /// Take `id` out of the task set and run its `shutdown`. Refused while
    /// that task is already being shut down by the manager.
    fn close_task(&self, id: TaskId) -> bool {
        let task = {
            let mut table = self.lock();
            if table.closing.contains(&id) {
                LOGGER.warn(format!(
                    "Task {} requested its removal while being shut down, ignored",
                    id
                ));
                return false;
            }
            let Some(task) = table.take(id) else {
                return false;
            };
            table.pending.remove(&id);
            table.closing.insert(id);
            task
        };
        run_shutdown(task.as_ref());
        self.lock().closing.remove(&id);
        self.changed.notify_waiters();
        LOGGER.debug(format!("Removed {}", task.describe()));
        true
    }

    fn refuse_while_shutting_down(&self, id: TaskId) -> bool {
        if self.lock().shutting_down {
            LOGGER.warn(format!(
                "Removal of task {} requested during manager shutdown, ignored",
                id
            ));
            return true;
        }
        false
    }

    pub(crate) async fn remove_task(&self, id: TaskId) -> bool {
        if self.refuse_while_shutting_down(id) {
            return false;
        }
        self.wait_for_pending_tasks().await;
        self.close_task(id)
    }

    /// Removal requested by the task itself. A task still initializing is
    /// removed right away; otherwise in-flight initializations drain first.
    pub(crate) async fn remove_self(&self, id: TaskId) {
        if self.refuse_while_shutting_down(id) {
            return;
        }
        let still_pending = self.lock().pending.contains(&id);
        if !still_pending {
            self.wait_for_pending_tasks().await;
        }
        self.close_task(id);
    }
}

impl PersistentTaskManager {
    pub fn new(
        store: TaskStore,
        registry: TaskRegistry,
        services: Services,
        options: ManagerOptions,
    ) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                state: Mutex::new(TaskTable::default()),
                changed: Notify::new(),
                store,
                registry,
                services: Arc::new(services),
                options,
            }),
        }
    }

    pub fn services(&self) -> &Services {
        &self.inner.services
    }

    pub fn store(&self) -> &TaskStore {
        &self.inner.store
    }

    /// Restore stored tasks and initialize each of them in order. Records that
    /// cannot be decoded are skipped and a task whose initialization fails is
    /// dropped. Calling it again on a started manager does nothing.
    ///
    /// Restored tasks count as pending until their own `initialize` returns,
    /// so removals and purges issued meanwhile wait for them.
    pub async fn start(&self) -> Result<()> {
        let inner = &self.inner;
        {
            let mut table = inner.lock();
            if table.started {
                LOGGER.warn("Task manager already started");
                return Ok(());
            }
            table.started = true;
            table.workers = Some(TaskQueue::new(TaskQueueConfig {
                queue_bound: inner.options.worker_queue_bound,
            }));
        }

        let records = inner.store.load().await;
        let stored = records.len();
        let mut restored: Vec<TaskEntry> = Vec::with_capacity(stored);
        for record in &records {
            match inner.registry.decode(record) {
                Ok(task) => restored.push((record.id(), task)),
                Err(e) => LOGGER.error(format!("Skipping stored task: {}", e)),
            }
        }

        let loaded: Vec<TaskEntry> = {
            let mut table = inner.lock();
            let mut loaded = Vec::with_capacity(restored.len());
            for (id, task) in restored {
                if table.contains(id) {
                    LOGGER.debug(format!("Duplicate stored task {}, skipped", task.describe()));
                    continue;
                }
                table.tasks.push((id, task.clone()));
                table.pending.insert(id);
                loaded.push((id, task));
            }
            loaded
        };
        LOGGER.info(format!(
            "Loaded {} of {} stored tasks",
            loaded.len(),
            stored
        ));

        for (id, task) in loaded {
            // Abandoned by the stuck-task timeout before its turn came.
            if !inner.lock().pending.contains(&id) {
                LOGGER.debug(format!("Stored task {} was dropped before initializing", id));
                continue;
            }
            let failure = inner.run_initialize(id, task).await;
            inner.initialize_finished(id, failure);
        }
        Ok(())
    }

    /// Register `task` and initialize it on the worker pool. Returns `None`
    /// when the manager is not running or an equal task is already registered.
    pub fn schedule_task(&self, task: Arc<dyn PersistentTask>) -> Option<TaskId> {
        self.inner.schedule_task(task)
    }

    /// Remove a task after every in-flight initialization has finished.
    /// Returns whether the task was registered.
    pub async fn remove_task(&self, id: TaskId) -> bool {
        self.inner.remove_task(id).await
    }

    /// Shut down and forget every task without storing them. New tasks are
    /// refused until the purge is over.
    pub async fn purge_all_tasks(&self) {
        let inner = &self.inner;
        {
            let mut table = inner.lock();
            if table.shutting_down {
                LOGGER.warn("Purge requested during manager shutdown, ignored");
                return;
            }
            if table.purging {
                LOGGER.warn("Task manager is already purging");
                return;
            }
            table.purging = true;
        }
        inner.wait_for_pending_tasks().await;
        let purged: Vec<TaskEntry> = {
            let mut table = inner.lock();
            let purged = std::mem::take(&mut table.tasks);
            table.closing.extend(purged.iter().map(|(id, _)| *id));
            purged
        };
        for (_, task) in &purged {
            run_shutdown(task.as_ref());
        }
        {
            let mut table = inner.lock();
            for (id, _) in &purged {
                table.closing.remove(id);
            }
            table.purging = false;
        }
        inner.changed.notify_waiters();
        LOGGER.info(format!("Purged {} tasks", purged.len()));
    }

    /// Shut every task down and store the remaining set. The manager can be
    /// started again afterwards.
    pub async fn shutdown(&self) {
        let inner = &self.inner;
        {
            let mut table = inner.lock();
            if !table.started {
                LOGGER.debug("Task manager was never started, nothing to shut down");
                return;
            }
            if table.shutting_down {
                LOGGER.warn("Task manager is already shutting down");
                return;
            }
            table.shutting_down = true;
        }

        inner.wait_for_pending_tasks().await;

        let remaining: Vec<TaskEntry> = {
            let mut table = inner.lock();
            let remaining = table.tasks.clone();
            table.closing.extend(remaining.iter().map(|(id, _)| *id));
            remaining
        };
        for (_, task) in &remaining {
            run_shutdown(task.as_ref());
        }

        let mut records = Vec::with_capacity(remaining.len());
        for (_, task) in &remaining {
            match TaskRecord::from_task(task.as_ref()) {
                Ok(record) => records.push(record),
                Err(e) => LOGGER.error(format!(
                    "Unable to encode {}, it will not be stored: {}",
                    task.describe(),
                    e
                )),
            }
        }
        if let Err(e) = inner.store.save(&records).await {
            LOGGER.error(format!("Unable to store tasks: {}", e));
        }

        let workers = {
            let mut table = inner.lock();
            table.tasks.clear();
            table.pending.clear();
            table.closing.clear();
            table.started = false;
            table.shutting_down = false;
            table.workers.take()
        };
        if let Some(workers) = workers {
            let _ = workers.shutdown().await;
        }
        inner.changed.notify_waiters();
        LOGGER.info(format!("Task manager stopped, {} tasks stored", records.len()));
    }

    pub fn is_started(&self) -> bool {
        self.inner.lock().started
    }

    pub fn has_tasks(&self) -> bool {
        !self.inner.lock().tasks.is_empty()
    }

    pub fn active_task_count(&self) -> usize {
        self.inner.lock().tasks.len()
    }

    pub fn has_send_message_task(&self) -> bool {
        self.inner
            .lock()
            .tasks
            .iter()
            .any(|(_, task)| task.kind() == SendMessageTask::KIND)
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.inner.lock().contains(id)
    }

    pub fn is_pending(&self, id: TaskId) -> bool {
        self.inner.lock().pending.contains(&id)
    }

    pub fn pending_task_count(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// Ids and descriptions of the registered tasks, in scheduling order.
    pub fn task_summaries(&self) -> Vec<(TaskId, String)> {
        self.inner
            .lock()
            .tasks
            .iter()
            .map(|(id, task)| (*id, task.describe()))
            .collect()
    }
}

impl std::fmt::Debug for PersistentTaskManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let table = self.inner.lock();
        f.debug_struct("PersistentTaskManager")
            .field("started", &table.started)
            .field("tasks", &table.tasks.len())
            .field("pending", &table.pending.len())
            .finish()
    }
}

/// Work item that runs one scheduled task's `initialize`.
struct InitializeTask {
    id: TaskId,
    task: Arc<dyn PersistentTask>,
    manager: Weak<ManagerInner>,
}

#[async_trait]
impl WorkItem for InitializeTask {
    fn label(&self) -> String {
        format!("Initialization of {}", self.task.describe())
    }

    async fn run(&mut self) -> Result<()> {
        let Some(manager) = self.manager.upgrade() else {
            return Ok(());
        };
        let failure = manager.run_initialize(self.id, self.task.clone()).await;
        manager.initialize_finished(self.id, failure);
        Ok(())
    }
}
