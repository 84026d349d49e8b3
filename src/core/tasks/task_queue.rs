use crate::err::Result;
use crate::global_var::LOGGER;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Something the queue can run in the background.
#[async_trait]
pub trait WorkItem: Send + 'static {
    /// Shown in the log when `run` fails.
    fn label(&self) -> String;

    async fn run(&mut self) -> Result<()>;
}

/// Bounded work queue drained by one consumer. Each accepted item is handled
/// in its own tokio task, so slow items never hold up the ones behind them.
#[derive(Debug)]
pub struct TaskQueue {
    tx: mpsc::Sender<QueueMsg>,
    worker: JoinHandle<()>,
}

/// Cloneable handle for enqueuing work from any thread.
#[derive(Clone, Debug)]
pub struct TaskQueueSender {
    tx: mpsc::Sender<QueueMsg>,
}

impl TaskQueueSender {
    /// Waits for room in the queue.
    pub async fn send(&self, item: Box<dyn WorkItem>) -> Result<()> {
        if self.tx.send(QueueMsg::Item(item)).await.is_err() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "task queue worker is not running",
            )
            .into());
        }
        Ok(())
    }

    /// Fails immediately if the queue is full or closed.
    pub fn try_send(&self, item: Box<dyn WorkItem>) -> Result<()> {
        match self.tx.try_send(QueueMsg::Item(item)) {
            Ok(_) => Ok(()),
            Err(e) => {
                use std::io::{Error, ErrorKind};
                let kind = match e {
                    mpsc::error::TrySendError::Full(_) => ErrorKind::WouldBlock,
                    mpsc::error::TrySendError::Closed(_) => ErrorKind::BrokenPipe,
                };
                Err(Error::new(kind, "task queue refused work item").into())
            }
        }
    }
}

#[derive(Clone, Debug)]
pub struct TaskQueueConfig {
    /// Max queued items before senders see backpressure. 0 means effectively unbounded.
    pub queue_bound: usize,
}

impl Default for TaskQueueConfig {
    fn default() -> Self {
        Self { queue_bound: 1024 }
    }
}

enum QueueMsg {
    Item(Box<dyn WorkItem>),
    Shutdown,
}

impl std::fmt::Debug for QueueMsg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueMsg::Item(_) => write!(f, "Item"),
            QueueMsg::Shutdown => write!(f, "Shutdown"),
        }
    }
}

impl TaskQueue {
    /// Must be called from within a tokio runtime.
    pub fn new(config: TaskQueueConfig) -> Self {
        // tokio caps bounded channels at usize::MAX >> 3
        let bound = if config.queue_bound == 0 {
            usize::MAX >> 4
        } else {
            config.queue_bound
        };
        let (tx, mut rx) = mpsc::channel(bound);

        let worker = tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                match msg {
                    QueueMsg::Item(item) => Self::dispatch(item),
                    QueueMsg::Shutdown => break,
                }
            }
            LOGGER.trace("task queue consumer stopped");
        });

        Self { tx, worker }
    }

    fn dispatch(mut item: Box<dyn WorkItem>) {
        tokio::spawn(async move {
            if let Err(e) = item.run().await {
                LOGGER.error(format!("{} failed: {}", item.label(), e));
            }
        });
    }

    pub fn sender(&self) -> TaskQueueSender {
        TaskQueueSender {
            tx: self.tx.clone(),
        }
    }

    /// Stops accepting work once everything queued so far has been dispatched.
    pub async fn shutdown(self) -> Result<()> {
        let _ = self.tx.send(QueueMsg::Shutdown).await;
        let _ = self.worker.await;
        Ok(())
    }
}
