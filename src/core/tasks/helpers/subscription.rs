use crate::global_var::LOGGER;
use std::future::Future;
use std::ops::ControlFlow;
use std::sync::Mutex;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, oneshot};

/// What a listener is handed for each wake-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery<E> {
    Event(E),
    /// The receiver fell behind and this many events were dropped.
    Missed(u64),
}

/// An event listener owned by a task. At most one listener runs per
/// subscription; `cancel` stops it and may be called any number of times.
///
/// The listener is stopped with a signal rather than aborted, so a handler
/// that ends up cancelling its own subscription (e.g. by removing its task)
/// always runs to completion.
#[derive(Debug, Default)]
pub struct Subscription {
    stop: Mutex<Option<oneshot::Sender<()>>>,
}

impl Subscription {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        match self.stop.lock() {
            Ok(stop) => stop.as_ref().is_some_and(|tx| !tx.is_closed()),
            Err(_) => false,
        }
    }

    /// Spawn a listener over `rx`. Returns `false` without spawning when a
    /// listener is already running.
    pub fn listen<E, F, Fut>(&self, mut rx: broadcast::Receiver<E>, mut on_event: F) -> bool
    where
        E: Clone + Send + 'static,
        F: FnMut(Delivery<E>) -> Fut + Send + 'static,
        Fut: Future<Output = ControlFlow<()>> + Send + 'static,
    {
        let Ok(mut stop) = self.stop.lock() else {
            return false;
        };
        if stop.as_ref().is_some_and(|tx| !tx.is_closed()) {
            return false;
        }
        let (tx, mut stop_rx) = oneshot::channel::<()>();
        *stop = Some(tx);
        drop(stop);

        tokio::spawn(async move {
            loop {
                let delivery = tokio::select! {
                    biased;
                    _ = &mut stop_rx => break,
                    received = rx.recv() => match received {
                        Ok(event) => Delivery::Event(event),
                        Err(RecvError::Lagged(n)) => Delivery::Missed(n),
                        Err(RecvError::Closed) => {
                            LOGGER.debug("event source closed, listener stopped");
                            break;
                        }
                    },
                };
                if on_event(delivery).await.is_break() {
                    break;
                }
            }
        });
        true
    }

    pub fn cancel(&self) {
        let tx = match self.stop.lock() {
            Ok(mut stop) => stop.take(),
            Err(_) => None,
        };
        if let Some(tx) = tx {
            let _ = tx.send(());
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(30)).await;
    }

    #[tokio::test]
    async fn listener_sees_events_until_cancelled() {
        let (tx, rx) = broadcast::channel::<u32>(8);
        let seen = Arc::new(AtomicUsize::new(0));
        let sub = Subscription::new();

        let counter = seen.clone();
        assert!(sub.listen(rx, move |_| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                ControlFlow::Continue(())
            }
        }));
        assert!(sub.is_active());
        assert!(!sub.listen(tx.subscribe(), |_| async { ControlFlow::Continue(()) }));

        tx.send(1).unwrap();
        tx.send(2).unwrap();
        settle().await;
        assert_eq!(seen.load(Ordering::SeqCst), 2);

        sub.cancel();
        sub.cancel();
        settle().await;
        let _ = tx.send(3);
        settle().await;
        assert_eq!(seen.load(Ordering::SeqCst), 2);
        assert!(!sub.is_active());
    }

    #[tokio::test]
    async fn break_ends_listener_and_allows_resubscribe() {
        let (tx, rx) = broadcast::channel::<u32>(8);
        let sub = Subscription::new();
        sub.listen(rx, |_| async { ControlFlow::Break(()) });
        tx.send(1).unwrap();
        settle().await;
        assert!(!sub.is_active());
        assert!(sub.listen(tx.subscribe(), |_| async { ControlFlow::Continue(()) }));
    }

    #[tokio::test]
    async fn lagging_receiver_reports_missed_events() {
        let (tx, rx) = broadcast::channel::<u32>(1);
        tx.send(1).unwrap();
        tx.send(2).unwrap();
        let missed = Arc::new(AtomicUsize::new(0));
        let m = missed.clone();
        let sub = Subscription::new();
        sub.listen(rx, move |delivery| {
            let m = m.clone();
            async move {
                if let Delivery::Missed(n) = delivery {
                    m.fetch_add(n as usize, Ordering::SeqCst);
                }
                ControlFlow::Continue(())
            }
        });
        settle().await;
        assert_eq!(missed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cancel_without_listener_is_harmless() {
        let sub = Subscription::new();
        sub.cancel();
        assert!(!sub.is_active());
    }
}
