use crate::err::Result;
use crate::global_var::LOGGER;
use crate::network::services::{
    AccountService, FolderService, RecordingServices, SecurityService,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::broadcast;

/// Lifecycle changes of the connection to the remote server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    Connected,
    Disconnected,
    LoggedIn,
    AccountUpdated,
}

impl SessionEvent {
    /// Whether the event may have made remote services reachable.
    pub fn may_enable_services(self) -> bool {
        !matches!(self, SessionEvent::Disconnected)
    }
}

/// Live connection to the remote server. Service stubs are only handed out
/// while connected.
pub trait SessionProvider: Send + Sync {
    fn is_connected(&self) -> bool;
    fn is_logged_in(&self) -> bool;
    fn subscribe(&self) -> broadcast::Receiver<SessionEvent>;
    fn folder_service(&self) -> Result<Arc<dyn FolderService>>;
    fn account_service(&self) -> Result<Arc<dyn AccountService>>;
    fn security_service(&self) -> Result<Arc<dyn SecurityService>>;
}

/// In-process session whose connectivity is switched by hand. Calls go to a
/// shared [`RecordingServices`].
#[derive(Debug)]
pub struct LoopbackSession {
    connected: AtomicBool,
    logged_in: AtomicBool,
    events: broadcast::Sender<SessionEvent>,
    services: Arc<RecordingServices>,
}

impl Default for LoopbackSession {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackSession {
    /// A disconnected session.
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            connected: AtomicBool::new(false),
            logged_in: AtomicBool::new(false),
            events,
            services: Arc::new(RecordingServices::new()),
        }
    }

    pub fn services(&self) -> &Arc<RecordingServices> {
        &self.services
    }

    pub fn connect(&self) {
        self.connected.store(true, Ordering::SeqCst);
        self.emit(SessionEvent::Connected);
    }

    pub fn login(&self) {
        self.connected.store(true, Ordering::SeqCst);
        self.logged_in.store(true, Ordering::SeqCst);
        self.emit(SessionEvent::LoggedIn);
    }

    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.logged_in.store(false, Ordering::SeqCst);
        self.emit(SessionEvent::Disconnected);
    }

    /// Change connectivity without telling subscribers.
    pub fn set_connected_silently(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn account_updated(&self) {
        self.emit(SessionEvent::AccountUpdated);
    }

    fn emit(&self, event: SessionEvent) {
        let receivers = self.events.send(event).unwrap_or(0);
        LOGGER.trace(format!(
            "Session event {:?} delivered to {} subscribers",
            event, receivers
        ));
    }

    fn connected_services(&self) -> Result<Arc<RecordingServices>> {
        if self.is_connected() {
            Ok(self.services.clone())
        } else {
            Err("not connected to the remote server".into())
        }
    }
}

impl SessionProvider for LoopbackSession {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn is_logged_in(&self) -> bool {
        self.logged_in.load(Ordering::SeqCst)
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    fn folder_service(&self) -> Result<Arc<dyn FolderService>> {
        Ok(self.connected_services()?)
    }

    fn account_service(&self) -> Result<Arc<dyn AccountService>> {
        Ok(self.connected_services()?)
    }

    fn security_service(&self) -> Result<Arc<dyn SecurityService>> {
        Ok(self.connected_services()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn services_require_connection() {
        let session = LoopbackSession::new();
        assert!(session.folder_service().is_err());
        session.connect();
        assert!(session.folder_service().is_ok());
        assert!(!session.is_logged_in());
        session.disconnect();
        assert!(session.account_service().is_err());
    }

    #[tokio::test]
    async fn subscribers_see_lifecycle_events() {
        let session = LoopbackSession::new();
        let mut rx = session.subscribe();
        session.login();
        session.account_updated();
        session.disconnect();
        assert_eq!(rx.recv().await.unwrap(), SessionEvent::LoggedIn);
        assert_eq!(rx.recv().await.unwrap(), SessionEvent::AccountUpdated);
        assert_eq!(rx.recv().await.unwrap(), SessionEvent::Disconnected);
        assert!(!SessionEvent::Disconnected.may_enable_services());
        assert!(SessionEvent::LoggedIn.may_enable_services());
    }
}
