use crate::core::topology::{NodeDirectory, NodeEvent};
use crate::err::Result;
use crate::global_var::LOGGER;
use crate::network::PeerMessage;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::{Mutex, RwLock, broadcast};

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

pub struct Peer {
    pub identifier: String,
    pub nick: String,

    pub is_connected: AtomicBool,
    pub connect_requested: AtomicBool,
    pub last_seen_ms: AtomicU64,

    /// Messages handed to this peer's connection, oldest first.
    delivered: Mutex<Vec<PeerMessage>>,
}

impl Debug for Peer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let last_seen = DateTime::<Utc>::from_timestamp_millis(
            self.last_seen_ms.load(Ordering::Relaxed) as i64,
        )
        .unwrap_or_default();
        write!(
            f,
            "Peer {{ identifier: {}, nick: {}, connected: {}, connect_requested: {}, last_seen: {} }}",
            &self.identifier,
            &self.nick,
            self.is_connected.load(Ordering::Relaxed),
            self.connect_requested.load(Ordering::Relaxed),
            last_seen.format("%Y-%m-%d %H:%M:%S")
        )
    }
}

impl Peer {
    pub fn new(identifier: String, nick: String) -> Self {
        Self {
            identifier,
            nick,
            is_connected: AtomicBool::new(false),
            connect_requested: AtomicBool::new(false),
            last_seen_ms: AtomicU64::new(now_ms()),
            delivered: Mutex::new(Vec::new()),
        }
    }

    pub async fn delivered_messages(&self) -> Vec<PeerMessage> {
        self.delivered.lock().await.clone()
    }
}

/// Known peers and their connection state. Emits a [`NodeEvent`] whenever a
/// peer connects or disconnects.
pub struct PeerTable {
    peers: RwLock<HashMap<String, Arc<Peer>>>,
    events: broadcast::Sender<NodeEvent>,
}

impl Default for PeerTable {
    fn default() -> Self {
        Self::new()
    }
}

impl PeerTable {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            peers: RwLock::new(HashMap::new()),
            events,
        }
    }

    pub async fn get_peer(&self, identifier: &str) -> Option<Arc<Peer>> {
        let table = self.peers.read().await;
        table.get(identifier).cloned()
    }

    /// Mark the peer connected (registering it if unknown) and notify subscribers.
    pub async fn peer_connected(&self, identifier: &str, nick: &str) {
        let peer = {
            let mut table = self.peers.write().await;
            table
                .entry(identifier.to_string())
                .or_insert_with(|| Arc::new(Peer::new(identifier.to_string(), nick.to_string())))
                .clone()
        };
        peer.last_seen_ms.store(now_ms(), Ordering::Relaxed);
        peer.connect_requested.store(false, Ordering::Relaxed);
        if !peer.is_connected.swap(true, Ordering::SeqCst) {
            LOGGER.debug(format!("Peer connected: {:?}", peer));
            let _ = self.events.send(NodeEvent::Connected(identifier.to_string()));
        }
    }

    pub async fn peer_disconnected(&self, identifier: &str) -> Result<()> {
        let peer = self
            .get_peer(identifier)
            .await
            .ok_or_else(|| format!("Peer {} does not exist", identifier))?;
        if peer.is_connected.swap(false, Ordering::SeqCst) {
            LOGGER.debug(format!("Peer disconnected: {:?}", peer));
            let _ = self
                .events
                .send(NodeEvent::Disconnected(identifier.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl NodeDirectory for PeerTable {
    async fn is_connected(&self, node_id: &str) -> bool {
        match self.get_peer(node_id).await {
            Some(peer) => peer.is_connected.load(Ordering::SeqCst),
            None => false,
        }
    }

    async fn mark_for_immediate_connect(&self, node_id: &str) {
        let peer = {
            let mut table = self.peers.write().await;
            table
                .entry(node_id.to_string())
                .or_insert_with(|| Arc::new(Peer::new(node_id.to_string(), String::new())))
                .clone()
        };
        if !peer.is_connected.load(Ordering::SeqCst) {
            peer.connect_requested.store(true, Ordering::Relaxed);
        }
    }

    async fn send_message(&self, node_id: &str, message: &PeerMessage) -> Result<()> {
        let peer = self
            .get_peer(node_id)
            .await
            .ok_or_else(|| format!("Peer {} does not exist", node_id))?;
        if !peer.is_connected.load(Ordering::SeqCst) {
            return Err(format!("Peer {} is not connected", node_id).into());
        }
        peer.delivered.lock().await.push(message.clone());
        peer.last_seen_ms.store(now_ms(), Ordering::Relaxed);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<NodeEvent> {
        self.events.subscribe()
    }
}

impl Debug for PeerTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.peers.try_read() {
            Ok(table) => {
                writeln!(f, "PeerTable {{ peers_len: {} }}", table.len())?;
                for peer in table.values() {
                    writeln!(f, "\t{:?}", peer)?;
                }
                write!(f, "END")
            }
            Err(_) => write!(f, "PeerTable {{ <locked> }}"),
        }
    }
}
