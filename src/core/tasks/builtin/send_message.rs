use crate::core::tasks::helpers::{Delivery, Subscription};
use crate::core::tasks::{PersistentTask, TaskContext};
use crate::core::topology::{NodeDirectory, NodeEvent};
use crate::err::Result;
use crate::global_var::LOGGER;
use crate::network::PeerMessage;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::ops::ControlFlow;
use std::sync::Arc;

#[derive(Serialize, Deserialize)]
struct Payload<M> {
    message: M,
    target_id: String,
    expires_at: Option<DateTime<Utc>>,
}

/// Deliver a message to a peer the next time it is online.
pub struct SendMessageTask {
    message: Arc<PeerMessage>,
    target_id: String,
    expires_at: Option<DateTime<Utc>>,
    subscription: Subscription,
}

impl SendMessageTask {
    pub const KIND: &'static str = "SendMessageTask";

    pub fn new(message: PeerMessage, target_id: impl Into<String>) -> Self {
        Self::with_expiry(message, target_id, None)
    }

    pub fn with_expiry(
        message: PeerMessage,
        target_id: impl Into<String>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            message: Arc::new(message),
            target_id: target_id.into(),
            expires_at,
            subscription: Subscription::new(),
        }
    }

    pub fn message(&self) -> &PeerMessage {
        &self.message
    }

    pub fn target_id(&self) -> &str {
        &self.target_id
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let (payload, _) = bincode::serde::decode_from_slice::<Payload<PeerMessage>, _>(
            bytes,
            bincode::config::standard(),
        )?;
        Ok(Self::with_expiry(
            payload.message,
            payload.target_id,
            payload.expires_at,
        ))
    }

    pub fn decode_boxed(bytes: &[u8]) -> Result<Arc<dyn PersistentTask>> {
        Ok(Arc::new(Self::decode(bytes)?))
    }

    async fn try_deliver(nodes: &dyn NodeDirectory, target_id: &str, message: &PeerMessage) -> bool {
        if !nodes.is_connected(target_id).await {
            return false;
        }
        match nodes.send_message(target_id, message).await {
            Ok(()) => {
                LOGGER.info(format!("Delivered {} to {}", message, target_id));
                true
            }
            Err(e) => {
                LOGGER.warn(format!(
                    "Unable to deliver {} to {}: {}",
                    message, target_id, e
                ));
                false
            }
        }
    }
}

#[async_trait]
impl PersistentTask for SendMessageTask {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    fn encode(&self) -> Result<Vec<u8>> {
        let payload = Payload {
            message: &*self.message,
            target_id: self.target_id.clone(),
            expires_at: self.expires_at,
        };
        Ok(bincode::serde::encode_to_vec(
            &payload,
            bincode::config::standard(),
        )?)
    }

    async fn initialize(&self, ctx: TaskContext) -> Result<()> {
        if self.is_expired() {
            LOGGER.info(format!("{} expired, dropping", self.describe()));
            ctx.remove().await;
            return Ok(());
        }
        let nodes = ctx.services().nodes.clone();
        let rx = nodes.subscribe();
        if Self::try_deliver(nodes.as_ref(), &self.target_id, &self.message).await {
            ctx.remove().await;
            return Ok(());
        }
        nodes.mark_for_immediate_connect(&self.target_id).await;

        let target_id = self.target_id.clone();
        let message = self.message.clone();
        let expires_at = self.expires_at;
        self.subscription.listen(rx, move |delivery| {
            let target_id = target_id.clone();
            let message = message.clone();
            let ctx = ctx.clone();
            async move {
                match delivery {
                    Delivery::Event(NodeEvent::Connected(id)) if id == target_id => {}
                    Delivery::Missed(_) => {}
                    Delivery::Event(_) => return ControlFlow::Continue(()),
                }
                if expires_at.is_some_and(|at| Utc::now() > at) {
                    LOGGER.info(format!("Message for {} expired, dropping", target_id));
                    ctx.remove().await;
                    return ControlFlow::Break(());
                }
                let nodes = ctx.services().nodes.clone();
                if Self::try_deliver(nodes.as_ref(), &target_id, &message).await {
                    ctx.remove().await;
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            }
        });
        Ok(())
    }

    fn shutdown(&self) {
        self.subscription.cancel();
    }

    fn describe(&self) -> String {
        format!("{}[{} -> {}]", Self::KIND, self.message, self.target_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FolderInfo, NodeInfo};

    #[test]
    fn encoding_covers_target_and_expiry() {
        let msg = PeerMessage::RevertedFile {
            folder: FolderInfo::new("f-1", "Docs"),
            file_name: "notes.txt".into(),
        };
        let a = SendMessageTask::new(msg.clone(), "n-1");
        let b = SendMessageTask::new(msg.clone(), "n-2");
        let c = SendMessageTask::with_expiry(msg.clone(), "n-1", Some(Utc::now()));
        assert_ne!(a.encode().unwrap(), b.encode().unwrap());
        assert_ne!(a.encode().unwrap(), c.encode().unwrap());
        assert_eq!(a.encode().unwrap(), SendMessageTask::new(msg, "n-1").encode().unwrap());
    }

    #[test]
    fn decode_restores_message() {
        let msg = PeerMessage::AddFriendNotification {
            from: NodeInfo::new("n-0", "desktop"),
            personal_message: Some("hi".into()),
        };
        let task = SendMessageTask::new(msg.clone(), "n-5");
        let restored = SendMessageTask::decode(&task.encode().unwrap()).unwrap();
        assert_eq!(restored.message(), &msg);
        assert_eq!(restored.target_id(), "n-5");
        assert_eq!(restored.expires_at(), None);
    }
}
