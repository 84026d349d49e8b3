use crate::core::tasks::{RemoteCall, RemoteCallTask};
use crate::err::Result;
use crate::network::SessionProvider;
use crate::types::{AccountInfo, NodeInfo};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Unlink a computer from an account on the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveComputerFromAccount {
    pub account: AccountInfo,
    pub node: NodeInfo,
}

pub type RemoveComputerFromAccountTask = RemoteCallTask<RemoveComputerFromAccount>;

#[async_trait]
impl RemoteCall for RemoveComputerFromAccount {
    const KIND: &'static str = "RemoveComputerFromAccountTask";

    fn describe(&self) -> String {
        format!("remove computer {} from {}", self.node, self.account)
    }

    async fn call(&self, session: &dyn SessionProvider) -> Result<()> {
        session
            .account_service()?
            .remove_computer(&self.account, &self.node)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tasks::PersistentTask;
    use crate::network::{LoopbackSession, RemoteCallRecord};

    #[tokio::test]
    async fn call_goes_to_account_service() {
        let session = LoopbackSession::new();
        let call = RemoveComputerFromAccount {
            account: AccountInfo::new("carol"),
            node: NodeInfo::new("n-9", "laptop"),
        };
        session.connect();
        call.call(&session).await.unwrap();
        assert_eq!(
            session.services().calls(),
            vec![RemoteCallRecord::RemoveComputer(
                AccountInfo::new("carol"),
                NodeInfo::new("n-9", "laptop")
            )]
        );
    }

    #[test]
    fn payload_survives_encode_decode_with_expiry() {
        let expiry = chrono::Utc::now() + chrono::Duration::days(3);
        let task = RemoveComputerFromAccountTask::with_expiry(
            RemoveComputerFromAccount {
                account: AccountInfo::new("carol"),
                node: NodeInfo::new("n-9", "laptop"),
            },
            Some(expiry),
        );
        let restored = RemoveComputerFromAccountTask::decode(&task.encode().unwrap()).unwrap();
        assert_eq!(restored.expires_at(), Some(expiry));
        assert_eq!(restored.call(), task.call());
        assert_eq!(restored.kind(), "RemoveComputerFromAccountTask");
    }
}
