use crate::core::tasks::helpers::{Delivery, Subscription};
use crate::core::tasks::{PersistentTask, Services, TaskContext};
use crate::err::Result;
use crate::global_var::LOGGER;
use crate::network::SessionProvider;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::ops::ControlFlow;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Relevance {
    Relevant,
    /// The call no longer makes sense and the task should be dropped.
    Obsolete(String),
}

/// Parameters of one call against a remote service.
#[async_trait]
pub trait RemoteCall: Serialize + DeserializeOwned + Send + Sync + 'static {
    const KIND: &'static str;

    fn describe(&self) -> String;

    async fn still_relevant(&self, _services: &Services) -> Relevance {
        Relevance::Relevant
    }

    /// Perform the call. Service stubs are fetched from `session` on every
    /// attempt.
    async fn call(&self, session: &dyn SessionProvider) -> Result<()>;
}

#[derive(Serialize, Deserialize)]
struct Payload<C> {
    call: C,
    expires_at: Option<DateTime<Utc>>,
}

enum Attempt {
    Done,
    Failed,
    NotConnected,
}

/// Retries a [`RemoteCall`] until it succeeds, the task expires or it is removed.
///
/// The first attempt happens during `initialize`. Every later attempt is
/// triggered by a session event that may have made the server reachable.
pub struct RemoteCallTask<C: RemoteCall> {
    call: Arc<C>,
    expires_at: Option<DateTime<Utc>>,
    subscription: Subscription,
}

impl<C: RemoteCall> RemoteCallTask<C> {
    pub fn new(call: C) -> Self {
        Self::with_expiry(call, None)
    }

    pub fn with_expiry(call: C, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            call: Arc::new(call),
            expires_at,
            subscription: Subscription::new(),
        }
    }

    pub fn call(&self) -> &C {
        &self.call
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let (payload, _) = bincode::serde::decode_from_slice::<Payload<C>, _>(
            bytes,
            bincode::config::standard(),
        )?;
        Ok(Self::with_expiry(payload.call, payload.expires_at))
    }

    async fn attempt(call: &C, session: &dyn SessionProvider) -> Attempt {
        if !session.is_connected() {
            LOGGER.debug(format!(
                "Not connected, postponing remote call {}",
                call.describe()
            ));
            return Attempt::NotConnected;
        }
        match call.call(session).await {
            Ok(()) => {
                LOGGER.info(format!("Remote call {} succeeded", call.describe()));
                Attempt::Done
            }
            Err(e) => {
                LOGGER.warn(format!(
                    "Remote call {} failed, retrying on next session event: {}",
                    call.describe(),
                    e
                ));
                Attempt::Failed
            }
        }
    }
}

#[async_trait]
impl<C: RemoteCall> PersistentTask for RemoteCallTask<C> {
    fn kind(&self) -> &'static str {
        C::KIND
    }

    fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    fn encode(&self) -> Result<Vec<u8>> {
        let payload = Payload {
            call: &*self.call,
            expires_at: self.expires_at,
        };
        Ok(bincode::serde::encode_to_vec(
            &payload,
            bincode::config::standard(),
        )?)
    }

    async fn initialize(&self, ctx: TaskContext) -> Result<()> {
        let services = ctx.services().clone();
        if !services.remote_service.is_enabled() {
            LOGGER.info(format!(
                "Remote services disabled, dropping {}",
                self.describe()
            ));
            ctx.remove().await;
            return Ok(());
        }
        if self.is_expired() {
            LOGGER.info(format!("{} expired, dropping", self.describe()));
            ctx.remove().await;
            return Ok(());
        }
        if let Relevance::Obsolete(reason) = self.call.still_relevant(&services).await {
            LOGGER.warn(format!("Dropping {}: {}", self.describe(), reason));
            ctx.remove().await;
            return Ok(());
        }

        // Subscribe first so an event fired during the attempt is not lost.
        let rx = services.session.subscribe();
        if let Attempt::Done = Self::attempt(&self.call, services.session.as_ref()).await {
            ctx.remove().await;
            return Ok(());
        }

        let call = self.call.clone();
        let expires_at = self.expires_at;
        self.subscription.listen(rx, move |delivery| {
            let call = call.clone();
            let ctx = ctx.clone();
            async move {
                match &delivery {
                    Delivery::Event(event) if !event.may_enable_services() => {
                        return ControlFlow::Continue(());
                    }
                    Delivery::Missed(n) => LOGGER.debug(format!(
                        "Missed {} session events, retrying {}",
                        n,
                        call.describe()
                    )),
                    Delivery::Event(_) => {}
                }
                if expires_at.is_some_and(|at| Utc::now() > at) {
                    LOGGER.info(format!("{} expired before retry, dropping", call.describe()));
                    ctx.remove().await;
                    return ControlFlow::Break(());
                }
                let session = ctx.services().session.clone();
                match Self::attempt(&call, session.as_ref()).await {
                    Attempt::Done => {
                        ctx.remove().await;
                        ControlFlow::Break(())
                    }
                    Attempt::Failed | Attempt::NotConnected => ControlFlow::Continue(()),
                }
            }
        });
        Ok(())
    }

    fn shutdown(&self) {
        self.subscription.cancel();
    }

    fn describe(&self) -> String {
        format!("{}[{}]", C::KIND, self.call.describe())
    }
}
