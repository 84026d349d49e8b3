pub mod messages;
pub mod services;
pub mod session;

pub use messages::PeerMessage;
pub use services::{
    AccountService, FolderService, RecordingServices, RemoteCallRecord, SecurityService,
};
pub use session::{LoopbackSession, SessionEvent, SessionProvider};
