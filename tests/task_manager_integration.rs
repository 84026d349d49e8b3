use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use persistent_tasks::core::tasks::TaskRecord;
use persistent_tasks::core::tasks::builtin::{
    CreateFolderOnServer, CreateFolderOnServerTask, FolderObtainPermission,
    FolderObtainPermissionTask, RemoveComputerFromAccount, RemoveComputerFromAccountTask,
};
use persistent_tasks::core::topology::PeerTable;
use persistent_tasks::fs::JoinedFolders;
use persistent_tasks::network::{LoopbackSession, PeerMessage, RemoteCallRecord};
use persistent_tasks::types::{AccountInfo, FolderInfo, NodeInfo};
use persistent_tasks::utilities::temp_dir::TmpDirGuard;
use persistent_tasks::{
    ManagerOptions, PersistentTaskManager, RemoteServiceToggle, SendMessageTask, Services,
    TaskRegistry, TaskStore,
};

struct Harness {
    session: Arc<LoopbackSession>,
    peers: Arc<PeerTable>,
    folders: Arc<JoinedFolders>,
    toggle: RemoteServiceToggle,
}

impl Harness {
    fn new() -> Self {
        Self {
            session: Arc::new(LoopbackSession::new()),
            peers: Arc::new(PeerTable::new()),
            folders: Arc::new(JoinedFolders::new()),
            toggle: RemoteServiceToggle::new(true),
        }
    }

    fn manager(&self, store: TaskStore) -> PersistentTaskManager {
        let services = Services::new(
            self.session.clone(),
            self.peers.clone(),
            self.folders.clone(),
            self.toggle.clone(),
        );
        PersistentTaskManager::new(
            store,
            TaskRegistry::default(),
            services,
            ManagerOptions::default(),
        )
    }
}

async fn eventually(mut cond: impl FnMut() -> bool) -> bool {
    for _ in 0..400 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    cond()
}

fn frame(record: &TaskRecord) -> Vec<u8> {
    let body = bincode::serde::encode_to_vec(record, bincode::config::standard()).unwrap();
    let mut out = (body.len() as u32).to_le_bytes().to_vec();
    out.extend(body);
    out
}

fn remove_computer_call() -> RemoveComputerFromAccount {
    RemoveComputerFromAccount {
        account: AccountInfo::new("alice"),
        node: NodeInfo::new("n-old", "old laptop"),
    }
}

#[tokio::test]
async fn send_message_waits_for_target_then_delivers() {
    let h = Harness::new();
    let m = h.manager(TaskStore::detached());
    m.start().await.unwrap();

    let msg = PeerMessage::AddFriendNotification {
        from: NodeInfo::new("n-me", "desktop"),
        personal_message: Some("hello".into()),
    };
    let id = m
        .schedule_task(Arc::new(SendMessageTask::new(msg.clone(), "n-target")))
        .expect("scheduled");
    assert!(m.is_pending(id));
    assert!(m.has_send_message_task());

    assert!(eventually(|| !m.is_pending(id)).await);
    assert!(m.contains(id));
    let peer = h.peers.get_peer("n-target").await.expect("marked for connect");
    assert!(peer.connect_requested.load(Ordering::SeqCst));
    assert!(peer.delivered_messages().await.is_empty());

    h.peers.peer_connected("n-other", "someone").await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(m.contains(id));

    h.peers.peer_connected("n-target", "friend").await;
    assert!(eventually(|| !m.contains(id)).await);
    assert_eq!(peer.delivered_messages().await, vec![msg]);
    assert!(!m.has_send_message_task());
    m.shutdown().await;
}

#[tokio::test]
async fn remote_call_retries_when_session_connects() {
    let h = Harness::new();
    let m = h.manager(TaskStore::detached());
    m.start().await.unwrap();

    let id = m
        .schedule_task(Arc::new(RemoveComputerFromAccountTask::new(
            remove_computer_call(),
        )))
        .unwrap();
    assert!(eventually(|| !m.is_pending(id)).await);
    assert!(m.contains(id));
    assert_eq!(h.session.services().attempts(), 0);

    h.session.connect();
    assert!(eventually(|| !m.contains(id)).await);
    assert_eq!(
        h.session.services().calls(),
        vec![RemoteCallRecord::RemoveComputer(
            AccountInfo::new("alice"),
            NodeInfo::new("n-old", "old laptop")
        )]
    );
    m.shutdown().await;
}

#[tokio::test]
async fn failed_call_is_retried_on_account_update_only() {
    let h = Harness::new();
    h.session.connect();
    h.session.services().fail_next(1);
    let m = h.manager(TaskStore::detached());
    m.start().await.unwrap();

    let id = m
        .schedule_task(Arc::new(RemoveComputerFromAccountTask::new(
            remove_computer_call(),
        )))
        .unwrap();
    assert!(eventually(|| !m.is_pending(id)).await);
    assert!(m.contains(id));
    assert_eq!(h.session.services().attempts(), 1);

    h.session.disconnect();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(h.session.services().attempts(), 1);

    h.session.set_connected_silently(true);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(h.session.services().attempts(), 1);

    h.session.account_updated();
    assert!(eventually(|| !m.contains(id)).await);
    assert_eq!(h.session.services().calls().len(), 1);
    m.shutdown().await;
}

#[tokio::test]
async fn disabled_service_expired_and_obsolete_tasks_drop_themselves() {
    let h = Harness::new();
    h.session.login();
    let m = h.manager(TaskStore::detached());
    m.start().await.unwrap();

    h.toggle.set_enabled(false);
    let disabled = m
        .schedule_task(Arc::new(RemoveComputerFromAccountTask::new(
            remove_computer_call(),
        )))
        .unwrap();
    assert!(eventually(|| !m.contains(disabled)).await);
    h.toggle.set_enabled(true);

    let expired = m
        .schedule_task(Arc::new(RemoveComputerFromAccountTask::with_expiry(
            remove_computer_call(),
            Some(Utc::now() - ChronoDuration::minutes(1)),
        )))
        .unwrap();
    assert!(eventually(|| !m.contains(expired)).await);

    let obsolete = m
        .schedule_task(Arc::new(FolderObtainPermissionTask::new(
            FolderObtainPermission {
                account: AccountInfo::new("alice"),
                folder: FolderInfo::new("f-gone", "Gone"),
            },
        )))
        .unwrap();
    assert!(eventually(|| !m.contains(obsolete)).await);

    assert!(eventually(|| m.pending_task_count() == 0).await);
    assert!(h.session.services().calls().is_empty());
    assert!(!m.has_tasks());
    m.shutdown().await;
}

#[tokio::test]
async fn unfinished_tasks_survive_restart_with_expiry() {
    let dir = TmpDirGuard::new("integration_restart");
    let misc = dir.join("misc");
    let expiry = Utc::now() + ChronoDuration::days(14);

    let h = Harness::new();
    h.folders.join("f-1");
    let m = h.manager(TaskStore::open(&misc, "default"));
    m.start().await.unwrap();
    m.schedule_task(Arc::new(SendMessageTask::with_expiry(
        PeerMessage::Text("later".into()),
        "n-away",
        Some(expiry),
    )))
    .unwrap();
    m.schedule_task(Arc::new(CreateFolderOnServerTask::new(
        CreateFolderOnServer::new(FolderInfo::new("f-1", "Docs")).with_archive_versions(3),
    )))
    .unwrap();
    assert!(eventually(|| m.pending_task_count() == 0).await);
    assert_eq!(m.active_task_count(), 2);
    m.shutdown().await;
    assert!(!m.has_tasks());

    let store = TaskStore::open(&misc, "default");
    let registry = TaskRegistry::default();
    let records = store.load().await;
    assert_eq!(records.len(), 2);
    let first = registry.decode(&records[0]).unwrap();
    assert_eq!(first.kind(), SendMessageTask::KIND);
    assert_eq!(first.expires_at(), Some(expiry));

    let h2 = Harness::new();
    h2.folders.join("f-1");
    let restarted = h2.manager(store);
    restarted.start().await.unwrap();
    assert_eq!(restarted.active_task_count(), 2);
    assert!(restarted.has_send_message_task());

    h2.session.connect();
    assert!(eventually(|| restarted.active_task_count() == 1).await);
    assert_eq!(
        h2.session.services().calls(),
        vec![
            RemoteCallRecord::CreateFolder(FolderInfo::new("f-1", "Docs")),
            RemoteCallRecord::SetArchiveMode(FolderInfo::new("f-1", "Docs"), 3),
        ]
    );
    restarted.shutdown().await;
}

#[tokio::test]
async fn corrupt_record_between_valid_ones_is_skipped() {
    let dir = TmpDirGuard::new("integration_corrupt");
    let misc = dir.join("misc");
    let store = TaskStore::open(&misc, "default");

    let a = SendMessageTask::new(PeerMessage::Text("a".into()), "n-1");
    let b = SendMessageTask::new(PeerMessage::Text("b".into()), "n-2");
    let mut bytes = frame(&TaskRecord::from_task(&a).unwrap());
    bytes.extend_from_slice(&5u32.to_le_bytes());
    bytes.extend_from_slice(&[0xde, 0xad, 0xbe, 0xef, 0xff]);
    bytes.extend(frame(&TaskRecord {
        kind: "RetiredTask".into(),
        payload: vec![1, 2, 3],
    }));
    bytes.extend(frame(&TaskRecord::from_task(&b).unwrap()));
    std::fs::write(store.path().unwrap(), bytes).unwrap();

    let kinds: Vec<String> = store
        .inspect()
        .await
        .unwrap()
        .into_iter()
        .map(|(kind, _)| kind)
        .collect();
    assert_eq!(
        kinds,
        vec![SendMessageTask::KIND, "<unreadable>", "RetiredTask", SendMessageTask::KIND]
    );

    let h = Harness::new();
    let m = h.manager(store);
    m.start().await.unwrap();
    assert_eq!(m.active_task_count(), 2);
    m.shutdown().await;
}

#[tokio::test]
async fn remove_task_is_final() {
    let h = Harness::new();
    let m = h.manager(TaskStore::detached());
    m.start().await.unwrap();
    let id = m
        .schedule_task(Arc::new(SendMessageTask::new(
            PeerMessage::Text("never".into()),
            "n-3",
        )))
        .unwrap();
    assert!(m.remove_task(id).await);
    assert!(!m.contains(id));
    assert!(!m.remove_task(id).await);

    h.peers.peer_connected("n-3", "late").await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    let peer = h.peers.get_peer("n-3").await.unwrap();
    assert!(peer.delivered_messages().await.is_empty());
    m.shutdown().await;
}
