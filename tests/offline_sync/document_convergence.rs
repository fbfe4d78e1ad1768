//! Two replicas of one document converge through a relaying server.

use std::sync::Arc;

use async_trait::async_trait;
use notesync::{
    AwarenessUpdate, BridgeOptions, Connectivity, LocalStore, MigrationSet, PresenceState,
    RemoteHello, RemoteSession, ReplicaId, ReplicatedDocument, SchemaDescriptor, SyncBridge,
    SyncError, SyncResult, SyncStatus, SystemClock,
};
use parking_lot::Mutex;
use serde_json::json;

/// Server side: one merged replica plus everything each session sent.
struct Hub {
    doc: Mutex<ReplicatedDocument>,
    schema: Option<SchemaDescriptor>,
    updates: Mutex<Vec<(usize, Vec<u8>)>>,
    presence: Mutex<Vec<(usize, AwarenessUpdate)>>,
}

impl Hub {
    fn new(schema: Option<SchemaDescriptor>) -> Arc<Self> {
        Arc::new(Self {
            doc: Mutex::new(ReplicatedDocument::new(ReplicaId::new())),
            schema,
            updates: Mutex::new(Vec::new()),
            presence: Mutex::new(Vec::new()),
        })
    }

    fn session(self: &Arc<Self>, index: usize) -> Arc<dyn RemoteSession> {
        Arc::new(Session {
            hub: Arc::clone(self),
            index,
        })
    }

    /// Updates sent by sessions other than `index`, starting at `from`.
    fn updates_for(&self, index: usize, from: usize) -> Vec<Vec<u8>> {
        self.updates.lock()[from..]
            .iter()
            .filter(|(sender, _)| *sender != index)
            .map(|(_, bytes)| bytes.clone())
            .collect()
    }
}

struct Session {
    hub: Arc<Hub>,
    index: usize,
}

#[async_trait]
impl RemoteSession for Session {
    async fn handshake(&self) -> SyncResult<RemoteHello> {
        Ok(RemoteHello {
            schema: self.hub.schema.clone(),
            state: self.hub.doc.lock().encode_state()?,
        })
    }

    async fn push(&self, update: Vec<u8>) -> SyncResult<()> {
        self.hub.doc.lock().apply_update(&update)?;
        self.hub.updates.lock().push((self.index, update));
        Ok(())
    }

    async fn broadcast(&self, update: AwarenessUpdate) -> SyncResult<()> {
        self.hub.presence.lock().push((self.index, update));
        Ok(())
    }
}

fn migrations() -> MigrationSet {
    MigrationSet::new().with("0001_init", Some)
}

fn open(name: &str) -> Arc<SyncBridge> {
    SyncBridge::open(
        name,
        &LocalStore::ephemeral(),
        Arc::new(SystemClock),
        migrations(),
        BridgeOptions::default(),
    )
    .unwrap()
}

fn relay(hub: &Hub, to: &SyncBridge, index: usize, from: usize) {
    for update in hub.updates_for(index, from) {
        to.apply_remote(&update).unwrap();
    }
}

#[tokio::test]
async fn concurrent_edits_converge() {
    let hub = Hub::new(Some(migrations().descriptor()));
    let a = open("doc");
    let b = open("doc");

    a.connect(hub.session(0)).await.unwrap();
    a.put("n1", json!({"title": "first"}));
    a.flush().await.unwrap();

    b.connect(hub.session(1)).await.unwrap();
    assert_eq!(b.live().get("n1"), Some(json!({"title": "first"})));

    let mark = hub.updates.lock().len();
    a.put("n2", json!({"title": "from a"}));
    b.put("n2", json!({"title": "from b"}));
    b.put("n3", json!({"title": "only b"}));
    assert!(a.delete("n1"));
    a.flush().await.unwrap();
    b.flush().await.unwrap();
    relay(&hub, &a, 0, mark);
    relay(&hub, &b, 1, mark);

    assert_eq!(a.replica_records(), b.replica_records());
    assert_eq!(a.live().snapshot(), b.live().snapshot());
    assert_eq!(a.replica_records(), hub.doc.lock().records());
    assert!(a.live().get("n1").is_none());
    assert_eq!(a.live().len(), 2);
}

#[tokio::test]
async fn offline_edits_reach_the_server_on_reconnect() {
    let hub = Hub::new(Some(migrations().descriptor()));
    let a = open("doc");
    a.connect(hub.session(0)).await.unwrap();

    a.disconnect();
    assert_eq!(a.status(), SyncStatus::SyncedRemote(Connectivity::Offline));
    a.put("n1", json!("offline"));
    a.flush().await.unwrap();
    assert!(hub.doc.lock().get("n1").is_none());

    a.connect(hub.session(0)).await.unwrap();
    assert_eq!(a.status(), SyncStatus::SyncedRemote(Connectivity::Online));
    assert_eq!(hub.doc.lock().get("n1"), Some(&json!("offline")));
}

#[tokio::test]
async fn newer_remote_schema_requires_a_reload() {
    let hub = Hub::new(Some(SchemaDescriptor::new(["0001_init", "0002_tags"])));
    let a = open("doc");
    let err = a.connect(hub.session(0)).await.unwrap_err();
    assert!(matches!(err, SyncError::SchemaDrift { .. }));
    assert_eq!(a.status(), SyncStatus::ReloadRequired);
    assert!(a.connect(hub.session(0)).await.is_err());
}

#[tokio::test]
async fn drift_arriving_in_an_update_requires_a_reload() {
    let hub = Hub::new(Some(migrations().descriptor()));
    let a = open("doc");
    a.connect(hub.session(0)).await.unwrap();

    let mut newer = ReplicatedDocument::new(ReplicaId::new());
    newer.set_schema(SchemaDescriptor::new(["0001_init", "0002_tags"]));
    let update = newer.encode_state().unwrap();
    assert!(a.apply_remote(&update).is_err());
    assert_eq!(a.status(), SyncStatus::ReloadRequired);
}

#[tokio::test]
async fn presence_reaches_the_other_replica() {
    let hub = Hub::new(Some(migrations().descriptor()));
    let a = open("doc");
    let b = open("doc");
    a.connect(hub.session(0)).await.unwrap();
    b.connect(hub.session(1)).await.unwrap();

    a.set_presence(PresenceState {
        user_id: Some("u1".into()),
        ..Default::default()
    });
    a.put("n1", json!(1));
    assert!(a.flush_presence().await.unwrap());

    let updates: Vec<AwarenessUpdate> = hub
        .presence
        .lock()
        .iter()
        .filter(|(sender, _)| *sender == 0)
        .map(|(_, u)| u.clone())
        .collect();
    for update in &updates {
        b.apply_presence(update);
    }
    let peers = b.peers();
    assert_eq!(peers.len(), 1);
    assert_eq!(peers[0].0, a.client_id());
    assert_eq!(peers[0].1.user_id.as_deref(), Some("u1"));
    assert_eq!(peers[0].1.recent_changes, vec!["n1"]);
}
