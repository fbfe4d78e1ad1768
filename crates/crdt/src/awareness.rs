//! Presence: ephemeral per-connection state shared between peers.
//!
//! Each connection publishes one [`PresenceState`] under its [`ClientId`]
//! with a clock that increases on every change. Peers learn about each other
//! only through [`AwarenessUpdate`] deltas; an entry carrying no state is a
//! removal. A peer that stays silent past the timeout is dropped locally.

use std::time::Duration;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use uuid::Uuid;

/// Identifier of one connection.
pub type ClientId = u64;

/// A fresh random client id.
pub fn new_client_id() -> ClientId {
    let bytes = Uuid::new_v4().into_bytes();
    let mut head = [0u8; 8];
    head.copy_from_slice(&bytes[..8]);
    u64::from_be_bytes(head)
}

/// What a connection tells its peers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceState {
    /// Signed-in user, if known.
    #[serde(default)]
    pub user_id: Option<String>,
    /// Free-form cursor or selection.
    #[serde(default)]
    pub cursor: Option<serde_json::Value>,
    /// Ids of records this connection changed since its last broadcast.
    #[serde(default)]
    pub recent_changes: Vec<String>,
}

/// One entry of a delta.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AwarenessEntry {
    /// Whose state.
    pub client_id: ClientId,
    /// Version of the state.
    pub clock: u32,
    /// `None` removes the client.
    pub state: Option<PresenceState>,
}

/// A batch of presence changes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AwarenessUpdate {
    /// Changed clients.
    pub entries: Vec<AwarenessEntry>,
}

/// Effect of applying an update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AwarenessChange {
    /// Clients seen for the first time.
    pub added: Vec<ClientId>,
    /// Clients whose state changed.
    pub updated: Vec<ClientId>,
    /// Clients that went away.
    pub removed: Vec<ClientId>,
}

impl AwarenessChange {
    /// Check if nothing changed.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }
}

#[derive(Debug, Clone)]
struct Meta {
    clock: u32,
    state: Option<PresenceState>,
    last_seen: Instant,
}

/// Presence states of this connection and its peers.
#[derive(Debug)]
pub struct Awareness {
    client_id: ClientId,
    states: FxHashMap<ClientId, Meta>,
}

impl Awareness {
    /// Awareness for the connection `client_id`, with no state yet.
    pub fn new(client_id: ClientId) -> Self {
        Self {
            client_id,
            states: FxHashMap::default(),
        }
    }

    /// This connection's id.
    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    /// This connection's state.
    pub fn local_state(&self) -> Option<&PresenceState> {
        self.states
            .get(&self.client_id)
            .and_then(|m| m.state.as_ref())
    }

    /// Replace this connection's state, returning the delta to broadcast.
    pub fn set_local_state(&mut self, state: Option<PresenceState>) -> AwarenessUpdate {
        let now = Instant::now();
        let meta = self.states.entry(self.client_id).or_insert(Meta {
            clock: 0,
            state: None,
            last_seen: now,
        });
        meta.clock += 1;
        meta.state = state;
        meta.last_seen = now;
        self.encode(&[self.client_id])
    }

    /// Live peer states, by client id.
    pub fn peers(&self) -> Vec<(ClientId, &PresenceState)> {
        let mut peers: Vec<_> = self
            .states
            .iter()
            .filter(|(id, _)| **id != self.client_id)
            .filter_map(|(id, m)| m.state.as_ref().map(|s| (*id, s)))
            .collect();
        peers.sort_by_key(|(id, _)| *id);
        peers
    }

    /// Delta describing `clients` as currently known.
    pub fn encode(&self, clients: &[ClientId]) -> AwarenessUpdate {
        let entries = clients
            .iter()
            .filter_map(|id| {
                self.states.get(id).map(|m| AwarenessEntry {
                    client_id: *id,
                    clock: m.clock,
                    state: m.state.clone(),
                })
            })
            .collect();
        AwarenessUpdate { entries }
    }

    /// Merge a peer's delta.
    ///
    /// Entries older than what is known are ignored; a removal at the same
    /// clock still applies. Entries about this connection are ignored.
    pub fn apply_update(&mut self, update: &AwarenessUpdate) -> AwarenessChange {
        let now = Instant::now();
        let mut change = AwarenessChange::default();
        for entry in &update.entries {
            if entry.client_id == self.client_id {
                continue;
            }
            let prev = self.states.get(&entry.client_id);
            let newer = match prev {
                None => true,
                Some(m) => {
                    m.clock < entry.clock
                        || (m.clock == entry.clock && entry.state.is_none() && m.state.is_some())
                }
            };
            if !newer {
                continue;
            }
            let was_live = prev.is_some_and(|m| m.state.is_some());
            let changed = prev.map(|m| m.state != entry.state).unwrap_or(true);
            match (&entry.state, was_live) {
                (None, true) => change.removed.push(entry.client_id),
                (Some(_), false) => change.added.push(entry.client_id),
                (Some(_), true) if changed => change.updated.push(entry.client_id),
                _ => {}
            }
            self.states.insert(
                entry.client_id,
                Meta {
                    clock: entry.clock,
                    state: entry.state.clone(),
                    last_seen: now,
                },
            );
        }
        change
    }

    /// Drop peers silent for `timeout`. Returns the removed ids.
    pub fn remove_outdated(&mut self, now: Instant, timeout: Duration) -> Vec<ClientId> {
        let mut removed = Vec::new();
        for (id, meta) in self.states.iter_mut() {
            if *id == self.client_id || meta.state.is_none() {
                continue;
            }
            if now.saturating_duration_since(meta.last_seen) >= timeout {
                meta.state = None;
                removed.push(*id);
            }
        }
        removed.sort_unstable();
        removed
    }

    /// Re-announce the local state once half the timeout has passed, so
    /// peers do not time this connection out while it is idle.
    pub fn renew_local(&mut self, now: Instant, timeout: Duration) -> Option<AwarenessUpdate> {
        let meta = self.states.get_mut(&self.client_id)?;
        meta.state.as_ref()?;
        if now.saturating_duration_since(meta.last_seen) < timeout / 2 {
            return None;
        }
        meta.clock += 1;
        meta.last_seen = now;
        Some(self.encode(&[self.client_id]))
    }
}
