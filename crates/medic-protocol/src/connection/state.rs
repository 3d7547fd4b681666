//! Pending and pairwise connection records.

use chrono::{DateTime, Utc};
use medic_core::{Did, Message, VerKey};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    InviteReceived,
    RequestSent,
    RequestReceived,
    ResponseSent,
    ResponseReceived,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub message: Message,
}

/// A handshake in progress, keyed by its connection key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingConnection {
    pub connection_key: VerKey,
    /// Counterpart's label.
    pub label: String,
    pub status: ConnectionStatus,
    /// Append-only.
    pub history: Vec<HistoryEntry>,
    pub my_did: Option<Did>,
    pub my_verkey: Option<VerKey>,
    pub their_did: Option<Did>,
    pub their_verkey: Option<VerKey>,
    /// Id of the request message; the response threads on it.
    pub request_id: Option<String>,
}

impl PendingConnection {
    pub fn new(connection_key: VerKey, label: impl Into<String>, status: ConnectionStatus) -> Self {
        Self {
            connection_key,
            label: label.into(),
            status,
            history: Vec::new(),
            my_did: None,
            my_verkey: None,
            their_did: None,
            their_verkey: None,
            request_id: None,
        }
    }

    /// Move to `status`, remembering the message that caused it.
    pub fn record(&mut self, status: ConnectionStatus, message: Message) {
        self.status = status;
        self.history.push(HistoryEntry {
            timestamp: Utc::now(),
            message,
        });
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PairwiseStatus {
    /// Inviter side, between request and response.
    Provisional,
    Established,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PairwiseConnection {
    pub my_did: Did,
    pub my_verkey: VerKey,
    pub their_did: Did,
    pub their_verkey: VerKey,
    pub label: String,
    /// Key of the invitation this relationship came from.
    pub connection_key: VerKey,
    pub status: PairwiseStatus,
}

/// All connection state of one agent.
#[derive(Debug, Default)]
pub struct ConnectionTable {
    issued: HashSet<VerKey>,
    pending: HashMap<VerKey, PendingConnection>,
    pairwise: BTreeMap<(Did, Did), PairwiseConnection>,
    retired: HashSet<VerKey>,
}

impl ConnectionTable {
    pub fn issue(&mut self, connection_key: VerKey) {
        self.issued.insert(connection_key);
    }

    /// Issued by us and not yet used up.
    pub fn is_issued(&self, connection_key: &VerKey) -> bool {
        self.issued.contains(connection_key)
    }

    pub fn is_retired(&self, connection_key: &VerKey) -> bool {
        self.retired.contains(connection_key)
    }

    pub fn pending(&self, connection_key: &VerKey) -> Option<&PendingConnection> {
        self.pending.get(connection_key)
    }

    pub fn pending_mut(&mut self, connection_key: &VerKey) -> Option<&mut PendingConnection> {
        self.pending.get_mut(connection_key)
    }

    pub fn insert_pending(&mut self, pending: PendingConnection) {
        self.pending.insert(pending.connection_key, pending);
    }

    /// Insert or replace the record for its `(my_did, their_did)` pair.
    pub fn upsert_pairwise(&mut self, pairwise: PairwiseConnection) {
        self.pairwise.insert(
            (pairwise.my_did.clone(), pairwise.their_did.clone()),
            pairwise,
        );
    }

    pub fn pairwise(&self, my_did: &Did, their_did: &Did) -> Option<&PairwiseConnection> {
        self.pairwise.get(&(my_did.clone(), their_did.clone()))
    }

    pub fn established_with(&self, their_did: &Did) -> Option<&PairwiseConnection> {
        self.pairwise
            .values()
            .find(|p| p.their_did == *their_did && p.status == PairwiseStatus::Established)
    }

    /// Mark the pair established once both handshake halves are done.
    pub fn establish(&mut self, my_did: &Did, their_did: &Did) -> Option<&PairwiseConnection> {
        let entry = self.pairwise.get_mut(&(my_did.clone(), their_did.clone()))?;
        entry.status = PairwiseStatus::Established;
        Some(entry)
    }

    /// Use up a connection key, dropping its pending record.
    pub fn retire(&mut self, connection_key: &VerKey) -> Option<PendingConnection> {
        self.issued.remove(connection_key);
        self.retired.insert(*connection_key);
        self.pending.remove(connection_key)
    }

    pub fn pending_list(&self) -> Vec<PendingConnection> {
        let mut list: Vec<PendingConnection> = self.pending.values().cloned().collect();
        list.sort_by_key(|p| p.connection_key);
        list
    }

    pub fn pairwise_list(&self) -> Vec<PairwiseConnection> {
        self.pairwise.values().cloned().collect()
    }
}
