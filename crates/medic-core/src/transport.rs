//! Transport collaborator and an in-process relay.
//!
//! The relay behaves like a chat room: every frame an agent sends reaches
//! every other connected agent together with the sender's label. Agents
//! discard frames that are not addressed to them.

use crate::{Error, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Outbound half of a transport.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, bytes: Vec<u8>) -> Result<()>;
}

/// Inbound half of a transport: receives complete frames.
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn on_message(&self, sender_label: String, bytes: Vec<u8>);
}

type Frame = (String, Vec<u8>);

/// An in-process broadcast relay.
#[derive(Clone, Default)]
pub struct MemoryRelay {
    peers: Arc<RwLock<HashMap<String, mpsc::UnboundedSender<Frame>>>>,
}

impl MemoryRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect `label`, forwarding every frame from other peers to `sink`
    /// in arrival order. Must be called inside a tokio runtime.
    pub fn connect(&self, label: impl Into<String>, sink: Arc<dyn MessageSink>) -> RelayClient {
        let label = label.into();
        let (tx, mut rx) = mpsc::unbounded_channel::<Frame>();
        self.peers.write().insert(label.clone(), tx);

        let peer = label.clone();
        tokio::spawn(async move {
            while let Some((sender, bytes)) = rx.recv().await {
                sink.on_message(sender, bytes).await;
            }
            debug!(peer = %peer, "relay inbox closed");
        });

        RelayClient {
            label,
            relay: self.clone(),
        }
    }

    pub fn disconnect(&self, label: &str) {
        self.peers.write().remove(label);
    }

    pub fn peers(&self) -> Vec<String> {
        let mut peers: Vec<String> = self.peers.read().keys().cloned().collect();
        peers.sort();
        peers
    }

    fn broadcast(&self, from: &str, bytes: Vec<u8>) -> Result<()> {
        let peers = self.peers.read();
        if !peers.contains_key(from) {
            return Err(Error::Transport(format!("{from} is not connected")));
        }
        for (label, tx) in peers.iter().filter(|(label, _)| label.as_str() != from) {
            if tx.send((from.to_string(), bytes.clone())).is_err() {
                warn!(peer = %label, "dropping frame for closed inbox");
            }
        }
        Ok(())
    }
}

/// One agent's connection to a [`MemoryRelay`].
#[derive(Clone)]
pub struct RelayClient {
    label: String,
    relay: MemoryRelay,
}

impl RelayClient {
    pub fn label(&self) -> &str {
        &self.label
    }
}

#[async_trait]
impl Transport for RelayClient {
    async fn send(&self, bytes: Vec<u8>) -> Result<()> {
        debug!(from = %self.label, size = bytes.len(), "relay send");
        self.relay.broadcast(&self.label, bytes)
    }
}
