//! Agent configuration.

use serde::{Deserialize, Serialize};

/// Starting nonce for proof exchanges.
pub const DEFAULT_PROOF_NONCE: u64 = 87392;

/// Shape of the proof request a verifier sends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProofTemplate {
    pub name: String,
    pub version: String,
    pub attributes: Vec<String>,
}

impl Default for ProofTemplate {
    fn default() -> Self {
        Self {
            name: "Consent-Request".to_string(),
            version: "0.1".to_string(),
            attributes: vec![
                "first_name".to_string(),
                "degree".to_string(),
                "status".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Owner label. Inbound messages must be addressed to it.
    pub label: String,
    pub proof_nonce_start: u64,
    /// Answer connection requests without waiting for a trigger.
    pub auto_respond: bool,
    /// Name of the holder secret claims are bound to.
    pub link_secret: String,
    pub proof_request: ProofTemplate,
    /// Bound of the worker's job queue.
    pub queue_capacity: usize,
    /// Bound of the event broadcast.
    pub event_capacity: usize,
}

impl AgentConfig {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Self::default()
        }
    }

    pub fn with_auto_respond(mut self, auto_respond: bool) -> Self {
        self.auto_respond = auto_respond;
        self
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            label: "agent".to_string(),
            proof_nonce_start: DEFAULT_PROOF_NONCE,
            auto_respond: false,
            link_secret: "link-secret".to_string(),
            proof_request: ProofTemplate::default(),
            queue_capacity: 64,
            event_capacity: 64,
        }
    }
}
