//! Per-agent protocol state and collaborators.

use crate::config::AgentConfig;
use crate::connection::{ConnectionTable, PairwiseConnection, PairwiseStatus, PendingConnection};
use crate::credential::CredentialBook;
use crate::error::{ProtocolError, Result};
use crate::events::AgentEvent;
use crate::proof::ProofBook;
use medic_claims::ledger::definition_digest;
use medic_claims::{AttributeValues, ClaimDefinition, ClaimEngine, Ledger, NymRecord, Schema};
use medic_core::{Did, EnvelopeCodec, Identity, Message, MessageContext, Transport, VerKey};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Tag used for every claim definition an agent creates.
pub const DEFINITION_TAG: &str = "TAG1";

/// The external services an agent runs against.
#[derive(Clone)]
pub struct Collaborators {
    pub identity: Arc<dyn Identity>,
    pub engine: Arc<dyn ClaimEngine>,
    pub ledger: Arc<dyn Ledger>,
    pub transport: Arc<dyn Transport>,
}

/// Everything one logged-in agent knows.
///
/// Created at login and dropped at logout. Protocol handlers take it by
/// `&mut`, so only one step runs at a time.
pub struct AgentSession {
    config: AgentConfig,
    collaborators: Collaborators,
    codec: EnvelopeCodec,
    pub(crate) events: broadcast::Sender<AgentEvent>,
    public_identity: Option<NymRecord>,
    pub(crate) connections: ConnectionTable,
    pub(crate) credentials: CredentialBook,
    pub(crate) proofs: ProofBook,
}

impl AgentSession {
    pub fn new(config: AgentConfig, collaborators: Collaborators) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let codec = EnvelopeCodec::new(collaborators.identity.clone());
        let proofs = ProofBook::new(config.proof_nonce_start);
        Self {
            config,
            collaborators,
            codec,
            events,
            public_identity: None,
            connections: ConnectionTable::default(),
            credentials: CredentialBook::default(),
            proofs,
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Label inbound messages must be addressed to.
    pub fn owner(&self) -> &str {
        &self.config.label
    }

    pub fn identity(&self) -> &dyn Identity {
        self.collaborators.identity.as_ref()
    }

    pub fn engine(&self) -> &dyn ClaimEngine {
        self.collaborators.engine.as_ref()
    }

    pub fn ledger(&self) -> &dyn Ledger {
        self.collaborators.ledger.as_ref()
    }

    pub fn codec(&self) -> &EnvelopeCodec {
        &self.codec
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.events.subscribe()
    }

    pub(crate) fn emit(&self, event: AgentEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Pack `message` from `from` to `to` and hand it to the transport.
    pub async fn send(&self, message: &Message, to: &VerKey, from: &VerKey) -> Result<()> {
        let bytes = self.codec.pack(message, &[*to], from).await?;
        self.collaborators.transport.send(bytes).await?;
        debug!(
            message_type = %message.type_,
            send_to = message.send_to.as_deref().unwrap_or_default(),
            "sent message"
        );
        Ok(())
    }

    /// Send over an established pairwise relationship.
    pub async fn send_pairwise(&self, pairwise: &PairwiseConnection, message: Message) -> Result<()> {
        let message = message
            .with_send_to(pairwise.label.clone())
            .with_from(self.config.label.clone());
        self.send(&message, &pairwise.their_verkey, &pairwise.my_verkey)
            .await
    }

    /// The established relationship with `their_did`.
    pub fn pairwise(&self, their_did: &Did) -> Result<PairwiseConnection> {
        self.connections
            .established_with(their_did)
            .cloned()
            .ok_or_else(|| ProtocolError::UnknownPairwise(their_did.to_string()))
    }

    /// The relationship an inbound credential or proof message belongs to.
    ///
    /// `sender_my_did`/`sender_their_did` are the identifiers as the sender
    /// wrote them. When the message came in an envelope, its sender key
    /// must be the counterpart's pairwise key.
    pub(crate) fn inbound_pairwise(
        &self,
        sender_my_did: &Did,
        sender_their_did: &Did,
        context: &MessageContext,
    ) -> Result<PairwiseConnection> {
        let pairwise = self
            .connections
            .pairwise(sender_their_did, sender_my_did)
            .filter(|p| p.status == PairwiseStatus::Established)
            .cloned()
            .ok_or_else(|| ProtocolError::UnknownPairwise(sender_my_did.to_string()))?;
        if let Some(from_key) = context.from_key {
            if from_key != pairwise.their_verkey {
                return Err(ProtocolError::SignatureInvalid(format!(
                    "envelope from {from_key}, expected {}",
                    pairwise.their_verkey
                )));
            }
        }
        Ok(pairwise)
    }

    pub fn pending_connections(&self) -> Vec<PendingConnection> {
        self.connections.pending_list()
    }

    pub fn pairwise_connections(&self) -> Vec<PairwiseConnection> {
        self.connections.pairwise_list()
    }

    pub fn public_identity(&self) -> Option<&NymRecord> {
        self.public_identity.as_ref()
    }

    /// Mint and publish the agent's public identifier.
    ///
    /// Idempotent: a second call returns the identifier already published.
    pub async fn publish_identity(&mut self, role: Option<&str>) -> Result<NymRecord> {
        if let Some(record) = &self.public_identity {
            return Ok(record.clone());
        }
        let (did, verkey) = self.identity().create_local_identifier().await?;
        let record = NymRecord {
            did,
            verkey,
            role: role.map(str::to_string),
        };
        self.ledger().publish_identifier(&record).await?;
        info!(did = %record.did, role = ?record.role, "published public identifier");
        self.public_identity = Some(record.clone());
        Ok(record)
    }

    /// Set up this agent to issue `schema_type` claims carrying `values`.
    ///
    /// Publishes the schema, creates and publishes its definition, and
    /// remembers the values offered for the type. Requires a published
    /// identity.
    pub async fn register_claim_type(
        &mut self,
        schema_type: &str,
        name: &str,
        version: &str,
        values: AttributeValues,
    ) -> Result<ClaimDefinition> {
        let (issuer, issuer_key) = self
            .public_identity
            .as_ref()
            .map(|r| (r.did.clone(), r.verkey))
            .ok_or(ProtocolError::MissingField("public identity"))?;

        let schema = Schema::new(&issuer, name, version, values.keys().cloned());
        self.ledger().publish_schema(&schema).await?;

        let definition = self
            .engine()
            .create_definition(&issuer, &schema, DEFINITION_TAG)
            .await?;
        let digest = definition_digest(&definition)?;
        let signature = self.identity().sign(&issuer_key, &digest).await?;
        self.ledger()
            .publish_definition(&definition, &signature)
            .await?;

        info!(
            schema_type = %schema_type,
            schema_id = %schema.id,
            cred_def_id = %definition.id,
            "registered claim type"
        );
        self.credentials
            .register(schema_type, schema, definition.clone(), values);
        Ok(definition)
    }
}
