//! Single-worker runtime.
//!
//! Every agent owns one task that drains one ordered queue. Inbound frames
//! and UI commands share the queue, so no two protocol steps of an agent
//! ever overlap. Commands carry a oneshot sender for their reply.

use crate::config::AgentConfig;
use crate::connection::{self, PairwiseConnection, PendingConnection};
use crate::credential;
use crate::dispatcher;
use crate::error::{ProtocolError, Result};
use crate::events::AgentEvent;
use crate::proof;
use crate::session::AgentSession;
use async_trait::async_trait;
use medic_claims::{AttributeValues, ClaimDefinition, NymRecord};
use medic_core::{Did, MessageSink, VerKey};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

type Reply<T> = oneshot::Sender<Result<T>>;

/// A request from the UI layer.
pub enum Command {
    PublishIdentity {
        role: Option<String>,
        reply: Reply<NymRecord>,
    },
    RegisterClaimType {
        schema_type: String,
        name: String,
        version: String,
        values: AttributeValues,
        reply: Reply<ClaimDefinition>,
    },
    GenerateInvitation {
        reply: Reply<String>,
    },
    ReceiveInvitation {
        code: String,
        reply: Reply<VerKey>,
    },
    SendRequest {
        connection_key: VerKey,
        reply: Reply<()>,
    },
    SendResponse {
        connection_key: VerKey,
        reply: Reply<()>,
    },
    OfferCredential {
        their_did: Did,
        schema_type: String,
        reply: Reply<u64>,
    },
    OfferProof {
        their_did: Did,
        reply: Reply<u64>,
    },
    SetTrustAnchors {
        anchors: Vec<Did>,
        reply: Reply<()>,
    },
    RequestProof {
        their_did: Did,
        attributes: Option<Vec<String>>,
        reply: Reply<()>,
    },
    PendingConnections {
        reply: Reply<Vec<PendingConnection>>,
    },
    PairwiseConnections {
        reply: Reply<Vec<PairwiseConnection>>,
    },
    CredentialObtained {
        schema_type: String,
        reply: Reply<bool>,
    },
    ProofOutcome {
        their_did: Did,
        reply: Reply<Option<bool>>,
    },
    Shutdown,
}

/// One unit of work for the worker.
pub enum Job {
    Inbound { sender_label: String, bytes: Vec<u8> },
    Command(Command),
}

/// The worker side; consumed by [`AgentRuntime::spawn`].
pub struct AgentRuntime {
    jobs: mpsc::Receiver<Job>,
    events: broadcast::Sender<AgentEvent>,
}

impl AgentRuntime {
    /// Create the queue and the handle feeding it.
    ///
    /// The handle exists before the session so it can be registered with a
    /// transport as the inbound sink.
    pub fn new(config: &AgentConfig) -> (Self, AgentHandle) {
        let (jobs_tx, jobs_rx) = mpsc::channel(config.queue_capacity.max(1));
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let handle = AgentHandle {
            label: config.label.clone(),
            jobs: jobs_tx,
            events: events.clone(),
        };
        (
            Self {
                jobs: jobs_rx,
                events,
            },
            handle,
        )
    }

    /// Start the worker. The session is handed back when it stops.
    pub fn spawn(self, mut session: AgentSession) -> JoinHandle<AgentSession> {
        session.events = self.events;
        let mut jobs = self.jobs;
        tokio::spawn(async move {
            info!(agent = %session.owner(), "agent worker started");
            while let Some(job) = jobs.recv().await {
                match job {
                    Job::Inbound {
                        sender_label,
                        bytes,
                    } => dispatcher::handle_frame(&mut session, &sender_label, &bytes).await,
                    Job::Command(Command::Shutdown) => break,
                    Job::Command(command) => execute(&mut session, command).await,
                }
            }
            info!(agent = %session.owner(), "agent worker stopped");
            session
        })
    }
}

fn respond<T>(reply: Reply<T>, result: Result<T>) {
    if let Err(e) = &result {
        debug!(error = %e, "command failed");
    }
    // The caller may have given up waiting.
    let _ = reply.send(result);
}

async fn execute(session: &mut AgentSession, command: Command) {
    match command {
        Command::PublishIdentity { role, reply } => {
            respond(reply, session.publish_identity(role.as_deref()).await)
        }
        Command::RegisterClaimType {
            schema_type,
            name,
            version,
            values,
            reply,
        } => respond(
            reply,
            session
                .register_claim_type(&schema_type, &name, &version, values)
                .await,
        ),
        Command::GenerateInvitation { reply } => {
            respond(reply, connection::generate_invitation(session).await)
        }
        Command::ReceiveInvitation { code, reply } => {
            respond(reply, connection::receive_invitation(session, &code).await)
        }
        Command::SendRequest {
            connection_key,
            reply,
        } => respond(reply, connection::send_request(session, &connection_key).await),
        Command::SendResponse {
            connection_key,
            reply,
        } => respond(reply, connection::send_response(session, &connection_key).await),
        Command::OfferCredential {
            their_did,
            schema_type,
            reply,
        } => respond(
            reply,
            credential::offer_credential(session, &their_did, &schema_type).await,
        ),
        Command::OfferProof { their_did, reply } => {
            respond(reply, proof::offer_proof(session, &their_did).await)
        }
        Command::SetTrustAnchors { anchors, reply } => {
            proof::set_trust_anchors(session, anchors);
            respond(reply, Ok(()))
        }
        Command::RequestProof {
            their_did,
            attributes,
            reply,
        } => respond(
            reply,
            proof::request_proof(session, &their_did, attributes).await,
        ),
        Command::PendingConnections { reply } => respond(reply, Ok(session.pending_connections())),
        Command::PairwiseConnections { reply } => {
            respond(reply, Ok(session.pairwise_connections()))
        }
        Command::CredentialObtained { schema_type, reply } => {
            respond(reply, Ok(session.credentials.obtained(&schema_type)))
        }
        Command::ProofOutcome { their_did, reply } => {
            respond(reply, Ok(proof::proof_outcome(session, &their_did)))
        }
        Command::Shutdown => {}
    }
}

/// Cloneable front door to a running agent.
#[derive(Clone)]
pub struct AgentHandle {
    label: String,
    jobs: mpsc::Sender<Job>,
    events: broadcast::Sender<AgentEvent>,
}

impl AgentHandle {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.events.subscribe()
    }

    /// Queue an inbound transport frame.
    pub async fn deliver(&self, sender_label: String, bytes: Vec<u8>) -> Result<()> {
        self.jobs
            .send(Job::Inbound {
                sender_label,
                bytes,
            })
            .await
            .map_err(|_| ProtocolError::AgentStopped)
    }

    async fn call<T>(&self, command: impl FnOnce(Reply<T>) -> Command) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.jobs
            .send(Job::Command(command(tx)))
            .await
            .map_err(|_| ProtocolError::AgentStopped)?;
        rx.await.map_err(|_| ProtocolError::AgentStopped)?
    }

    pub async fn publish_identity(&self, role: Option<&str>) -> Result<NymRecord> {
        let role = role.map(str::to_string);
        self.call(|reply| Command::PublishIdentity { role, reply })
            .await
    }

    pub async fn register_claim_type(
        &self,
        schema_type: &str,
        name: &str,
        version: &str,
        values: AttributeValues,
    ) -> Result<ClaimDefinition> {
        self.call(|reply| Command::RegisterClaimType {
            schema_type: schema_type.to_string(),
            name: name.to_string(),
            version: version.to_string(),
            values,
            reply,
        })
        .await
    }

    pub async fn generate_invitation(&self) -> Result<String> {
        self.call(|reply| Command::GenerateInvitation { reply })
            .await
    }

    pub async fn receive_invitation(&self, code: &str) -> Result<VerKey> {
        let code = code.to_string();
        self.call(|reply| Command::ReceiveInvitation { code, reply })
            .await
    }

    pub async fn send_request(&self, connection_key: VerKey) -> Result<()> {
        self.call(|reply| Command::SendRequest {
            connection_key,
            reply,
        })
        .await
    }

    pub async fn send_response(&self, connection_key: VerKey) -> Result<()> {
        self.call(|reply| Command::SendResponse {
            connection_key,
            reply,
        })
        .await
    }

    pub async fn offer_credential(&self, their_did: &Did, schema_type: &str) -> Result<u64> {
        self.call(|reply| Command::OfferCredential {
            their_did: their_did.clone(),
            schema_type: schema_type.to_string(),
            reply,
        })
        .await
    }

    pub async fn offer_proof(&self, their_did: &Did) -> Result<u64> {
        self.call(|reply| Command::OfferProof {
            their_did: their_did.clone(),
            reply,
        })
        .await
    }

    pub async fn set_trust_anchors(&self, anchors: Vec<Did>) -> Result<()> {
        self.call(|reply| Command::SetTrustAnchors { anchors, reply })
            .await
    }

    pub async fn request_proof(
        &self,
        their_did: &Did,
        attributes: Option<Vec<String>>,
    ) -> Result<()> {
        self.call(|reply| Command::RequestProof {
            their_did: their_did.clone(),
            attributes,
            reply,
        })
        .await
    }

    pub async fn pending_connections(&self) -> Result<Vec<PendingConnection>> {
        self.call(|reply| Command::PendingConnections { reply })
            .await
    }

    pub async fn pairwise_connections(&self) -> Result<Vec<PairwiseConnection>> {
        self.call(|reply| Command::PairwiseConnections { reply })
            .await
    }

    pub async fn credential_obtained(&self, schema_type: &str) -> Result<bool> {
        self.call(|reply| Command::CredentialObtained {
            schema_type: schema_type.to_string(),
            reply,
        })
        .await
    }

    pub async fn proof_outcome(&self, their_did: &Did) -> Result<Option<bool>> {
        self.call(|reply| Command::ProofOutcome {
            their_did: their_did.clone(),
            reply,
        })
        .await
    }

    /// Stop the worker after the jobs already queued.
    pub async fn shutdown(&self) -> Result<()> {
        self.jobs
            .send(Job::Command(Command::Shutdown))
            .await
            .map_err(|_| ProtocolError::AgentStopped)
    }
}

#[async_trait]
impl MessageSink for AgentHandle {
    async fn on_message(&self, sender_label: String, bytes: Vec<u8>) {
        if let Err(e) = self.deliver(sender_label, bytes).await {
            warn!(agent = %self.label, error = %e, "inbound frame lost");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestAgent;
    use medic_claims::MemoryLedger;
    use tokio_test::{assert_err, assert_ok};

    fn start(label: &str) -> (AgentHandle, JoinHandle<AgentSession>) {
        let ledger = MemoryLedger::new();
        let agent = TestAgent::new(label, &ledger);
        let (runtime, handle) = AgentRuntime::new(agent.session.config());
        (handle, runtime.spawn(agent.session))
    }

    #[tokio::test]
    async fn test_commands_reply_in_order() {
        let (handle, _worker) = start("Doctor");

        let code = assert_ok!(handle.generate_invitation().await);
        let key = assert_ok!(handle.receive_invitation(&code).await);
        let pending = assert_ok!(handle.pending_connections().await);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].connection_key, key);
        assert!(assert_ok!(handle.pairwise_connections().await).is_empty());
    }

    #[tokio::test]
    async fn test_failed_command_keeps_worker_alive() {
        let (handle, _worker) = start("Doctor");
        let stray = medic_core::LocalKey::generate().verkey();

        let err = assert_err!(handle.send_request(stray).await);
        assert!(matches!(err, ProtocolError::UnknownConnectionKey(_)));
        assert!(!err.is_fatal_to_agent());
        assert_ok!(handle.generate_invitation().await);
    }

    #[tokio::test]
    async fn test_shutdown_hands_back_session() {
        let (handle, worker) = start("Doctor");
        assert_ok!(handle.generate_invitation().await);
        assert_ok!(handle.shutdown().await);

        let session = worker.await.unwrap();
        assert_eq!(session.owner(), "Doctor");

        let err = assert_err!(handle.pending_connections().await);
        assert!(err.is_fatal_to_agent());
        assert!(matches!(
            handle.deliver("Steward".into(), Vec::new()).await,
            Err(ProtocolError::AgentStopped)
        ));
    }

    #[tokio::test]
    async fn test_events_reach_handle_subscribers() {
        let (handle, _worker) = start("Doctor");
        let mut events = handle.subscribe();
        let inviter = start("Steward").0;

        let code = assert_ok!(inviter.generate_invitation().await);
        let key = assert_ok!(handle.receive_invitation(&code).await);
        assert_eq!(
            events.recv().await.unwrap(),
            AgentEvent::InvitationReceived {
                connection_key: key,
                label: "Steward".into(),
            }
        );
    }
}
