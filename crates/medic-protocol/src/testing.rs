//! Fixtures for driving sessions by hand in unit tests.

use crate::config::AgentConfig;
use crate::connection;
use crate::dispatcher::{self, Disposition};
use crate::error::Result;
use crate::session::{AgentSession, Collaborators};
use async_trait::async_trait;
use medic_claims::{attribute_values, AttributeValues, MemoryEngine, MemoryLedger};
use medic_core::{Did, MemoryWallet, Transport};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Transport that keeps every sent frame for the test to route.
pub struct Outbox(mpsc::UnboundedSender<Vec<u8>>);

#[async_trait]
impl Transport for Outbox {
    async fn send(&self, bytes: Vec<u8>) -> medic_core::Result<()> {
        self.0
            .send(bytes)
            .map_err(|_| medic_core::Error::Transport("outbox closed".into()))
    }
}

pub struct TestAgent {
    pub session: AgentSession,
    pub wallet: Arc<MemoryWallet>,
    pub engine: Arc<MemoryEngine>,
    outbox: mpsc::UnboundedReceiver<Vec<u8>>,
}

impl TestAgent {
    pub fn new(label: &str, ledger: &MemoryLedger) -> Self {
        Self::with_config(AgentConfig::new(label), ledger)
    }

    pub fn with_config(config: AgentConfig, ledger: &MemoryLedger) -> Self {
        let wallet = Arc::new(MemoryWallet::opened(config.label.clone()));
        let engine = Arc::new(MemoryEngine::new());
        let (tx, outbox) = mpsc::unbounded_channel();
        let session = AgentSession::new(
            config,
            Collaborators {
                identity: wallet.clone(),
                engine: engine.clone(),
                ledger: Arc::new(ledger.clone()),
                transport: Arc::new(Outbox(tx)),
            },
        );
        Self {
            session,
            wallet,
            engine,
            outbox,
        }
    }

    /// The next frame this agent sent.
    pub fn sent(&mut self) -> Vec<u8> {
        self.outbox.try_recv().expect("agent sent nothing")
    }

    pub fn sent_nothing(&mut self) -> bool {
        self.outbox.try_recv().is_err()
    }

    pub async fn receive(&mut self, bytes: &[u8]) -> Result<Disposition> {
        let (message, context) = self.session.codec().read(bytes).await?;
        dispatcher::handle_inbound(&mut self.session, message, context).await
    }

    /// Move this agent's next frame to `other`.
    pub async fn deliver_to(&mut self, other: &mut TestAgent) -> Result<Disposition> {
        let frame = self.sent();
        other.receive(&frame).await
    }
}

pub fn medical_values() -> AttributeValues {
    attribute_values([
        ("first_name", "Bob"),
        ("last_name", "Smith"),
        ("degree", "Doctor"),
        ("level", "Heart"),
        ("year", "2015"),
        ("status", "Good"),
    ])
}

pub fn consent_values() -> AttributeValues {
    attribute_values([
        ("first_name", "Alice"),
        ("last_name", "Garcia"),
        ("hospital", "Hospital Green"),
        ("status", "Active"),
    ])
}

/// An issuer with a public identity and `medical` and `consent` claim types.
pub async fn issuer(label: &str, ledger: &MemoryLedger) -> TestAgent {
    let mut agent = TestAgent::new(label, ledger);
    agent
        .session
        .publish_identity(Some("TRUST_ANCHOR"))
        .await
        .unwrap();
    agent
        .session
        .register_claim_type("medical", "medical", "1.0", medical_values())
        .await
        .unwrap();
    agent
        .session
        .register_claim_type("consent", "consent", "1.0", consent_values())
        .await
        .unwrap();
    agent
}

/// Run the full handshake with `inviter` inviting `invitee`.
///
/// Returns the invitee's DID as the inviter sees it and the inviter's DID as
/// the invitee sees it.
pub async fn connect(inviter: &mut TestAgent, invitee: &mut TestAgent) -> (Did, Did) {
    let code = connection::generate_invitation(&mut inviter.session)
        .await
        .unwrap();
    let key = connection::receive_invitation(&mut invitee.session, &code)
        .await
        .unwrap();
    connection::send_request(&mut invitee.session, &key)
        .await
        .unwrap();
    invitee.deliver_to(inviter).await.unwrap();
    connection::send_response(&mut inviter.session, &key)
        .await
        .unwrap();
    inviter.deliver_to(invitee).await.unwrap();

    let their_did = |agent: &TestAgent| {
        agent
            .session
            .pairwise_connections()
            .into_iter()
            .find(|p| p.connection_key == key)
            .map(|p| p.their_did)
            .unwrap()
    };
    (their_did(&*inviter), their_did(&*invitee))
}
