//! End-to-end scenarios: agents on a shared relay, driven through their handles.

use medic::{
    attribute_values, launch, AgentConfig, AgentEvent, AgentHandle, AttributeValues, Did,
    MemoryLedger, MemoryRelay,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("medic_protocol=debug")
        .with_test_writer()
        .try_init();
}

/// Wait for the first event `pick` accepts.
async fn wait_for<T>(
    events: &mut broadcast::Receiver<AgentEvent>,
    mut pick: impl FnMut(&AgentEvent) -> Option<T>,
) -> T {
    timeout(WAIT, async {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if let Some(found) = pick(&event) {
                        return found;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(e) => panic!("event stream ended: {e}"),
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

fn medical_values() -> AttributeValues {
    attribute_values([
        ("first_name", "Bob"),
        ("last_name", "Smith"),
        ("degree", "Doctor"),
        ("level", "Heart"),
        ("year", "2015"),
        ("status", "Good"),
    ])
}

struct Network {
    relay: MemoryRelay,
    ledger: Arc<MemoryLedger>,
}

impl Network {
    fn new() -> Self {
        init_tracing();
        Self {
            relay: MemoryRelay::new(),
            ledger: Arc::new(MemoryLedger::new()),
        }
    }

    fn agent(&self, label: &str) -> AgentHandle {
        launch(AgentConfig::new(label), self.ledger.clone(), &self.relay).0
    }

    /// A steward able to issue `medical` claims; returns its public DID.
    async fn steward(&self) -> (AgentHandle, Did) {
        let steward = self.agent("Steward");
        let nym = steward
            .publish_identity(Some("TRUST_ANCHOR"))
            .await
            .unwrap();
        steward
            .register_claim_type("medical", "medical", "1.0", medical_values())
            .await
            .unwrap();
        (steward, nym.did)
    }
}

/// Connect two running agents; returns each side's DID for the other.
async fn connect(inviter: &AgentHandle, invitee: &AgentHandle) -> (Did, Did) {
    let mut inviter_events = inviter.subscribe();
    let mut invitee_events = invitee.subscribe();

    let code = inviter.generate_invitation().await.unwrap();
    let key = invitee.receive_invitation(&code).await.unwrap();
    invitee.send_request(key).await.unwrap();

    let invitee_did = wait_for(&mut inviter_events, |e| match e {
        AgentEvent::ConnectionRequested {
            connection_key,
            their_did,
            ..
        } if *connection_key == key => Some(their_did.clone()),
        _ => None,
    })
    .await;
    inviter.send_response(key).await.unwrap();

    let inviter_did = wait_for(&mut invitee_events, |e| match e {
        AgentEvent::ConnectionEstablished { their_did, .. } => Some(their_did.clone()),
        _ => None,
    })
    .await;
    (invitee_did, inviter_did)
}

async fn issue_medical(steward: &AgentHandle, holder: &AgentHandle, holder_did: &Did) {
    let mut events = holder.subscribe();
    steward.offer_credential(holder_did, "medical").await.unwrap();
    wait_for(&mut events, |e| match e {
        AgentEvent::CredentialStored { schema_type, .. } if schema_type == "medical" => Some(()),
        _ => None,
    })
    .await;
}

#[tokio::test]
async fn test_connection_handshake() {
    let net = Network::new();
    let steward = net.agent("Steward");
    let doctor = net.agent("Doctor");

    let (doctor_did, steward_did) = connect(&steward, &doctor).await;

    let at_steward = steward.pairwise_connections().await.unwrap();
    let at_doctor = doctor.pairwise_connections().await.unwrap();
    assert_eq!(at_steward.len(), 1);
    assert_eq!(at_doctor.len(), 1);
    assert_eq!(at_steward[0].their_did, doctor_did);
    assert_eq!(at_doctor[0].their_did, steward_did);
    assert_eq!(at_steward[0].my_did, at_doctor[0].their_did);
    assert!(steward.pending_connections().await.unwrap().is_empty());
    assert!(doctor.pending_connections().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_credential_issuance() {
    let net = Network::new();
    let (steward, _) = net.steward().await;
    let doctor = net.agent("Doctor");
    let (doctor_did, _) = connect(&steward, &doctor).await;

    assert!(!doctor.credential_obtained("medical").await.unwrap());
    issue_medical(&steward, &doctor, &doctor_did).await;
    assert!(doctor.credential_obtained("medical").await.unwrap());
    assert!(!doctor.credential_obtained("consent").await.unwrap());
}

#[tokio::test]
async fn test_proof_verified_against_trust_anchor() {
    let net = Network::new();
    let (steward, steward_public) = net.steward().await;
    let doctor = net.agent("Doctor");
    let patient = net.agent("Patient");

    let (doctor_did, _) = connect(&steward, &doctor).await;
    issue_medical(&steward, &doctor, &doctor_did).await;

    let (doctor_at_patient, patient_at_doctor) = connect(&patient, &doctor).await;
    patient
        .set_trust_anchors(vec![steward_public])
        .await
        .unwrap();

    let mut events = patient.subscribe();
    doctor.offer_proof(&patient_at_doctor).await.unwrap();
    let verified = wait_for(&mut events, |e| match e {
        AgentEvent::ProofVerified { verified, .. } => Some(*verified),
        _ => None,
    })
    .await;

    assert!(verified);
    assert_eq!(
        patient.proof_outcome(&doctor_at_patient).await.unwrap(),
        Some(true)
    );
}

#[tokio::test]
async fn test_proof_without_claims_aborts_prover() {
    let net = Network::new();
    let (_steward, steward_public) = net.steward().await;
    let doctor = net.agent("Doctor");
    let patient = net.agent("Patient");

    let (doctor_at_patient, patient_at_doctor) = connect(&patient, &doctor).await;
    patient
        .set_trust_anchors(vec![steward_public])
        .await
        .unwrap();

    let mut events = doctor.subscribe();
    doctor.offer_proof(&patient_at_doctor).await.unwrap();
    let reason = wait_for(&mut events, |e| match e {
        AgentEvent::ExchangeAborted {
            message_type,
            reason,
        } if message_type == "proof/1.0/request" => Some(reason.clone()),
        _ => None,
    })
    .await;

    assert!(reason.starts_with("No stored claim satisfies"), "{reason}");
    assert_eq!(patient.proof_outcome(&doctor_at_patient).await.unwrap(), None);
}

#[tokio::test]
async fn test_spent_invitation_is_refused() {
    let net = Network::new();
    let steward = net.agent("Steward");
    let doctor = net.agent("Doctor");
    let mallory = net.agent("Mallory");

    let mut steward_events = steward.subscribe();
    let mut doctor_events = doctor.subscribe();
    let code = steward.generate_invitation().await.unwrap();
    let key = doctor.receive_invitation(&code).await.unwrap();
    doctor.send_request(key).await.unwrap();
    wait_for(&mut steward_events, |e| {
        matches!(e, AgentEvent::ConnectionRequested { .. }).then_some(())
    })
    .await;
    steward.send_response(key).await.unwrap();
    wait_for(&mut doctor_events, |e| {
        matches!(e, AgentEvent::ConnectionEstablished { .. }).then_some(())
    })
    .await;

    let key = mallory.receive_invitation(&code).await.unwrap();
    mallory.send_request(key).await.unwrap();
    let reason = wait_for(&mut steward_events, |e| match e {
        AgentEvent::ExchangeAborted { reason, .. } => Some(reason.clone()),
        _ => None,
    })
    .await;

    assert!(reason.contains(&key.to_string()), "{reason}");
    assert_eq!(steward.pairwise_connections().await.unwrap().len(), 1);
    assert!(steward.pending_connections().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_shutdown_returns_session() {
    let net = Network::new();
    let (handle, worker) = launch(AgentConfig::new("Doctor"), net.ledger.clone(), &net.relay);

    handle.generate_invitation().await.unwrap();
    handle.shutdown().await.unwrap();
    let session = worker.await.unwrap();

    assert_eq!(session.owner(), "Doctor");
    assert!(matches!(
        handle.generate_invitation().await,
        Err(medic::ProtocolError::AgentStopped)
    ));
}
