//! Proof protocol: offer, request, proof.
//!
//! The prover offers to prove. The verifier answers with a proof request
//! restricted to its trust anchors, and judges the returned proof against
//! that stored request only.

mod messages;
mod state;

pub use messages::{ProofData, ProofMessage, ProofOfferData, ProofRequestData, OFFER, PROOF, REQUEST};
pub use state::{ProofBook, ProofExchange, ProofRole, ProofStatus, NONCES_PER_EXCHANGE};

use crate::error::{ProtocolError, Result};
use crate::events::AgentEvent;
use crate::payload::SignedPayload;
use crate::session::AgentSession;
use medic_claims::{
    CandidateClaims, ClaimDefinition, Ledger, LedgerError, Proof, ProofRequest, RequestedClaims,
    Schema,
};
use medic_core::{Did, Message, MessageContext};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

type Material = (BTreeMap<String, Schema>, BTreeMap<String, ClaimDefinition>);

/// Prover: offer to prove to an established counterpart.
pub async fn offer_proof(session: &mut AgentSession, their_did: &Did) -> Result<u64> {
    let pairwise = session.pairwise(their_did)?;
    let nonce = session.proofs.take_nonce();

    let data = ProofOfferData {
        their_did: pairwise.their_did.clone(),
        my_did: pairwise.my_did.clone(),
        nonce,
    };
    let payload = SignedPayload::seal(session.identity(), data, &pairwise.my_verkey).await?;
    session
        .send_pairwise(&pairwise, Message::new(OFFER, &payload)?)
        .await?;

    session.proofs.open(ProofExchange::new(
        pairwise.their_did.clone(),
        ProofRole::Prover,
        ProofStatus::OfferSent,
        nonce,
    ));
    info!(their_did = %their_did, nonce, "proof offered");
    Ok(nonce)
}

/// Issuers whose claims the verifier accepts.
pub fn set_trust_anchors(session: &mut AgentSession, anchors: Vec<Did>) {
    info!(count = anchors.len(), "trust anchors set");
    session.proofs.set_trust_anchors(anchors);
}

/// Verifier: record the offer and, when trust anchors are known, request a proof.
pub async fn handle_offer(
    session: &mut AgentSession,
    payload: SignedPayload<ProofOfferData>,
    context: &MessageContext,
) -> Result<()> {
    let pairwise =
        session.inbound_pairwise(&payload.data.my_did, &payload.data.their_did, context)?;
    let data = payload.open(session.identity(), &pairwise.their_verkey).await?;

    session.proofs.open(ProofExchange::new(
        pairwise.their_did.clone(),
        ProofRole::Verifier,
        ProofStatus::OfferReceived,
        data.nonce,
    ));
    info!(their_did = %pairwise.their_did, nonce = data.nonce, "proof offer received");
    session.emit(AgentEvent::ProofOfferReceived {
        their_did: pairwise.their_did.clone(),
        nonce: data.nonce,
    });

    if session.proofs.trust_anchors().is_empty() {
        debug!(their_did = %pairwise.their_did, "waiting for trust anchors before requesting proof");
        return Ok(());
    }
    request_proof(session, &pairwise.their_did, None).await
}

/// Verifier: send the proof request for a received offer.
///
/// `attributes` overrides the configured attribute names.
pub async fn request_proof(
    session: &mut AgentSession,
    their_did: &Did,
    attributes: Option<Vec<String>>,
) -> Result<()> {
    let anchors = session.proofs.trust_anchors().to_vec();
    if anchors.is_empty() {
        return Err(ProtocolError::MissingTrustAnchor);
    }
    let pairwise = session.pairwise(their_did)?;
    let exchange = session
        .proofs
        .exchange(ProofRole::Verifier, their_did)
        .filter(|e| e.status == ProofStatus::OfferReceived)
        .cloned()
        .ok_or_else(|| ProtocolError::UnexpectedMessage(format!("no proof offer from {their_did}")))?;

    let nonce = exchange.nonce.wrapping_add(1);
    let template = &session.config().proof_request;
    let attributes = attributes.unwrap_or_else(|| template.attributes.clone());
    let proof_request = ProofRequest::new(&template.name, &template.version, nonce)
        .with_attributes(attributes, &anchors);

    let data = ProofRequestData {
        their_did: pairwise.their_did.clone(),
        my_did: pairwise.my_did.clone(),
        nonce,
        proof_request: proof_request.clone(),
    };
    let payload = SignedPayload::seal(session.identity(), data, &pairwise.my_verkey).await?;
    session
        .send_pairwise(&pairwise, Message::new(REQUEST, &payload)?)
        .await?;

    if let Some(e) = session.proofs.exchange_mut(ProofRole::Verifier, their_did) {
        e.status = ProofStatus::RequestSent;
        e.nonce = nonce;
        e.request = Some(proof_request);
    }
    info!(their_did = %their_did, nonce, "proof requested");
    session.emit(AgentEvent::ProofRequested {
        their_did: their_did.clone(),
    });
    Ok(())
}

/// Prover: build and send a proof for the request.
pub async fn handle_request(
    session: &mut AgentSession,
    payload: SignedPayload<ProofRequestData>,
    context: &MessageContext,
) -> Result<()> {
    let pairwise =
        session.inbound_pairwise(&payload.data.my_did, &payload.data.their_did, context)?;
    let data = payload.open(session.identity(), &pairwise.their_verkey).await?;
    let their_did = pairwise.their_did.clone();

    let exchange = session
        .proofs
        .exchange(ProofRole::Prover, &their_did)
        .filter(|e| e.status == ProofStatus::OfferSent)
        .cloned()
        .ok_or_else(|| {
            ProtocolError::UnexpectedMessage(format!("proof request from {their_did} without an offer"))
        })?;
    let expected = exchange.nonce.wrapping_add(1);
    if data.nonce != expected {
        return Err(ProtocolError::NonceMismatch {
            expected,
            got: data.nonce,
        });
    }
    if data.proof_request.nonce != data.nonce.to_string() {
        return Err(ProtocolError::UnexpectedMessage(format!(
            "proof request nonce {} does not match message nonce {}",
            data.proof_request.nonce, data.nonce
        )));
    }

    // First stored claim per referent, in engine order
    let request = data.proof_request;
    let candidates = session.engine().search_for_predicate(&request).await?;
    let selected = match candidates.select_first(&request) {
        Ok(selected) => selected,
        Err(referent) => {
            if let Some(e) = session.proofs.exchange_mut(ProofRole::Prover, &their_did) {
                e.status = ProofStatus::Failed;
            }
            return Err(ProtocolError::InsufficientClaims(referent));
        }
    };

    let (schemas, definitions) =
        selected_material(session.ledger(), &candidates, &selected).await?;
    let link_secret = session.config().link_secret.clone();
    let proof = session
        .engine()
        .build_proof(&request, &selected, &link_secret, &schemas, &definitions)
        .await?;

    let nonce = data.nonce.wrapping_add(1);
    let reply = ProofData {
        their_did: their_did.clone(),
        my_did: pairwise.my_did.clone(),
        nonce,
        proof,
    };
    let reply = SignedPayload::seal(session.identity(), reply, &pairwise.my_verkey).await?;
    session
        .send_pairwise(&pairwise, Message::new(PROOF, &reply)?)
        .await?;

    if let Some(e) = session.proofs.exchange_mut(ProofRole::Prover, &their_did) {
        e.status = ProofStatus::ProofSent;
        e.nonce = nonce;
        e.request = Some(request);
    }
    info!(their_did = %their_did, nonce, "proof sent");
    session.emit(AgentEvent::ProofSent { their_did });
    Ok(())
}

/// Verifier: judge the proof against the request we sent.
pub async fn handle_proof(
    session: &mut AgentSession,
    payload: SignedPayload<ProofData>,
    context: &MessageContext,
) -> Result<()> {
    let pairwise =
        session.inbound_pairwise(&payload.data.my_did, &payload.data.their_did, context)?;
    let data = payload.open(session.identity(), &pairwise.their_verkey).await?;
    let their_did = pairwise.their_did.clone();

    let exchange = session
        .proofs
        .exchange(ProofRole::Verifier, &their_did)
        .filter(|e| e.status == ProofStatus::RequestSent)
        .cloned()
        .ok_or_else(|| {
            ProtocolError::UnexpectedMessage(format!("proof from {their_did} without a request"))
        })?;
    let expected = exchange.nonce.wrapping_add(1);
    if data.nonce != expected {
        return Err(ProtocolError::NonceMismatch {
            expected,
            got: data.nonce,
        });
    }
    let request = exchange
        .request
        .ok_or(ProtocolError::MissingField("stored proof request"))?;

    let verified = match proof_material(session.ledger(), &data.proof).await {
        Ok((schemas, definitions)) => {
            session
                .engine()
                .verify_proof(&request, &data.proof, &schemas, &definitions)
                .await?
        }
        Err(ProtocolError::Ledger(LedgerError::NotFound(id))) => {
            warn!(their_did = %their_did, missing = %id, "proof names unknown ledger material");
            false
        }
        Err(e) => return Err(e),
    };

    if let Some(e) = session.proofs.exchange_mut(ProofRole::Verifier, &their_did) {
        e.status = ProofStatus::Verified;
        e.nonce = data.nonce;
        e.verified = Some(verified);
    }
    info!(their_did = %their_did, verified, "proof verified");
    session.emit(AgentEvent::ProofVerified {
        their_did,
        verified,
    });
    Ok(())
}

/// Outcome of the verifier's exchange with `their_did`, once judged.
pub fn proof_outcome(session: &AgentSession, their_did: &Did) -> Option<bool> {
    session
        .proofs
        .exchange(ProofRole::Verifier, their_did)
        .and_then(|e| e.verified)
}

async fn selected_material(
    ledger: &dyn Ledger,
    candidates: &CandidateClaims,
    selected: &RequestedClaims,
) -> Result<Material> {
    let mut ids = Vec::new();
    for (referent, attribute) in &selected.requested_attributes {
        let info = candidates
            .attrs
            .get(referent)
            .and_then(|c| c.iter().find(|info| info.referent == attribute.cred_id))
            .ok_or_else(|| ProtocolError::InsufficientClaims(referent.clone()))?;
        ids.push((info.schema_id.clone(), info.cred_def_id.clone()));
    }
    fetch_material(ledger, ids).await
}

async fn proof_material(ledger: &dyn Ledger, proof: &Proof) -> Result<Material> {
    let ids = proof
        .identifiers
        .iter()
        .map(|i| (i.schema_id.clone(), i.cred_def_id.clone()))
        .collect();
    fetch_material(ledger, ids).await
}

async fn fetch_material(ledger: &dyn Ledger, ids: Vec<(String, String)>) -> Result<Material> {
    let mut schemas = BTreeMap::new();
    let mut definitions = BTreeMap::new();
    for (schema_id, cred_def_id) in ids {
        if !schemas.contains_key(&schema_id) {
            let schema = ledger.get_schema(&schema_id).await?;
            schemas.insert(schema_id, schema);
        }
        if !definitions.contains_key(&cred_def_id) {
            let definition = ledger.get_definition(&cred_def_id).await?;
            definitions.insert(cred_def_id, definition);
        }
    }
    Ok((schemas, definitions))
}
