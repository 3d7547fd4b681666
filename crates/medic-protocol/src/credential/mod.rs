//! Credential protocol: offer, request, claim.
//!
//! Each hop carries the previous hop's nonce plus one. Exchanges are keyed
//! by `(schema type, counterpart)`, so offers of different types run side by
//! side without touching each other.

mod messages;
mod state;

pub use messages::{ClaimData, CredentialMessage, OfferData, RequestData, CLAIM, OFFER, REQUEST};
pub use state::{ClaimType, CredentialBook, CredentialExchange, CredentialRole, CredentialStatus};

use crate::error::{ProtocolError, Result};
use crate::events::AgentEvent;
use crate::payload::SignedPayload;
use crate::session::AgentSession;
use medic_core::{Did, Message, MessageContext};
use tracing::{debug, info};

/// Issuer: offer a registered claim type to an established counterpart.
///
/// Returns the nonce the exchange starts from.
pub async fn offer_credential(
    session: &mut AgentSession,
    their_did: &Did,
    schema_type: &str,
) -> Result<u64> {
    let pairwise = session.pairwise(their_did)?;
    let claim_type = session
        .credentials
        .claim_type(schema_type)
        .cloned()
        .ok_or_else(|| ProtocolError::SchemaTypeMismatch(schema_type.to_string()))?;

    let offer = session
        .engine()
        .create_offer(&claim_type.definition.id)
        .await?;
    let nonce = u64::from(rand::random::<u32>());

    let data = OfferData {
        their_did: pairwise.their_did.clone(),
        my_did: pairwise.my_did.clone(),
        schema_type: schema_type.to_string(),
        nonce,
        cred_def_id: claim_type.definition.id.clone(),
        definition: claim_type.definition.clone(),
        offer: offer.clone(),
        schema: claim_type.schema.clone(),
    };
    let payload = SignedPayload::seal(session.identity(), data, &pairwise.my_verkey).await?;
    session
        .send_pairwise(&pairwise, Message::new(OFFER, &payload)?)
        .await?;

    session.credentials.open(CredentialExchange {
        schema_type: schema_type.to_string(),
        their_did: pairwise.their_did.clone(),
        role: CredentialRole::Issuer,
        status: CredentialStatus::OfferSent,
        nonce,
        offer,
        definition: claim_type.definition,
        schema: claim_type.schema,
        request_metadata: None,
        referent: None,
    });
    info!(schema_type = %schema_type, their_did = %their_did, nonce, "credential offered");
    session.emit(AgentEvent::CredentialOffered {
        schema_type: schema_type.to_string(),
        their_did: their_did.clone(),
    });
    Ok(nonce)
}

/// Holder: bind a request to the offer and send it back.
pub async fn handle_offer(
    session: &mut AgentSession,
    payload: SignedPayload<OfferData>,
    context: &MessageContext,
) -> Result<()> {
    let pairwise =
        session.inbound_pairwise(&payload.data.my_did, &payload.data.their_did, context)?;
    let data = payload.open(session.identity(), &pairwise.their_verkey).await?;
    let schema_type = data.schema_type.clone();

    if let Some(existing) = session.credentials.exchange(&schema_type, &pairwise.their_did) {
        if existing.role == CredentialRole::Holder && existing.offer == data.offer {
            debug!(schema_type = %schema_type, nonce = data.nonce, "offer already answered");
            return Ok(());
        }
    }
    if data.cred_def_id != data.definition.id || data.schema.id != data.definition.schema_id {
        return Err(ProtocolError::SchemaTypeMismatch(format!(
            "{schema_type} offer names {} but carries {}",
            data.cred_def_id, data.definition.id
        )));
    }

    session.emit(AgentEvent::CredentialOfferReceived {
        schema_type: schema_type.clone(),
        their_did: pairwise.their_did.clone(),
    });

    let link_secret = session.config().link_secret.clone();
    session.engine().create_link_secret(&link_secret).await?;
    let (request, request_metadata) = session
        .engine()
        .create_request(&data.offer, &data.definition, &pairwise.my_did, &link_secret)
        .await?;

    let nonce = data.nonce.wrapping_add(1);
    let reply = RequestData {
        their_did: pairwise.their_did.clone(),
        my_did: pairwise.my_did.clone(),
        schema_type: schema_type.clone(),
        nonce,
        request,
    };
    let reply = SignedPayload::seal(session.identity(), reply, &pairwise.my_verkey).await?;
    session
        .send_pairwise(&pairwise, Message::new(REQUEST, &reply)?)
        .await?;

    session.credentials.open(CredentialExchange {
        schema_type: schema_type.clone(),
        their_did: pairwise.their_did.clone(),
        role: CredentialRole::Holder,
        status: CredentialStatus::RequestSent,
        nonce,
        offer: data.offer,
        definition: data.definition,
        schema: data.schema,
        request_metadata: Some(request_metadata),
        referent: None,
    });
    info!(schema_type = %schema_type, their_did = %pairwise.their_did, nonce, "credential requested");
    Ok(())
}

/// Issuer: issue against the request answering our offer.
pub async fn handle_request(
    session: &mut AgentSession,
    payload: SignedPayload<RequestData>,
    context: &MessageContext,
) -> Result<()> {
    let pairwise =
        session.inbound_pairwise(&payload.data.my_did, &payload.data.their_did, context)?;
    let data = payload.open(session.identity(), &pairwise.their_verkey).await?;
    let schema_type = data.schema_type.clone();

    let exchange = session
        .credentials
        .exchange(&schema_type, &pairwise.their_did)
        .filter(|e| e.role == CredentialRole::Issuer && e.status == CredentialStatus::OfferSent)
        .cloned()
        .ok_or_else(|| ProtocolError::SchemaTypeMismatch(schema_type.clone()))?;
    check_nonce(exchange.nonce, data.nonce)?;

    let values = session
        .credentials
        .claim_type(&schema_type)
        .map(|t| t.values.clone())
        .ok_or_else(|| ProtocolError::SchemaTypeMismatch(schema_type.clone()))?;
    let claim = session
        .engine()
        .issue(&exchange.definition.id, &exchange.offer, &data.request, &values)
        .await?;

    let nonce = data.nonce.wrapping_add(1);
    let reply = ClaimData {
        their_did: pairwise.their_did.clone(),
        my_did: pairwise.my_did.clone(),
        schema_type: schema_type.clone(),
        nonce,
        claim,
    };
    let reply = SignedPayload::seal(session.identity(), reply, &pairwise.my_verkey).await?;
    session
        .send_pairwise(&pairwise, Message::new(CLAIM, &reply)?)
        .await?;

    if let Some(e) = session
        .credentials
        .exchange_mut(&schema_type, &pairwise.their_did)
    {
        e.status = CredentialStatus::Issued;
        e.nonce = nonce;
    }
    info!(schema_type = %schema_type, their_did = %pairwise.their_did, nonce, "credential issued");
    session.emit(AgentEvent::CredentialIssued {
        schema_type,
        their_did: pairwise.their_did,
    });
    Ok(())
}

/// Holder: store the issued claim.
pub async fn handle_claim(
    session: &mut AgentSession,
    payload: SignedPayload<ClaimData>,
    context: &MessageContext,
) -> Result<()> {
    let pairwise =
        session.inbound_pairwise(&payload.data.my_did, &payload.data.their_did, context)?;
    let data = payload.open(session.identity(), &pairwise.their_verkey).await?;
    let schema_type = data.schema_type.clone();

    let exchange = session
        .credentials
        .exchange(&schema_type, &pairwise.their_did)
        .filter(|e| e.role == CredentialRole::Holder && e.status == CredentialStatus::RequestSent)
        .cloned()
        .ok_or_else(|| ProtocolError::SchemaTypeMismatch(schema_type.clone()))?;
    check_nonce(exchange.nonce, data.nonce)?;
    let metadata = exchange
        .request_metadata
        .as_ref()
        .ok_or(ProtocolError::MissingField("request metadata"))?;

    let referent = session
        .engine()
        .store(metadata, &data.claim, &exchange.definition)
        .await?;

    if let Some(e) = session
        .credentials
        .exchange_mut(&schema_type, &pairwise.their_did)
    {
        e.status = CredentialStatus::Stored;
        e.nonce = data.nonce;
        e.referent = Some(referent.clone());
    }
    session.credentials.mark_obtained(&schema_type);
    info!(
        schema_type = %schema_type,
        their_did = %pairwise.their_did,
        nonce = data.nonce,
        referent = %referent,
        "credential stored"
    );
    session.emit(AgentEvent::CredentialStored {
        schema_type,
        their_did: pairwise.their_did,
    });
    Ok(())
}

/// A hop must carry the previous hop's nonce plus one.
fn check_nonce(previous: u64, got: u64) -> Result<()> {
    let expected = previous.wrapping_add(1);
    if got != expected {
        return Err(ProtocolError::NonceMismatch { expected, got });
    }
    Ok(())
}
