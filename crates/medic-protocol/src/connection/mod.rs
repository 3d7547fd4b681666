//! Connection protocol: invitation, request, response.
//!
//! The inviter mints a single-use connection key and exports it in an
//! invitation. The invitee answers with a request carrying its fresh
//! pairwise DID document. The inviter answers with its own document signed
//! by the connection key, which ties the new relationship to the invitation.

mod messages;
mod state;

pub use messages::{
    ConnectionMessage, ConnectionRequest, ConnectionResponse, Invitation, INVITATION, REQUEST,
    RESPONSE,
};
pub use state::{
    ConnectionStatus, ConnectionTable, HistoryEntry, PairwiseConnection, PairwiseStatus,
    PendingConnection,
};

use crate::error::{ProtocolError, Result};
use crate::events::AgentEvent;
use crate::session::AgentSession;
use medic_core::{sign_field, verify_field, ConnectionInfo, Did, Message, MessageContext, VerKey};
use serde_json::json;
use tracing::{debug, info};

/// Mint a connection key and return the portable invitation code.
pub async fn generate_invitation(session: &mut AgentSession) -> Result<String> {
    let connection_key = session.identity().create_key().await?;
    let initialized = session.credentials.has_registrations();
    let invitation = Invitation::new(session.owner(), connection_key, initialized);
    let code = invitation.encode()?;

    session.connections.issue(connection_key);
    info!(connection_key = %connection_key, "generated invitation");
    Ok(code)
}

/// Decode an invitation code into a pending connection.
///
/// Receiving the same invitation again is a no-op.
pub async fn receive_invitation(session: &mut AgentSession, code: &str) -> Result<VerKey> {
    let invitation = Invitation::decode(code)?;
    let connection_key = invitation.connection_key()?;

    if session.connections.is_retired(&connection_key) {
        return Err(ProtocolError::UnknownConnectionKey(connection_key.to_string()));
    }
    if session.connections.pending(&connection_key).is_some() {
        debug!(connection_key = %connection_key, "invitation already received");
        return Ok(connection_key);
    }

    let mut pending = PendingConnection::new(
        connection_key,
        invitation.label.clone(),
        ConnectionStatus::InviteReceived,
    );
    pending.record(ConnectionStatus::InviteReceived, invitation.to_message()?);
    session.connections.insert_pending(pending);

    info!(connection_key = %connection_key, label = %invitation.label, "invitation received");
    session.emit(AgentEvent::InvitationReceived {
        connection_key,
        label: invitation.label,
    });
    Ok(connection_key)
}

/// Answer a received invitation with a connection request.
pub async fn send_request(session: &mut AgentSession, connection_key: &VerKey) -> Result<()> {
    let label = match session.connections.pending(connection_key) {
        Some(p) if p.status == ConnectionStatus::InviteReceived => p.label.clone(),
        Some(p) => {
            return Err(ProtocolError::UnexpectedMessage(format!(
                "request for {connection_key} while {:?}",
                p.status
            )))
        }
        None => return Err(ProtocolError::UnknownConnectionKey(connection_key.to_string())),
    };

    let (my_did, my_verkey) = session.identity().create_local_identifier().await?;
    session
        .identity()
        .set_metadata(&my_did, json!({ "label": label }))
        .await?;

    let request = ConnectionRequest {
        label: session.owner().to_string(),
        connection: ConnectionInfo::new(&my_did, &my_verkey),
    };
    let message = Message::new(REQUEST, &request)?
        .with_send_to(label.clone())
        .with_from(session.owner().to_string());
    session.send(&message, connection_key, &my_verkey).await?;

    if let Some(pending) = session.connections.pending_mut(connection_key) {
        pending.my_did = Some(my_did.clone());
        pending.my_verkey = Some(my_verkey);
        pending.request_id = Some(message.id.clone());
        pending.record(ConnectionStatus::RequestSent, message);
    }
    info!(connection_key = %connection_key, my_did = %my_did, to = %label, "connection request sent");
    Ok(())
}

/// Inviter side: a request arrived at one of our connection keys.
pub async fn handle_request(
    session: &mut AgentSession,
    message: Message,
    request: ConnectionRequest,
    context: &MessageContext,
) -> Result<()> {
    let connection_key = context.to_key.ok_or(ProtocolError::MissingField("recipient key"))?;

    if !session.connections.is_issued(&connection_key) {
        return Err(ProtocolError::UnknownConnectionKey(connection_key.to_string()));
    }
    if session.connections.pending(&connection_key).is_some() {
        debug!(connection_key = %connection_key, "duplicate connection request");
        return Ok(());
    }

    let their_did = request.connection.did.clone();
    let their_verkey = request.connection.verkey()?;
    if context.from_key != Some(their_verkey) {
        return Err(ProtocolError::SignatureInvalid(
            "request was not sent by the key its document names".into(),
        ));
    }

    // Remember the counterpart and mint our side of the relationship
    let identity = session.identity();
    identity.store_counterpart(&their_did, &their_verkey).await?;
    identity
        .set_metadata(&their_did, json!({ "label": request.label }))
        .await?;
    let (my_did, my_verkey) = identity.create_local_identifier().await?;

    session.connections.upsert_pairwise(PairwiseConnection {
        my_did: my_did.clone(),
        my_verkey,
        their_did: their_did.clone(),
        their_verkey,
        label: request.label.clone(),
        connection_key,
        status: PairwiseStatus::Provisional,
    });

    let mut pending = PendingConnection::new(
        connection_key,
        request.label.clone(),
        ConnectionStatus::RequestReceived,
    );
    pending.my_did = Some(my_did);
    pending.my_verkey = Some(my_verkey);
    pending.their_did = Some(their_did.clone());
    pending.their_verkey = Some(their_verkey);
    pending.request_id = Some(message.id.clone());
    pending.record(ConnectionStatus::RequestReceived, message);
    session.connections.insert_pending(pending);

    info!(connection_key = %connection_key, their_did = %their_did, "connection request received");
    session.emit(AgentEvent::ConnectionRequested {
        connection_key,
        label: request.label,
        their_did,
    });

    if session.config().auto_respond {
        send_response(session, &connection_key).await?;
    }
    Ok(())
}

/// Inviter side: answer a received request and establish the relationship.
pub async fn send_response(session: &mut AgentSession, connection_key: &VerKey) -> Result<()> {
    let pending = match session.connections.pending(connection_key) {
        Some(p) if p.status == ConnectionStatus::RequestReceived => p.clone(),
        Some(p) => {
            return Err(ProtocolError::UnexpectedMessage(format!(
                "response for {connection_key} while {:?}",
                p.status
            )))
        }
        None => return Err(ProtocolError::UnknownConnectionKey(connection_key.to_string())),
    };
    let (my_did, my_verkey, their_did, their_verkey, request_id) = match pending {
        PendingConnection {
            my_did: Some(my_did),
            my_verkey: Some(my_verkey),
            their_did: Some(their_did),
            their_verkey: Some(their_verkey),
            request_id: Some(request_id),
            ..
        } => (my_did, my_verkey, their_did, their_verkey, request_id),
        _ => return Err(ProtocolError::MissingField("pending connection identifiers")),
    };

    // Sign our document with the invitation key to prove continuity
    let info = ConnectionInfo::new(&my_did, &my_verkey);
    let connection_sig = sign_field(session.identity(), &info, connection_key).await?;
    let message = Message::new(RESPONSE, &ConnectionResponse { connection_sig })?
        .with_thread(request_id)
        .with_send_to(pending.label.clone())
        .with_from(session.owner().to_string());
    session.send(&message, &their_verkey, &my_verkey).await?;

    if let Some(p) = session.connections.pending_mut(connection_key) {
        p.record(ConnectionStatus::ResponseSent, message);
    }
    finish(session, connection_key, &my_did, &their_did, &pending.label);
    Ok(())
}

/// Invitee side: the inviter answered our request.
pub async fn handle_response(
    session: &mut AgentSession,
    message: Message,
    response: ConnectionResponse,
    context: &MessageContext,
) -> Result<()> {
    let connection_key = response.connection_sig.signer;
    let pending = match session.connections.pending(&connection_key) {
        Some(p) if p.status == ConnectionStatus::RequestSent => p.clone(),
        Some(p) => {
            return Err(ProtocolError::UnexpectedMessage(format!(
                "response for {connection_key} while {:?}",
                p.status
            )))
        }
        None => return Err(ProtocolError::UnknownConnectionKey(connection_key.to_string())),
    };

    let field = verify_field(session.identity(), &response.connection_sig).await?;
    if !field.verified {
        return Err(ProtocolError::SignatureInvalid(format!(
            "connection~sig does not verify under {connection_key}"
        )));
    }
    if message.thid().is_none() || message.thid() != pending.request_id.as_deref() {
        return Err(ProtocolError::UnexpectedMessage(
            "response is not threaded on our request".into(),
        ));
    }

    let info: ConnectionInfo = field.into_typed()?;
    let their_did = info.did.clone();
    let their_verkey = info.verkey()?;
    if context.from_key != Some(their_verkey) {
        return Err(ProtocolError::SignatureInvalid(
            "response was not sent by the key its document names".into(),
        ));
    }
    let (my_did, my_verkey) = match (pending.my_did.clone(), pending.my_verkey) {
        (Some(did), Some(key)) => (did, key),
        _ => return Err(ProtocolError::MissingField("pending connection identifiers")),
    };

    let identity = session.identity();
    identity.store_counterpart(&their_did, &their_verkey).await?;
    identity
        .set_metadata(&their_did, json!({ "label": pending.label }))
        .await?;

    session.connections.upsert_pairwise(PairwiseConnection {
        my_did: my_did.clone(),
        my_verkey,
        their_did: their_did.clone(),
        their_verkey,
        label: pending.label.clone(),
        connection_key,
        status: PairwiseStatus::Provisional,
    });
    if let Some(p) = session.connections.pending_mut(&connection_key) {
        p.their_did = Some(their_did.clone());
        p.their_verkey = Some(their_verkey);
        p.record(ConnectionStatus::ResponseReceived, message);
    }
    finish(session, &connection_key, &my_did, &their_did, &pending.label);
    Ok(())
}

fn finish(
    session: &mut AgentSession,
    connection_key: &VerKey,
    my_did: &Did,
    their_did: &Did,
    label: &str,
) {
    session.connections.establish(my_did, their_did);
    session.connections.retire(connection_key);
    info!(
        connection_key = %connection_key,
        my_did = %my_did,
        their_did = %their_did,
        "connection established"
    );
    session.emit(AgentEvent::ConnectionEstablished {
        my_did: my_did.clone(),
        their_did: their_did.clone(),
        label: label.to_string(),
    });
}
