//! Routes inbound messages to exactly one protocol handler.

use crate::connection::{self, ConnectionMessage};
use crate::credential::{self, CredentialMessage};
use crate::error::{ProtocolError, Result};
use crate::events::AgentEvent;
use crate::proof::{self, ProofMessage};
use crate::session::AgentSession;
use medic_core::{Message, MessageContext};
use tracing::{debug, info_span, warn, Instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Connection,
    Credential,
    Proof,
}

/// Every inbound message type this agent understands.
pub const ROUTES: &[(&str, Protocol)] = &[
    (connection::REQUEST, Protocol::Connection),
    (connection::RESPONSE, Protocol::Connection),
    (credential::OFFER, Protocol::Credential),
    (credential::REQUEST, Protocol::Credential),
    (credential::CLAIM, Protocol::Credential),
    (proof::OFFER, Protocol::Proof),
    (proof::REQUEST, Protocol::Proof),
    (proof::PROOF, Protocol::Proof),
];

pub fn route(message_type: &str) -> Option<Protocol> {
    ROUTES
        .iter()
        .find(|(tag, _)| *tag == message_type)
        .map(|(_, protocol)| *protocol)
}

/// What happened to one inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Handled,
    /// Addressed to someone else.
    Ignored,
}

/// Process one message to completion.
///
/// Messages whose `@sendTo` is not the owner are ignored; unknown types are
/// rejected with [`ProtocolError::UnknownMessageType`].
pub async fn handle_inbound(
    session: &mut AgentSession,
    message: Message,
    context: Option<MessageContext>,
) -> Result<Disposition> {
    if message.send_to.as_deref() != Some(session.owner()) {
        debug!(
            message_type = %message.type_,
            send_to = ?message.send_to,
            "message not addressed to owner"
        );
        return Ok(Disposition::Ignored);
    }
    let context = context.unwrap_or_default();

    let span = info_span!("inbound", message_type = %message.type_, id = %message.id);
    match route(&message.type_) {
        Some(Protocol::Connection) => match ConnectionMessage::from_message(&message)? {
            ConnectionMessage::Request(request) => {
                connection::handle_request(session, message, request, &context)
                    .instrument(span)
                    .await?
            }
            ConnectionMessage::Response(response) => {
                connection::handle_response(session, message, response, &context)
                    .instrument(span)
                    .await?
            }
        },
        Some(Protocol::Credential) => match CredentialMessage::from_message(&message)? {
            CredentialMessage::Offer(p) => {
                credential::handle_offer(session, p, &context)
                    .instrument(span)
                    .await?
            }
            CredentialMessage::Request(p) => {
                credential::handle_request(session, p, &context)
                    .instrument(span)
                    .await?
            }
            CredentialMessage::Claim(p) => {
                credential::handle_claim(session, p, &context)
                    .instrument(span)
                    .await?
            }
        },
        Some(Protocol::Proof) => match ProofMessage::from_message(&message)? {
            ProofMessage::Offer(p) => {
                proof::handle_offer(session, p, &context)
                    .instrument(span)
                    .await?
            }
            ProofMessage::Request(p) => {
                proof::handle_request(session, p, &context)
                    .instrument(span)
                    .await?
            }
            ProofMessage::Proof(p) => {
                proof::handle_proof(session, p, &context)
                    .instrument(span)
                    .await?
            }
        },
        None => return Err(ProtocolError::UnknownMessageType(message.type_)),
    }
    Ok(Disposition::Handled)
}

/// Decode a transport frame and dispatch it.
///
/// Never fails: frames for other agents are dropped quietly, everything
/// else that goes wrong is logged and published as
/// [`AgentEvent::ExchangeAborted`]. Plaintext frames are refused.
pub async fn handle_frame(session: &mut AgentSession, sender_label: &str, bytes: &[u8]) {
    let (message, context) = match session.codec().read(bytes).await {
        Ok(read) => read,
        Err(e) => match ProtocolError::from(e) {
            ProtocolError::NotAddressed => {
                debug!(from = %sender_label, "frame for another agent");
                return;
            }
            err => {
                warn!(from = %sender_label, error = %err, "dropping undecodable frame");
                session.emit(AgentEvent::ExchangeAborted {
                    message_type: String::new(),
                    reason: err.to_string(),
                });
                return;
            }
        },
    };

    let message_type = message.type_.clone();
    if context.is_none() {
        let err = ProtocolError::UnexpectedMessage(format!(
            "{message_type} arrived without an envelope"
        ));
        warn!(from = %sender_label, message_type = %message_type, "refusing plaintext frame");
        session.emit(AgentEvent::ExchangeAborted {
            message_type,
            reason: err.to_string(),
        });
        return;
    }
    if let Err(err) = handle_inbound(session, message, context).await {
        warn!(
            from = %sender_label,
            message_type = %message_type,
            error = %err,
            "exchange aborted"
        );
        session.emit(AgentEvent::ExchangeAborted {
            message_type,
            reason: err.to_string(),
        });
    }
}
