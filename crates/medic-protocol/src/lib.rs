//! # medic-protocol
//!
//! The agent-to-agent protocol engine.
//!
//! An [`AgentSession`] holds one agent's connection, credential and proof
//! state. Protocol handlers take the session by `&mut`; the [`dispatcher`]
//! routes every inbound message to exactly one of them, and [`AgentRuntime`]
//! runs a session on a single worker task fed by an ordered queue.
//!
//! ## Example
//!
//! ```rust,ignore
//! let (runtime, handle) = AgentRuntime::new(&config);
//! let transport = relay.connect(handle.label(), Arc::new(handle.clone()));
//! let session = AgentSession::new(config, Collaborators { identity, engine, ledger, transport: Arc::new(transport) });
//! runtime.spawn(session);
//!
//! let code = handle.generate_invitation().await?;
//! ```

pub mod config;
pub mod connection;
pub mod credential;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod payload;
pub mod proof;
pub mod session;
pub mod worker;

#[cfg(test)]
mod testing;

pub use config::{AgentConfig, ProofTemplate};
pub use connection::{Invitation, PairwiseConnection, PendingConnection};
pub use dispatcher::{handle_frame, handle_inbound, Disposition};
pub use error::{ProtocolError, Result};
pub use events::AgentEvent;
pub use payload::SignedPayload;
pub use session::{AgentSession, Collaborators};
pub use worker::{AgentHandle, AgentRuntime, Command, Job};
