//! # medic
//!
//! Peer-to-peer agents that connect, issue claims and prove them.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use medic::{launch, AgentConfig, MemoryLedger, MemoryRelay};
//! use std::sync::Arc;
//!
//! # async fn run() -> medic::Result<()> {
//! let relay = MemoryRelay::new();
//! let ledger = Arc::new(MemoryLedger::new());
//!
//! let (steward, _) = launch(AgentConfig::new("Steward"), ledger.clone(), &relay);
//! let (doctor, _) = launch(AgentConfig::new("Doctor"), ledger, &relay);
//!
//! let code = steward.generate_invitation().await?;
//! let key = doctor.receive_invitation(&code).await?;
//! doctor.send_request(key).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`core`] - Identifiers, keys, envelopes and signed fields
//! - [`claims`] - Claim engine and ledger collaborators
//! - [`protocol`] - Connection, credential and proof protocols

pub use medic_claims as claims;
pub use medic_core as core;
pub use medic_protocol as protocol;

// Re-export common types at root
pub use medic_claims::{attribute_values, AttributeValues, MemoryEngine, MemoryLedger};
pub use medic_core::{Did, MemoryRelay, MemoryWallet, VerKey};
pub use medic_protocol::{
    AgentConfig, AgentEvent, AgentHandle, AgentRuntime, AgentSession, Collaborators,
    ProtocolError, Result,
};

use medic_claims::Ledger;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Start an agent with an in-memory wallet and engine on `relay`.
///
/// Must be called inside a tokio runtime. The worker hands its session back
/// when it shuts down.
pub fn launch(
    config: AgentConfig,
    ledger: Arc<dyn Ledger>,
    relay: &MemoryRelay,
) -> (AgentHandle, JoinHandle<AgentSession>) {
    let (runtime, handle) = AgentRuntime::new(&config);
    let transport = relay.connect(config.label.clone(), Arc::new(handle.clone()));
    tracing::debug!(agent = %config.label, "launching agent");

    let session = AgentSession::new(
        config.clone(),
        Collaborators {
            identity: Arc::new(MemoryWallet::opened(config.label)),
            engine: Arc::new(MemoryEngine::new()),
            ledger,
            transport: Arc::new(transport),
        },
    );
    (handle, runtime.spawn(session))
}
